//! Configuration types.
//!
//! Everything is read from `SPAMMER_*` environment variables. Parsing goes
//! through a lookup closure so tests can feed a map instead of mutating the
//! process environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::ConfigError;

/// Default maximum number of users per `fetch_messages` call.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Default maximum number of in-flight classify calls.
pub const DEFAULT_MAX_CONCURRENT_CLASSIFY: usize = 5;

/// Limits the pipeline core consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum users per batch handed to the message store.
    pub batch_size: usize,
    /// Maximum concurrent classify calls.
    pub max_concurrent_classify: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_classify: DEFAULT_MAX_CONCURRENT_CLASSIFY,
        }
    }
}

impl PipelineConfig {
    /// Build from `SPAMMER_BATCH_SIZE` and `SPAMMER_MAX_CLASSIFY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            batch_size: parse_or("SPAMMER_BATCH_SIZE", &lookup, defaults.batch_size)?,
            max_concurrent_classify: parse_or(
                "SPAMMER_MAX_CLASSIFY",
                &lookup,
                defaults.max_concurrent_classify,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Both limits must be non-zero or the pipeline could never make progress.
    /// The classify limit becomes a semaphore size, which tokio caps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("SPAMMER_BATCH_SIZE", "must be at least 1"));
        }
        if self.max_concurrent_classify == 0 {
            return Err(ConfigError::invalid("SPAMMER_MAX_CLASSIFY", "must be at least 1"));
        }
        if self.max_concurrent_classify > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "SPAMMER_MAX_CLASSIFY",
                format!("must be at most {}", Semaphore::MAX_PERMITS),
            ));
        }
        Ok(())
    }
}

/// Behaviour of the in-process simulated collaborators.
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    /// Base latency of one user lookup.
    pub resolve_delay: Duration,
    /// Base latency of one batch fetch.
    pub fetch_delay: Duration,
    /// Base latency of one classify call.
    pub classify_delay: Duration,
    /// Upper bound of the random extra latency added to every call.
    pub jitter: Duration,
    /// Alias address -> canonical address.
    pub aliases: HashMap<String, String>,
}

impl SimulationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| -> Result<Duration, ConfigError> {
            parse_or(key, &lookup, default).map(Duration::from_millis)
        };

        let aliases = match lookup("SPAMMER_ALIASES") {
            Some(raw) => parse_aliases(&raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            resolve_delay: millis("SPAMMER_RESOLVE_DELAY_MS", 10)?,
            fetch_delay: millis("SPAMMER_FETCH_DELAY_MS", 50)?,
            classify_delay: millis("SPAMMER_CLASSIFY_DELAY_MS", 20)?,
            jitter: millis("SPAMMER_JITTER_MS", 10)?,
            aliases,
        })
    }
}

/// How the binary prints the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One `"<has_spam> <id>"` line per message.
    #[default]
    Text,
    /// The whole `SpamReport` as a JSON document.
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid(
                "SPAMMER_FORMAT",
                format!("expected 'text' or 'json', got '{other}'"),
            )),
        }
    }
}

impl OutputFormat {
    pub fn from_env() -> Result<Self, ConfigError> {
        std::env::var("SPAMMER_FORMAT")
            .ok()
            .map_or(Ok(Self::default()), |s| s.parse())
    }
}

/// Parse `alias=canonical` pairs separated by commas. Addresses are lowercased.
pub fn parse_aliases(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (alias, canonical) = entry.split_once('=').ok_or_else(|| ConfigError::ParseError {
                entry: entry.to_string(),
                reason: "expected alias=canonical".to_string(),
            })?;
            let (alias, canonical) = (alias.trim(), canonical.trim());
            if alias.is_empty() || canonical.is_empty() {
                return Err(ConfigError::ParseError {
                    entry: entry.to_string(),
                    reason: "empty address".to_string(),
                });
            }
            Ok((alias.to_lowercase(), canonical.to_lowercase()))
        })
        .collect()
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}
