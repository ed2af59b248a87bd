//! In-process stand-ins for the user, message and spam services.
//!
//! They add artificial latency and enforce the limits of the real services:
//! the message store rejects oversized batches and the classifier rejects
//! calls beyond its concurrency limit. Every answer is a pure function of its
//! input so runs are reproducible apart from timing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::trace;

use super::{MessageStore, Services, SpamClassifier, UserDirectory};
use crate::config::{PipelineConfig, SimulationConfig};
use crate::error::ServiceError;
use crate::pipeline::{Message, MessageId, User};

/// Most messages a simulated user owns.
const MAX_MESSAGES_PER_USER: u64 = 3;

impl Services {
    /// Simulated collaborators whose limits match `pipeline`.
    pub fn simulated(sim: &SimulationConfig, pipeline: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(
                SimulatedUserDirectory::new(sim.aliases.clone())
                    .with_latency(sim.resolve_delay, sim.jitter),
            ),
            Arc::new(
                SimulatedMessageStore::new(pipeline.batch_size)
                    .with_latency(sim.fetch_delay, sim.jitter),
            ),
            Arc::new(
                SimulatedClassifier::new(pipeline.max_concurrent_classify)
                    .with_latency(sim.classify_delay, sim.jitter),
            ),
        )
    }
}

// ── Latency ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Latency {
    base: Duration,
    jitter: Duration,
}

impl Latency {
    fn sample(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.base;
        }
        let extra = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        self.base.saturating_add(extra)
    }

    async fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// 64-bit FNV-1a. Stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

// ── Users ───────────────────────────────────────────────────────────

/// Derives user ids from addresses, honouring an alias table.
#[derive(Debug, Default)]
pub struct SimulatedUserDirectory {
    aliases: HashMap<String, String>,
    latency: Latency,
}

impl SimulatedUserDirectory {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self {
            aliases,
            latency: Latency::default(),
        }
    }

    pub fn with_latency(mut self, base: Duration, jitter: Duration) -> Self {
        self.latency = Latency { base, jitter };
        self
    }

    /// Canonical form of `address`: trimmed, lowercased, aliases followed once.
    pub fn canonical(&self, address: &str) -> String {
        let normalized = address.trim().to_lowercase();
        match self.aliases.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }
}

#[async_trait]
impl UserDirectory for SimulatedUserDirectory {
    async fn resolve_user(&self, address: &str) -> User {
        self.latency.wait().await;
        let email = self.canonical(address);
        let user = User {
            id: fnv1a(email.as_bytes()),
            email,
        };
        trace!(address, user_id = user.id, "Resolved user");
        user
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Returns one to three messages per user and rejects oversized batches.
#[derive(Debug)]
pub struct SimulatedMessageStore {
    max_batch: usize,
    latency: Latency,
}

impl SimulatedMessageStore {
    pub fn new(max_batch: usize) -> Self {
        Self {
            max_batch,
            latency: Latency::default(),
        }
    }

    pub fn with_latency(mut self, base: Duration, jitter: Duration) -> Self {
        self.latency = Latency { base, jitter };
        self
    }

    /// The messages `user_id` owns.
    pub fn messages_for(user_id: u64) -> Vec<Message> {
        let count = 1 + user_id % MAX_MESSAGES_PER_USER;
        (0..count)
            .map(|index| {
                let mut seed = [0u8; 16];
                seed[..8].copy_from_slice(&user_id.to_le_bytes());
                seed[8..].copy_from_slice(&index.to_le_bytes());
                Message {
                    id: MessageId(fnv1a(&seed)),
                    user_id,
                }
            })
            .collect()
    }
}

#[async_trait]
impl MessageStore for SimulatedMessageStore {
    async fn fetch_messages(&self, users: &[User]) -> Result<Vec<Message>, ServiceError> {
        if users.is_empty() {
            return Err(ServiceError::EmptyBatch);
        }
        if users.len() > self.max_batch {
            return Err(ServiceError::BatchTooLarge {
                size: users.len(),
                max: self.max_batch,
            });
        }

        self.latency.wait().await;
        Ok(users
            .iter()
            .flat_map(|user| Self::messages_for(user.id))
            .collect())
    }
}

// ── Spam ────────────────────────────────────────────────────────────

/// Deterministic verdicts; calls over the concurrency limit fail.
#[derive(Debug)]
pub struct SimulatedClassifier {
    limit: usize,
    latency: Latency,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedClassifier {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            latency: Latency::default(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, base: Duration, jitter: Duration) -> Self {
        self.latency = Latency { base, jitter };
        self
    }

    /// Verdict for `id`, independent of timing.
    pub fn verdict(id: MessageId) -> bool {
        fnv1a(&id.0.to_le_bytes()) % 3 == 0
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpamClassifier for SimulatedClassifier {
    async fn classify(&self, id: MessageId) -> Result<bool, ServiceError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.peak.fetch_max(current, Ordering::SeqCst);

        if current > self.limit {
            return Err(ServiceError::TooManyRequests { limit: self.limit });
        }

        self.latency.wait().await;
        Ok(Self::verdict(id))
    }
}
