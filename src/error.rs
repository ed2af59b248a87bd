//! Error types for the spam pipeline.

/// Top-level error type for a pipeline run.
///
/// Per-item failures (a failed batch fetch, a failed classification) never
/// show up here; stages swallow them and the report just gets shorter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration entry {entry:?}: {reason}")]
    ParseError { entry: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised by the pipeline runner itself.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Stage {stage} was aborted before it finished")]
    StageAborted { stage: &'static str },
}

/// Errors returned by the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Batch of {size} users exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Too many concurrent requests (limit {limit})")]
    TooManyRequests { limit: usize },

    #[error("Service {service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_into_top_level() {
        let err: Error = ConfigError::invalid("SPAMMER_BATCH_SIZE", "must be at least 1").into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration value for SPAMMER_BATCH_SIZE: must be at least 1"
        );
    }

    #[test]
    fn service_error_messages() {
        assert_eq!(
            ServiceError::BatchTooLarge { size: 3, max: 2 }.to_string(),
            "Batch of 3 users exceeds the limit of 2"
        );
        assert_eq!(
            ServiceError::TooManyRequests { limit: 5 }.to_string(),
            "Too many concurrent requests (limit 5)"
        );
    }
}
