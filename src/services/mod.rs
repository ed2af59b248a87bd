//! External collaborators the pipeline calls.
//!
//! The pipeline only depends on these traits. Production wiring points them at
//! real services; `simulated` provides in-process stand-ins.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::pipeline::{Message, MessageId, User};

pub use simulated::{SimulatedClassifier, SimulatedMessageStore, SimulatedUserDirectory};

/// Resolves an address to the user that owns it.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Always succeeds. The same address always yields the same `User::id`.
    async fn resolve_user(&self, address: &str) -> User;
}

/// Bulk message retrieval.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch every message of every user in `users`.
    ///
    /// On error none of the batch's messages are usable.
    async fn fetch_messages(&self, users: &[User]) -> Result<Vec<Message>, ServiceError>;
}

/// Spam verdicts for single messages.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, id: MessageId) -> Result<bool, ServiceError>;
}

/// The three collaborators one pipeline run needs.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub classifier: Arc<dyn SpamClassifier>,
}

impl Services {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        classifier: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            users,
            messages,
            classifier,
        }
    }
}
