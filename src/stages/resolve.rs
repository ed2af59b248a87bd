//! Resolve-and-dedup stage — one lookup per address, one `User` per identity.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::pipeline::{Address, Stage, User, join_tasks};
use crate::services::UserDirectory;

const STAGE: &str = "resolve";

/// Resolves every address concurrently and forwards each user id once.
pub struct ResolveStage {
    directory: Arc<dyn UserDirectory>,
}

impl ResolveStage {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Stage for ResolveStage {
    type Input = Address;
    type Output = User;

    fn name(&self) -> &'static str {
        STAGE
    }

    async fn run(self, mut input: UnboundedReceiver<Address>, output: UnboundedSender<User>) {
        // Ids already forwarded during this run.
        let seen: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut tasks = JoinSet::new();

        while let Some(address) = input.recv().await {
            let directory = Arc::clone(&self.directory);
            let seen = Arc::clone(&seen);
            let output = output.clone();

            tasks.spawn(async move {
                let user = directory.resolve_user(&address).await;

                // Check-and-insert is one critical section: two aliases racing
                // here cannot both see the id as new.
                let first = seen.lock().await.insert(user.id);
                if !first {
                    trace!(address = %address, user_id = user.id, "Duplicate user, skipping");
                    return;
                }

                if output.send(user).is_err() {
                    debug!(stage = STAGE, "Downstream closed, dropping user");
                }
            });
        }

        join_tasks(STAGE, tasks).await;
        let unique_users = seen.lock().await.len();
        debug!(stage = STAGE, unique_users, "All addresses resolved");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::pipeline::Pipeline;

    /// Directory backed by a fixed address -> id table; unknown addresses get id 0.
    struct TableDirectory {
        ids: HashMap<&'static str, u64>,
        delay: Duration,
    }

    #[async_trait]
    impl UserDirectory for TableDirectory {
        async fn resolve_user(&self, address: &str) -> User {
            tokio::time::sleep(self.delay).await;
            tokio::task::yield_now().await;
            User {
                id: self.ids.get(address).copied().unwrap_or(0),
                email: address.to_string(),
            }
        }
    }

    async fn resolve(directory: TableDirectory, addresses: Vec<&str>) -> Vec<User> {
        let addresses: Vec<Address> = addresses.into_iter().map(String::from).collect();
        Pipeline::from_items(addresses)
            .stage(ResolveStage::new(Arc::new(directory)))
            .collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn repeated_address_is_forwarded_once() {
        let directory = TableDirectory {
            ids: HashMap::from([("a@x", 1), ("b@x", 2)]),
            delay: Duration::ZERO,
        };
        let mut users = resolve(directory, vec!["a@x", "b@x", "a@x"]).await;
        users.sort_by_key(|u| u.id);

        let ids: Vec<u64> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn aliases_collapse_to_one_user() {
        let directory = TableDirectory {
            ids: HashMap::from([("bob@x", 7), ("robert@x", 7), ("bobby@x", 7)]),
            delay: Duration::ZERO,
        };
        let users = resolve(directory, vec!["bob@x", "robert@x", "bobby@x"]).await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_resolutions_never_duplicate() {
        let addresses: Vec<&'static str> = vec!["a@x", "b@x", "c@x", "d@x", "e@x"];
        let ids: HashMap<&'static str, u64> = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| (*a, i as u64 % 3))
            .collect();
        let directory = TableDirectory {
            ids,
            delay: Duration::from_millis(1),
        };

        let input: Vec<&str> = addresses.iter().cycle().take(500).copied().collect();
        let users = resolve(directory, input).await;

        let unique: HashSet<u64> = users.iter().map(|u| u.id).collect();
        assert_eq!(users.len(), unique.len());
        assert_eq!(unique, HashSet::from([0, 1, 2]));
    }

    #[tokio::test]
    async fn empty_input_emits_nothing() {
        let directory = TableDirectory {
            ids: HashMap::new(),
            delay: Duration::ZERO,
        };
        assert!(resolve(directory, vec![]).await.is_empty());
    }
}
