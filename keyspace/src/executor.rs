//! The seam between the collections and the remote store.

use std::sync::Arc;

use async_trait::async_trait;
use keyspace_types::{Command, Reply};

use crate::error::Error;

/// Executes primitive commands against the remote store.
///
/// Every call is one round trip, and the store applies the whole batch
/// atomically: either every command runs and one reply per command comes
/// back in order, or none runs and an error is returned. Implementations
/// must not retry; timeouts and transport failures are reported as-is.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, commands: Vec<Command>) -> Result<Vec<Reply>, Error>;
}

/// A remote key together with the executor that reaches it.
pub(crate) struct RemoteKey {
    name: String,
    executor: Arc<dyn Executor>,
}

impl RemoteKey {
    pub(crate) fn new(name: String, executor: Arc<dyn Executor>) -> Self {
        Self { name, executor }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn key(&self) -> String {
        self.name.clone()
    }

    /// Another key reached through the same executor.
    pub(crate) fn sibling(&self, name: String) -> RemoteKey {
        RemoteKey {
            name,
            executor: Arc::clone(&self.executor),
        }
    }

    pub(crate) async fn run(&self, command: Command) -> Result<Reply, Error> {
        let mut replies = self.run_atomic(vec![command]).await?;
        replies.pop().ok_or(Error::ReplyCount {
            expected: 1,
            actual: 0,
        })
    }

    pub(crate) async fn run_atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>, Error> {
        let expected = commands.len();
        let replies = self.executor.execute(commands).await?;
        if replies.len() != expected {
            return Err(Error::ReplyCount {
                expected,
                actual: replies.len(),
            });
        }
        Ok(replies)
    }
}
