//! Scripted executor for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use keyspace_types::{Command, Reply};

use crate::error::Error;
use crate::executor::Executor;

/// Answers each call with the next queued response and records every batch
/// it receives.
pub(crate) struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<Vec<Reply>, Error>>>,
    calls: Mutex<Vec<Vec<Command>>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a single-reply response.
    pub(crate) fn reply(self, reply: Reply) -> Self {
        self.replies(vec![reply])
    }

    /// Queues a response to a batch.
    pub(crate) fn replies(self, replies: Vec<Reply>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(replies));
        self
    }

    pub(crate) fn fail(self, error: Error) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Command>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, commands: Vec<Command>) -> Result<Vec<Reply>, Error> {
        self.calls.lock().unwrap().push(commands);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Rejected("no scripted response left".into())))
    }
}
