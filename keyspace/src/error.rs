//! Error types for keyspace operations.

use keyspace_types::store::{Failure, FailureKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC status error: {0}")]
    Status(#[from] tonic::Status),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("wrong type: {0}")]
    WrongType(String),

    #[error("command rejected: {0}")]
    Rejected(String),

    /// A guarded batch found its guard set changed and was not applied.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("unexpected {reply} reply to {command}")]
    UnexpectedReply {
        command: &'static str,
        reply: &'static str,
    },

    #[error("expected {expected} replies, got {actual}")]
    ReplyCount { expected: usize, actual: usize },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("task failed: {0}")]
    Task(String),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure.kind() {
            FailureKind::WrongType => Error::WrongType(failure.message),
            FailureKind::InvalidArgument => Error::InvalidArgument(failure.message),
            FailureKind::Conflict => Error::Conflict(failure.message),
            FailureKind::UnknownCommand | FailureKind::Unspecified => {
                Error::Rejected(failure.message)
            }
        }
    }
}
