use crate::storage::{ExecError, Storage};
use keyspace_types::store::{
    store_server::{Store, StoreServer},
    ExecuteRequest, ExecuteResponse, Failure,
};
use keyspace_types::{Command, Reply};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct StoreService {
    storage: Arc<Storage>,
}

impl StoreService {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

fn failure(err: ExecError) -> Result<Response<ExecuteResponse>, Status> {
    match err {
        ExecError::Failure { kind, message } => {
            tracing::debug!(kind = kind.as_str_name(), %message, "batch rejected");
            Ok(Response::new(ExecuteResponse {
                replies: Vec::new(),
                failure: Some(Failure {
                    kind: kind as i32,
                    message,
                }),
            }))
        }
        ExecError::Sql(e) => {
            tracing::error!(error = %e, "batch failed");
            Err(Status::internal(format!("Database error: {}", e)))
        }
    }
}

#[tonic::async_trait]
impl Store for StoreService {
    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> Result<Response<ExecuteResponse>, Status> {
        let req = request.into_inner();

        let mut commands = Vec::with_capacity(req.commands.len());
        for raw in req.commands {
            match Command::try_from(raw) {
                Ok(command) => commands.push(command),
                Err(e) => return failure(e.into()),
            }
        }

        tracing::trace!(count = commands.len(), "executing batch");
        match self.storage.execute(commands).await {
            Ok(replies) => Ok(Response::new(ExecuteResponse {
                replies: replies.into_iter().map(Reply::into).collect(),
                failure: None,
            })),
            Err(e) => failure(e),
        }
    }
}

pub fn create_server(storage: Arc<Storage>) -> StoreServer<StoreService> {
    StoreServer::new(StoreService::new(storage))
}
