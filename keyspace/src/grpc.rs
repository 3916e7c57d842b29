//! Executor that talks to a keyspace store over gRPC.

use std::time::Duration;

use async_trait::async_trait;
use keyspace_types::store::ExecuteRequest;
use keyspace_types::store::store_client::StoreClient;
use keyspace_types::{Command, Reply};
use tonic::transport::{Channel, Endpoint};

use crate::error::Error;
use crate::executor::Executor;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`GrpcExecutor`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// How long to wait for the initial connection.
    pub connect_timeout: Duration,
    /// Per-request deadline. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }
}

/// Remote command executor backed by a tonic channel.
///
/// The channel multiplexes concurrent requests; cloning the executor is cheap
/// and shares the connection.
#[derive(Clone)]
pub struct GrpcExecutor {
    client: StoreClient<Channel>,
}

impl GrpcExecutor {
    /// Connects with default [`ConnectOptions`].
    ///
    /// # Arguments
    ///
    /// * `addr` - Server address (e.g., `"localhost:50051"`)
    pub async fn connect(addr: impl Into<ServerAddr>) -> Result<Self, Error> {
        Self::connect_with(addr, ConnectOptions::default()).await
    }

    pub async fn connect_with(
        addr: impl Into<ServerAddr>,
        options: ConnectOptions,
    ) -> Result<Self, Error> {
        let server_addr = addr.into();
        let mut endpoint = Endpoint::from_shared(format!("http://{}", server_addr.0))?
            .connect_timeout(options.connect_timeout);
        if let Some(timeout) = options.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }

        let channel = endpoint.connect().await?;
        tracing::debug!(addr = %server_addr.0, "connected to keyspace store");

        Ok(Self {
            client: StoreClient::new(channel),
        })
    }
}

#[async_trait]
impl Executor for GrpcExecutor {
    async fn execute(&self, commands: Vec<Command>) -> Result<Vec<Reply>, Error> {
        if let Some(first) = commands.first() {
            tracing::trace!(
                command = first.name(),
                key = first.key(),
                batch = commands.len(),
                "executing"
            );
        }

        let request = ExecuteRequest {
            commands: commands.into_iter().map(Into::into).collect(),
        };

        let mut client = self.client.clone();
        let response = client.execute(request).await?.into_inner();

        if let Some(failure) = response.failure {
            tracing::debug!(message = %failure.message, "store rejected batch");
            return Err(Error::from(failure));
        }

        Ok(response.replies.into_iter().map(Reply::from).collect())
    }
}

/// Server address wrapper for type-safe connection.
#[derive(Clone)]
pub struct ServerAddr(pub String);

impl From<String> for ServerAddr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerAddr {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<std::net::SocketAddr> for ServerAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self(addr.to_string())
    }
}
