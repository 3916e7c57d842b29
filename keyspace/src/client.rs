//! Entry point handing out remote collections.

use std::sync::Arc;

use serde::Serialize;

use crate::bitset::RemoteBitSet;
use crate::error::Error;
use crate::executor::Executor;
use crate::grpc::{ConnectOptions, GrpcExecutor, ServerAddr};
use crate::multimap::{MultimapValue, RemoteSetMultimap};

/// A connection to a keyspace store.
///
/// Creating a collection handle is free: no remote key is created until the
/// first write. Cloning a `Keyspace` shares the underlying executor.
#[derive(Clone)]
pub struct Keyspace {
    executor: Arc<dyn Executor>,
}

impl Keyspace {
    /// Connects to a keyspace store over gRPC.
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
        let executor = GrpcExecutor::connect_with(addr, options).await?;
        Ok(Self::with_executor(executor))
    }

    /// Uses a custom executor instead of gRPC.
    pub fn with_executor(executor: impl Executor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn from_shared(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub fn bitset(&self, name: impl Into<String>) -> RemoteBitSet {
        RemoteBitSet::new(name.into(), Arc::clone(&self.executor))
    }

    pub fn set_multimap<K, V>(&self, name: impl Into<String>) -> RemoteSetMultimap<K, V>
    where
        K: Serialize,
        V: MultimapValue,
    {
        RemoteSetMultimap::new(name.into(), Arc::clone(&self.executor))
    }
}
