//! Command-line and environment configuration for the store server.

use clap::Parser;
use std::net::SocketAddr;

/// Keyspace store - serves atomic command batches over gRPC
#[derive(Parser, Debug, Clone)]
#[command(name = "keyspace-server")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to accept gRPC connections on
    #[arg(long, env = "KEYSPACE_LISTEN", default_value = "127.0.0.1:50051")]
    pub listen: SocketAddr,

    /// SQLite database URL (e.g., sqlite::memory:, sqlite://keyspace.db)
    #[arg(long, env = "KEYSPACE_DATABASE_URL", default_value = "sqlite::memory:")]
    pub database_url: String,
}
