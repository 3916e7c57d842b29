//! Reference store for the `keyspace` client.
//!
//! Byte strings and member sets live in SQLite; each gRPC `Execute` call
//! runs its command batch in one transaction.

pub mod bitmap;
pub mod config;
pub mod db;
pub mod grpc;
pub mod models;
pub mod storage;
