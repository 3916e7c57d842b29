//! Remotely-backed collections for the keyspace store.
//!
//! `keyspace` provides two collection types whose state lives entirely in a
//! shared remote store reached through the [`Executor`] trait:
//!
//! - [`RemoteBitSet`]: a growable bit vector under one key.
//! - [`RemoteSetMultimap`]: a map from keys to sets of values, with a live
//!   [`SetView`] per key and disconnected `HashSet` snapshots.
//!
//! # Features
//!
//! - One atomic store call per operation; multi-command operations such as
//!   [`RemoteSetMultimap::replace_values`] are sent as one atomic batch
//! - No client-side cache or locking
//! - The same operations in four delivery styles: plain async, deferred
//!   handles, single-element streams and blocking calls (see [`delivery`])
//! - Key expiry through [`Expirable`]
//!
//! # Example
//!
//! ```no_run
//! use keyspace::{Deferred, Keyspace};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keyspace = Keyspace::connect("localhost:50051").await?;
//!
//!     let bits = keyspace.bitset("flags");
//!     bits.set_range(0, 8).await?;
//!     assert_eq!(bits.cardinality().await?, 8);
//!
//!     let deferred = bits.with_delivery(Deferred::current()?);
//!     let handle = deferred.clear_range(0, 4);
//!     handle.await?;
//!
//!     assert_eq!(bits.to_byte_array().await?, vec![0x0f]);
//!     Ok(())
//! }
//! ```

mod bits;
mod bitset;
mod client;
mod codec;
pub mod delivery;
mod error;
mod executor;
mod expirable;
mod grpc;
mod multimap;
mod reply;

#[cfg(test)]
mod testing;

pub use bits::BitSnapshot;
pub use bitset::RemoteBitSet;
pub use client::Keyspace;
pub use delivery::{Blocking, Deferred, DeferredHandle, Delivery, Direct, Reactive, Single};
pub use error::Error;
pub use executor::Executor;
pub use expirable::{Expirable, TimeToLive};
pub use grpc::{ConnectOptions, GrpcExecutor, ServerAddr};
pub use keyspace_types::bits::MAX_BIT_INDEX;
pub use keyspace_types::{BitOp, Command, Reply};
pub use multimap::{MultimapValue, RemoteSetMultimap, SetView};
