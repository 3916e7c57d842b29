//! Wire types shared by the keyspace client and the reference store.
//!
//! - [`store`]: generated protobuf messages and the `Store` gRPC service.
//! - [`Command`] / [`Reply`]: the typed primitive command model both sides
//!   agree on, with conversions to and from the wire form.
//! - [`bits`]: bit position math for the most-significant-bit-first layout
//!   used by every bit command.

pub mod bits;
mod command;
mod reply;

pub use command::{BitOp, Command, DecodeError};
pub use reply::Reply;

pub mod store {
    tonic::include_proto!("store");
}
