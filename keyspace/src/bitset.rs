//! Distributed bitset.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keyspace_types::{BitOp, Command};

use crate::bits::{self, BitIndex, BitRange, BitSnapshot};
use crate::delivery::{Delivery, Direct};
use crate::error::Error;
use crate::executor::{Executor, RemoteKey};
use crate::expirable::{self, Expirable, TimeToLive};
use crate::reply;

/// A growable vector of bits held under one remote key.
///
/// Every bit defaults to 0 and the value grows on demand when a bit past the
/// current end is written. Each method issues exactly one atomic call to the
/// store; nothing is cached locally, so reads such as [`length`](Self::length)
/// and [`cardinality`](Self::cardinality) are best-effort snapshots when
/// other clients write concurrently.
///
/// Results are delivered through `D`; see [`delivery`](crate::delivery).
///
/// # Example
///
/// ```no_run
/// use keyspace::Keyspace;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let keyspace = Keyspace::connect("localhost:50051").await?;
///     let bits = keyspace.bitset("visitors");
///
///     assert!(!bits.set(5).await?);
///     assert!(bits.get(5).await?);
///     assert_eq!(bits.length().await?, 6);
///     assert_eq!(bits.cardinality().await?, 1);
///
///     bits.clear().await?;
///     Ok(())
/// }
/// ```
pub struct RemoteBitSet<D: Delivery = Direct> {
    remote: Arc<RemoteKey>,
    delivery: D,
}

impl<D: Delivery> Clone for RemoteBitSet<D> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            delivery: self.delivery.clone(),
        }
    }
}

impl RemoteBitSet<Direct> {
    pub(crate) fn new(name: String, executor: Arc<dyn Executor>) -> Self {
        Self {
            remote: Arc::new(RemoteKey::new(name, executor)),
            delivery: Direct,
        }
    }
}

impl<D: Delivery> RemoteBitSet<D> {
    /// Same bitset, results delivered through `delivery` instead.
    pub fn with_delivery<E: Delivery>(&self, delivery: E) -> RemoteBitSet<E> {
        RemoteBitSet {
            remote: Arc::clone(&self.remote),
            delivery,
        }
    }

    pub fn name(&self) -> &str {
        self.remote.name()
    }

    fn deliver<T, F, Fut>(&self, operation: F) -> D::Output<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<RemoteKey>) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.delivery.deliver(operation(Arc::clone(&self.remote)))
    }

    /// The full byte value. Empty when no bit was ever written.
    pub fn to_byte_array(&self) -> D::Output<Vec<u8>> {
        self.deliver(|remote| async move {
            let reply = remote.run(Command::Get { key: remote.key() }).await?;
            reply::bytes("GET", reply)
        })
    }

    /// The full value as a [`BitSnapshot`].
    pub fn as_snapshot(&self) -> D::Output<BitSnapshot> {
        self.deliver(|remote| async move {
            let reply = remote.run(Command::Get { key: remote.key() }).await?;
            reply::bytes("GET", reply).map(BitSnapshot::from_bytes)
        })
    }

    /// Logical size: index of the highest set bit plus one, or 0.
    pub fn length(&self) -> D::Output<u64> {
        self.deliver(|remote| async move {
            let reply = remote.run(Command::BitLen { key: remote.key() }).await?;
            reply::count("BITLEN", reply)
        })
    }

    /// Sets every bit in `[from, to)` to `value`.
    ///
    /// `from == to` is a no-op and does not contact the store.
    pub fn set_range_to(&self, from: u64, to: u64, value: bool) -> D::Output<()> {
        let range = BitRange::new(from, to);
        self.deliver(move |remote| async move {
            let range = range?;
            if range.is_empty() {
                return Ok(());
            }
            let reply = remote.run(range.fill(remote.key(), value)).await?;
            reply::done("BITFILL", reply)
        })
    }

    /// Sets every bit in `[from, to)` to 1.
    pub fn set_range(&self, from: u64, to: u64) -> D::Output<()> {
        self.set_range_to(from, to, true)
    }

    /// Sets every bit in `[from, to)` to 0.
    pub fn clear_range(&self, from: u64, to: u64) -> D::Output<()> {
        self.set_range_to(from, to, false)
    }

    /// Replaces the whole value with `snapshot`. Bits past the snapshot's
    /// length end up cleared.
    pub fn set_snapshot(&self, snapshot: &BitSnapshot) -> D::Output<()> {
        let command = snapshot.overwrite(self.remote.key());
        self.deliver(|remote| async move {
            let reply = remote.run(command).await?;
            reply::done("SET", reply)
        })
    }

    /// Flips every bit within the current byte extent.
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> D::Output<()> {
        self.deliver(|remote| async move {
            let reply = remote.run(Command::BitNot { key: remote.key() }).await?;
            reply::done("BITNOT", reply)
        })
    }

    /// Number of set bits; same as [`cardinality`](Self::cardinality), not
    /// [`length`](Self::length).
    pub fn size(&self) -> D::Output<u64> {
        self.cardinality()
    }

    /// Number of bits set to 1.
    pub fn cardinality(&self) -> D::Output<u64> {
        self.deliver(|remote| async move {
            let reply = remote.run(Command::BitCount { key: remote.key() }).await?;
            reply::count("BITCOUNT", reply)
        })
    }

    /// Value of the bit at `index`; bits past the end read as `false`.
    pub fn get(&self, index: u64) -> D::Output<bool> {
        let index = BitIndex::new(index);
        self.deliver(move |remote| async move {
            let reply = remote.run(index?.get(remote.key())).await?;
            reply::flag("GETBIT", reply)
        })
    }

    /// Sets the bit at `index` to 1 and returns its previous value.
    pub fn set(&self, index: u64) -> D::Output<bool> {
        self.set_to(index, true)
    }

    /// Sets the bit at `index` to `value` and returns its previous value.
    ///
    /// The write and the read of the previous value are one store primitive.
    pub fn set_to(&self, index: u64, value: bool) -> D::Output<bool> {
        let index = BitIndex::new(index);
        self.deliver(move |remote| async move {
            let reply = remote.run(index?.set(remote.key(), value)).await?;
            reply::flag("SETBIT", reply)
        })
    }

    /// Sets the bit at `index` to 0 and returns its previous value.
    pub fn clear_bit(&self, index: u64) -> D::Output<bool> {
        self.set_to(index, false)
    }

    /// Resets every bit to 0 by deleting the value.
    pub fn clear(&self) -> D::Output<()> {
        self.deliver(|remote| async move {
            let reply = remote.run(Command::Del { key: remote.key() }).await?;
            reply::integer("DEL", reply).map(|_| ())
        })
    }

    /// `self = self | names...`
    pub fn or<I, S>(&self, names: I) -> D::Output<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.combine(BitOp::Or, names)
    }

    /// `self = self & names...`
    ///
    /// The result keeps the longest operand's byte length, zero-padded, so
    /// its logical size is at most the smallest operand's.
    pub fn and<I, S>(&self, names: I) -> D::Output<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.combine(BitOp::And, names)
    }

    /// `self = self ^ names...`
    pub fn xor<I, S>(&self, names: I) -> D::Output<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.combine(BitOp::Xor, names)
    }

    fn combine<I, S>(&self, op: BitOp, names: I) -> D::Output<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let command = bits::combine(op, self.remote.key(), names);
        self.deliver(|remote| async move {
            let reply = remote.run(command).await?;
            reply::integer("BITOP", reply).map(|_| ())
        })
    }
}

impl<D: Delivery> Expirable<D> for RemoteBitSet<D> {
    fn expire(&self, ttl: Duration) -> D::Output<bool> {
        self.deliver(|remote| expirable::expire(remote, ttl))
    }

    fn expire_at(&self, at: DateTime<Utc>) -> D::Output<bool> {
        self.deliver(|remote| expirable::expire_at(remote, at))
    }

    fn clear_expire(&self) -> D::Output<bool> {
        self.deliver(expirable::clear_expire)
    }

    fn remain_time_to_live(&self) -> D::Output<TimeToLive> {
        self.deliver(expirable::remain_time_to_live)
    }
}
