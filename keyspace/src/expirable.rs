//! Time-to-live management shared by every remote object.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keyspace_types::Command;

use crate::delivery::Delivery;
use crate::error::Error;
use crate::executor::RemoteKey;
use crate::reply;

/// Remaining lifetime of a remote key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeToLive {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    Expires(Duration),
}

/// Expiry operations on the remote key backing an object.
pub trait Expirable<D: Delivery> {
    /// Sets the key to expire after `ttl`. Returns `false` if the key does
    /// not exist.
    fn expire(&self, ttl: Duration) -> D::Output<bool>;

    /// Sets the key to expire at `at`. Returns `false` if the key does not
    /// exist.
    fn expire_at(&self, at: DateTime<Utc>) -> D::Output<bool>;

    /// Removes any expiry. Returns `true` if one was removed.
    fn clear_expire(&self) -> D::Output<bool>;

    fn remain_time_to_live(&self) -> D::Output<TimeToLive>;
}

pub(crate) fn ttl_millis(ttl: Duration) -> Result<u64, Error> {
    u64::try_from(ttl.as_millis())
        .map_err(|_| Error::InvalidArgument(format!("ttl {ttl:?} is too large")))
}

pub(crate) async fn expire(remote: Arc<RemoteKey>, ttl: Duration) -> Result<bool, Error> {
    let millis = ttl_millis(ttl)?;
    let reply = remote
        .run(Command::PExpire {
            key: remote.key(),
            millis,
        })
        .await?;
    reply::flag("PEXPIRE", reply)
}

pub(crate) async fn expire_at(remote: Arc<RemoteKey>, at: DateTime<Utc>) -> Result<bool, Error> {
    let reply = remote
        .run(Command::PExpireAt {
            key: remote.key(),
            unix_millis: at.timestamp_millis(),
        })
        .await?;
    reply::flag("PEXPIREAT", reply)
}

pub(crate) async fn clear_expire(remote: Arc<RemoteKey>) -> Result<bool, Error> {
    let reply = remote.run(Command::Persist { key: remote.key() }).await?;
    reply::flag("PERSIST", reply)
}

pub(crate) async fn remain_time_to_live(remote: Arc<RemoteKey>) -> Result<TimeToLive, Error> {
    let reply = remote.run(Command::PTtl { key: remote.key() }).await?;
    match reply::integer("PTTL", reply)? {
        -2 => Ok(TimeToLive::Missing),
        -1 => Ok(TimeToLive::Persistent),
        millis if millis >= 0 => Ok(TimeToLive::Expires(Duration::from_millis(millis as u64))),
        _ => Err(Error::UnexpectedReply {
            command: "PTTL",
            reply: "negative integer",
        }),
    }
}
