//! Distributed set-multimap.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keyspace_types::{Command, Reply};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::delivery::{Delivery, Direct};
use crate::error::Error;
use crate::executor::{Executor, RemoteKey};
use crate::expirable::{self, Expirable, TimeToLive};
use crate::reply;

/// Attempts a whole-map batch makes before giving up on a changing index.
const MAX_GUARD_ATTEMPTS: usize = 8;

/// Bounds every multimap value type must meet.
pub trait MultimapValue: Serialize + DeserializeOwned + Eq + Hash + Send + 'static {}

impl<T> MultimapValue for T where T: Serialize + DeserializeOwned + Eq + Hash + Send + 'static {}

/// A map from keys to sets of values, held in the remote store.
///
/// The values of key `k` live in a remote set at `"{name}:{json(k)}"`, and
/// the set at `name` indexes the keys that were given values. A key without
/// values is the same as an absent key: reads return an empty set.
///
/// Two read contracts are offered on purpose:
///
/// - [`get`](Self::get) returns a [`SetView`], a live handle whose every read
///   goes to the store.
/// - [`get_all`](Self::get_all) returns a disconnected `HashSet` copy.
///
/// [`replace_values`](Self::replace_values) and
/// [`remove_all`](Self::remove_all) read and rewrite a value-set in one atomic
/// batch, so no reader observes a half-replaced set.
///
/// Whole-map operations ([`key_set`](Self::key_set), [`size`](Self::size),
/// [`clear`](Self::clear) and the [`Expirable`] methods) read the index, then
/// send one batch that only applies if the index is still unchanged.
///
/// # Example
///
/// ```no_run
/// use std::collections::HashSet;
///
/// use keyspace::Keyspace;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let keyspace = Keyspace::connect("localhost:50051").await?;
///     let tags = keyspace.set_multimap::<String, String>("tags");
///
///     let key = "post-1".to_string();
///     tags.replace_values(&key, ["rust".to_string(), "async".to_string()]).await?;
///
///     let snapshot = tags.get_all(&key).await?;
///     assert_eq!(snapshot.len(), 2);
///
///     let removed = tags.remove_all(&key).await?;
///     assert_eq!(removed, snapshot);
///     assert_eq!(tags.get_all(&key).await?, HashSet::new());
///     Ok(())
/// }
/// ```
pub struct RemoteSetMultimap<K, V, D: Delivery = Direct> {
    index: Arc<RemoteKey>,
    delivery: D,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V, D: Delivery> Clone for RemoteSetMultimap<K, V, D> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            delivery: self.delivery.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> RemoteSetMultimap<K, V, Direct> {
    pub(crate) fn new(name: String, executor: Arc<dyn Executor>) -> Self {
        Self {
            index: Arc::new(RemoteKey::new(name, executor)),
            delivery: Direct,
            _marker: PhantomData,
        }
    }
}

impl<K, V, D> RemoteSetMultimap<K, V, D>
where
    K: Serialize,
    V: MultimapValue,
    D: Delivery,
{
    pub fn with_delivery<E: Delivery>(&self, delivery: E) -> RemoteSetMultimap<K, V, E> {
        RemoteSetMultimap {
            index: Arc::clone(&self.index),
            delivery,
            _marker: PhantomData,
        }
    }

    /// Name of the map, which is also the remote key of its key index.
    pub fn name(&self) -> &str {
        self.index.name()
    }

    fn slot(&self, key: &K) -> Result<Slot, Error> {
        let encoded = codec::encode_key(key)?;
        Ok(Slot {
            values: Arc::new(
                self.index
                    .sibling(values_name(self.index.name(), encoded.as_bytes())),
            ),
            index: self.index.key(),
            member: encoded.into_bytes(),
        })
    }

    fn deliver<T, F, Fut>(&self, key: &K, operation: F) -> D::Output<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Slot>) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        match self.slot(key) {
            Ok(slot) => self.delivery.deliver(operation(Arc::new(slot))),
            Err(e) => self.delivery.deliver(async move { Err::<T, Error>(e) }),
        }
    }

    /// Live view of the values of `key`. No round trip happens here; each
    /// read on the view queries the store again.
    pub fn get(&self, key: &K) -> Result<SetView<V, D>, Error> {
        Ok(SetView {
            slot: Arc::new(self.slot(key)?),
            delivery: self.delivery.clone(),
            _marker: PhantomData,
        })
    }

    /// Point-in-time copy of the values of `key`, empty if it has none.
    /// Later changes to the multimap do not show up in it, and changing it
    /// does not touch the multimap.
    pub fn get_all(&self, key: &K) -> D::Output<HashSet<V>> {
        self.deliver(key, read_members::<V>)
    }

    /// Removes every value of `key` and returns them.
    ///
    /// The removal commits before the returned members are decoded: if a
    /// stored member does not decode as `V` the values are still gone and
    /// the call fails with [`Error::Codec`].
    pub fn remove_all(&self, key: &K) -> D::Output<HashSet<V>> {
        self.deliver(key, |slot| async move {
            let replies = slot
                .values
                .run_atomic(vec![
                    Command::SMembers { key: slot.values.key() },
                    Command::Del { key: slot.values.key() },
                    slot.untrack(),
                ])
                .await?;
            take_members::<V>(replies)
        })
    }

    /// Replaces the values of `key` with `values` and returns the previous
    /// ones. An empty `values` behaves like [`remove_all`](Self::remove_all).
    pub fn replace_values<I>(&self, key: &K, values: I) -> D::Output<HashSet<V>>
    where
        I: IntoIterator<Item = V>,
    {
        let members = codec::encode_values(values);
        self.deliver(key, |slot| async move {
            let members = members?;
            let mut batch = vec![
                Command::SMembers { key: slot.values.key() },
                Command::Del { key: slot.values.key() },
            ];
            if members.is_empty() {
                batch.push(slot.untrack());
            } else {
                batch.push(Command::SAdd {
                    key: slot.values.key(),
                    members,
                });
                batch.push(slot.track());
            }
            let replies = slot.values.run_atomic(batch).await?;
            take_members::<V>(replies)
        })
    }

    /// Adds `value` under `key`. Returns `true` if it was not there yet.
    pub fn put(&self, key: &K, value: V) -> D::Output<bool> {
        let member = codec::encode_value(&value);
        self.deliver(key, |slot| async move {
            add_members(slot, vec![member?]).await.map(|added| added > 0)
        })
    }

    /// Adds every value under `key`. Returns `true` if any was new.
    pub fn put_all<I>(&self, key: &K, values: I) -> D::Output<bool>
    where
        I: IntoIterator<Item = V>,
    {
        let members = codec::encode_values(values);
        self.deliver(key, |slot| async move {
            add_members(slot, members?).await.map(|added| added > 0)
        })
    }

    /// Removes one value from `key`. Returns `true` if it was there.
    pub fn remove(&self, key: &K, value: &V) -> D::Output<bool> {
        let member = codec::encode_value(value);
        self.deliver(key, |slot| async move {
            remove_members(slot, vec![member?]).await.map(|removed| removed > 0)
        })
    }

    pub fn contains_entry(&self, key: &K, value: &V) -> D::Output<bool> {
        let member = codec::encode_value(value);
        self.deliver(key, |slot| async move { is_member(slot, member?).await })
    }

    /// Whether `key` has at least one value.
    pub fn contains_key(&self, key: &K) -> D::Output<bool> {
        self.deliver(key, |slot| async move { cardinality(slot).await.map(|n| n > 0) })
    }

    /// Number of values stored under `key`.
    pub fn value_count(&self, key: &K) -> D::Output<u64> {
        self.deliver(key, cardinality)
    }

    /// Expires the values of `key` after `ttl`. Returns `false` if the key
    /// has no values.
    pub fn expire_key(&self, key: &K, ttl: Duration) -> D::Output<bool> {
        self.deliver(key, |slot| expirable::expire(Arc::clone(&slot.values), ttl))
    }

    /// Removes `keys` and their values in one batch, without reading the
    /// values back. Returns how many of the keys had values.
    pub fn fast_remove<'a, I>(&self, keys: I) -> D::Output<u64>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let encoded: Result<Vec<String>, Error> = keys.into_iter().map(codec::encode_key).collect();
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let encoded = encoded?;
            if encoded.is_empty() {
                return Ok(0);
            }
            let mut batch: Vec<Command> = encoded
                .iter()
                .map(|key| Command::Del {
                    key: values_name(index.name(), key.as_bytes()),
                })
                .collect();
            batch.push(Command::SRem {
                key: index.key(),
                members: encoded.into_iter().map(String::into_bytes).collect(),
            });
            let mut replies = index.run_atomic(batch).await?;
            replies.pop();
            let mut removed = 0;
            for reply in replies {
                removed += reply::count("DEL", reply)?;
            }
            Ok(removed)
        })
    }

    /// Total number of values across all keys.
    pub fn size(&self) -> D::Output<u64> {
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let (_, replies) = guarded(&index, |keys| each_values_key(&index, keys, scard)).await?;
            let mut total = 0;
            for reply in replies {
                total += reply::count("SCARD", reply)?;
            }
            Ok(total)
        })
    }

    /// Removes every key and value. Returns `true` if there was anything to
    /// remove.
    pub fn clear(&self) -> D::Output<bool> {
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let (_, replies) = guarded(&index, |keys| {
                let mut batch = vec![Command::Del { key: index.key() }];
                batch.extend(each_values_key(&index, keys, del));
                batch
            })
            .await?;
            let mut removed = false;
            for reply in replies {
                removed |= reply::flag("DEL", reply)?;
            }
            Ok(removed)
        })
    }
}

impl<K, V, D> RemoteSetMultimap<K, V, D>
where
    K: MultimapValue,
    V: MultimapValue,
    D: Delivery,
{
    /// Keys that currently have at least one value, as a disconnected copy.
    pub fn key_set(&self) -> D::Output<HashSet<K>> {
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let (keys, replies) =
                guarded(&index, |keys| each_values_key(&index, keys, scard)).await?;
            let mut live = Vec::with_capacity(keys.len());
            for (key, reply) in keys.into_iter().zip(replies) {
                if reply::count("SCARD", reply)? > 0 {
                    live.push(key);
                }
            }
            codec::decode_set(live)
        })
    }
}

/// Expiry of the whole map: the key index and every indexed value-set get
/// the same deadline in one batch.
///
/// Values added under a new key after the deadline is set do not inherit it.
impl<K, V, D> Expirable<D> for RemoteSetMultimap<K, V, D>
where
    K: Serialize,
    V: MultimapValue,
    D: Delivery,
{
    fn expire(&self, ttl: Duration) -> D::Output<bool> {
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let millis = expirable::ttl_millis(ttl)?;
            let pexpire = |key| Command::PExpire { key, millis };
            let (_, replies) = guarded(&index, |keys| {
                let mut batch = vec![pexpire(index.key())];
                batch.extend(each_values_key(&index, keys, pexpire));
                batch
            })
            .await?;
            first_flag("PEXPIRE", replies)
        })
    }

    fn expire_at(&self, at: DateTime<Utc>) -> D::Output<bool> {
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let unix_millis = at.timestamp_millis();
            let pexpire_at = |key| Command::PExpireAt { key, unix_millis };
            let (_, replies) = guarded(&index, |keys| {
                let mut batch = vec![pexpire_at(index.key())];
                batch.extend(each_values_key(&index, keys, pexpire_at));
                batch
            })
            .await?;
            first_flag("PEXPIREAT", replies)
        })
    }

    fn clear_expire(&self) -> D::Output<bool> {
        let index = Arc::clone(&self.index);
        self.delivery.deliver(async move {
            let persist = |key| Command::Persist { key };
            let (_, replies) = guarded(&index, |keys| {
                let mut batch = vec![persist(index.key())];
                batch.extend(each_values_key(&index, keys, persist));
                batch
            })
            .await?;
            first_flag("PERSIST", replies)
        })
    }

    /// Lifetime of the key index.
    fn remain_time_to_live(&self) -> D::Output<TimeToLive> {
        self.delivery
            .deliver(expirable::remain_time_to_live(Arc::clone(&self.index)))
    }
}

/// Live handle on the value-set of one multimap key.
///
/// Holds no values itself: every call is a fresh round trip, so results
/// always reflect the store at the time of the call.
pub struct SetView<V, D: Delivery = Direct> {
    slot: Arc<Slot>,
    delivery: D,
    _marker: PhantomData<fn() -> V>,
}

impl<V, D: Delivery> Clone for SetView<V, D> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            delivery: self.delivery.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V: MultimapValue, D: Delivery> SetView<V, D> {
    /// Remote key holding the values.
    pub fn name(&self) -> &str {
        self.slot.values.name()
    }

    fn deliver<T, F, Fut>(&self, operation: F) -> D::Output<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Slot>) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.delivery.deliver(operation(Arc::clone(&self.slot)))
    }

    /// Current values, as a disconnected copy.
    pub fn read_all(&self) -> D::Output<HashSet<V>> {
        self.deliver(read_members::<V>)
    }

    pub fn contains(&self, value: &V) -> D::Output<bool> {
        let member = codec::encode_value(value);
        self.deliver(|slot| async move { is_member(slot, member?).await })
    }

    pub fn len(&self) -> D::Output<u64> {
        self.deliver(cardinality)
    }

    pub fn is_empty(&self) -> D::Output<bool> {
        self.deliver(|slot| async move { cardinality(slot).await.map(|n| n == 0) })
    }

    pub fn insert(&self, value: V) -> D::Output<bool> {
        let member = codec::encode_value(&value);
        self.deliver(|slot| async move {
            add_members(slot, vec![member?]).await.map(|added| added > 0)
        })
    }

    pub fn remove(&self, value: &V) -> D::Output<bool> {
        let member = codec::encode_value(value);
        self.deliver(|slot| async move {
            remove_members(slot, vec![member?]).await.map(|removed| removed > 0)
        })
    }

    /// Removes every value. Returns `true` if there was anything to remove.
    pub fn clear(&self) -> D::Output<bool> {
        self.deliver(|slot| async move {
            let replies = slot
                .values
                .run_atomic(vec![Command::Del { key: slot.values.key() }, slot.untrack()])
                .await?;
            first_flag("DEL", replies)
        })
    }
}

impl<V: MultimapValue, D: Delivery> Expirable<D> for SetView<V, D> {
    fn expire(&self, ttl: Duration) -> D::Output<bool> {
        self.deliver(|slot| expirable::expire(Arc::clone(&slot.values), ttl))
    }

    fn expire_at(&self, at: DateTime<Utc>) -> D::Output<bool> {
        self.deliver(|slot| expirable::expire_at(Arc::clone(&slot.values), at))
    }

    fn clear_expire(&self) -> D::Output<bool> {
        self.deliver(|slot| expirable::clear_expire(Arc::clone(&slot.values)))
    }

    fn remain_time_to_live(&self) -> D::Output<TimeToLive> {
        self.deliver(|slot| expirable::remain_time_to_live(Arc::clone(&slot.values)))
    }
}

/// One multimap key: its value-set and its entry in the key index.
///
/// The index may still list a key whose values were removed one by one or
/// expired; readers of the index skip keys with no values.
struct Slot {
    values: Arc<RemoteKey>,
    index: String,
    member: Vec<u8>,
}

impl Slot {
    fn track(&self) -> Command {
        Command::SAdd {
            key: self.index.clone(),
            members: vec![self.member.clone()],
        }
    }

    fn untrack(&self) -> Command {
        Command::SRem {
            key: self.index.clone(),
            members: vec![self.member.clone()],
        }
    }
}

fn values_name(map: &str, encoded_key: &[u8]) -> String {
    format!("{}:{}", map, String::from_utf8_lossy(encoded_key))
}

fn scard(key: String) -> Command {
    Command::SCard { key }
}

fn del(key: String) -> Command {
    Command::Del { key }
}

/// One command per indexed key, aimed at that key's value-set.
fn each_values_key<F>(index: &RemoteKey, keys: &[Vec<u8>], command: F) -> Vec<Command>
where
    F: Fn(String) -> Command,
{
    keys.iter()
        .map(|key| command(values_name(index.name(), key)))
        .collect()
}

/// Reads the key index, then runs the batch `build` makes for those keys,
/// guarded so that it only applies if the index has not changed since.
///
/// Returns the keys the batch was built from and the batch's replies.
async fn guarded<F>(index: &RemoteKey, build: F) -> Result<(Vec<Vec<u8>>, Vec<Reply>), Error>
where
    F: Fn(&[Vec<u8>]) -> Vec<Command>,
{
    for attempt in 1..=MAX_GUARD_ATTEMPTS {
        let reply = index.run(Command::SMembers { key: index.key() }).await?;
        let keys = reply::members("SMEMBERS", reply)?;

        let mut batch = vec![Command::SMatch {
            key: index.key(),
            members: keys.clone(),
        }];
        batch.extend(build(&keys));

        match index.run_atomic(batch).await {
            Ok(mut replies) => {
                reply::done("SMATCH", replies.remove(0))?;
                return Ok((keys, replies));
            }
            Err(Error::Conflict(message)) => {
                tracing::debug!(map = index.name(), attempt, %message, "key index changed");
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::Conflict(format!(
        "key index {} kept changing after {} attempts",
        index.name(),
        MAX_GUARD_ATTEMPTS
    )))
}

fn first_flag(command: &'static str, replies: Vec<Reply>) -> Result<bool, Error> {
    let first = replies.into_iter().next().ok_or(Error::ReplyCount {
        expected: 1,
        actual: 0,
    })?;
    reply::flag(command, first)
}

async fn read_members<V: MultimapValue>(slot: Arc<Slot>) -> Result<HashSet<V>, Error> {
    let reply = slot
        .values
        .run(Command::SMembers { key: slot.values.key() })
        .await?;
    codec::decode_set(reply::members("SMEMBERS", reply)?)
}

/// Decodes the `SMEMBERS` reply leading a read-and-rewrite batch.
fn take_members<V: MultimapValue>(replies: Vec<Reply>) -> Result<HashSet<V>, Error> {
    let first = replies.into_iter().next().ok_or(Error::ReplyCount {
        expected: 1,
        actual: 0,
    })?;
    codec::decode_set(reply::members("SMEMBERS", first)?)
}

async fn add_members(slot: Arc<Slot>, members: Vec<Vec<u8>>) -> Result<u64, Error> {
    if members.is_empty() {
        return Ok(0);
    }
    let replies = slot
        .values
        .run_atomic(vec![
            Command::SAdd {
                key: slot.values.key(),
                members,
            },
            slot.track(),
        ])
        .await?;
    let first = replies.into_iter().next().ok_or(Error::ReplyCount {
        expected: 2,
        actual: 0,
    })?;
    reply::count("SADD", first)
}

async fn remove_members(slot: Arc<Slot>, members: Vec<Vec<u8>>) -> Result<u64, Error> {
    let reply = slot
        .values
        .run(Command::SRem {
            key: slot.values.key(),
            members,
        })
        .await?;
    reply::count("SREM", reply)
}

async fn is_member(slot: Arc<Slot>, member: Vec<u8>) -> Result<bool, Error> {
    let reply = slot
        .values
        .run(Command::SIsMember {
            key: slot.values.key(),
            member,
        })
        .await?;
    reply::flag("SISMEMBER", reply)
}

async fn cardinality(slot: Arc<Slot>) -> Result<u64, Error> {
    let reply = slot.values.run(Command::SCard { key: slot.values.key() }).await?;
    reply::count("SCARD", reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;

    fn multimap(executor: &Arc<ScriptedExecutor>) -> RemoteSetMultimap<String, String> {
        RemoteSetMultimap::new("tags".into(), executor.clone())
    }

    fn json(value: &str) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    fn values_of(key: &str) -> String {
        format!("tags:{}", serde_json::to_string(key).unwrap())
    }

    fn track(key: &str) -> Command {
        Command::SAdd {
            key: "tags".into(),
            members: vec![json(key)],
        }
    }

    fn untrack(key: &str) -> Command {
        Command::SRem {
            key: "tags".into(),
            members: vec![json(key)],
        }
    }

    #[tokio::test]
    async fn test_get_all_of_unknown_key_is_empty() {
        let executor = Arc::new(ScriptedExecutor::new().reply(Reply::Members(vec![])));
        let values = multimap(&executor).get_all(&"k".into()).await.unwrap();

        assert!(values.is_empty());
        assert_eq!(
            executor.calls(),
            vec![vec![Command::SMembers {
                key: "tags:\"k\"".into()
            }]]
        );
    }

    #[tokio::test]
    async fn test_replace_values_is_one_batch() {
        let executor = Arc::new(ScriptedExecutor::new().replies(vec![
            Reply::Members(vec![json("old")]),
            Reply::Integer(1),
            Reply::Integer(2),
            Reply::Integer(0),
        ]));
        let previous = multimap(&executor)
            .replace_values(&"k".into(), ["x".to_string(), "y".to_string()])
            .await
            .unwrap();

        assert_eq!(previous, HashSet::from(["old".to_string()]));
        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![
                Command::SMembers { key: values_of("k") },
                Command::Del { key: values_of("k") },
                Command::SAdd {
                    key: values_of("k"),
                    members: vec![json("x"), json("y")],
                },
                track("k"),
            ]
        );
    }

    #[tokio::test]
    async fn test_replace_with_nothing_matches_remove_all() {
        let batch = || {
            vec![
                Reply::Members(vec![json("a")]),
                Reply::Integer(1),
                Reply::Integer(1),
            ]
        };
        let executor = Arc::new(ScriptedExecutor::new().replies(batch()).replies(batch()));
        let map = multimap(&executor);

        let replaced = map.replace_values(&"k".into(), Vec::new()).await.unwrap();
        let removed = map.remove_all(&"k".into()).await.unwrap();

        assert_eq!(replaced, removed);
        let calls = executor.calls();
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0][2], untrack("k"));
    }

    #[tokio::test]
    async fn test_remove_all_deletes_before_decoding() {
        let executor = Arc::new(ScriptedExecutor::new().replies(vec![
            Reply::Members(vec![b"not json".to_vec()]),
            Reply::Integer(1),
            Reply::Integer(1),
        ]));
        let result = multimap(&executor).remove_all(&"k".into()).await;

        assert!(matches!(result, Err(Error::Codec(_))));
        assert_eq!(executor.calls()[0][1], Command::Del { key: values_of("k") });
    }

    #[tokio::test]
    async fn test_view_requeries_every_read() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .reply(Reply::Members(vec![json("a")]))
                .reply(Reply::Members(vec![json("a"), json("b")])),
        );
        let view = multimap(&executor).get(&"k".into()).unwrap();
        assert!(executor.calls().is_empty());

        assert_eq!(view.read_all().await.unwrap().len(), 1);
        assert_eq!(view.read_all().await.unwrap().len(), 2);
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_put_and_remove_report_changes() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .replies(vec![Reply::Integer(1), Reply::Integer(1)])
                .replies(vec![Reply::Integer(0), Reply::Integer(0)])
                .reply(Reply::Integer(1)),
        );
        let map = multimap(&executor);
        let key = "k".to_string();

        assert!(map.put(&key, "x".into()).await.unwrap());
        assert!(!map.put(&key, "x".into()).await.unwrap());
        assert!(map.remove(&key, &"x".into()).await.unwrap());

        let calls = executor.calls();
        assert_eq!(calls[0][1], track("k"));
        assert_eq!(calls[2].len(), 1);
    }

    #[tokio::test]
    async fn test_put_all_of_nothing_skips_store() {
        let executor = Arc::new(ScriptedExecutor::new());
        let added = multimap(&executor)
            .put_all(&"k".into(), Vec::new())
            .await
            .unwrap();
        assert!(!added);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_key_set_skips_keys_without_values() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .reply(Reply::Members(vec![json("a"), json("b")]))
                .replies(vec![Reply::Done, Reply::Integer(2), Reply::Integer(0)]),
        );
        let keys = multimap(&executor).key_set().await.unwrap();

        assert_eq!(keys, HashSet::from(["a".to_string()]));
        assert_eq!(
            executor.calls()[1],
            vec![
                Command::SMatch {
                    key: "tags".into(),
                    members: vec![json("a"), json("b")],
                },
                Command::SCard { key: values_of("a") },
                Command::SCard { key: values_of("b") },
            ]
        );
    }

    #[tokio::test]
    async fn test_guarded_batch_retries_on_conflict() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .reply(Reply::Members(vec![json("a")]))
                .fail(Error::Conflict("index changed".into()))
                .reply(Reply::Members(vec![json("a"), json("b")]))
                .replies(vec![Reply::Done, Reply::Integer(1), Reply::Integer(3)]),
        );
        let size = multimap(&executor).size().await.unwrap();

        assert_eq!(size, 4);
        assert_eq!(executor.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_guarded_batch_gives_up() {
        let mut executor = ScriptedExecutor::new();
        for _ in 0..MAX_GUARD_ATTEMPTS {
            executor = executor
                .reply(Reply::Members(vec![]))
                .fail(Error::Conflict("index changed".into()));
        }
        let executor = Arc::new(executor);

        assert!(matches!(
            multimap(&executor).clear().await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(executor.calls().len(), 2 * MAX_GUARD_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_expire_covers_index_and_values() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .reply(Reply::Members(vec![json("a")]))
                .replies(vec![Reply::Done, Reply::Integer(1), Reply::Integer(1)]),
        );
        let expired = multimap(&executor)
            .expire(Duration::from_secs(2))
            .await
            .unwrap();

        assert!(expired);
        assert_eq!(
            executor.calls()[1][1..],
            [
                Command::PExpire {
                    key: "tags".into(),
                    millis: 2000,
                },
                Command::PExpire {
                    key: values_of("a"),
                    millis: 2000,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fast_remove_is_one_batch() {
        let executor = Arc::new(ScriptedExecutor::new().replies(vec![
            Reply::Integer(1),
            Reply::Integer(0),
            Reply::Integer(1),
        ]));
        let removed = multimap(&executor)
            .fast_remove([&"a".to_string(), &"b".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(
            executor.calls(),
            vec![vec![
                Command::Del { key: values_of("a") },
                Command::Del { key: values_of("b") },
                Command::SRem {
                    key: "tags".into(),
                    members: vec![json("a"), json("b")],
                },
            ]]
        );
    }

    #[tokio::test]
    async fn test_wrong_type_surfaces() {
        let executor = Arc::new(
            ScriptedExecutor::new().fail(Error::WrongType("key holds bytes".into())),
        );
        assert!(matches!(
            multimap(&executor).get_all(&"k".into()).await,
            Err(Error::WrongType(_))
        ));
    }
}
