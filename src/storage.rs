use std::collections::BTreeSet;

use keyspace_types::bits::{self, MAX_BIT_INDEX};
use keyspace_types::store::FailureKind;
use keyspace_types::{Command, DecodeError, Reply};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::bitmap;
use crate::models::{Entry, Kind};

/// Executes command batches, each inside one SQLite transaction.
///
/// A batch either commits completely or not at all; the first failing
/// command rolls the whole batch back.
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn execute(&self, commands: Vec<Command>) -> Result<Vec<Reply>, ExecError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            replies.push(apply(&mut *tx, command, now).await?);
        }

        tx.commit().await?;
        Ok(replies)
    }
}

async fn apply(
    conn: &mut SqliteConnection,
    command: Command,
    now: i64,
) -> Result<Reply, ExecError> {
    match command {
        Command::Get { key } => Ok(match load_bytes(conn, &key, now).await? {
            Some(value) => Reply::Bulk(value),
            None => Reply::Nil,
        }),
        Command::Set { key, value } => {
            load_bytes(conn, &key, now).await?;
            store_bytes(conn, &key, &value).await?;
            Ok(Reply::Done)
        }
        Command::BitLen { key } => {
            let value = load_bytes(conn, &key, now).await?.unwrap_or_default();
            Ok(Reply::Integer(bits::logical_len(&value) as i64))
        }
        Command::GetBit { key, offset } => {
            check_offset(offset)?;
            let value = load_bytes(conn, &key, now).await?.unwrap_or_default();
            Ok(Reply::Integer(bitmap::get_bit(&value, offset) as i64))
        }
        Command::SetBit { key, offset, value: bit } => {
            check_offset(offset)?;
            let mut value = load_bytes(conn, &key, now).await?.unwrap_or_default();
            let previous = bitmap::set_bit(&mut value, offset, bit);
            store_bytes(conn, &key, &value).await?;
            Ok(Reply::Integer(previous as i64))
        }
        Command::BitFill { key, from, to, value: bit } => {
            if from > to || to > MAX_BIT_INDEX + 1 {
                return Err(ExecError::invalid(format!("BITFILL: invalid range {from}..{to}")));
            }
            let mut value = load_bytes(conn, &key, now).await?.unwrap_or_default();
            if from < to {
                bitmap::fill(&mut value, from, to, bit);
                store_bytes(conn, &key, &value).await?;
            }
            Ok(Reply::Done)
        }
        Command::BitCount { key } => {
            let value = load_bytes(conn, &key, now).await?.unwrap_or_default();
            Ok(Reply::Integer(bits::count_ones(&value) as i64))
        }
        Command::BitNot { key } => {
            if let Some(mut value) = load_bytes(conn, &key, now).await? {
                bitmap::invert(&mut value);
                store_bytes(conn, &key, &value).await?;
            }
            Ok(Reply::Done)
        }
        Command::BitOp { op, dest, sources } => {
            load_bytes(conn, &dest, now).await?;
            let mut operands = Vec::with_capacity(sources.len());
            for source in &sources {
                operands.push(load_bytes(conn, source, now).await?.unwrap_or_default());
            }
            let result = bitmap::combine(op, &operands);
            if result.is_empty() {
                remove(conn, &dest).await?;
            } else {
                store_bytes(conn, &dest, &result).await?;
            }
            Ok(Reply::Integer(result.len() as i64))
        }
        Command::Del { key } => {
            let existed = load(conn, &key, now).await?.is_some();
            if existed {
                remove(conn, &key).await?;
            }
            Ok(Reply::Integer(existed as i64))
        }
        Command::SMembers { key } => {
            if !set_exists(conn, &key, now).await? {
                return Ok(Reply::Members(Vec::new()));
            }
            Ok(Reply::Members(members(conn, &key).await?))
        }
        Command::SAdd { key, members } => {
            ensure_set(conn, &key, now).await?;
            let mut added = 0;
            for member in &members {
                added += sqlx::query("INSERT OR IGNORE INTO members (key, member) VALUES (?, ?)")
                    .bind(&key)
                    .bind(member)
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
            }
            Ok(Reply::Integer(added as i64))
        }
        Command::SRem { key, members } => {
            if !set_exists(conn, &key, now).await? {
                return Ok(Reply::Integer(0));
            }
            let mut removed = 0;
            for member in &members {
                removed += sqlx::query("DELETE FROM members WHERE key = ? AND member = ?")
                    .bind(&key)
                    .bind(member)
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
            }
            if cardinality(conn, &key).await? == 0 {
                remove(conn, &key).await?;
            }
            Ok(Reply::Integer(removed as i64))
        }
        Command::SIsMember { key, member } => {
            if !set_exists(conn, &key, now).await? {
                return Ok(Reply::Integer(0));
            }
            let found = sqlx::query("SELECT 1 FROM members WHERE key = ? AND member = ?")
                .bind(&key)
                .bind(&member)
                .fetch_optional(&mut *conn)
                .await?
                .is_some();
            Ok(Reply::Integer(found as i64))
        }
        Command::SCard { key } => {
            if !set_exists(conn, &key, now).await? {
                return Ok(Reply::Integer(0));
            }
            Ok(Reply::Integer(cardinality(conn, &key).await?))
        }
        Command::SMatch {
            key,
            members: expected,
        } => {
            let actual = if set_exists(conn, &key, now).await? {
                members(conn, &key).await?
            } else {
                Vec::new()
            };
            let expected: BTreeSet<Vec<u8>> = expected.into_iter().collect();
            let actual: BTreeSet<Vec<u8>> = actual.into_iter().collect();
            if expected != actual {
                return Err(ExecError::Failure {
                    kind: FailureKind::Conflict,
                    message: format!("set {key} no longer holds the expected members"),
                });
            }
            Ok(Reply::Done)
        }
        Command::PExpire { key, millis } => {
            let at = i64::try_from(millis)
                .ok()
                .and_then(|millis| now.checked_add(millis))
                .ok_or_else(|| ExecError::invalid(format!("PEXPIRE: ttl {millis} is too large")))?;
            expire_at(conn, &key, at, now).await
        }
        Command::PExpireAt { key, unix_millis } => expire_at(conn, &key, unix_millis, now).await,
        Command::PTtl { key } => Ok(Reply::Integer(match load(conn, &key, now).await? {
            None => -2,
            Some(entry) => entry.expire_at.map(|at| at - now).unwrap_or(-1),
        })),
        Command::Persist { key } => match load(conn, &key, now).await? {
            Some(entry) if entry.expire_at.is_some() => {
                sqlx::query("UPDATE entries SET expire_at = NULL WHERE key = ?")
                    .bind(&key)
                    .execute(&mut *conn)
                    .await?;
                Ok(Reply::Integer(1))
            }
            _ => Ok(Reply::Integer(0)),
        },
    }
}

fn check_offset(offset: u64) -> Result<(), ExecError> {
    if offset > MAX_BIT_INDEX {
        return Err(ExecError::invalid(format!(
            "bit offset {offset} exceeds maximum {MAX_BIT_INDEX}"
        )));
    }
    Ok(())
}

/// Reads a key, dropping it first if it has expired.
async fn load(
    conn: &mut SqliteConnection,
    key: &str,
    now: i64,
) -> Result<Option<Entry>, sqlx::Error> {
    let row = sqlx::query("SELECT kind, value, expire_at FROM entries WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expire_at: Option<i64> = row.get("expire_at");
    if expire_at.is_some_and(|at| at <= now) {
        remove(conn, key).await?;
        return Ok(None);
    }

    let raw_kind: i64 = row.get("kind");
    let kind = Kind::from_i64(raw_kind)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown entry kind {raw_kind}").into()))?;
    let value: Option<Vec<u8>> = row.get("value");

    Ok(Some(Entry {
        kind,
        value: value.unwrap_or_default(),
        expire_at,
    }))
}

fn expect_kind(key: &str, entry: &Entry, expected: Kind) -> Result<(), ExecError> {
    if entry.kind != expected {
        return Err(ExecError::Failure {
            kind: FailureKind::WrongType,
            message: format!(
                "key {} holds {}, not {}",
                key,
                entry.kind.name(),
                expected.name()
            ),
        });
    }
    Ok(())
}

async fn load_bytes(
    conn: &mut SqliteConnection,
    key: &str,
    now: i64,
) -> Result<Option<Vec<u8>>, ExecError> {
    match load(conn, key, now).await? {
        Some(entry) => {
            expect_kind(key, &entry, Kind::Bytes)?;
            Ok(Some(entry.value))
        }
        None => Ok(None),
    }
}

/// Writes a byte value, keeping any expiry already set on the key.
async fn store_bytes(
    conn: &mut SqliteConnection,
    key: &str,
    value: &[u8],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO entries (key, kind, value) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(Kind::Bytes.as_i64())
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn set_exists(conn: &mut SqliteConnection, key: &str, now: i64) -> Result<bool, ExecError> {
    match load(conn, key, now).await? {
        Some(entry) => {
            expect_kind(key, &entry, Kind::Set)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

async fn ensure_set(conn: &mut SqliteConnection, key: &str, now: i64) -> Result<(), ExecError> {
    if !set_exists(conn, key, now).await? {
        sqlx::query("INSERT INTO entries (key, kind) VALUES (?, ?)")
            .bind(key)
            .bind(Kind::Set.as_i64())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn members(conn: &mut SqliteConnection, key: &str) -> Result<Vec<Vec<u8>>, sqlx::Error> {
    sqlx::query_scalar::<_, Vec<u8>>("SELECT member FROM members WHERE key = ? ORDER BY member")
        .bind(key)
        .fetch_all(&mut *conn)
        .await
}

async fn cardinality(conn: &mut SqliteConnection, key: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM members WHERE key = ?")
        .bind(key)
        .fetch_one(&mut *conn)
        .await
}

async fn remove(conn: &mut SqliteConnection, key: &str) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM entries WHERE key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM members WHERE key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await?;
    Ok(deleted > 0)
}

async fn expire_at(
    conn: &mut SqliteConnection,
    key: &str,
    at: i64,
    now: i64,
) -> Result<Reply, ExecError> {
    if load(conn, key, now).await?.is_none() {
        return Ok(Reply::Integer(0));
    }
    if at <= now {
        remove(conn, key).await?;
    } else {
        sqlx::query("UPDATE entries SET expire_at = ? WHERE key = ?")
            .bind(at)
            .bind(key)
            .execute(&mut *conn)
            .await?;
    }
    Ok(Reply::Integer(1))
}

#[derive(Debug)]
pub enum ExecError {
    Failure { kind: FailureKind, message: String },
    Sql(sqlx::Error),
}

impl ExecError {
    fn invalid(message: String) -> Self {
        ExecError::Failure {
            kind: FailureKind::InvalidArgument,
            message,
        }
    }
}

impl From<sqlx::Error> for ExecError {
    fn from(err: sqlx::Error) -> Self {
        ExecError::Sql(err)
    }
}

impl From<DecodeError> for ExecError {
    fn from(err: DecodeError) -> Self {
        let kind = match err {
            DecodeError::UnknownCommand(_) => FailureKind::UnknownCommand,
            DecodeError::InvalidArgument(_) => FailureKind::InvalidArgument,
        };
        ExecError::Failure {
            kind,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Failure { kind, message } => {
                write!(f, "{}: {}", kind.as_str_name(), message)
            }
            ExecError::Sql(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for ExecError {}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use keyspace_types::BitOp;

    use super::*;
    use crate::db;

    async fn storage() -> Storage {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        Storage::new(pool)
    }

    async fn one(storage: &Storage, command: Command) -> Result<Reply, ExecError> {
        storage.execute(vec![command]).await.map(|mut r| r.remove(0))
    }

    #[tokio::test]
    async fn test_setbit_returns_previous() {
        let storage = storage().await;
        let set = || Command::SetBit {
            key: "b".into(),
            offset: 5,
            value: true,
        };
        assert_eq!(one(&storage, set()).await.unwrap(), Reply::Integer(0));
        assert_eq!(one(&storage, set()).await.unwrap(), Reply::Integer(1));
        assert_eq!(
            one(&storage, Command::BitLen { key: "b".into() }).await.unwrap(),
            Reply::Integer(6)
        );
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let storage = storage().await;
        one(
            &storage,
            Command::SAdd {
                key: "s".into(),
                members: vec![b"x".to_vec()],
            },
        )
        .await
        .unwrap();

        let err = one(&storage, Command::BitCount { key: "s".into() }).await.unwrap_err();
        assert!(matches!(
            err,
            ExecError::Failure {
                kind: FailureKind::WrongType,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let storage = storage().await;
        one(
            &storage,
            Command::SAdd {
                key: "s".into(),
                members: vec![b"x".to_vec()],
            },
        )
        .await
        .unwrap();

        let result = storage
            .execute(vec![
                Command::Del { key: "s".into() },
                Command::GetBit {
                    key: "b".into(),
                    offset: MAX_BIT_INDEX + 1,
                },
            ])
            .await;
        assert!(result.is_err());

        assert_eq!(
            one(&storage, Command::SCard { key: "s".into() }).await.unwrap(),
            Reply::Integer(1)
        );
    }

    #[tokio::test]
    async fn test_last_member_removal_drops_key() {
        let storage = storage().await;
        one(
            &storage,
            Command::SAdd {
                key: "s".into(),
                members: vec![b"x".to_vec()],
            },
        )
        .await
        .unwrap();
        one(
            &storage,
            Command::SRem {
                key: "s".into(),
                members: vec![b"x".to_vec()],
            },
        )
        .await
        .unwrap();

        assert_eq!(
            one(&storage, Command::PTtl { key: "s".into() }).await.unwrap(),
            Reply::Integer(-2)
        );
        // The key is gone, so it can now hold bytes.
        assert!(one(&storage, Command::BitCount { key: "s".into() }).await.is_ok());
    }

    #[tokio::test]
    async fn test_smatch_guards_the_batch() {
        let storage = storage().await;
        one(
            &storage,
            Command::SAdd {
                key: "index".into(),
                members: vec![b"a".to_vec(), b"b".to_vec()],
            },
        )
        .await
        .unwrap();

        let stale = storage
            .execute(vec![
                Command::SMatch {
                    key: "index".into(),
                    members: vec![b"a".to_vec()],
                },
                Command::Del { key: "index".into() },
            ])
            .await;
        assert!(matches!(
            stale,
            Err(ExecError::Failure {
                kind: FailureKind::Conflict,
                ..
            })
        ));
        assert_eq!(
            one(&storage, Command::SCard { key: "index".into() }).await.unwrap(),
            Reply::Integer(2)
        );

        let replies = storage
            .execute(vec![
                Command::SMatch {
                    key: "index".into(),
                    members: vec![b"b".to_vec(), b"a".to_vec()],
                },
                Command::SMatch {
                    key: "missing".into(),
                    members: vec![],
                },
            ])
            .await
            .unwrap();
        assert_eq!(replies, vec![Reply::Done, Reply::Done]);
    }

    #[tokio::test]
    async fn test_bitop_with_missing_sources_deletes_destination() {
        let storage = storage().await;
        let reply = one(
            &storage,
            Command::BitOp {
                op: BitOp::And,
                dest: "d".into(),
                sources: vec!["nope".into(), "none".into()],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, Reply::Integer(0));
        assert_eq!(
            one(&storage, Command::Get { key: "d".into() }).await.unwrap(),
            Reply::Nil
        );
    }

    #[tokio::test]
    async fn test_expired_keys_disappear() {
        let storage = storage().await;
        one(
            &storage,
            Command::Set {
                key: "b".into(),
                value: vec![0xff],
            },
        )
        .await
        .unwrap();
        assert_eq!(
            one(&storage, Command::PExpire { key: "b".into(), millis: 50 }).await.unwrap(),
            Reply::Integer(1)
        );

        match one(&storage, Command::PTtl { key: "b".into() }).await.unwrap() {
            Reply::Integer(ms) => assert!(ms > 0 && ms <= 50),
            other => panic!("unexpected reply {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            one(&storage, Command::Get { key: "b".into() }).await.unwrap(),
            Reply::Nil
        );
        assert_eq!(
            one(&storage, Command::PExpire { key: "b".into(), millis: 50 }).await.unwrap(),
            Reply::Integer(0)
        );
    }

    #[tokio::test]
    async fn test_persist() {
        let storage = storage().await;
        one(
            &storage,
            Command::Set {
                key: "b".into(),
                value: vec![0x01],
            },
        )
        .await
        .unwrap();

        assert_eq!(
            one(&storage, Command::Persist { key: "b".into() }).await.unwrap(),
            Reply::Integer(0)
        );
        one(&storage, Command::PExpire { key: "b".into(), millis: 60_000 })
            .await
            .unwrap();
        assert_eq!(
            one(&storage, Command::Persist { key: "b".into() }).await.unwrap(),
            Reply::Integer(1)
        );
        assert_eq!(
            one(&storage, Command::PTtl { key: "b".into() }).await.unwrap(),
            Reply::Integer(-1)
        );
    }
}
