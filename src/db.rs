use std::time::Duration;

use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{Sqlite, SqlitePoolOptions},
    Pool,
};

pub type DbPool = Pool<Sqlite>;

pub async fn ensure_database_file(url: &str) -> Result<(), sqlx::Error> {
    if url.contains(":memory:") {
        return Ok(());
    }

    let exists = Sqlite::database_exists(url).await?;

    if !exists {
        Sqlite::create_database(url).await?;
    }

    Ok(())
}

/// Opens the store database and creates its tables.
///
/// The pool holds exactly one connection that is never recycled: command
/// batches are serialized on it, and an in-memory database lives as long as
/// that connection does.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    ensure_database_file(database_url).await?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect(database_url)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            key TEXT PRIMARY KEY,
            kind INTEGER NOT NULL,
            value BLOB,
            expire_at INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            key TEXT NOT NULL,
            member BLOB NOT NULL,
            PRIMARY KEY (key, member)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}
