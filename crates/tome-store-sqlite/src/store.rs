//! [`SqliteStore`] — the SQLite implementation of the shared-store traits.

use std::path::Path;

use chrono::Utc;
use tome_core::store::{
  CredentialStore, RateLimitStore, UsageStore, WindowSnapshot,
};

use crate::{Error, Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Tome's shared admission state backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All
/// operations are serialised through one connection actor, which is what
/// makes increments and window updates atomic across concurrent requests.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── UsageStore impl ─────────────────────────────────────────────────────────

impl UsageStore for SqliteStore {
  type Error = Error;

  async fn usage_count(&self, identity: &str, bucket: &str) -> Result<u32> {
    let identity = identity.to_owned();
    let bucket = bucket.to_owned();
    let count = self
      .conn
      .call(move |conn| {
        let count: u32 = conn
          .query_row(
            "SELECT COALESCE(
               (SELECT count FROM usage_counts
                 WHERE identity = ?1 AND bucket = ?2), 0)",
            rusqlite::params![identity, bucket],
            |r| r.get(0),
          )?;
        Ok(count)
      })
      .await?;
    Ok(count)
  }

  async fn increment_usage(&self, identity: &str, bucket: &str) -> Result<u32> {
    let identity = identity.to_owned();
    let bucket = bucket.to_owned();
    let count = self
      .conn
      .call(move |conn| {
        let count: u32 = conn.query_row(
          "INSERT INTO usage_counts (identity, bucket, count)
             VALUES (?1, ?2, 1)
           ON CONFLICT (identity, bucket)
             DO UPDATE SET count = count + 1
           RETURNING count",
          rusqlite::params![identity, bucket],
          |r| r.get(0),
        )?;
        Ok(count)
      })
      .await?;
    Ok(count)
  }
}

// ─── RateLimitStore impl ─────────────────────────────────────────────────────

impl RateLimitStore for SqliteStore {
  type Error = Error;

  async fn record_hit(
    &self,
    key: &str,
    now_ms: i64,
    window_ms: i64,
  ) -> Result<WindowSnapshot> {
    let key = key.to_owned();
    let window = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM rate_hits WHERE key = ?1 AND hit_ms <= ?2",
          rusqlite::params![key, now_ms - window_ms],
        )?;
        tx.execute(
          "INSERT INTO rate_hits (key, hit_ms) VALUES (?1, ?2)",
          rusqlite::params![key, now_ms],
        )?;
        let (total_hits, oldest_hit_ms): (u32, Option<i64>) = tx.query_row(
          "SELECT COUNT(*), MIN(hit_ms) FROM rate_hits WHERE key = ?1",
          rusqlite::params![key],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        tx.commit()?;
        Ok(WindowSnapshot { total_hits, oldest_hit_ms })
      })
      .await?;
    Ok(window)
  }

  async fn prune_hits(&self, cutoff_ms: i64) -> Result<u64> {
    let removed = self
      .conn
      .call(move |conn| {
        let removed = conn.execute(
          "DELETE FROM rate_hits WHERE hit_ms < ?1",
          rusqlite::params![cutoff_ms],
        )?;
        Ok(removed as u64)
      })
      .await?;
    Ok(removed)
  }
}

// ─── CredentialStore impl ────────────────────────────────────────────────────

impl CredentialStore for SqliteStore {
  type Error = Error;

  async fn credential(&self, identity: &str) -> Result<Option<String>> {
    use rusqlite::OptionalExtension as _;
    let identity = identity.to_owned();
    let key = self
      .conn
      .call(move |conn| {
        let key: Option<String> = conn
          .query_row(
            "SELECT api_key FROM credentials WHERE identity = ?1",
            rusqlite::params![identity],
            |r| r.get(0),
          )
          .optional()?;
        Ok(key)
      })
      .await?;
    Ok(key)
  }

  async fn set_credential(&self, identity: &str, api_key: &str) -> Result<()> {
    let identity = identity.to_owned();
    let api_key = api_key.to_owned();
    let updated_at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO credentials (identity, api_key, updated_at)
             VALUES (?1, ?2, ?3)
           ON CONFLICT (identity)
             DO UPDATE SET api_key = excluded.api_key,
                           updated_at = excluded.updated_at",
          rusqlite::params![identity, api_key, updated_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove_credential(&self, identity: &str) -> Result<bool> {
    let identity = identity.to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        let removed = conn.execute(
          "DELETE FROM credentials WHERE identity = ?1",
          rusqlite::params![identity],
        )?;
        Ok(removed > 0)
      })
      .await?;
    Ok(removed)
  }

  async fn has_credential(&self, identity: &str) -> Result<bool> {
    Ok(self.credential(identity).await?.is_some())
  }
}
