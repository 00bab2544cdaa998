//! Shared-store traits and the in-process fallback implementation.
//!
//! The traits are implemented by storage backends (e.g. `tome-store-sqlite`).
//! Admission components depend on these abstractions, never on a concrete
//! backend, and degrade to [`MemoryStore`] when the shared store errors.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  sync::{Arc, Mutex},
};

// ─── Usage counter store ─────────────────────────────────────────────────────

/// Per-identity, per-day generation counts. The bucket string embeds the
/// calendar date, so counts "reset" by virtue of a new bucket key — no
/// expiry job is needed.
pub trait UsageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn usage_count<'a>(
    &'a self,
    identity: &'a str,
    bucket: &'a str,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + 'a;

  /// Atomically add one and return the new count. Concurrent callers must
  /// not be able to race past the limit.
  fn increment_usage<'a>(
    &'a self,
    identity: &'a str,
    bucket: &'a str,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + 'a;
}

// ─── Rate-limit store ────────────────────────────────────────────────────────

/// The state of one sliding window after a hit was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSnapshot {
  /// Hits inside the window, including the one just recorded.
  pub total_hits:    u32,
  /// Oldest surviving hit; `reset` is this plus the window length.
  pub oldest_hit_ms: Option<i64>,
}

/// Ordered hit timestamps per key, pruned lazily to the trailing window.
pub trait RateLimitStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Record a hit at `now_ms`, discard hits older than
  /// `now_ms - window_ms`, and report the surviving window. Must be atomic
  /// with respect to concurrent callers of the same key.
  fn record_hit<'a>(
    &'a self,
    key: &'a str,
    now_ms: i64,
    window_ms: i64,
  ) -> impl Future<Output = Result<WindowSnapshot, Self::Error>> + Send + 'a;

  /// Drop all hits older than `cutoff_ms` across every key. Returns the
  /// number of rows removed. Driven by the host's periodic sweep task.
  fn prune_hits(
    &self,
    cutoff_ms: i64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Credential store ────────────────────────────────────────────────────────

/// Caller-supplied upstream credentials, opaque at this layer. A backend
/// may encrypt values at rest.
pub trait CredentialStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn credential<'a>(
    &'a self,
    identity: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  fn set_credential<'a>(
    &'a self,
    identity: &'a str,
    api_key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Returns `true` if a credential was present and removed.
  fn remove_credential<'a>(
    &'a self,
    identity: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn has_credential<'a>(
    &'a self,
    identity: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── In-process fallback ─────────────────────────────────────────────────────

/// Mutex-guarded maps implementing all three store traits.
///
/// Used as the fallback when the shared store is unreachable, and directly
/// in tests. Not accurate across multiple processes; that is a documented
/// limitation of degraded mode, not a correctness target.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  usage: Arc<Mutex<HashMap<(String, String), u32>>>,
  hits:  Arc<Mutex<HashMap<String, Vec<i64>>>>,
  creds: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    MemoryStore::default()
  }
}

impl UsageStore for MemoryStore {
  type Error = Infallible;

  async fn usage_count(&self, identity: &str, bucket: &str) -> Result<u32, Infallible> {
    let usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
    Ok(
      usage
        .get(&(identity.to_string(), bucket.to_string()))
        .copied()
        .unwrap_or(0),
    )
  }

  async fn increment_usage(
    &self,
    identity: &str,
    bucket: &str,
  ) -> Result<u32, Infallible> {
    let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
    let count = usage
      .entry((identity.to_string(), bucket.to_string()))
      .or_insert(0);
    *count += 1;
    Ok(*count)
  }
}

impl RateLimitStore for MemoryStore {
  type Error = Infallible;

  async fn record_hit(
    &self,
    key: &str,
    now_ms: i64,
    window_ms: i64,
  ) -> Result<WindowSnapshot, Infallible> {
    let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
    let timestamps = hits.entry(key.to_string()).or_default();
    // Prune expired entries while we hold the lock.
    timestamps.retain(|&t| t > now_ms - window_ms);
    timestamps.push(now_ms);
    Ok(WindowSnapshot {
      total_hits:    timestamps.len() as u32,
      oldest_hit_ms: timestamps.iter().min().copied(),
    })
  }

  async fn prune_hits(&self, cutoff_ms: i64) -> Result<u64, Infallible> {
    let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
    let mut removed = 0u64;
    for timestamps in hits.values_mut() {
      let before = timestamps.len();
      timestamps.retain(|&t| t >= cutoff_ms);
      removed += (before - timestamps.len()) as u64;
    }
    hits.retain(|_, timestamps| !timestamps.is_empty());
    Ok(removed)
  }
}

impl CredentialStore for MemoryStore {
  type Error = Infallible;

  async fn credential(&self, identity: &str) -> Result<Option<String>, Infallible> {
    let creds = self.creds.lock().unwrap_or_else(|e| e.into_inner());
    Ok(creds.get(identity).cloned())
  }

  async fn set_credential(
    &self,
    identity: &str,
    api_key: &str,
  ) -> Result<(), Infallible> {
    let mut creds = self.creds.lock().unwrap_or_else(|e| e.into_inner());
    creds.insert(identity.to_string(), api_key.to_string());
    Ok(())
  }

  async fn remove_credential(&self, identity: &str) -> Result<bool, Infallible> {
    let mut creds = self.creds.lock().unwrap_or_else(|e| e.into_inner());
    Ok(creds.remove(identity).is_some())
  }

  async fn has_credential(&self, identity: &str) -> Result<bool, Infallible> {
    let creds = self.creds.lock().unwrap_or_else(|e| e.into_inner());
    Ok(creds.contains_key(identity))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn usage_counts_are_per_bucket() {
    let store = MemoryStore::new();
    store.increment_usage("u1", "2026-08-05").await.unwrap();
    store.increment_usage("u1", "2026-08-05").await.unwrap();
    store.increment_usage("u1", "2026-08-06").await.unwrap();

    assert_eq!(store.usage_count("u1", "2026-08-05").await.unwrap(), 2);
    assert_eq!(store.usage_count("u1", "2026-08-06").await.unwrap(), 1);
    assert_eq!(store.usage_count("u2", "2026-08-05").await.unwrap(), 0);
  }

  #[tokio::test]
  async fn record_hit_discards_expired_entries() {
    let store = MemoryStore::new();
    store.record_hit("k", 1_000, 60_000).await.unwrap();
    store.record_hit("k", 2_000, 60_000).await.unwrap();
    // A hit far past the window: only itself survives.
    let window = store.record_hit("k", 100_000, 60_000).await.unwrap();
    assert_eq!(window.total_hits, 1);
    assert_eq!(window.oldest_hit_ms, Some(100_000));
  }

  #[tokio::test]
  async fn prune_drops_old_hits_across_keys() {
    let store = MemoryStore::new();
    store.record_hit("a", 1_000, 60_000).await.unwrap();
    store.record_hit("b", 2_000, 60_000).await.unwrap();
    store.record_hit("b", 50_000, 60_000).await.unwrap();

    let removed = store.prune_hits(10_000).await.unwrap();
    assert_eq!(removed, 2);
  }

  #[tokio::test]
  async fn credential_crud() {
    let store = MemoryStore::new();
    assert!(!store.has_credential("u1").await.unwrap());

    store.set_credential("u1", "sk-user-key").await.unwrap();
    assert!(store.has_credential("u1").await.unwrap());
    assert_eq!(
      store.credential("u1").await.unwrap().as_deref(),
      Some("sk-user-key")
    );

    assert!(store.remove_credential("u1").await.unwrap());
    assert!(!store.remove_credential("u1").await.unwrap());
  }
}
