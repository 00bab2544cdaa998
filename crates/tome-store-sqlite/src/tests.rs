//! Integration tests for `SqliteStore` against an in-memory database.

use tome_core::store::{CredentialStore, RateLimitStore, UsageStore};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Usage counts ────────────────────────────────────────────────────────────

#[tokio::test]
async fn usage_starts_at_zero_and_increments() {
  let s = store().await;
  assert_eq!(s.usage_count("alice", "2026-08-05").await.unwrap(), 0);
  assert_eq!(s.increment_usage("alice", "2026-08-05").await.unwrap(), 1);
  assert_eq!(s.increment_usage("alice", "2026-08-05").await.unwrap(), 2);
  assert_eq!(s.usage_count("alice", "2026-08-05").await.unwrap(), 2);
}

#[tokio::test]
async fn usage_buckets_are_independent() {
  let s = store().await;
  s.increment_usage("alice", "2026-08-05").await.unwrap();
  assert_eq!(s.usage_count("alice", "2026-08-06").await.unwrap(), 0);
  assert_eq!(s.usage_count("bob", "2026-08-05").await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_increments_never_lose_updates() {
  let s = store().await;
  let mut handles = Vec::new();
  for _ in 0..10 {
    let s = s.clone();
    handles.push(tokio::spawn(async move {
      s.increment_usage("alice", "2026-08-05").await.unwrap()
    }));
  }
  let mut counts = Vec::new();
  for handle in handles {
    counts.push(handle.await.unwrap());
  }
  counts.sort_unstable();
  assert_eq!(counts, (1..=10).collect::<Vec<u32>>());
}

// ─── Rate windows ────────────────────────────────────────────────────────────

#[tokio::test]
async fn hits_accumulate_and_expire() {
  let s = store().await;
  let w = s.record_hit("k", 1_000, 60_000).await.unwrap();
  assert_eq!(w.total_hits, 1);
  let w = s.record_hit("k", 2_000, 60_000).await.unwrap();
  assert_eq!(w.total_hits, 2);
  assert_eq!(w.oldest_hit_ms, Some(1_000));

  // Far past the window: earlier hits are discarded.
  let w = s.record_hit("k", 100_000, 60_000).await.unwrap();
  assert_eq!(w.total_hits, 1);
  assert_eq!(w.oldest_hit_ms, Some(100_000));
}

#[tokio::test]
async fn keys_are_isolated() {
  let s = store().await;
  s.record_hit("a", 1_000, 60_000).await.unwrap();
  let w = s.record_hit("b", 1_000, 60_000).await.unwrap();
  assert_eq!(w.total_hits, 1);
}

#[tokio::test]
async fn prune_removes_only_rows_before_the_cutoff() {
  let s = store().await;
  s.record_hit("a", 1_000, 600_000).await.unwrap();
  s.record_hit("a", 2_000, 600_000).await.unwrap();
  s.record_hit("b", 50_000, 600_000).await.unwrap();

  assert_eq!(s.prune_hits(10_000).await.unwrap(), 2);
  assert_eq!(s.prune_hits(10_000).await.unwrap(), 0);

  let w = s.record_hit("b", 51_000, 600_000).await.unwrap();
  assert_eq!(w.total_hits, 2);
}

// ─── Credentials ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn credential_round_trip() {
  let s = store().await;
  assert!(!s.has_credential("alice").await.unwrap());
  assert_eq!(s.credential("alice").await.unwrap(), None);

  s.set_credential("alice", "sk-alice-1").await.unwrap();
  assert!(s.has_credential("alice").await.unwrap());
  assert_eq!(
    s.credential("alice").await.unwrap().as_deref(),
    Some("sk-alice-1")
  );

  // Setting again replaces the stored key.
  s.set_credential("alice", "sk-alice-2").await.unwrap();
  assert_eq!(
    s.credential("alice").await.unwrap().as_deref(),
    Some("sk-alice-2")
  );

  assert!(s.remove_credential("alice").await.unwrap());
  assert!(!s.remove_credential("alice").await.unwrap());
  assert!(!s.has_credential("alice").await.unwrap());
}
