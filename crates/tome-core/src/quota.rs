//! Daily free-tier usage counting.
//!
//! Counts are bucketed by the store clock's calendar day; the bucket key
//! embeds the date, so yesterday's counts simply stop being read — there is
//! no reset job. Incremented only after a generation completes successfully
//! and only for callers on the free tier.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
  observe::{Fallback, FallbackMeter},
  page::UsageView,
  store::{MemoryStore, UsageStore},
};

/// Usage counter over a shared store with in-process fallback.
#[derive(Debug, Clone)]
pub struct UsageCounter<S> {
  shared:      Option<Arc<S>>,
  local:       MemoryStore,
  daily_limit: u32,
  meter:       FallbackMeter,
}

impl<S: UsageStore> UsageCounter<S> {
  pub fn new(
    shared: Option<Arc<S>>,
    daily_limit: u32,
    meter: FallbackMeter,
  ) -> Self {
    UsageCounter {
      shared,
      local: MemoryStore::new(),
      daily_limit,
      meter,
    }
  }

  pub fn daily_limit(&self) -> u32 {
    self.daily_limit
  }

  fn bucket(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
  }

  /// Today's count for `identity`. Store failures degrade to the
  /// in-process map rather than failing the request.
  pub async fn count(&self, identity: &str) -> u32 {
    self.count_at(identity, Utc::now()).await
  }

  pub(crate) async fn count_at(&self, identity: &str, now: DateTime<Utc>) -> u32 {
    let bucket = Self::bucket(now);
    if let Some(store) = &self.shared {
      match store.usage_count(identity, &bucket).await {
        Ok(count) => return count,
        Err(e) => {
          self.meter.record(Fallback::UsageStore);
          tracing::warn!(error = %e, identity, "usage store unreachable");
        }
      }
    }
    match self.local.usage_count(identity, &bucket).await {
      Ok(count) => count,
      Err(never) => match never {},
    }
  }

  /// Record one completed generation and return the new count.
  pub async fn increment(&self, identity: &str) -> u32 {
    self.increment_at(identity, Utc::now()).await
  }

  pub(crate) async fn increment_at(
    &self,
    identity: &str,
    now: DateTime<Utc>,
  ) -> u32 {
    let bucket = Self::bucket(now);
    if let Some(store) = &self.shared {
      match store.increment_usage(identity, &bucket).await {
        Ok(count) => return count,
        Err(e) => {
          self.meter.record(Fallback::UsageStore);
          tracing::warn!(error = %e, identity, "usage store unreachable");
        }
      }
    }
    match self.local.increment_usage(identity, &bucket).await {
      Ok(count) => count,
      Err(never) => match never {},
    }
  }

  pub async fn has_exceeded(&self, identity: &str) -> bool {
    self.count(identity).await >= self.daily_limit
  }

  /// The client-facing view of today's usage.
  pub async fn view(&self, identity: &str) -> UsageView {
    UsageView::new(self.count(identity).await, self.daily_limit)
  }
}
