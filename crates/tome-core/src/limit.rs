//! Sliding-window rate limiting.
//!
//! Each request is checked under two independent keys — the caller's quota
//! key and their IP — and admitted only when both are inside their window.
//! Window parameters are per-operation classes supplied by configuration.
//! When the shared store errors, decisions degrade to the in-process map.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::{
  error::{Error, LimitScope, Result},
  observe::{Fallback, FallbackMeter},
  request::Caller,
  store::{MemoryStore, RateLimitStore, WindowSnapshot},
};

// ─── Classes ─────────────────────────────────────────────────────────────────

/// One rate-limit class: a rolling window and its hit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitClass {
  pub window_ms: i64,
  pub max_hits:  u32,
}

impl LimitClass {
  pub const fn new(window_ms: i64, max_hits: u32) -> Self {
    LimitClass { window_ms, max_hits }
  }
}

/// The operation being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Page,
  Section,
  Metadata,
}

impl Operation {
  fn key_part(self) -> &'static str {
    match self {
      Operation::Page => "page",
      Operation::Section => "section",
      Operation::Metadata => "metadata",
    }
  }
}

/// Per-operation classes, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitClasses {
  pub page:     LimitClass,
  pub section:  LimitClass,
  pub metadata: LimitClass,
}

impl Default for LimitClasses {
  fn default() -> Self {
    LimitClasses {
      page:     LimitClass::new(60_000, 10),
      section:  LimitClass::new(60_000, 20),
      metadata: LimitClass::new(60_000, 30),
    }
  }
}

impl LimitClasses {
  pub fn class(&self, op: Operation) -> LimitClass {
    match op {
      Operation::Page => self.page,
      Operation::Section => self.section,
      Operation::Metadata => self.metadata,
    }
  }
}

// ─── Decisions ───────────────────────────────────────────────────────────────

/// The outcome of checking one key against one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
  pub allowed:    bool,
  pub limit:      u32,
  pub remaining:  u32,
  pub total_hits: u32,
  pub reset_at:   DateTime<Utc>,
}

impl Decision {
  pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
    (self.reset_at - now).num_seconds().max(0) as u64
  }
}

/// The tighter of the two per-key decisions, kept for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
  pub limit:     u32,
  pub remaining: u32,
  pub reset_at:  DateTime<Utc>,
}

// ─── Limiter ─────────────────────────────────────────────────────────────────

/// Sliding-window limiter over a shared store with in-process fallback.
#[derive(Debug, Clone)]
pub struct RateLimiter<S> {
  shared:  Option<Arc<S>>,
  local:   MemoryStore,
  classes: LimitClasses,
  meter:   FallbackMeter,
}

impl<S: RateLimitStore> RateLimiter<S> {
  pub fn new(
    shared: Option<Arc<S>>,
    classes: LimitClasses,
    meter: FallbackMeter,
  ) -> Self {
    RateLimiter {
      shared,
      local: MemoryStore::new(),
      classes,
      meter,
    }
  }

  /// Record a hit for `key` and decide. Store failures never reject the
  /// request; they degrade to the in-process window.
  pub async fn check(&self, key: &str, class: LimitClass) -> Decision {
    self.check_at(key, class, Utc::now()).await
  }

  pub(crate) async fn check_at(
    &self,
    key: &str,
    class: LimitClass,
    now: DateTime<Utc>,
  ) -> Decision {
    let now_ms = now.timestamp_millis();
    let window = self.record(key, now_ms, class.window_ms).await;

    let reset_ms = window.oldest_hit_ms.unwrap_or(now_ms) + class.window_ms;
    Decision {
      allowed:    window.total_hits <= class.max_hits,
      limit:      class.max_hits,
      remaining:  class.max_hits.saturating_sub(window.total_hits),
      total_hits: window.total_hits,
      reset_at:   Utc
        .timestamp_millis_opt(reset_ms)
        .single()
        .unwrap_or(now),
    }
  }

  async fn record(&self, key: &str, now_ms: i64, window_ms: i64) -> WindowSnapshot {
    if let Some(store) = &self.shared {
      match store.record_hit(key, now_ms, window_ms).await {
        Ok(window) => return window,
        Err(e) => {
          self.meter.record(Fallback::RateStore);
          tracing::warn!(error = %e, key, "rate-limit store unreachable");
        }
      }
    }
    match self.local.record_hit(key, now_ms, window_ms).await {
      Ok(window) => window,
      Err(never) => match never {},
    }
  }

  /// Check both keys for `caller`; reject naming the offending scope.
  pub async fn enforce(
    &self,
    caller: &Caller,
    op: Operation,
  ) -> Result<RateStatus> {
    self.enforce_at(caller, op, Utc::now()).await
  }

  pub(crate) async fn enforce_at(
    &self,
    caller: &Caller,
    op: Operation,
    now: DateTime<Utc>,
  ) -> Result<RateStatus> {
    let class = self.classes.class(op);
    let identity_key =
      format!("rl:{}:id:{}", op.key_part(), caller.quota_key());
    let ip_key = format!("rl:{}:ip:{}", op.key_part(), caller.ip);

    let identity = self.check_at(&identity_key, class, now).await;
    if !identity.allowed {
      return Err(rejection(LimitScope::Identity, &identity, now));
    }
    let ip = self.check_at(&ip_key, class, now).await;
    if !ip.allowed {
      return Err(rejection(LimitScope::Ip, &ip, now));
    }

    let tighter = if identity.remaining <= ip.remaining { identity } else { ip };
    Ok(RateStatus {
      limit:     tighter.limit,
      remaining: tighter.remaining,
      reset_at:  tighter.reset_at,
    })
  }
}

fn rejection(
  scope: LimitScope,
  decision: &Decision,
  now: DateTime<Utc>,
) -> Error {
  Error::RateLimited {
    scope,
    limit: decision.limit,
    retry_after_secs: decision.retry_after_secs(now),
    reset_at: decision.reset_at,
  }
}
