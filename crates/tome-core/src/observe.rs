//! Fallback observability.
//!
//! Every degraded path (shared store unreachable, metadata substituted,
//! mock content served) records a counter event here in addition to its
//! log line, so "the fallback was taken" is assertable by tests and
//! scrapeable by operators.

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

/// The degraded paths the pipeline can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
  /// Usage counter served from the in-process map.
  UsageStore,
  /// Rate-limit window served from the in-process map.
  RateStore,
  /// Canned metadata substituted after an upstream failure.
  Metadata,
  /// Deterministic mock content streamed instead of upstream prose.
  MockContent,
}

impl Fallback {
  pub fn label(self) -> &'static str {
    match self {
      Fallback::UsageStore => "usage_store",
      Fallback::RateStore => "rate_store",
      Fallback::Metadata => "metadata",
      Fallback::MockContent => "mock_content",
    }
  }

  fn index(self) -> usize {
    match self {
      Fallback::UsageStore => 0,
      Fallback::RateStore => 1,
      Fallback::Metadata => 2,
      Fallback::MockContent => 3,
    }
  }
}

/// Shared counters, one per fallback class. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FallbackMeter {
  counts: Arc<[AtomicU64; 4]>,
}

impl Default for FallbackMeter {
  fn default() -> Self {
    FallbackMeter {
      counts: Arc::new([
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
      ]),
    }
  }
}

impl FallbackMeter {
  pub fn new() -> Self {
    FallbackMeter::default()
  }

  pub fn record(&self, fallback: Fallback) {
    self.counts[fallback.index()].fetch_add(1, Ordering::Relaxed);
    tracing::warn!(fallback = fallback.label(), "degraded path taken");
  }

  pub fn count(&self, fallback: Fallback) -> u64 {
    self.counts[fallback.index()].load(Ordering::Relaxed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_are_per_class_and_shared() {
    let meter = FallbackMeter::new();
    let clone = meter.clone();
    clone.record(Fallback::Metadata);
    clone.record(Fallback::Metadata);
    clone.record(Fallback::RateStore);

    assert_eq!(meter.count(Fallback::Metadata), 2);
    assert_eq!(meter.count(Fallback::RateStore), 1);
    assert_eq!(meter.count(Fallback::UsageStore), 0);
  }
}
