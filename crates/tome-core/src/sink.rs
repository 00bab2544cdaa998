//! The transport-agnostic event sink.
//!
//! The orchestrator pushes every event through this seam; hosting adapters
//! supply the concrete sink (an HTTP response channel, stdout, a Vec in
//! tests). This is what keeps the persistent-server and one-shot hosts
//! behaviorally identical.

use std::future::Future;

use crate::event::StreamEvent;

/// Where stream events go.
pub trait EventSink: Send {
  /// Deliver one event. Returns `false` once the receiver is gone; the
  /// producer must stop pushing (and stop consuming upstream).
  fn send(
    &mut self,
    event: StreamEvent,
  ) -> impl Future<Output = bool> + Send;
}

/// Collects events in memory. Used by tests and the parity harness.
#[derive(Debug, Default)]
pub struct CollectSink {
  pub events: Vec<StreamEvent>,
}

impl CollectSink {
  pub fn new() -> Self {
    CollectSink::default()
  }
}

impl EventSink for CollectSink {
  async fn send(&mut self, event: StreamEvent) -> bool {
    self.events.push(event);
    true
  }
}
