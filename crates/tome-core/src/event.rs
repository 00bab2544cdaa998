//! Stream events — the unit framed onto the push protocol.
//!
//! A stream is a sequence of snapshot events, closed by exactly one terminal
//! event: either a snapshot with `complete = true` or an error envelope.

use serde::{Deserialize, Serialize};

use crate::{
  error::Error,
  page::{PageSnapshot, UsageView},
};

/// One event on the push channel.
///
/// Untagged on the wire: snapshots serialize as the bare snapshot object,
/// errors as `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
  Snapshot(PageSnapshot),
  Error(ErrorEnvelope),
}

impl StreamEvent {
  /// Terminal events end the stream: a complete snapshot or any error.
  pub fn is_terminal(&self) -> bool {
    match self {
      StreamEvent::Snapshot(s) => s.complete,
      StreamEvent::Error(_) => true,
    }
  }

  pub fn as_snapshot(&self) -> Option<&PageSnapshot> {
    match self {
      StreamEvent::Snapshot(s) => Some(s),
      StreamEvent::Error(_) => None,
    }
  }
}

/// Wrapper giving error events their distinguishing `error` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
  pub error: ErrorBody,
}

/// The machine-readable error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
  pub code:    String,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub usage: Option<UsageView>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_after_secs: Option<u64>,
}

impl ErrorBody {
  pub fn from_error(err: &Error) -> Self {
    let usage = match err {
      Error::QuotaExceeded { usage } => Some(*usage),
      _ => None,
    };
    let retry_after_secs = match err {
      Error::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
      _ => None,
    };
    ErrorBody {
      code: err.code().to_string(),
      message: err.to_string(),
      usage,
      retry_after_secs,
    }
  }
}

impl From<&Error> for StreamEvent {
  fn from(err: &Error) -> Self {
    StreamEvent::Error(ErrorEnvelope {
      error: ErrorBody::from_error(err),
    })
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;
  use crate::error::UpstreamError;

  #[test]
  fn snapshot_and_error_round_trip_untagged() {
    let snap = StreamEvent::Snapshot(PageSnapshot::partial(
      Uuid::new_v4(),
      "Aethros",
      "Prose so far".into(),
      None,
      40,
    ));
    let json = serde_json::to_string(&snap).unwrap();
    let back: StreamEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);

    let err = StreamEvent::from(&Error::Upstream(UpstreamError::Transport(
      "connection reset".into(),
    )));
    let json = serde_json::to_string(&err).unwrap();
    let back: StreamEvent = serde_json::from_str(&json).unwrap();
    assert!(back.is_terminal());
    assert_eq!(back, err);
  }

  #[test]
  fn quota_error_carries_usage() {
    let body = ErrorBody::from_error(&Error::QuotaExceeded {
      usage: UsageView::new(5, 5),
    });
    assert_eq!(body.code, "QUOTA_EXCEEDED");
    assert_eq!(body.usage.unwrap().remaining, 0);
  }
}
