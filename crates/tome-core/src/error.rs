//! Error taxonomy for the generation pipeline.
//!
//! Admission errors (validation, rate limit, quota, credential) are returned
//! before any stream byte is written and map to a 4xx status. Upstream errors
//! raised mid-stream are pushed as a terminal error event on the same channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::page::UsageView;

// ─── Rate-limit scope ────────────────────────────────────────────────────────

/// Which of the two independently-limited keys was over its window.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
  Identity,
  Ip,
}

impl std::fmt::Display for LimitScope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      LimitScope::Identity => write!(f, "identity"),
      LimitScope::Ip => write!(f, "ip"),
    }
  }
}

// ─── Pipeline error ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error(
    "daily free generation limit reached ({}/{})",
    usage.usage_count,
    usage.daily_limit
  )]
  QuotaExceeded { usage: UsageView },

  #[error("rate limit exceeded for {scope} key")]
  RateLimited {
    scope:            LimitScope,
    limit:            u32,
    retry_after_secs: u64,
    reset_at:         DateTime<Utc>,
  },

  #[error("no upstream credential available")]
  CredentialRequired,

  #[error(transparent)]
  Upstream(#[from] UpstreamError),
}

impl Error {
  /// Machine-readable code clients branch on.
  pub fn code(&self) -> &'static str {
    match self {
      Error::Validation(_) => "VALIDATION_FAILED",
      Error::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
      Error::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
      Error::CredentialRequired => "API_KEY_REQUIRED",
      Error::Upstream(_) => "UPSTREAM_ERROR",
    }
  }

  /// The HTTP-style status this error maps to when surfaced before
  /// streaming begins.
  pub fn http_status(&self) -> u16 {
    match self {
      Error::Validation(_) => 400,
      Error::QuotaExceeded { .. } => 429,
      Error::RateLimited { .. } => 429,
      Error::CredentialRequired => 401,
      Error::Upstream(_) => 502,
    }
  }
}

// ─── Upstream error ──────────────────────────────────────────────────────────

/// A failure talking to the upstream generation service.
///
/// Metadata-phase failures are recovered locally with fallback metadata;
/// content-phase failures surface as a terminal error event and are safe
/// for the caller to retry.
#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("upstream request failed: {0}")]
  Transport(String),

  #[error("upstream returned malformed payload: {0}")]
  Malformed(String),

  #[error("upstream call timed out after {0:?}")]
  Timeout(Duration),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
