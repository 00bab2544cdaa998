//! Hosting layer for Tome.
//!
//! Owns runtime configuration, the reqwest-backed upstream client, and the
//! wiring shared by both hosting shapes — the persistent `server` binary
//! and the one-shot `tome-oneshot` binary. Both build the same
//! [`tome_api::AppState`] through [`bootstrap`], which is what keeps their
//! behavior identical.

pub mod upstream;

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tome_api::{AppState, StaticTokenVerifier};
use tome_core::{
  limit::{LimitClass, LimitClasses},
  orchestrator::{Orchestrator, PipelineConfig},
  store::RateLimitStore,
};
use tome_store_sqlite::SqliteStore;

pub use upstream::HttpUpstream;

// ─── Configuration ────────────────────────────────────────────────────────────

/// One rate-limit class as it appears in `config.toml`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitEntry {
  pub window_secs: u64,
  pub max_hits:    u32,
}

impl LimitEntry {
  fn class(self) -> LimitClass {
    LimitClass::new(self.window_secs as i64 * 1000, self.max_hits)
  }
}

/// Per-operation rate-limit classes.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
  pub page:     LimitEntry,
  pub section:  LimitEntry,
  pub metadata: LimitEntry,
}

impl Default for LimitsConfig {
  fn default() -> Self {
    LimitsConfig {
      page:     LimitEntry { window_secs: 60, max_hits: 10 },
      section:  LimitEntry { window_secs: 60, max_hits: 20 },
      metadata: LimitEntry { window_secs: 60, max_hits: 30 },
    }
  }
}

/// Runtime server configuration, deserialised from `config.toml` layered
/// under `TOME_*` environment variables.
// No Debug: `upstream_api_key` and `auth_tokens` are secrets.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,

  /// Shared SQLite store; `None` runs on in-process fallback maps only.
  #[serde(default)]
  pub store_path: Option<PathBuf>,

  pub upstream_url: String,
  #[serde(default)]
  pub upstream_api_key: Option<String>,
  #[serde(default = "default_upstream_timeout_secs")]
  pub upstream_timeout_secs: u64,

  #[serde(default)]
  pub user_api_keys_enabled: bool,
  /// Proceed with deterministic mock data when no credential exists.
  #[serde(default)]
  pub development: bool,

  #[serde(default = "default_daily_free_limit")]
  pub daily_free_limit: u32,
  #[serde(default)]
  pub limits: LimitsConfig,
  #[serde(default = "default_prune_interval_secs")]
  pub prune_interval_secs: u64,

  /// Static token → identity table for the bundled verifier. Real
  /// deployments plug their own `TokenVerifier` into `tome-api`.
  #[serde(default)]
  pub auth_tokens: HashMap<String, String>,
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}
fn default_port() -> u16 {
  8484
}
fn default_upstream_timeout_secs() -> u64 {
  60
}
fn default_daily_free_limit() -> u32 {
  5
}
fn default_prune_interval_secs() -> u64 {
  300
}

impl ServerConfig {
  pub fn pipeline(&self) -> PipelineConfig {
    PipelineConfig {
      daily_free_limit: self.daily_free_limit,
      limits: LimitClasses {
        page:     self.limits.page.class(),
        section:  self.limits.section.class(),
        metadata: self.limits.metadata.class(),
      },
      user_api_keys_enabled: self.user_api_keys_enabled,
      service_credential: self.upstream_api_key.clone(),
      development: self.development,
      upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
      ..PipelineConfig::default()
    }
  }

  /// The widest configured window — the prune horizon.
  pub fn max_window(&self) -> Duration {
    let widest = self
      .limits
      .page
      .window_secs
      .max(self.limits.section.window_secs)
      .max(self.limits.metadata.window_secs);
    Duration::from_secs(widest)
  }
}

// ─── Bootstrap ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BootstrapError {
  #[error("cannot open shared store: {0}")]
  Store(#[from] tome_store_sqlite::Error),

  #[error("cannot build upstream client: {0}")]
  Upstream(#[from] reqwest::Error),
}

/// The application state both hosting shapes run on.
pub type ServerState =
  AppState<SqliteStore, HttpUpstream, StaticTokenVerifier>;

/// Open the shared store (if configured), build the upstream client, and
/// assemble the pipeline. Call [`spawn_prune_task`] separately — only the
/// persistent host wants one.
pub async fn bootstrap(cfg: &ServerConfig) -> Result<ServerState, BootstrapError> {
  let store = match &cfg.store_path {
    Some(path) => {
      let store = SqliteStore::open(path).await?;
      tracing::info!(path = %path.display(), "opened shared store");
      Some(Arc::new(store))
    }
    None => {
      tracing::warn!(
        "no store_path configured; quota and rate limits are per-process"
      );
      None
    }
  };

  let upstream = Arc::new(HttpUpstream::new(
    &cfg.upstream_url,
    Duration::from_secs(cfg.upstream_timeout_secs),
  )?);

  let orch =
    Arc::new(Orchestrator::new(store.clone(), upstream, cfg.pipeline()));
  let verifier =
    Arc::new(StaticTokenVerifier::new(cfg.auth_tokens.clone()));

  Ok(AppState { orch, verifier, creds: store })
}

/// Periodic sweep of expired rate-limit hits. Owned by the process
/// bootstrap; dropped (and thus aborted) with the returned handle.
pub fn spawn_prune_task<S>(
  store: Arc<S>,
  interval: Duration,
  max_window: Duration,
) -> tokio::task::JoinHandle<()>
where
  S: RateLimitStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
      ticker.tick().await;
      let cutoff =
        Utc::now().timestamp_millis() - max_window.as_millis() as i64;
      match store.prune_hits(cutoff).await {
        Ok(0) => {}
        Ok(removed) => {
          tracing::debug!(removed, "pruned expired rate-limit hits");
        }
        Err(e) => tracing::warn!(error = %e, "rate-limit prune failed"),
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_config_gets_defaults() {
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str(
        "upstream_url = \"http://upstream.test\"",
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.port, 8484);
    assert_eq!(cfg.daily_free_limit, 5);
    assert_eq!(cfg.limits.page.max_hits, 10);
    assert!(!cfg.development);
    assert_eq!(cfg.max_window(), Duration::from_secs(60));
  }

  #[test]
  fn limit_classes_flow_into_the_pipeline() {
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str(
        r#"
          upstream_url = "http://upstream.test"
          daily_free_limit = 7
          [limits.page]
          window_secs = 30
          max_hits = 2
        "#,
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    let pipeline = cfg.pipeline();
    assert_eq!(pipeline.daily_free_limit, 7);
    assert_eq!(pipeline.limits.page.window_ms, 30_000);
    assert_eq!(pipeline.limits.page.max_hits, 2);
    // Untouched classes keep their defaults.
    assert_eq!(pipeline.limits.section.max_hits, 20);
  }
}
