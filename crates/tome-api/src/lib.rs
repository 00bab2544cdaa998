//! HTTP layer for Tome.
//!
//! Exposes an axum [`Router`] over the transport-agnostic orchestrator.
//! Handlers do admission, then hand a channel-backed sink to the
//! orchestrator and return the push-stream response; the hosting binary
//! owns listeners, TLS, and process lifecycle.
//!
//! # Mounting
//!
//! ```rust,ignore
//! axum::serve(listener, tome_api::router(state)).await?;
//! ```

pub mod error;
pub mod identity;
pub mod pages;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use tome_core::{
  generate::Upstream,
  orchestrator::Orchestrator,
  store::{CredentialStore, RateLimitStore, UsageStore},
};

pub use error::ApiError;
pub use identity::{StaticTokenVerifier, TokenVerifier};

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, U, V> {
  pub orch:     Arc<Orchestrator<S, U>>,
  pub verifier: Arc<V>,
  /// Direct handle for the credential endpoints; `None` when the
  /// deployment has no shared store.
  pub creds:    Option<Arc<S>>,
}

impl<S, U, V> Clone for AppState<S, U, V> {
  fn clone(&self) -> Self {
    AppState {
      orch:     self.orch.clone(),
      verifier: self.verifier.clone(),
      creds:    self.creds.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S, U, V>(state: AppState<S, U, V>) -> Router
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  Router::new()
    .route("/v1/pages", post(pages::generate::<S, U, V>))
    .route("/v1/pages/section", post(pages::section::<S, U, V>))
    .route("/v1/usage", get(pages::usage::<S, U, V>))
    .route(
      "/v1/credential",
      put(pages::put_credential::<S, U, V>)
        .delete(pages::delete_credential::<S, U, V>),
    )
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
