//! Upstream credential resolution.
//!
//! Decides which credential a request will use — never stores one. Storage
//! (and any at-rest encryption) belongs to the [`CredentialStore`] backend.

use std::sync::Arc;

use crate::{
  error::{Error, Result},
  store::CredentialStore,
};

/// The credential a request will present upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredential {
  /// Caller-supplied key: exempt from the daily cap.
  Own(String),
  /// The service-wide default key: free tier, capped.
  ServiceDefault(String),
  /// Development mode with no key at all: deterministic mock data.
  Mock,
}

impl ResolvedCredential {
  pub fn is_own(&self) -> bool {
    matches!(self, ResolvedCredential::Own(_))
  }

  pub fn is_mock(&self) -> bool {
    matches!(self, ResolvedCredential::Mock)
  }
}

/// Per-request credential decision layer.
// No Debug: `service_key` is a secret.
#[derive(Clone)]
pub struct CredentialResolver<C> {
  store:             Option<Arc<C>>,
  user_keys_enabled: bool,
  service_key:       Option<String>,
  development:       bool,
}

impl<C: CredentialStore> CredentialResolver<C> {
  pub fn new(
    store: Option<Arc<C>>,
    user_keys_enabled: bool,
    service_key: Option<String>,
    development: bool,
  ) -> Self {
    CredentialResolver {
      store,
      user_keys_enabled,
      service_key,
      development,
    }
  }

  pub fn user_keys_enabled(&self) -> bool {
    self.user_keys_enabled
  }

  /// Resolution order: caller's own key (feature-gated), the service
  /// default, then mock in development mode. With none of the three the
  /// request cannot proceed.
  pub async fn resolve(
    &self,
    identity: Option<&str>,
  ) -> Result<ResolvedCredential> {
    if self.user_keys_enabled
      && let Some(identity) = identity
      && let Some(store) = &self.store
    {
      match store.credential(identity).await {
        Ok(Some(key)) => return Ok(ResolvedCredential::Own(key)),
        Ok(None) => {}
        Err(e) => {
          // A dead credential store must not block free-tier callers.
          tracing::warn!(error = %e, identity, "credential store unreachable");
        }
      }
    }
    if let Some(key) = &self.service_key {
      return Ok(ResolvedCredential::ServiceDefault(key.clone()));
    }
    if self.development {
      return Ok(ResolvedCredential::Mock);
    }
    Err(Error::CredentialRequired)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[tokio::test]
  async fn own_key_wins_when_feature_enabled() {
    let store = Arc::new(MemoryStore::new());
    store.set_credential("alice", "sk-alice").await.unwrap();
    let resolver = CredentialResolver::new(
      Some(store),
      true,
      Some("sk-service".into()),
      false,
    );
    assert_eq!(
      resolver.resolve(Some("alice")).await.unwrap(),
      ResolvedCredential::Own("sk-alice".into())
    );
  }

  #[tokio::test]
  async fn own_key_ignored_when_feature_disabled() {
    let store = Arc::new(MemoryStore::new());
    store.set_credential("alice", "sk-alice").await.unwrap();
    let resolver = CredentialResolver::new(
      Some(store),
      false,
      Some("sk-service".into()),
      false,
    );
    assert_eq!(
      resolver.resolve(Some("alice")).await.unwrap(),
      ResolvedCredential::ServiceDefault("sk-service".into())
    );
  }

  #[tokio::test]
  async fn anonymous_callers_use_the_service_default() {
    let resolver = CredentialResolver::<MemoryStore>::new(
      None,
      true,
      Some("sk-service".into()),
      false,
    );
    assert_eq!(
      resolver.resolve(None).await.unwrap(),
      ResolvedCredential::ServiceDefault("sk-service".into())
    );
  }

  #[tokio::test]
  async fn development_mode_falls_back_to_mock() {
    let resolver =
      CredentialResolver::<MemoryStore>::new(None, false, None, true);
    assert_eq!(
      resolver.resolve(Some("alice")).await.unwrap(),
      ResolvedCredential::Mock
    );
  }

  #[tokio::test]
  async fn no_credential_anywhere_is_an_error() {
    let resolver =
      CredentialResolver::<MemoryStore>::new(None, true, None, false);
    let err = resolver.resolve(Some("alice")).await.unwrap_err();
    assert!(matches!(err, Error::CredentialRequired));
  }
}
