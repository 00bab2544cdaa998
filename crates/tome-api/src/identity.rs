//! Caller identity and origin extraction.
//!
//! Token issuance and verification are an external collaborator; this
//! module only parses the `Authorization` header and hands the opaque token
//! to a [`TokenVerifier`]. A request without a valid token proceeds as an
//! anonymous caller — admission decides what anonymous callers may do.

use std::{collections::HashMap, future::Future};

use axum::http::{HeaderMap, header};
use tome_core::request::Caller;

/// Resolves an opaque bearer token to a caller identity.
pub trait TokenVerifier: Send + Sync {
  fn verify<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Option<String>> + Send + 'a;
}

/// A fixed token → identity table from configuration. Stands in for a real
/// verification service in single-box deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
  tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
  pub fn new(tokens: HashMap<String, String>) -> Self {
    StaticTokenVerifier { tokens }
  }
}

impl TokenVerifier for StaticTokenVerifier {
  async fn verify(&self, token: &str) -> Option<String> {
    self.tokens.get(token).cloned()
  }
}

/// The bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// Best-effort client IP from proxy headers.
pub fn client_ip(headers: &HeaderMap) -> String {
  if let Some(forwarded) = headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    && let Some(first) = forwarded.split(',').next()
    && !first.trim().is_empty()
  {
    return first.trim().to_string();
  }
  if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok())
    && !real_ip.trim().is_empty()
  {
    return real_ip.trim().to_string();
  }
  "unknown".to_string()
}

/// Resolve the full [`Caller`] for a request.
pub async fn resolve_caller<V: TokenVerifier>(
  headers: &HeaderMap,
  verifier: &V,
) -> Caller {
  let identity = match bearer_token(headers) {
    Some(token) => verifier.verify(token).await,
    None => None,
  };
  Caller { identity, ip: client_ip(headers) }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn verifier() -> StaticTokenVerifier {
    StaticTokenVerifier::new(HashMap::from([(
      "tok-alice".to_string(),
      "alice".to_string(),
    )]))
  }

  #[tokio::test]
  async fn valid_token_resolves_identity() {
    let mut headers = HeaderMap::new();
    headers.insert(
      header::AUTHORIZATION,
      HeaderValue::from_static("Bearer tok-alice"),
    );
    headers
      .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

    let caller = resolve_caller(&headers, &verifier()).await;
    assert_eq!(caller.identity.as_deref(), Some("alice"));
    assert_eq!(caller.ip, "203.0.113.9");
  }

  #[tokio::test]
  async fn unknown_token_is_anonymous() {
    let mut headers = HeaderMap::new();
    headers.insert(
      header::AUTHORIZATION,
      HeaderValue::from_static("Bearer tok-mallory"),
    );
    let caller = resolve_caller(&headers, &verifier()).await;
    assert_eq!(caller.identity, None);
    assert_eq!(caller.ip, "unknown");
  }

  #[test]
  fn forwarded_for_takes_the_first_entry() {
    let mut headers = HeaderMap::new();
    headers.insert(
      "x-forwarded-for",
      HeaderValue::from_static("198.51.100.7, 10.0.0.1"),
    );
    assert_eq!(client_ip(&headers), "198.51.100.7");
  }
}
