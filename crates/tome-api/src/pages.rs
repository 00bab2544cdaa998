//! Handlers for the generation, usage, and credential endpoints.
//!
//! | Method   | Path                | Notes                                    |
//! |----------|---------------------|------------------------------------------|
//! | `POST`   | `/v1/pages`         | Body: [`GenerationRequest`]; push stream |
//! | `POST`   | `/v1/pages/section` | Body: [`SectionRequest`]; push stream    |
//! | `GET`    | `/v1/usage`         | Caller's current [`UsageView`]           |
//! | `PUT`    | `/v1/credential`    | Body: `{"apiKey":"..."}`                 |
//! | `DELETE` | `/v1/credential`    | Remove the caller's stored key           |

use std::{future::Future, sync::Arc};

use axum::{
  Json,
  body::Body,
  extract::State,
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt as _;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tome_core::{
  event::StreamEvent,
  generate::Upstream,
  limit::RateStatus,
  orchestrator::Ticket,
  page::UsageView,
  request::{GenerationRequest, SectionRequest},
  sink::EventSink,
  store::{CredentialStore, RateLimitStore, UsageStore},
};
use tome_wire::{
  STREAM_CONTENT_TYPE, STREAM_MARKER_HEADER, STREAM_MARKER_VALUE,
  encode_event,
};

use crate::{
  AppState,
  error::{ApiError, header_value},
  identity::{TokenVerifier, resolve_caller},
};

// ─── Streaming sink ──────────────────────────────────────────────────────────

/// Bridges the orchestrator's event stream into an HTTP response body.
/// Each event is encoded to one frame and handed straight to the body
/// channel; nothing is batched.
struct ChannelSink {
  tx: tokio::sync::mpsc::Sender<Bytes>,
}

impl EventSink for ChannelSink {
  async fn send(&mut self, event: StreamEvent) -> bool {
    let frame = match encode_event(&event) {
      Ok(frame) => frame,
      Err(e) => {
        tracing::error!(error = %e, "dropping unencodable event");
        return true;
      }
    };
    self.tx.send(Bytes::from(frame)).await.is_ok()
  }
}

enum Job {
  Page(GenerationRequest),
  Section(SectionRequest),
}

fn stream_response<S, U, V>(
  state: &AppState<S, U, V>,
  ticket: Ticket,
  job: Job,
) -> Response
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  let rate = ticket.rate();
  let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);

  let orch = state.orch.clone();
  tokio::spawn(async move {
    let mut sink = ChannelSink { tx };
    match job {
      Job::Page(req) => orch.stream_page(ticket, req, &mut sink).await,
      Job::Section(req) => orch.stream_section(ticket, req, &mut sink).await,
    }
  });

  let body = Body::from_stream(
    ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>),
  );
  let mut response = Response::new(body);
  let headers = response.headers_mut();
  headers.insert(
    header::CONTENT_TYPE,
    header_value(STREAM_CONTENT_TYPE.to_string()),
  );
  headers.insert(
    header::CACHE_CONTROL,
    header_value("no-cache, no-transform".to_string()),
  );
  headers
    .insert(header::CONNECTION, header_value("keep-alive".to_string()));
  headers.insert("x-accel-buffering", header_value("no".to_string()));
  headers.insert(
    STREAM_MARKER_HEADER,
    header_value(STREAM_MARKER_VALUE.to_string()),
  );
  insert_rate_headers(headers, rate);
  response
}

fn insert_rate_headers(headers: &mut HeaderMap, rate: RateStatus) {
  headers.insert("x-ratelimit-limit", header_value(rate.limit.to_string()));
  headers.insert(
    "x-ratelimit-remaining",
    header_value(rate.remaining.to_string()),
  );
  headers.insert(
    "x-ratelimit-reset",
    header_value(rate.reset_at.timestamp().to_string()),
  );
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// `POST /v1/pages`
pub async fn generate<S, U, V>(
  State(state): State<AppState<S, U, V>>,
  headers: HeaderMap,
  Json(req): Json<GenerationRequest>,
) -> Response
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  let caller = resolve_caller(&headers, state.verifier.as_ref()).await;
  match state.orch.admit_page(&caller, &req).await {
    Ok(ticket) => stream_response(&state, ticket, Job::Page(req)),
    Err(e) => ApiError(e).into_response(),
  }
}

/// `POST /v1/pages/section`
pub async fn section<S, U, V>(
  State(state): State<AppState<S, U, V>>,
  headers: HeaderMap,
  Json(req): Json<SectionRequest>,
) -> Response
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  let caller = resolve_caller(&headers, state.verifier.as_ref()).await;
  match state.orch.admit_section(&caller, &req).await {
    Ok(ticket) => stream_response(&state, ticket, Job::Section(req)),
    Err(e) => ApiError(e).into_response(),
  }
}

// ─── Usage ───────────────────────────────────────────────────────────────────

/// `GET /v1/usage`
pub async fn usage<S, U, V>(
  State(state): State<AppState<S, U, V>>,
  headers: HeaderMap,
) -> Json<UsageView>
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  let caller = resolve_caller(&headers, state.verifier.as_ref()).await;
  Json(state.orch.usage().view(&caller.quota_key()).await)
}

// ─── Credentials ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CredentialBody {
  #[serde(rename = "apiKey")]
  pub api_key: String,
}

/// `PUT /v1/credential` — store the caller's own upstream key.
pub async fn put_credential<S, U, V>(
  State(state): State<AppState<S, U, V>>,
  headers: HeaderMap,
  Json(body): Json<CredentialBody>,
) -> Response
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  with_credential_store(&state, &headers, |creds, identity| async move {
    if body.api_key.trim().is_empty() {
      return error_response(
        StatusCode::BAD_REQUEST,
        "VALIDATION_FAILED",
        "apiKey must not be empty",
      );
    }
    match creds.set_credential(&identity, body.api_key.trim()).await {
      Ok(()) => StatusCode::NO_CONTENT.into_response(),
      Err(e) => store_failure(e),
    }
  })
  .await
}

/// `DELETE /v1/credential`
pub async fn delete_credential<S, U, V>(
  State(state): State<AppState<S, U, V>>,
  headers: HeaderMap,
) -> Response
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
{
  with_credential_store(&state, &headers, |creds, identity| async move {
    match creds.remove_credential(&identity).await {
      Ok(true) => StatusCode::NO_CONTENT.into_response(),
      Ok(false) => error_response(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        "no credential on file",
      ),
      Err(e) => store_failure(e),
    }
  })
  .await
}

/// Shared feature-flag / auth / store-presence checks for the credential
/// endpoints.
async fn with_credential_store<S, U, V, F, Fut>(
  state: &AppState<S, U, V>,
  headers: &HeaderMap,
  run: F,
) -> Response
where
  S: UsageStore + RateLimitStore + CredentialStore + 'static,
  U: Upstream + 'static,
  V: TokenVerifier + 'static,
  F: FnOnce(Arc<S>, String) -> Fut,
  Fut: Future<Output = Response>,
{
  if !state.orch.user_keys_enabled() {
    return error_response(
      StatusCode::FORBIDDEN,
      "FEATURE_DISABLED",
      "caller-supplied keys are not enabled",
    );
  }
  let caller = resolve_caller(headers, state.verifier.as_ref()).await;
  let Some(identity) = caller.identity else {
    return error_response(
      StatusCode::UNAUTHORIZED,
      "AUTH_REQUIRED",
      "storing a key requires an authenticated caller",
    );
  };
  let Some(creds) = state.creds.clone() else {
    return error_response(
      StatusCode::SERVICE_UNAVAILABLE,
      "STORE_UNAVAILABLE",
      "no shared store configured",
    );
  };
  run(creds, identity).await
}

fn store_failure(e: impl std::error::Error) -> Response {
  tracing::error!(error = %e, "credential store operation failed");
  error_response(
    StatusCode::INTERNAL_SERVER_ERROR,
    "STORE_ERROR",
    "credential store operation failed",
  )
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
  (
    status,
    Json(serde_json::json!({
      "error": { "code": code, "message": message }
    })),
  )
    .into_response()
}
