//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Admission errors become single JSON documents shaped like the stream's
//! error events, so clients parse one error format everywhere. Rate-limit
//! rejections carry the standard limit headers plus `retry-after`.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use thiserror::Error;
use tome_core::{error::Error as PipelineError, event::ErrorBody};

/// An error returned by an API handler before streaming begins.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub PipelineError);

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = StatusCode::from_u16(self.0.http_status())
      .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody::from_error(&self.0);

    let mut response = (
      status,
      Json(serde_json::json!({ "error": body })),
    )
      .into_response();

    if let PipelineError::RateLimited { limit, retry_after_secs, reset_at, .. } =
      &self.0
    {
      let headers = response.headers_mut();
      headers.insert("x-ratelimit-limit", header_value(limit.to_string()));
      headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
      headers.insert(
        "x-ratelimit-reset",
        header_value(reset_at.timestamp().to_string()),
      );
      headers.insert(
        header::RETRY_AFTER,
        header_value(retry_after_secs.to_string()),
      );
    }
    response
  }
}

pub(crate) fn header_value(value: String) -> HeaderValue {
  HeaderValue::from_str(&value)
    .unwrap_or_else(|_| HeaderValue::from_static("0"))
}
