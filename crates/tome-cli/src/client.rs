//! Async HTTP client wrapping the Tome generation API.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt as _;
use reqwest::Client;
use std::time::Duration;
use tome_core::{
  event::StreamEvent,
  page::{PageSnapshot, UsageView},
  request::{GenerationRequest, SectionRequest},
};
use tome_wire::{EventAssembler, STREAM_MARKER_HEADER};

/// Connection settings for the Tome API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub token:    Option<String>,
}

/// Async HTTP client for the Tome API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    // No total timeout: generation streams are expected to run long.
    let client = Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{path}", self.config.base_url.trim_end_matches('/'))
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.config.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  // ── Generation ────────────────────────────────────────────────────────────

  /// `POST /v1/pages` — stream a full page. Each partial snapshot is
  /// handed to `on_snapshot`; the terminal event is returned.
  pub async fn stream_page(
    &self,
    req: &GenerationRequest,
    on_snapshot: impl FnMut(&PageSnapshot),
  ) -> Result<StreamEvent> {
    self.stream("/v1/pages", req, on_snapshot).await
  }

  /// `POST /v1/pages/section` — stream one section of an existing page.
  pub async fn stream_section(
    &self,
    req: &SectionRequest,
    on_snapshot: impl FnMut(&PageSnapshot),
  ) -> Result<StreamEvent> {
    self.stream("/v1/pages/section", req, on_snapshot).await
  }

  async fn stream<R: serde::Serialize>(
    &self,
    path: &str,
    req: &R,
    mut on_snapshot: impl FnMut(&PageSnapshot),
  ) -> Result<StreamEvent> {
    let resp = self
      .auth(self.client.post(self.url(path)).json(req))
      .send()
      .await
      .with_context(|| format!("POST {path} failed"))?;

    if !resp.status().is_success() {
      return Err(api_error(path, resp).await);
    }

    // Without the marker header the body is one JSON document.
    if resp.headers().get(STREAM_MARKER_HEADER).is_none() {
      let snapshot: PageSnapshot =
        resp.json().await.context("deserialising snapshot")?;
      return Ok(StreamEvent::Snapshot(snapshot));
    }

    let mut assembler = EventAssembler::new();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
      let chunk = chunk.context("reading push stream")?;
      for snapshot in assembler.push(&chunk) {
        on_snapshot(&snapshot);
      }
    }
    assembler.finish().map_err(Into::into)
  }

  // ── Usage & credentials ───────────────────────────────────────────────────

  /// `GET /v1/usage`
  pub async fn usage(&self) -> Result<UsageView> {
    let resp = self
      .auth(self.client.get(self.url("/v1/usage")))
      .send()
      .await
      .context("GET /v1/usage failed")?;
    if !resp.status().is_success() {
      return Err(api_error("/v1/usage", resp).await);
    }
    resp.json().await.context("deserialising usage view")
  }

  /// `PUT /v1/credential`
  pub async fn set_credential(&self, api_key: &str) -> Result<()> {
    let resp = self
      .auth(self.client.put(self.url("/v1/credential")))
      .json(&serde_json::json!({ "apiKey": api_key }))
      .send()
      .await
      .context("PUT /v1/credential failed")?;
    if !resp.status().is_success() {
      return Err(api_error("/v1/credential", resp).await);
    }
    Ok(())
  }

  /// `DELETE /v1/credential`
  pub async fn remove_credential(&self) -> Result<()> {
    let resp = self
      .auth(self.client.delete(self.url("/v1/credential")))
      .send()
      .await
      .context("DELETE /v1/credential failed")?;
    if !resp.status().is_success() {
      return Err(api_error("/v1/credential", resp).await);
    }
    Ok(())
  }
}

/// Turn a non-2xx response into an error carrying the server's code.
async fn api_error(path: &str, resp: reqwest::Response) -> anyhow::Error {
  let status = resp.status();
  match resp.json::<serde_json::Value>().await {
    Ok(json) => {
      let code = json["error"]["code"].as_str().unwrap_or("UNKNOWN");
      let message = json["error"]["message"].as_str().unwrap_or("");
      anyhow!("{path} → {status} {code}: {message}")
    }
    Err(_) => anyhow!("{path} → {status}"),
  }
}
