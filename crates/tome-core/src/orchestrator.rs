//! The two-phase generation orchestrator.
//!
//! Admission (`admit_*`) runs validation, rate limiting, credential
//! resolution, and the quota gate — in that fixed order — and returns a
//! [`Ticket`] or a structured error before any stream byte is written.
//! Streaming (`stream_*`) then drives the state machine: metadata phase,
//! initial snapshot, content phase with one snapshot per upstream chunk,
//! and the terminal snapshot. Failures during streaming are pushed as a
//! terminal error event on the same channel.
//!
//! Both hosting shapes call the same two entry points with different
//! sinks; nothing transport-specific lives here.

use std::{future::Future, sync::Arc, time::Duration};

use futures::StreamExt;
use uuid::Uuid;

use crate::{
  credentials::{CredentialResolver, ResolvedCredential},
  error::{Error, Result, UpstreamError},
  event::StreamEvent,
  generate::{MockUpstream, Upstream},
  limit::{LimitClasses, Operation, RateLimiter, RateStatus},
  metadata::{self, MetadataSource},
  observe::{Fallback, FallbackMeter},
  page::{PageMetadata, PageSnapshot, UsageView},
  prompt,
  quota::UsageCounter,
  request::{Caller, GenerationRequest, SectionRequest},
  sink::EventSink,
  store::{CredentialStore, RateLimitStore, UsageStore},
};

/// Progress reported with the initial snapshot.
const INITIAL_PROGRESS: u8 = 20;
/// Ceiling for in-flight progress; only the terminal snapshot reaches 100.
const STREAM_PROGRESS_CAP: u8 = 90;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for the whole pipeline, supplied by the host.
// No Debug: `service_credential` is a secret.
#[derive(Clone)]
pub struct PipelineConfig {
  pub daily_free_limit:      u32,
  pub limits:                LimitClasses,
  pub user_api_keys_enabled: bool,
  pub service_credential:    Option<String>,
  /// Development mode: proceed with deterministic mock data when no
  /// credential exists at all.
  pub development:           bool,
  /// Expected prose length, used to scale progress.
  pub expected_content_chars: usize,
  /// Bounded wait applied to each upstream call and to chunk arrival.
  pub upstream_timeout:      Duration,
  pub mock_chunk_words:      usize,
  pub mock_chunk_delay:      Duration,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    PipelineConfig {
      daily_free_limit:       5,
      limits:                 LimitClasses::default(),
      user_api_keys_enabled:  false,
      service_credential:     None,
      development:            false,
      expected_content_chars: 2200,
      upstream_timeout:       Duration::from_secs(60),
      mock_chunk_words:       8,
      mock_chunk_delay:       Duration::from_millis(25),
    }
  }
}

// ─── Ticket ──────────────────────────────────────────────────────────────────

/// Proof of admission: the resolved credential plus the rate-window state
/// the transport reflects into response headers.
#[derive(Debug, Clone)]
pub struct Ticket {
  credential: ResolvedCredential,
  quota_key:  String,
  rate:       RateStatus,
}

impl Ticket {
  pub fn rate(&self) -> RateStatus {
    self.rate
  }

  pub fn has_own_credential(&self) -> bool {
    self.credential.is_own()
  }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// The transport-agnostic generation pipeline.
pub struct Orchestrator<S, U> {
  usage:    UsageCounter<S>,
  limiter:  RateLimiter<S>,
  resolver: CredentialResolver<S>,
  upstream: Arc<U>,
  mock:     MockUpstream,
  meter:    FallbackMeter,
  cfg:      PipelineConfig,
}

impl<S, U> Orchestrator<S, U>
where
  S: UsageStore + RateLimitStore + CredentialStore,
  U: Upstream,
{
  pub fn new(
    shared: Option<Arc<S>>,
    upstream: Arc<U>,
    cfg: PipelineConfig,
  ) -> Self {
    let meter = FallbackMeter::new();
    Orchestrator {
      usage: UsageCounter::new(
        shared.clone(),
        cfg.daily_free_limit,
        meter.clone(),
      ),
      limiter: RateLimiter::new(shared.clone(), cfg.limits, meter.clone()),
      resolver: CredentialResolver::new(
        shared,
        cfg.user_api_keys_enabled,
        cfg.service_credential.clone(),
        cfg.development,
      ),
      upstream,
      mock: MockUpstream::with_pacing(
        cfg.mock_chunk_words,
        cfg.mock_chunk_delay,
      ),
      meter,
      cfg,
    }
  }

  pub fn meter(&self) -> &FallbackMeter {
    &self.meter
  }

  pub fn usage(&self) -> &UsageCounter<S> {
    &self.usage
  }

  pub fn user_keys_enabled(&self) -> bool {
    self.resolver.user_keys_enabled()
  }

  // ── Admission ─────────────────────────────────────────────────────────────

  pub async fn admit_page(
    &self,
    caller: &Caller,
    req: &GenerationRequest,
  ) -> Result<Ticket> {
    req.validate()?;
    self.admit(caller, Operation::Page).await
  }

  pub async fn admit_section(
    &self,
    caller: &Caller,
    req: &SectionRequest,
  ) -> Result<Ticket> {
    req.validate()?;
    self.admit(caller, Operation::Section).await
  }

  async fn admit(&self, caller: &Caller, op: Operation) -> Result<Ticket> {
    let rate = self.limiter.enforce(caller, op).await?;
    let credential =
      self.resolver.resolve(caller.identity.as_deref()).await?;
    let quota_key = caller.quota_key();

    if !credential.is_own() {
      let view = self.usage.view(&quota_key).await;
      if view.remaining == 0 {
        return Err(Error::QuotaExceeded { usage: view });
      }
    }

    Ok(Ticket { credential, quota_key, rate })
  }

  // ── Streaming ─────────────────────────────────────────────────────────────

  /// Drive a full-page generation into `sink`. Never fails: post-admission
  /// errors are delivered as a terminal error event.
  pub async fn stream_page<W: EventSink>(
    &self,
    ticket: Ticket,
    req: GenerationRequest,
    sink: &mut W,
  ) {
    let title = req.input.trim().to_string();
    let page_id = Uuid::new_v4();

    // Phase 1 — metadata. Recovered locally on failure, never fatal.
    let metadata = self.metadata_phase(&ticket, &req, &title).await;

    let initial = PageSnapshot::partial(
      page_id,
      &title,
      String::new(),
      Some(&metadata),
      INITIAL_PROGRESS,
    );
    if !sink.send(StreamEvent::Snapshot(initial)).await {
      return;
    }

    // Phase 2 — content, one snapshot per chunk.
    let content_prompt = prompt::content_prompt(
      &title,
      &metadata,
      req.context.as_deref(),
      req.world.as_ref(),
    );
    let content = match self
      .stream_phase(&ticket, &content_prompt, page_id, &title, Some(&metadata), sink)
      .await
    {
      Ok(Some(content)) => content,
      Ok(None) => return, // client went away
      Err(e) => {
        sink.send(StreamEvent::from(&e)).await;
        return;
      }
    };

    let usage = self.finalize_usage(&ticket, true).await;
    let terminal = PageSnapshot::terminal(
      page_id,
      &title,
      content.trim().to_string(),
      Some(&metadata),
      usage,
    );
    sink.send(StreamEvent::Snapshot(terminal)).await;
  }

  /// Drive a single-section generation into `sink`. No metadata phase and
  /// no metadata fields on the snapshots.
  pub async fn stream_section<W: EventSink>(
    &self,
    ticket: Ticket,
    req: SectionRequest,
    sink: &mut W,
  ) {
    let title = req.section_title.trim().to_string();
    let section_id = Uuid::new_v4();

    let initial = PageSnapshot::partial(
      section_id,
      &title,
      String::new(),
      None,
      INITIAL_PROGRESS,
    );
    if !sink.send(StreamEvent::Snapshot(initial)).await {
      return;
    }

    let section_prompt = prompt::section_prompt(
      &title,
      &req.page_title,
      &req.page_content,
      req.world.as_ref(),
    );
    let content = match self
      .stream_phase(&ticket, &section_prompt, section_id, &title, None, sink)
      .await
    {
      Ok(Some(content)) => content,
      Ok(None) => return,
      Err(e) => {
        sink.send(StreamEvent::from(&e)).await;
        return;
      }
    };

    // Sections report usage but do not consume a daily generation.
    let usage = self.finalize_usage(&ticket, false).await;
    let terminal = PageSnapshot::terminal(
      section_id,
      &title,
      content.trim().to_string(),
      None,
      usage,
    );
    sink.send(StreamEvent::Snapshot(terminal)).await;
  }

  // ── Phases ────────────────────────────────────────────────────────────────

  async fn metadata_phase(
    &self,
    ticket: &Ticket,
    req: &GenerationRequest,
    title: &str,
  ) -> PageMetadata {
    let metadata_prompt = prompt::metadata_prompt(
      title,
      req.kind,
      req.context.as_deref(),
      req.world.as_ref(),
    );
    let schema = prompt::metadata_schema();

    let result = match &ticket.credential {
      ResolvedCredential::Mock => {
        self.mock.generate_structured("", &metadata_prompt, &schema).await
      }
      ResolvedCredential::Own(key)
      | ResolvedCredential::ServiceDefault(key) => {
        self
          .bounded(self.upstream.generate_structured(
            key,
            &metadata_prompt,
            &schema,
          ))
          .await
      }
    };

    match result {
      Ok(value) => MetadataSource::Structured(value).extract(title),
      Err(e) => {
        self.meter.record(Fallback::Metadata);
        tracing::warn!(error = %e, title, "metadata phase failed");
        metadata::fallback_metadata(title)
      }
    }
  }

  /// Stream prose chunks into `sink` as partial snapshots.
  ///
  /// Returns the accumulated content, or `Ok(None)` once the sink reports
  /// the client gone — at which point upstream consumption stops too.
  async fn stream_phase<W: EventSink>(
    &self,
    ticket: &Ticket,
    content_prompt: &str,
    id: Uuid,
    title: &str,
    metadata: Option<&PageMetadata>,
    sink: &mut W,
  ) -> Result<Option<String>> {
    let mut stream = match &ticket.credential {
      ResolvedCredential::Mock => {
        self.meter.record(Fallback::MockContent);
        self.mock.stream_text("", content_prompt).await?
      }
      ResolvedCredential::Own(key)
      | ResolvedCredential::ServiceDefault(key) => {
        self
          .bounded(self.upstream.stream_text(key, content_prompt))
          .await?
      }
    };

    let mut content = String::new();
    let mut progress = INITIAL_PROGRESS;
    loop {
      let next = tokio::time::timeout(self.cfg.upstream_timeout, stream.next())
        .await
        .map_err(|_| UpstreamError::Timeout(self.cfg.upstream_timeout))?;
      let Some(chunk) = next else { break };
      content.push_str(&chunk?);

      progress = progress.max(self.progress_for(content.chars().count()));
      let snapshot =
        PageSnapshot::partial(id, title, content.clone(), metadata, progress);
      if !sink.send(StreamEvent::Snapshot(snapshot)).await {
        tracing::debug!(title, "client gone; abandoning upstream stream");
        return Ok(None);
      }
    }
    Ok(Some(content))
  }

  async fn finalize_usage(
    &self,
    ticket: &Ticket,
    consume: bool,
  ) -> Option<UsageView> {
    match &ticket.credential {
      ResolvedCredential::Own(_) => None,
      ResolvedCredential::ServiceDefault(_) if consume => {
        let count = self.usage.increment(&ticket.quota_key).await;
        Some(UsageView::new(count, self.usage.daily_limit()))
      }
      // Mock generations and sections spend nothing upstream.
      _ => Some(self.usage.view(&ticket.quota_key).await),
    }
  }

  fn progress_for(&self, chars: usize) -> u8 {
    let span = (STREAM_PROGRESS_CAP - INITIAL_PROGRESS) as usize;
    let scaled = INITIAL_PROGRESS as usize
      + chars * span / self.cfg.expected_content_chars.max(1);
    scaled.min(STREAM_PROGRESS_CAP as usize) as u8
  }

  async fn bounded<T>(
    &self,
    call: impl Future<Output = Result<T, UpstreamError>>,
  ) -> Result<T, UpstreamError> {
    match tokio::time::timeout(self.cfg.upstream_timeout, call).await {
      Ok(result) => result,
      Err(_) => Err(UpstreamError::Timeout(self.cfg.upstream_timeout)),
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
