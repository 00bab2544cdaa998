//! The upstream generation seam and its deterministic mock.
//!
//! The real backend (`tome-server`) talks HTTP; the mock exercises the
//! identical two-phase contract — a structured object, then a paced chunk
//! stream — with no upstream dependency, and counts its calls so tests can
//! assert the upstream was (or was not) reached.

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
  },
  time::Duration,
};

use futures::{StreamExt, stream::BoxStream};

use crate::{
  error::UpstreamError,
  page::{PageFact, PageMetadata, RelatedConcept},
};

/// The incremental prose sequence produced by the content phase.
pub type ContentStream = BoxStream<'static, Result<String, UpstreamError>>;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the upstream text-generation service.
pub trait Upstream: Send + Sync {
  /// One-shot structured generation: a JSON object matching `schema`.
  fn generate_structured<'a>(
    &'a self,
    credential: &'a str,
    prompt: &'a str,
    schema: &'a serde_json::Value,
  ) -> impl Future<Output = Result<serde_json::Value, UpstreamError>> + Send + 'a;

  /// Free-text generation delivered as an incremental chunk sequence.
  fn stream_text<'a>(
    &'a self,
    credential: &'a str,
    prompt: &'a str,
  ) -> impl Future<Output = Result<ContentStream, UpstreamError>> + Send + 'a;
}

// ─── Chunking ────────────────────────────────────────────────────────────────

/// Split `text` into chunks of `words_per_chunk` whitespace-delimited words,
/// preserving all original bytes so concatenating the chunks reproduces the
/// input exactly.
pub fn chunk_text(text: &str, words_per_chunk: usize) -> Vec<String> {
  let per = words_per_chunk.max(1);
  let words: Vec<&str> = text.split_inclusive(' ').collect();
  words
    .chunks(per)
    .map(|group| group.concat())
    .collect()
}

/// Turn `text` into a paced [`ContentStream`] of fixed-size word chunks.
pub fn stream_words(
  text: String,
  words_per_chunk: usize,
  delay: Duration,
) -> ContentStream {
  let chunks = chunk_text(&text, words_per_chunk);
  futures::stream::iter(chunks.into_iter().map(Ok))
    .then(move |item| async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      item
    })
    .boxed()
}

// ─── Mock ────────────────────────────────────────────────────────────────────

/// The subject a prompt is about; prompts lead with a `Subject:` line.
pub(crate) fn subject_of(prompt: &str) -> &str {
  prompt
    .lines()
    .next()
    .and_then(|line| line.strip_prefix("Subject: "))
    .map(str::trim)
    .unwrap_or("Unknown Entry")
}

/// Deterministic metadata; every cross-reference term appears verbatim in
/// [`mock_content`] for the same subject.
pub fn mock_metadata(subject: &str) -> PageMetadata {
  PageMetadata {
    categories: vec!["Places & Regions".into(), "Wonders".into()],
    cross_reference_terms: vec![
      "crystal currents".into(),
      "the Drift Charts".into(),
      "skyfarers".into(),
      "the Lowward Reaches".into(),
      "beacon lanterns".into(),
    ],
    related_concepts: vec![
      RelatedConcept {
        term:        "Skyfarer Guilds".into(),
        description: format!(
          "Chartered crews that ply the routes around {subject}."
        ),
      },
      RelatedConcept {
        term:        "The Drift Charts".into(),
        description: "Hand-annotated maps of the shifting currents.".into(),
      },
    ],
    facts: vec![
      PageFact {
        name:  "Classification".into(),
        value: "Uncatalogued wonder".into(),
      },
      PageFact { name: "First charted".into(), value: "Third Age".into() },
      PageFact { name: "Status".into(), value: "Inhabited".into() },
    ],
  }
}

/// Deterministic multi-paragraph placeholder prose for `subject`.
pub fn mock_content(subject: &str) -> String {
  format!(
    "{subject} sits where the crystal currents fold back on themselves, \
and travellers who trust the Drift Charts rarely find it twice in the \
same place. Most accounts agree on little beyond the light: a slow, \
sourceless shimmer that the skyfarers call morning-glass.\n\n\
Trade with the Lowward Reaches keeps {subject} provisioned through the \
still seasons. Cargo moves by tethered glider, guided in by beacon \
lanterns whose keepers memorise the currents rather than chart them. \
The lantern-keepers' rolls are the closest thing to a census the place \
has ever had.\n\n\
Scholars dispute almost everything else written about {subject}, and \
the archives hold three mutually exclusive founding stories. The \
inhabitants, asked to pick among them, are said to answer only that \
the wind settles such questions eventually."
  )
}

/// A counting, failure-injectable mock upstream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MockUpstream {
  inner: Arc<MockInner>,
}

#[derive(Debug)]
struct MockInner {
  chunk_words:      usize,
  chunk_delay:      Duration,
  structured_calls: AtomicU32,
  stream_calls:     AtomicU32,
  fail_structured:  AtomicBool,
  fail_stream:      AtomicBool,
}

impl Default for MockUpstream {
  fn default() -> Self {
    MockUpstream::with_pacing(8, Duration::from_millis(25))
  }
}

impl MockUpstream {
  pub fn new() -> Self {
    MockUpstream::default()
  }

  pub fn with_pacing(chunk_words: usize, chunk_delay: Duration) -> Self {
    MockUpstream {
      inner: Arc::new(MockInner {
        chunk_words,
        chunk_delay,
        structured_calls: AtomicU32::new(0),
        stream_calls: AtomicU32::new(0),
        fail_structured: AtomicBool::new(false),
        fail_stream: AtomicBool::new(false),
      }),
    }
  }

  pub fn structured_calls(&self) -> u32 {
    self.inner.structured_calls.load(Ordering::Relaxed)
  }

  pub fn stream_calls(&self) -> u32 {
    self.inner.stream_calls.load(Ordering::Relaxed)
  }

  pub fn fail_structured(&self, fail: bool) {
    self.inner.fail_structured.store(fail, Ordering::Relaxed);
  }

  pub fn fail_stream(&self, fail: bool) {
    self.inner.fail_stream.store(fail, Ordering::Relaxed);
  }
}

impl Upstream for MockUpstream {
  async fn generate_structured(
    &self,
    _credential: &str,
    prompt: &str,
    _schema: &serde_json::Value,
  ) -> Result<serde_json::Value, UpstreamError> {
    self.inner.structured_calls.fetch_add(1, Ordering::Relaxed);
    if self.inner.fail_structured.load(Ordering::Relaxed) {
      return Err(UpstreamError::Transport(
        "mock structured generation failure".into(),
      ));
    }
    serde_json::to_value(mock_metadata(subject_of(prompt)))
      .map_err(|e| UpstreamError::Malformed(e.to_string()))
  }

  async fn stream_text(
    &self,
    _credential: &str,
    prompt: &str,
  ) -> Result<ContentStream, UpstreamError> {
    self.inner.stream_calls.fetch_add(1, Ordering::Relaxed);
    if self.inner.fail_stream.load(Ordering::Relaxed) {
      return Err(UpstreamError::Transport("mock stream failure".into()));
    }
    let text = mock_content(subject_of(prompt));
    Ok(stream_words(text, self.inner.chunk_words, self.inner.chunk_delay))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chunks_reassemble_to_the_original_text() {
    let text = mock_content("Aethros");
    let chunks = chunk_text(&text, 8);
    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), text);
  }

  #[test]
  fn mock_terms_appear_verbatim_in_mock_prose() {
    let metadata = mock_metadata("Aethros");
    let prose = mock_content("Aethros");
    for term in &metadata.cross_reference_terms {
      assert!(
        prose.contains(term.as_str()),
        "term {term:?} missing from prose"
      );
    }
  }

  #[tokio::test]
  async fn mock_streams_are_deterministic() {
    let mock = MockUpstream::with_pacing(4, Duration::ZERO);
    let collect = |prompt: &'static str| {
      let mock = mock.clone();
      async move {
        let mut stream = mock.stream_text("", prompt).await.unwrap();
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
          out.push_str(&chunk.unwrap());
        }
        out
      }
    };
    let a = collect("Subject: Aethros\n\nWrite.").await;
    let b = collect("Subject: Aethros\n\nWrite.").await;
    assert_eq!(a, b);
    assert!(a.contains("Aethros"));
    assert_eq!(mock.stream_calls(), 2);
  }

  #[tokio::test]
  async fn failure_injection_trips_both_phases() {
    let mock = MockUpstream::with_pacing(4, Duration::ZERO);
    mock.fail_structured(true);
    mock.fail_stream(true);
    let schema = serde_json::json!({});
    assert!(mock.generate_structured("", "Subject: X", &schema).await.is_err());
    assert!(mock.stream_text("", "Subject: X").await.is_err());
    assert_eq!(mock.structured_calls(), 1);
  }
}
