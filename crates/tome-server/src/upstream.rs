//! reqwest-backed client for the upstream generation service.
//!
//! Both operations hit `POST {base}/v1/generate` with the caller's bearer
//! credential. Non-streaming calls return one JSON object; streaming calls
//! return SSE-style `data:` lines terminated by `[DONE]`, surfaced here as
//! a plain text-chunk stream.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tome_core::{
  error::UpstreamError,
  generate::{ContentStream, Upstream},
};

/// Async HTTP client for the upstream service.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
  client:   reqwest::Client,
  base_url: String,
}

impl HttpUpstream {
  /// `timeout` bounds the non-streaming call and the streaming handshake;
  /// chunk arrival is bounded by the orchestrator, not here, so a healthy
  /// long generation is never cut off mid-stream.
  pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
    let client = reqwest::Client::builder()
      .connect_timeout(timeout.min(Duration::from_secs(10)))
      .build()?;
    Ok(HttpUpstream {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  fn url(&self) -> String {
    format!("{}/v1/generate", self.base_url)
  }
}

impl Upstream for HttpUpstream {
  async fn generate_structured(
    &self,
    credential: &str,
    prompt: &str,
    schema: &serde_json::Value,
  ) -> Result<serde_json::Value, UpstreamError> {
    let resp = self
      .client
      .post(self.url())
      .bearer_auth(credential)
      .json(&serde_json::json!({
        "prompt": prompt,
        "schema": schema,
        "stream": false
      }))
      .send()
      .await
      .map_err(|e| UpstreamError::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(UpstreamError::Transport(format!(
        "upstream returned {status}"
      )));
    }
    resp
      .json()
      .await
      .map_err(|e| UpstreamError::Malformed(e.to_string()))
  }

  async fn stream_text(
    &self,
    credential: &str,
    prompt: &str,
  ) -> Result<ContentStream, UpstreamError> {
    let resp = self
      .client
      .post(self.url())
      .bearer_auth(credential)
      .json(&serde_json::json!({ "prompt": prompt, "stream": true }))
      .send()
      .await
      .map_err(|e| UpstreamError::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(UpstreamError::Transport(format!(
        "upstream returned {status}"
      )));
    }
    Ok(sse_text_stream(resp.bytes_stream().boxed()))
  }
}

// ─── SSE line handling ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChunkPayload {
  text: String,
}

enum LineEvent {
  Text(String),
  Done,
}

/// One `data:` line. Undecodable lines are logged and skipped; they must
/// not abort the stream.
fn parse_sse_line(line: &str) -> Option<LineEvent> {
  let payload = line.strip_prefix("data:")?.trim();
  if payload == "[DONE]" {
    return Some(LineEvent::Done);
  }
  match serde_json::from_str::<ChunkPayload>(payload) {
    Ok(chunk) => Some(LineEvent::Text(chunk.text)),
    Err(e) => {
      tracing::warn!(error = %e, "skipping undecodable upstream line");
      None
    }
  }
}

struct SseState<B> {
  inner:   B,
  buffer:  Vec<u8>,
  pending: VecDeque<String>,
  done:    bool,
}

/// Adapt a raw byte stream of SSE lines into text chunks. Tolerates line
/// breaks and multi-byte characters falling on any chunk boundary.
fn sse_text_stream<B>(bytes: B) -> ContentStream
where
  B: Stream<Item = reqwest::Result<Bytes>> + Send + Unpin + 'static,
{
  let state = SseState {
    inner:   bytes,
    buffer:  Vec::new(),
    pending: VecDeque::new(),
    done:    false,
  };

  futures::stream::unfold(state, |mut st| async move {
    loop {
      if let Some(text) = st.pending.pop_front() {
        return Some((Ok(text), st));
      }
      if st.done {
        return None;
      }
      match st.inner.next().await {
        None => st.done = true,
        Some(Err(e)) => {
          st.done = true;
          return Some((
            Err(UpstreamError::Transport(e.to_string())),
            st,
          ));
        }
        Some(Ok(chunk)) => {
          st.buffer.extend_from_slice(&chunk);
          while let Some(at) = st.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = st.buffer.drain(..=at).collect();
            let line = String::from_utf8_lossy(&line);
            match parse_sse_line(line.trim()) {
              Some(LineEvent::Text(text)) => st.pending.push_back(text),
              Some(LineEvent::Done) => {
                st.done = true;
                break;
              }
              None => {}
            }
          }
        }
      }
    }
  })
  .boxed()
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn collect(chunks: Vec<&'static [u8]>) -> Vec<String> {
    let bytes = futures::stream::iter(
      chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
    );
    let mut stream = sse_text_stream(Box::pin(bytes));
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
      out.push(item.unwrap());
    }
    out
  }

  #[tokio::test]
  async fn lines_split_across_chunks_are_reassembled() {
    let out = collect(vec![
      b"data: {\"text\": \"Aethros \"}\ndata: {\"te",
      b"xt\": \"drifts.\"}\n",
      b"data: [DONE]\n",
    ])
    .await;
    assert_eq!(out, vec!["Aethros ", "drifts."]);
  }

  #[tokio::test]
  async fn undecodable_lines_are_skipped() {
    let out = collect(vec![
      b"data: not json\n",
      b": comment line\n",
      b"data: {\"text\": \"ok\"}\n",
      b"data: [DONE]\n",
    ])
    .await;
    assert_eq!(out, vec!["ok"]);
  }

  #[tokio::test]
  async fn nothing_after_done_is_emitted() {
    let out = collect(vec![
      b"data: {\"text\": \"a\"}\ndata: [DONE]\ndata: {\"text\": \"b\"}\n",
    ])
    .await;
    assert_eq!(out, vec!["a"]);
  }
}
