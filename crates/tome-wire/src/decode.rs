//! Push-protocol decoder.
//!
//! [`StreamDecoder`] reassembles frames from arbitrarily fragmented bytes.
//! [`EventAssembler`] layers stream semantics on top: partial snapshots are
//! handed back for live rendering, the single terminal event becomes the
//! call's result, and a stream that ends without one is an error.

use tome_core::{event::StreamEvent, page::PageSnapshot};

use crate::{
  Error, Result,
  encode::{DATA_PREFIX, FRAME_DELIMITER},
};

// ─── Frame reassembly ────────────────────────────────────────────────────────

/// Reconstructs whole events from a fragmented byte stream.
///
/// Bytes are buffered until a blank-line delimiter completes a frame; the
/// trailing (possibly incomplete) segment stays buffered for the next
/// chunk, so delimiters and multi-byte characters may fall on any chunk
/// boundary. A malformed segment is logged and skipped — one bad frame
/// never aborts the stream.
#[derive(Debug, Default)]
pub struct StreamDecoder {
  buffer: Vec<u8>,
}

impl StreamDecoder {
  pub fn new() -> Self {
    StreamDecoder::default()
  }

  /// Append `chunk` and return every event completed by it.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
    self.buffer.extend_from_slice(chunk);

    let delimiter = FRAME_DELIMITER.as_bytes();
    let mut events = Vec::new();
    while let Some(at) = find(&self.buffer, delimiter) {
      let segment: Vec<u8> =
        self.buffer.drain(..at + delimiter.len()).collect();
      if let Some(event) = decode_segment(&segment[..at]) {
        events.push(event);
      }
    }
    events
  }

  /// Bytes still waiting for a delimiter.
  pub fn pending(&self) -> &[u8] {
    &self.buffer
  }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_segment(bytes: &[u8]) -> Option<StreamEvent> {
  let text = match std::str::from_utf8(bytes) {
    Ok(text) => text.trim(),
    Err(e) => {
      tracing::warn!(error = %e, "skipping non-UTF-8 stream segment");
      return None;
    }
  };
  if text.is_empty() {
    return None;
  }
  let Some(payload) = text.strip_prefix(DATA_PREFIX) else {
    tracing::warn!(segment = text, "skipping unprefixed stream segment");
    return None;
  };
  match serde_json::from_str(payload) {
    Ok(event) => Some(event),
    Err(e) => {
      tracing::warn!(error = %e, "skipping undecodable stream segment");
      None
    }
  }
}

// ─── Stream semantics ────────────────────────────────────────────────────────

/// Separates the live partial snapshots from the one terminal event.
#[derive(Debug, Default)]
pub struct EventAssembler {
  decoder:  StreamDecoder,
  terminal: Option<StreamEvent>,
}

impl EventAssembler {
  pub fn new() -> Self {
    EventAssembler::default()
  }

  /// Feed bytes; returns the partial snapshots completed by this chunk,
  /// in arrival order. The terminal event is retained for [`finish`].
  ///
  /// [`finish`]: EventAssembler::finish
  pub fn push(&mut self, chunk: &[u8]) -> Vec<PageSnapshot> {
    let mut partials = Vec::new();
    for event in self.decoder.push(chunk) {
      if event.is_terminal() {
        // Keep the first terminal; anything after it is a protocol
        // violation worth noting but not worth failing over.
        if self.terminal.is_some() {
          tracing::warn!("event after terminal; ignoring");
        } else {
          self.terminal = Some(event);
        }
      } else if let StreamEvent::Snapshot(snapshot) = event {
        partials.push(snapshot);
      }
    }
    partials
  }

  /// The terminal event, or the no-data error if the stream ended
  /// without one.
  pub fn finish(self) -> Result<StreamEvent> {
    self.terminal.ok_or(Error::NoTerminalEvent)
  }
}
