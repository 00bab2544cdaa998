//! Push-protocol frame encoder and header constants.

use tome_core::event::StreamEvent;

use crate::Result;

/// Prefix of every frame line.
pub const DATA_PREFIX: &str = "data: ";
/// Blank-line terminator making each frame self-delimited.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Content type of a push-stream response body.
pub const STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
/// Marker header telling the client to decode the body as a push stream
/// rather than a single JSON document.
pub const STREAM_MARKER_HEADER: &str = "x-tome-stream";
pub const STREAM_MARKER_VALUE: &str = "v1";

/// Encode one event as a complete frame, delimiter included.
pub fn encode_event(event: &StreamEvent) -> Result<String> {
  let json = serde_json::to_string(event)?;
  Ok(format!("{DATA_PREFIX}{json}{FRAME_DELIMITER}"))
}

#[cfg(test)]
mod tests {
  use tome_core::page::PageSnapshot;
  use uuid::Uuid;

  use super::*;

  #[test]
  fn frames_are_prefixed_and_blank_line_terminated() {
    let event = StreamEvent::Snapshot(PageSnapshot::partial(
      Uuid::new_v4(),
      "Aethros",
      "Prose".into(),
      None,
      40,
    ));
    let frame = encode_event(&event).unwrap();
    assert!(frame.starts_with("data: {"));
    assert!(frame.ends_with("\n\n"));
    // The JSON payload itself stays on one line.
    assert_eq!(frame.trim_end().lines().count(), 1);
  }
}
