//! Push-protocol codec for Tome.
//!
//! Frames [`StreamEvent`]s as line-oriented, self-delimited text
//! (`data: <json>\n\n`) and reconstructs them from an arbitrarily
//! fragmented byte stream. Pure synchronous; no HTTP or database
//! dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use tome_wire::{EventAssembler, encode_event};
//!
//! let mut assembler = EventAssembler::new();
//! for chunk in [&b"data: {\"error\":{\"code\":\"X\",\""[..], &b"message\":\"boom\"}}\n\n"[..]] {
//!   for snapshot in assembler.push(chunk) {
//!     println!("partial: {}", snapshot.content);
//!   }
//! }
//! let terminal = assembler.finish().unwrap();
//! ```

pub mod decode;
pub mod encode;
pub mod error;

pub use decode::{EventAssembler, StreamDecoder};
pub use encode::{
  DATA_PREFIX, FRAME_DELIMITER, STREAM_CONTENT_TYPE, STREAM_MARKER_HEADER,
  STREAM_MARKER_VALUE, encode_event,
};
pub use error::{Error, Result};
