//! Error types for `tome-wire`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The stream ended without a terminal event.
  #[error("no complete data received from stream")]
  NoTerminalEvent,

  #[error("cannot encode event: {0}")]
  Encode(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
