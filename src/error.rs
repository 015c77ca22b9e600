//! Error types for the SquirrelDB kit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  /// The decode target cannot hold a sequence of documents.
  #[error("Invalid decode target: {0}")]
  InvalidTarget(String),

  /// A single cursor item failed to decode; the whole decode is aborted.
  #[error("Decode error: {0}")]
  Decode(String),

  /// The cursor reported a fault after it was exhausted.
  #[error("Cursor error: {0}")]
  Cursor(String),

  #[error("Store error: {0}")]
  Store(String),

  #[error("Duplicate key: {0}")]
  DuplicateKey(String),

  #[error("no document results")]
  NoDocument,

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Timeout")]
  Timeout,
}

impl From<rmp_serde::encode::Error> for Error {
  fn from(e: rmp_serde::encode::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<tokio::time::error::Elapsed> for Error {
  fn from(_: tokio::time::error::Elapsed) -> Self {
    Self::Timeout
  }
}

pub type Result<T> = std::result::Result<T, Error>;
