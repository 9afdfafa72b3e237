//! Error taxonomy shared by the cache, toggle and aggregation layers.

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
  /// An operation that needs an actor was called without one.
  #[error("user not authenticated")]
  Unauthenticated,
  /// The store or a remote feed rejected the call.
  #[error("remote failure: {0}")]
  RemoteFailure(String),
  /// A single-row lookup returned nothing.
  #[error("not found: {0}")]
  NotFound(String),
  #[error("timed out after {0:?}")]
  Timeout(Duration),
  /// A row or payload did not have the expected shape.
  #[error("decode error: {0}")]
  Decode(String),
}

impl Error {
  pub fn remote(message: impl std::fmt::Display) -> Self {
    Self::RemoteFailure(message.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      Self::Decode(e.to_string())
    } else {
      Self::RemoteFailure(e.to_string())
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Self::RemoteFailure(e.to_string())
  }
}

impl From<tokio::task::JoinError> for Error {
  fn from(e: tokio::task::JoinError) -> Self {
    Self::RemoteFailure(format!("store task failed: {}", e))
  }
}
