//! Error types for `babble-core`.

use thiserror::Error;

use crate::token::TokenId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("model not found: {0:?}")]
  ModelNotFound(String),

  #[error("model already exists: {0:?}")]
  ModelExists(String),

  /// A seed token (or imported text) has no vocabulary entry.
  #[error("token not in vocabulary: {0:?}")]
  UnknownToken(String),

  #[error("token id not in vocabulary: {0}")]
  UnknownTokenId(TokenId),

  #[error("model order must be at least 1, got {0}")]
  InvalidOrder(usize),

  #[error("model {model:?} has order {existing}, cannot use order {requested}")]
  OrderMismatch {
    model:     String,
    existing:  usize,
    requested: usize,
  },

  #[error("malformed prefix text: {0:?}")]
  MalformedPrefix(String),

  /// An interchange document references an id it never defines.
  #[error("consistency error: {0}")]
  Consistency(String),

  #[error("operation cancelled")]
  Cancelled,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid pattern: {0}")]
  Regex(#[from] regex::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
