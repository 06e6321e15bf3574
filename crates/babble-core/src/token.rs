//! Vocabulary identifiers and the token unit produced by tokenizers.

/// Identifier of a vocabulary entry. Matches the `INTEGER` rowid column.
pub type TokenId = i64;

/// Start-of-chain sentinel; pads the front of every sentence.
pub const SOC_ID: TokenId = 0;
/// End-of-chain sentinel; terminates every sentence.
pub const EOC_ID: TokenId = 1;

pub const SOC_TEXT: &str = "<SOC>";
pub const EOC_TEXT: &str = "<EOC>";

/// Returns `true` for the two ids that are never pruned or remapped.
pub fn is_reserved(id: TokenId) -> bool { id == SOC_ID || id == EOC_ID }

/// A single token read from a text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub text:   String,
  /// The token closes a sentence (e.g. a full stop).
  pub is_eoc: bool,
}

impl Token {
  pub fn new(text: impl Into<String>, is_eoc: bool) -> Self {
    Self { text: text.into(), is_eoc }
  }
}
