//! The [`Tokenizer`] trait and its default regex-driven implementation.
//!
//! A tokenizer turns a byte stream into a lazy, forward-only sequence of
//! [`Token`]s and knows how to glue tokens back together for output: which
//! separator goes before a token and whether an end-of-chain marker should
//! be rendered after one.

use std::{
  collections::VecDeque,
  io::{self, BufRead, Cursor},
};

use regex::Regex;
use serde::Deserialize;

use crate::{Result, token::Token};

/// A lazy token sequence. `None` marks end of stream; read errors are
/// yielded as `Some(Err(..))` and end the sequence.
pub type Tokens = Box<dyn Iterator<Item = io::Result<Token>> + Send>;

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait Tokenizer: Send + Sync + 'static {
  /// Open a token stream over `reader`. Restarting means opening a new one.
  fn tokens(&self, reader: Box<dyn BufRead + Send>) -> Tokens;

  /// Separator to emit before `next`, given the previously emitted token.
  fn separator(&self, prev: Option<&str>, next: &str) -> &str;

  /// End-of-chain marker to emit after `prev`; empty when suppressed.
  fn eoc(&self, prev: Option<&str>) -> &str;

  /// Tokenize an in-memory string eagerly.
  fn tokenize_str(&self, text: &str) -> io::Result<Vec<Token>> {
    self
      .tokens(Box::new(Cursor::new(text.as_bytes().to_vec())))
      .collect()
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Patterns driving [`RegexTokenizer`]. Every field has a default, so a
/// partial config section only overrides what it names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegexTokenizerConfig {
  /// Selects token runs out of each line.
  pub split:           String,
  /// Classifies a run as end-of-chain.
  pub eoc:             String,
  /// Tokens matching this get no separator in front of them.
  pub no_space_before: String,
  /// No EOC marker is rendered after tokens matching this.
  pub no_eoc_after:    String,
  pub separator:       String,
  pub eoc_text:        String,
}

impl Default for RegexTokenizerConfig {
  fn default() -> Self {
    Self {
      split:           r"\w+(?:['’]\w+)*|[^\w\s]+".to_owned(),
      eoc:             r"^[.!?]+$".to_owned(),
      no_space_before: r"^[.,;:!?%)\]}…]".to_owned(),
      no_eoc_after:    r"[.!?…]$".to_owned(),
      separator:       " ".to_owned(),
      eoc_text:        ".".to_owned(),
    }
  }
}

// ─── Regex tokenizer ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegexTokenizer {
  split:           Regex,
  eoc:             Regex,
  no_space_before: Regex,
  no_eoc_after:    Regex,
  separator:       String,
  eoc_text:        String,
}

impl RegexTokenizer {
  pub fn new(config: RegexTokenizerConfig) -> Result<Self> {
    Ok(Self {
      split:           Regex::new(&config.split)?,
      eoc:             Regex::new(&config.eoc)?,
      no_space_before: Regex::new(&config.no_space_before)?,
      no_eoc_after:    Regex::new(&config.no_eoc_after)?,
      separator:       config.separator,
      eoc_text:        config.eoc_text,
    })
  }
}

impl Tokenizer for RegexTokenizer {
  fn tokens(&self, reader: Box<dyn BufRead + Send>) -> Tokens {
    Box::new(RegexTokens {
      reader,
      split: self.split.clone(),
      eoc: self.eoc.clone(),
      pending: VecDeque::new(),
      line: Vec::new(),
      done: false,
    })
  }

  fn separator(&self, prev: Option<&str>, next: &str) -> &str {
    if prev.is_none() || self.no_space_before.is_match(next) {
      ""
    } else {
      &self.separator
    }
  }

  fn eoc(&self, prev: Option<&str>) -> &str {
    match prev {
      Some(p) if !self.no_eoc_after.is_match(p) => &self.eoc_text,
      _ => "",
    }
  }
}

/// Reads one line at a time and drains its matches before reading more.
struct RegexTokens {
  reader:  Box<dyn BufRead + Send>,
  split:   Regex,
  eoc:     Regex,
  pending: VecDeque<Token>,
  line:    Vec<u8>,
  done:    bool,
}

impl Iterator for RegexTokens {
  type Item = io::Result<Token>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(token) = self.pending.pop_front() {
        return Some(Ok(token));
      }
      if self.done {
        return None;
      }

      self.line.clear();
      match self.reader.read_until(b'\n', &mut self.line) {
        Ok(0) => self.done = true,
        Ok(_) => {
          let text = String::from_utf8_lossy(&self.line);
          for m in self.split.find_iter(&text) {
            let run = m.as_str();
            self.pending.push_back(Token::new(run, self.eoc.is_match(run)));
          }
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
        Err(e) => {
          self.done = true;
          return Some(Err(e));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tokenizer() -> RegexTokenizer {
    RegexTokenizer::new(RegexTokenizerConfig::default()).unwrap()
  }

  fn texts(tokens: &[Token]) -> Vec<&str> {
    tokens.iter().map(|t| t.text.as_str()).collect()
  }

  #[test]
  fn splits_words_and_punctuation() {
    let tokens = tokenizer()
      .tokenize_str("Hello, world! It's fine...")
      .unwrap();
    assert_eq!(
      texts(&tokens),
      vec!["Hello", ",", "world", "!", "It's", "fine", "..."]
    );
  }

  #[test]
  fn flags_sentence_terminators() {
    let tokens = tokenizer().tokenize_str("a b c. d?").unwrap();
    let flags: Vec<bool> = tokens.iter().map(|t| t.is_eoc).collect();
    assert_eq!(flags, vec![false, false, false, true, false, true]);
  }

  #[test]
  fn reads_across_lines_lazily() {
    let reader = Cursor::new(b"one two\nthree\n\nfour".to_vec());
    let tokens: Vec<Token> = tokenizer()
      .tokens(Box::new(reader))
      .collect::<io::Result<_>>()
      .unwrap();
    assert_eq!(texts(&tokens), vec!["one", "two", "three", "four"]);
  }

  #[test]
  fn empty_input_is_end_of_stream() {
    let mut tokens = tokenizer().tokens(Box::new(Cursor::new(Vec::new())));
    assert!(tokens.next().is_none());
    assert!(tokens.next().is_none());
  }

  #[test]
  fn read_errors_propagate() {
    struct Broken;
    impl io::Read for Broken {
      fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("disk on fire"))
      }
    }

    let mut tokens =
      tokenizer().tokens(Box::new(io::BufReader::new(Broken)));
    assert!(matches!(tokens.next(), Some(Err(_))));
    assert!(tokens.next().is_none());
  }

  #[test]
  fn separator_rules() {
    let t = tokenizer();
    assert_eq!(t.separator(None, "word"), "");
    assert_eq!(t.separator(Some("a"), "word"), " ");
    assert_eq!(t.separator(Some("a"), ","), "");
    assert_eq!(t.separator(Some("a"), "."), "");
  }

  #[test]
  fn eoc_rules() {
    let t = tokenizer();
    assert_eq!(t.eoc(None), "");
    assert_eq!(t.eoc(Some("word")), ".");
    assert_eq!(t.eoc(Some("!")), "");
    assert_eq!(t.eoc(Some("...")), "");
  }

  #[test]
  fn rejects_invalid_pattern() {
    let config = RegexTokenizerConfig {
      split: "(".to_owned(),
      ..Default::default()
    };
    assert!(RegexTokenizer::new(config).is_err());
  }
}
