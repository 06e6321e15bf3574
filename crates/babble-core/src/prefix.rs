//! Canonical prefix encoding and the sliding context window.
//!
//! A prefix is exactly `order` token ids. It is stored as its decimal ids
//! joined by a single ASCII space, so `[0, 0]` encodes to `"0 0"`. The
//! encoding is order-preserving and cheap to parse back into ids.

use std::collections::VecDeque;

use crate::{
  Error, Result,
  token::{EOC_ID, SOC_ID, TokenId},
};

/// Encode a window of token ids into its canonical prefix text.
pub fn encode_prefix(ids: &[TokenId]) -> String {
  let mut out = String::with_capacity(ids.len() * 4);
  for (i, id) in ids.iter().enumerate() {
    if i > 0 {
      out.push(' ');
    }
    out.push_str(&id.to_string());
  }
  out
}

/// Parse canonical prefix text back into its component ids.
pub fn decode_prefix(text: &str) -> Result<Vec<TokenId>> {
  if text.is_empty() {
    return Err(Error::MalformedPrefix(text.to_owned()));
  }
  text
    .split(' ')
    .map(|part| {
      part
        .parse::<TokenId>()
        .map_err(|_| Error::MalformedPrefix(text.to_owned()))
    })
    .collect()
}

/// The all-SOC prefix text that every chain starts from.
pub fn start_prefix(order: usize) -> String {
  encode_prefix(&vec![SOC_ID; order])
}

/// Pad a sentence for training: `order` SOC ids in front, one EOC id behind.
///
/// Sliding a window of `order + 1` over the result yields every
/// `(prefix, next)` transition of the sentence; see [`transitions`].
pub fn pad_sentence(sentence: &[TokenId], order: usize) -> Vec<TokenId> {
  let mut padded = Vec::with_capacity(order + sentence.len() + 1);
  padded.extend(std::iter::repeat_n(SOC_ID, order));
  padded.extend_from_slice(sentence);
  padded.push(EOC_ID);
  padded
}

/// Split each window of a padded sentence into its prefix and next token.
pub fn transitions(
  padded: &[TokenId],
  order: usize,
) -> impl Iterator<Item = (&[TokenId], TokenId)> {
  padded
    .windows(order + 1)
    .map(move |w| (&w[..order], w[order]))
}

// ─── Sliding window ──────────────────────────────────────────────────────────

/// The `order`-wide context used while stepping through a chain.
#[derive(Debug, Clone)]
pub struct PrefixWindow {
  ids: VecDeque<TokenId>,
}

impl PrefixWindow {
  /// A window of `order` SOC ids.
  pub fn new(order: usize) -> Self {
    Self { ids: std::iter::repeat_n(SOC_ID, order).collect() }
  }

  /// Drop the oldest id and append `id`.
  pub fn push(&mut self, id: TokenId) {
    if self.ids.is_empty() {
      return;
    }
    self.ids.pop_front();
    self.ids.push_back(id);
  }

  /// Refill the window with SOC ids, as at the start of a chain.
  pub fn reset(&mut self) {
    for id in self.ids.iter_mut() {
      *id = SOC_ID;
    }
  }

  pub fn key(&self) -> String {
    let (a, b) = self.ids.as_slices();
    if b.is_empty() {
      encode_prefix(a)
    } else {
      encode_prefix(&[a, b].concat())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_and_decode_prefix() {
    assert_eq!(encode_prefix(&[0, 0]), "0 0");
    assert_eq!(encode_prefix(&[12, 7, 1]), "12 7 1");
    assert_eq!(decode_prefix("12 7 1").unwrap(), vec![12, 7, 1]);
  }

  #[test]
  fn decode_rejects_garbage() {
    assert!(matches!(decode_prefix(""), Err(Error::MalformedPrefix(_))));
    assert!(matches!(decode_prefix("1  2"), Err(Error::MalformedPrefix(_))));
    assert!(matches!(decode_prefix("1 x"), Err(Error::MalformedPrefix(_))));
  }

  #[test]
  fn start_prefix_is_all_soc() {
    assert_eq!(start_prefix(1), "0");
    assert_eq!(start_prefix(3), "0 0 0");
  }

  #[test]
  fn sentence_transitions_cover_padding() {
    // "a b ." with ids 5 6 7, order 2.
    let padded = pad_sentence(&[5, 6, 7], 2);
    assert_eq!(padded, vec![0, 0, 5, 6, 7, 1]);

    let pairs: Vec<_> = transitions(&padded, 2)
      .map(|(p, n)| (p.to_vec(), n))
      .collect();
    assert_eq!(
      pairs,
      vec![
        (vec![0, 0], 5),
        (vec![0, 5], 6),
        (vec![5, 6], 7),
        (vec![6, 7], 1),
      ]
    );
  }

  #[test]
  fn window_slides_and_resets() {
    let mut w = PrefixWindow::new(2);
    assert_eq!(w.key(), "0 0");
    w.push(4);
    w.push(9);
    assert_eq!(w.key(), "4 9");
    w.push(3);
    assert_eq!(w.key(), "9 3");
    w.reset();
    assert_eq!(w.key(), "0 0");
  }
}
