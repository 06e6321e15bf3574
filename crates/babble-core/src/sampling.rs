//! Next-token selection over a prefix's candidate set.
//!
//! Selection is a pure function of the candidates, the sampling settings and
//! the random source, which keeps it independent of storage and easy to test
//! with a seeded generator.

use rand::Rng;

use crate::token::TokenId;

/// One observed continuation of a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
  pub token_id:  TokenId,
  pub text:      String,
  pub frequency: u64,
}

/// Pick the next token from `candidates`; `None` only if there are none.
///
/// 1. With `0 < top_k < len`, only the `top_k` most frequent candidates stay.
/// 2. `temperature <= 0` takes the most frequent candidate. Equal
///    frequencies resolve to the lowest token id.
/// 3. `temperature == 1` draws proportionally to frequency.
/// 4. Anything else draws proportionally to `freq^(1/temperature)`, computed
///    in log space and shifted by the maximum for numerical stability.
pub fn select<'a, R: Rng + ?Sized>(
  candidates:  &'a [Candidate],
  temperature: f64,
  top_k:       usize,
  rng:         &mut R,
) -> Option<&'a Candidate> {
  if candidates.is_empty() {
    return None;
  }

  let mut pool: Vec<&Candidate> = candidates.iter().collect();
  if top_k > 0 && top_k < pool.len() {
    pool.sort_by(|a, b| {
      b.frequency
        .cmp(&a.frequency)
        .then(a.token_id.cmp(&b.token_id))
    });
    pool.truncate(top_k);
  }

  if temperature <= 0.0 {
    return argmax(&pool);
  }
  if temperature == 1.0 {
    return weighted_by_frequency(&pool, rng);
  }
  weighted_by_temperature(&pool, temperature, rng)
}

fn argmax<'a>(pool: &[&'a Candidate]) -> Option<&'a Candidate> {
  pool.iter().copied().reduce(|best, c| {
    if c.frequency > best.frequency
      || (c.frequency == best.frequency && c.token_id < best.token_id)
    {
      c
    } else {
      best
    }
  })
}

fn weighted_by_frequency<'a, R: Rng + ?Sized>(
  pool: &[&'a Candidate],
  rng:  &mut R,
) -> Option<&'a Candidate> {
  // Summed wide: a handful of saturated counts overflow u64.
  let total: u128 = pool.iter().map(|c| u128::from(c.frequency)).sum();
  if total == 0 {
    return argmax(pool);
  }

  let mut r = rng.random_range(0..total);
  for &c in pool {
    let freq = u128::from(c.frequency);
    if r < freq {
      return Some(c);
    }
    r -= freq;
  }
  pool.last().copied()
}

fn weighted_by_temperature<'a, R: Rng + ?Sized>(
  pool:        &[&'a Candidate],
  temperature: f64,
  rng:         &mut R,
) -> Option<&'a Candidate> {
  let log_weights: Vec<f64> = pool
    .iter()
    .map(|c| (c.frequency.max(1) as f64).ln() / temperature)
    .collect();
  let max = log_weights
    .iter()
    .copied()
    .fold(f64::NEG_INFINITY, f64::max);

  let weights: Vec<f64> = log_weights.iter().map(|w| (w - max).exp()).collect();
  let total: f64 = weights.iter().sum();
  if !total.is_finite() || total <= 0.0 {
    return argmax(pool);
  }

  let mut r = rng.random::<f64>() * total;
  for (&c, w) in pool.iter().zip(&weights) {
    if r < *w {
      return Some(c);
    }
    r -= w;
  }
  pool.last().copied()
}

#[cfg(test)]
mod tests {
  use rand::{SeedableRng, rngs::StdRng};

  use super::*;

  fn cand(token_id: TokenId, frequency: u64) -> Candidate {
    Candidate { token_id, text: format!("t{token_id}"), frequency }
  }

  fn rng() -> StdRng { StdRng::seed_from_u64(7) }

  #[test]
  fn empty_has_no_choice() {
    assert!(select(&[], 1.0, 0, &mut rng()).is_none());
  }

  #[test]
  fn zero_temperature_is_argmax() {
    let cs = [cand(4, 2), cand(5, 9), cand(6, 3)];
    for _ in 0..20 {
      assert_eq!(select(&cs, 0.0, 0, &mut rng()).unwrap().token_id, 5);
    }
  }

  #[test]
  fn argmax_tie_prefers_lowest_id() {
    let cs = [cand(9, 5), cand(3, 5), cand(7, 5)];
    assert_eq!(select(&cs, 0.0, 0, &mut rng()).unwrap().token_id, 3);
    assert_eq!(select(&cs, -1.0, 0, &mut rng()).unwrap().token_id, 3);
  }

  #[test]
  fn top_k_restricts_the_pool() {
    let cs = [cand(2, 1), cand(3, 50), cand(4, 40), cand(5, 1)];
    let mut r = rng();
    for _ in 0..200 {
      let id = select(&cs, 1.0, 2, &mut r).unwrap().token_id;
      assert!(id == 3 || id == 4, "picked {id}");
    }
  }

  #[test]
  fn top_k_of_one_is_deterministic() {
    let cs = [cand(2, 3), cand(3, 8), cand(4, 8)];
    let mut r = rng();
    for _ in 0..50 {
      assert_eq!(select(&cs, 2.0, 1, &mut r).unwrap().token_id, 3);
    }
  }

  #[test]
  fn frequency_weighting_follows_counts() {
    let cs = [cand(2, 1), cand(3, 99)];
    let mut r = rng();
    let heavy = (0..1000)
      .filter(|_| select(&cs, 1.0, 0, &mut r).unwrap().token_id == 3)
      .count();
    assert!(heavy > 900, "heavy picked {heavy} times");
  }

  #[test]
  fn low_temperature_sharpens() {
    let cs = [cand(2, 2), cand(3, 3)];
    let mut r = rng();
    let picks = (0..1000)
      .filter(|_| select(&cs, 0.05, 0, &mut r).unwrap().token_id == 3)
      .count();
    assert!(picks > 990, "picked {picks} times");
  }

  #[test]
  fn high_temperature_flattens() {
    let cs = [cand(2, 1), cand(3, 1000)];
    let mut r = rng();
    let light = (0..2000)
      .filter(|_| select(&cs, 100.0, 0, &mut r).unwrap().token_id == 2)
      .count();
    // freq^(1/100) puts the light candidate near 48%.
    assert!(light > 700, "light picked {light} times");
  }

  #[test]
  fn saturated_frequencies_do_not_overflow() {
    let cs = [cand(2, u64::MAX), cand(3, u64::MAX), cand(4, u64::MAX)];
    let mut r = rng();
    for _ in 0..100 {
      let id = select(&cs, 1.0, 0, &mut r).unwrap().token_id;
      assert!((2..=4).contains(&id));
    }
  }

  #[test]
  fn huge_frequencies_stay_finite() {
    let cs = [cand(2, u64::MAX / 2), cand(3, u64::MAX / 3)];
    assert!(select(&cs, 0.01, 0, &mut rng()).is_some());
  }
}
