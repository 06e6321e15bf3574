//! Training and generation settings.

use serde::Deserialize;

// ─── Generation ──────────────────────────────────────────────────────────────

/// How a single generation call samples and when it stops.
///
/// Every field is independent; start from [`GenerateOptions::default`] and
/// override with the `with_*` setters or a struct literal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
  /// Upper bound on emitted steps (seed tokens, sampled tokens and soft
  /// chain restarts all count). Defaults to 100.
  pub max_length:        usize,
  /// Stop at the first end-of-chain instead of restarting the chain.
  /// Defaults to `true`.
  pub early_termination: bool,
  /// `<= 0` picks the most frequent candidate; `1.0` samples proportionally
  /// to frequency; other values reshape the distribution. Defaults to 1.0.
  pub temperature:       f64,
  /// Keep only the `k` most frequent candidates. `0` disables the filter.
  pub top_k:             usize,
  /// Seed for the sampler; `None` seeds from the operating system.
  pub rng_seed:          Option<u64>,
}

impl Default for GenerateOptions {
  fn default() -> Self {
    Self {
      max_length:        100,
      early_termination: true,
      temperature:       1.0,
      top_k:             0,
      rng_seed:          None,
    }
  }
}

impl GenerateOptions {
  pub fn with_max_length(mut self, max_length: usize) -> Self {
    self.max_length = max_length;
    self
  }

  pub fn with_early_termination(mut self, early_termination: bool) -> Self {
    self.early_termination = early_termination;
    self
  }

  pub fn with_temperature(mut self, temperature: f64) -> Self {
    self.temperature = temperature;
    self
  }

  pub fn with_top_k(mut self, top_k: usize) -> Self {
    self.top_k = top_k;
    self
  }

  pub fn with_rng_seed(mut self, seed: u64) -> Self {
    self.rng_seed = Some(seed);
    self
  }
}

// ─── Training ────────────────────────────────────────────────────────────────

/// Bounds on the memory a single training call holds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
  /// Transitions accumulated before a flush to storage.
  pub batch_size:       usize,
  /// A sentence is force-closed once it reaches this many tokens.
  pub max_sentence_len: usize,
}

impl Default for TrainConfig {
  fn default() -> Self {
    Self { batch_size: 1000, max_sentence_len: 4096 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let o = GenerateOptions::default();
    assert_eq!(o.max_length, 100);
    assert!(o.early_termination);
    assert_eq!(o.temperature, 1.0);
    assert_eq!(o.top_k, 0);
    assert_eq!(o.rng_seed, None);
  }

  #[test]
  fn setters_compose() {
    let o = GenerateOptions::default()
      .with_temperature(0.0)
      .with_top_k(3)
      .with_max_length(7)
      .with_early_termination(false)
      .with_rng_seed(42);
    assert_eq!(o.temperature, 0.0);
    assert_eq!(o.top_k, 3);
    assert_eq!(o.max_length, 7);
    assert!(!o.early_termination);
    assert_eq!(o.rng_seed, Some(42));
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let o: GenerateOptions =
      serde_json::from_str(r#"{ "temperature": 0.5 }"#).unwrap();
    assert_eq!(o.temperature, 0.5);
    assert_eq!(o.max_length, 100);

    let t: TrainConfig = serde_json::from_str(r#"{ "batch_size": 10 }"#).unwrap();
    assert_eq!(t, TrainConfig { batch_size: 10, max_sentence_len: 4096 });
  }
}
