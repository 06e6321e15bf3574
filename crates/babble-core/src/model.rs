//! Model metadata and summary records returned by the engine.

use serde::{Deserialize, Serialize};

pub type ModelId = i64;
pub type PrefixId = i64;

/// A named chain model. Its `order` is fixed for the model's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
  pub model_id: ModelId,
  pub name:     String,
  pub order:    usize,
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
  pub model:           Model,
  /// Distinct `(prefix, next)` links.
  pub links:           u64,
  /// Sum of all link frequencies.
  pub total_frequency: u64,
  /// Links leaving the all-SOC prefix, i.e. distinct sentence openings.
  pub starts:          u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
  pub vocabulary_size: u64,
  pub prefix_count:    u64,
  pub models:          Vec<ModelStats>,
}

// ─── Operation summaries ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainSummary {
  pub tokens:      u64,
  pub sentences:   u64,
  pub transitions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyPruneSummary {
  pub tokens:   u64,
  pub prefixes: u64,
  pub links:    u64,
}
