//! Layered configuration for the `babble` binary.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use babble_core::{GenerateOptions, RegexTokenizerConfig, TrainConfig};
use serde::Deserialize;

/// Everything the binary reads from `babble.toml` and `BABBLE_*` variables.
///
/// Nested keys use a double underscore in the environment, e.g.
/// `BABBLE_GENERATE__TEMPERATURE=0.7`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path: PathBuf,
  pub tokenizer:  RegexTokenizerConfig,
  pub train:      TrainConfig,
  pub generate:   GenerateOptions,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("~/.local/share/babble/babble.db"),
      tokenizer:  RegexTokenizerConfig::default(),
      train:      TrainConfig::default(),
      generate:   GenerateOptions::default(),
    }
  }
}

impl AppConfig {
  /// Read `path` (if it exists) under the environment and expand `~` in the
  /// store path.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("BABBLE")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut cfg: AppConfig = settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = AppConfig::load(Path::new("/definitely/not/here/babble.toml")).unwrap();
    assert_eq!(cfg.train, TrainConfig::default());
    assert_eq!(cfg.generate, GenerateOptions::default());
    assert!(!cfg.store_path.starts_with("~"));
  }

  #[test]
  fn tilde_is_expanded_only_at_the_start() {
    let plain = PathBuf::from("/tmp/a~b.db");
    assert_eq!(expand_tilde(&plain), plain);
  }
}
