//! `babble`: train and sample n-gram text models from the command line.
//!
//! Reads `babble.toml` (or the path given with `--config`) under
//! `BABBLE_*` environment overrides, then opens the SQLite store named by
//! `store_path`.
//!
//! ```
//! babble model add prose --order 2
//! babble train prose corpus.txt
//! babble generate prose --seed "The" --temperature 0.8
//! ```
//!
//! Ctrl-C cancels a running training, generation, prune or import.

mod settings;

use std::{
  fs::File,
  io::{self, BufReader, Read, Write},
  path::PathBuf,
};

use anyhow::Context as _;
use babble_core::{GenerateOptions, Generator, RegexTokenizer};
use babble_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::AppConfig;

type Engine = Generator<SqliteStore, RegexTokenizer>;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Persistent n-gram text generator")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "babble.toml")]
  config: PathBuf,

  /// Override the store path from the configuration.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the store and its schema.
  Init,

  /// Manage models.
  #[command(subcommand)]
  Model(ModelCommand),

  /// Train a model on files (or stdin when none are given).
  Train {
    model: String,
    files: Vec<PathBuf>,
  },

  /// Generate text from a model.
  Generate {
    model: String,

    /// Text the output starts with. Every token must be in the vocabulary.
    #[arg(long)]
    seed: Option<String>,

    /// Print output as it is produced.
    #[arg(long)]
    stream: bool,

    #[arg(long)]
    max_length: Option<usize>,

    #[arg(long)]
    temperature: Option<f64>,

    #[arg(long)]
    top_k: Option<usize>,

    /// Restart the chain at end-of-chain instead of stopping.
    #[arg(long)]
    no_early_termination: bool,

    #[arg(long)]
    rng_seed: Option<u64>,
  },

  /// Delete one model's links at or below a frequency.
  Prune { model: String, min_freq: u64 },

  /// Delete tokens rarer than a frequency across all models.
  VocabPrune { min_freq: u64 },

  /// Print store statistics as JSON.
  Stats,

  /// Write a model as a JSON document.
  Export {
    model: String,
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Merge a JSON model document into the store.
  Import {
    /// Input file; stdin when omitted.
    input: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum ModelCommand {
  /// Create a model.
  Add {
    name: String,
    #[arg(short, long, default_value_t = 2)]
    order: usize,
  },
  /// List models.
  List,
  /// Delete a model and all of its links.
  Rm { name: String },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so generated text on stdout stays clean.
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = AppConfig::load(&cli.config)?;
  if let Some(store) = &cli.store {
    cfg.store_path = settings::expand_tilde(store);
  }

  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let tokenizer =
    RegexTokenizer::new(cfg.tokenizer.clone()).context("invalid tokenizer patterns")?;
  let engine = Generator::new(store, tokenizer);

  let cancel = CancellationToken::new();
  tokio::spawn({
    let cancel = cancel.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupted, cancelling");
        cancel.cancel();
      }
    }
  });

  let result = run(&engine, &cfg, cli.command, &cancel).await;
  engine.close().await.context("failed to close store")?;
  result
}

async fn run(
  engine: &Engine,
  cfg: &AppConfig,
  command: Command,
  cancel: &CancellationToken,
) -> anyhow::Result<()> {
  match command {
    Command::Init => {
      tracing::info!(path = ?cfg.store_path, "store ready");
    }

    Command::Model(ModelCommand::Add { name, order }) => {
      let model = engine.insert_model(&name, order).await?;
      println!("{}\t{}", model.name, model.order);
    }
    Command::Model(ModelCommand::List) => {
      for model in engine.model_infos().await? {
        println!("{}\t{}", model.name, model.order);
      }
    }
    Command::Model(ModelCommand::Rm { name }) => {
      let model = engine.model_info(&name).await?;
      engine.remove_model(&model).await?;
    }

    Command::Train { model, files } => {
      let model = engine.model_info(&model).await?;
      if files.is_empty() {
        let reader = BufReader::new(io::stdin());
        engine.train(&model, reader, &cfg.train, cancel).await?;
      }
      for path in files {
        let file = File::open(&path)
          .with_context(|| format!("failed to open {}", path.display()))?;
        let summary = engine
          .train(&model, BufReader::new(file), &cfg.train, cancel)
          .await
          .with_context(|| format!("training on {} failed", path.display()))?;
        tracing::info!(file = %path.display(), sentences = summary.sentences, "file trained");
      }
    }

    Command::Generate {
      model,
      seed,
      stream,
      max_length,
      temperature,
      top_k,
      no_early_termination,
      rng_seed,
    } => {
      let model = engine.model_info(&model).await?;
      let mut options: GenerateOptions = cfg.generate.clone();
      if let Some(n) = max_length {
        options.max_length = n;
      }
      if let Some(t) = temperature {
        options.temperature = t;
      }
      if let Some(k) = top_k {
        options.top_k = k;
      }
      if no_early_termination {
        options.early_termination = false;
      }
      if rng_seed.is_some() {
        options.rng_seed = rng_seed;
      }

      if stream {
        let mut units = match &seed {
          Some(seed) => {
            engine
              .generate_stream_from_string(&model, seed, &options, cancel.clone())
              .await?
          }
          None => engine.generate_stream(&model, &options, cancel.clone()),
        };
        let mut out = io::stdout();
        while let Some(unit) = units.next().await {
          out.write_all(unit.as_bytes())?;
          out.flush()?;
        }
        writeln!(out)?;
      } else {
        let text = match &seed {
          Some(seed) => engine.generate_from_string(&model, seed, &options, cancel).await?,
          None => engine.generate(&model, &options, cancel).await?,
        };
        println!("{text}");
      }
    }

    Command::Prune { model, min_freq } => {
      let model = engine.model_info(&model).await?;
      let deleted = engine.prune_model(&model, min_freq).await?;
      println!("{deleted}");
    }

    Command::VocabPrune { min_freq } => {
      let summary = engine.vocabulary_prune(min_freq, cancel).await?;
      println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Command::Stats => {
      let stats = engine.stats().await?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Command::Export { model, output } => {
      let model = engine.model_info(&model).await?;
      match output {
        Some(path) => {
          let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
          export_to(engine, &model, io::BufWriter::new(file))
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => export_to(engine, &model, io::stdout()).await?,
      }
    }

    Command::Import { input } => {
      let reader: Box<dyn Read> = match input {
        Some(path) => Box::new(BufReader::new(
          File::open(&path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin()),
      };
      let model = engine.import_model(reader, cancel).await?;
      println!("{}\t{}", model.name, model.order);
    }
  }
  Ok(())
}

/// Export `model` into `writer` and flush it, so a failed final write is
/// reported instead of being lost on drop.
async fn export_to(
  engine: &Engine,
  model: &babble_core::model::Model,
  mut writer: impl Write,
) -> anyhow::Result<()> {
  engine.export_model(model, &mut writer).await?;
  writer.flush().context("failed to flush export")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  /// Accepts writes, fails on flush.
  struct FullDisk(Vec<u8>);

  impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Err(io::Error::other("no space left")) }
  }

  async fn engine() -> Engine {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let tokenizer = RegexTokenizer::new(Default::default()).unwrap();
    Generator::new(store, tokenizer)
  }

  #[tokio::test]
  async fn export_reports_flush_failure() {
    let engine = engine().await;
    let model = engine.insert_model("m", 1).await.unwrap();

    let err = export_to(&engine, &model, FullDisk(Vec::new()))
      .await
      .unwrap_err();
    assert!(format!("{err:#}").contains("no space left"));

    let mut ok = Vec::new();
    export_to(&engine, &model, &mut ok).await.unwrap();
    assert!(!ok.is_empty());
  }

  #[test]
  fn cli_definition_is_valid() { Cli::command().debug_assert(); }

  #[test]
  fn generate_flags_parse() {
    let cli = Cli::try_parse_from([
      "babble",
      "generate",
      "prose",
      "--seed",
      "The",
      "--temperature",
      "0",
      "--no-early-termination",
    ])
    .unwrap();
    match cli.command {
      Command::Generate { model, seed, temperature, no_early_termination, .. } => {
        assert_eq!(model, "prose");
        assert_eq!(seed.as_deref(), Some("The"));
        assert_eq!(temperature, Some(0.0));
        assert!(no_early_termination);
      }
      _ => panic!("expected generate"),
    }
  }
}
