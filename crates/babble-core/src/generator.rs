//! [`Generator`]: the engine entry point.
//!
//! Wraps a [`ChainStore`] and a [`Tokenizer`]. Training tokenizes input and
//! hands the stream to the store; generation walks the stored chains one
//! prefix at a time and renders the sampled tokens back into text.
//!
//! Generation holds no shared mutable state, so any number of generations
//! (synchronous or streaming) may run against the same model at once.

use std::{
  collections::VecDeque,
  io::{BufRead, Read, Write},
  sync::Arc,
};

use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
  Error,
  interchange::ModelDocument,
  model::{Model, ModelId, Stats, TrainSummary, VocabularyPruneSummary},
  options::{GenerateOptions, TrainConfig},
  prefix::PrefixWindow,
  sampling,
  store::ChainStore,
  token::{EOC_ID, Token, TokenId},
  tokenizer::Tokenizer,
};

// ─── Generator ───────────────────────────────────────────────────────────────

/// The n-gram engine: a store plus the tokenizer that feeds and renders it.
///
/// Cloning is cheap when the store is (the tokenizer is shared).
pub struct Generator<S, T> {
  store:     S,
  tokenizer: Arc<T>,
}

impl<S: Clone, T> Clone for Generator<S, T> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), tokenizer: Arc::clone(&self.tokenizer) }
  }
}

impl<S: ChainStore, T: Tokenizer> Generator<S, T> {
  pub fn new(store: S, tokenizer: T) -> Self {
    Self { store, tokenizer: Arc::new(tokenizer) }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn tokenizer(&self) -> &T { &self.tokenizer }

  /// Release the underlying store.
  pub async fn close(self) -> Result<(), S::Error> { self.store.close().await }

  // ── Models ────────────────────────────────────────────────────────────

  pub async fn insert_model(
    &self,
    name: &str,
    order: usize,
  ) -> Result<Model, S::Error> {
    self.store.insert_model(name, order).await
  }

  pub async fn model_info(&self, name: &str) -> Result<Model, S::Error> {
    self.store.model_info(name).await
  }

  pub async fn model_infos(&self) -> Result<Vec<Model>, S::Error> {
    self.store.model_infos().await
  }

  pub async fn remove_model(&self, model: &Model) -> Result<(), S::Error> {
    self.store.remove_model(model).await
  }

  // ── Low-level access ──────────────────────────────────────────────────

  /// Increment one link directly. Inefficient for bulk use; prefer
  /// [`Generator::train`].
  pub async fn insert_token(
    &self,
    model: &Model,
    prefix: &[TokenId],
    token: TokenId,
  ) -> Result<(), S::Error> {
    self.store.insert_token(model, prefix, token).await
  }

  pub async fn vocab_str(&self, id: TokenId) -> Result<String, S::Error> {
    self.store.vocab_str(id).await
  }

  pub async fn vocab_int(&self, text: &str) -> Result<TokenId, S::Error> {
    self.store.vocab_int(text).await
  }

  // ── Training ──────────────────────────────────────────────────────────

  /// Train `model` on everything `reader` yields, in one transaction.
  pub async fn train(
    &self,
    model: &Model,
    reader: impl BufRead + Send + 'static,
    config: &TrainConfig,
    cancel: &CancellationToken,
  ) -> Result<TrainSummary, S::Error> {
    let tokens = self.tokenizer.tokens(Box::new(reader));
    self.store.train(model, tokens, config, cancel).await
  }

  // ── Generation ────────────────────────────────────────────────────────

  /// Generate one text from the start of the chain.
  pub async fn generate(
    &self,
    model: &Model,
    options: &GenerateOptions,
    cancel: &CancellationToken,
  ) -> Result<String, S::Error> {
    let stepper = Stepper::new(model, options, VecDeque::new());
    self.run(stepper, cancel).await
  }

  /// Generate a text that opens with `seed`. Every seed token must already
  /// be in the vocabulary; otherwise nothing is generated.
  pub async fn generate_from_string(
    &self,
    model: &Model,
    seed: &str,
    options: &GenerateOptions,
    cancel: &CancellationToken,
  ) -> Result<String, S::Error> {
    let tokens = self.tokenizer.tokenize_str(seed).map_err(Error::from)?;
    let seed = self.resolve_seed(tokens, options.max_length).await?;
    self.run(Stepper::new(model, options, seed), cancel).await
  }

  /// As [`Generator::generate_from_string`], reading the seed from a stream.
  pub async fn generate_from_reader(
    &self,
    model: &Model,
    seed: impl BufRead + Send + 'static,
    options: &GenerateOptions,
    cancel: &CancellationToken,
  ) -> Result<String, S::Error> {
    let tokens = self.read_seed(seed)?;
    let seed = self.resolve_seed(tokens, options.max_length).await?;
    self.run(Stepper::new(model, options, seed), cancel).await
  }

  /// Generate in a background task, one output unit per step.
  ///
  /// The returned stream ends when generation stops, when `cancel` fires, or
  /// when a storage error occurs (the error is logged).
  pub fn generate_stream(
    &self,
    model: &Model,
    options: &GenerateOptions,
    cancel: CancellationToken,
  ) -> GenerationStream {
    self.spawn(Stepper::new(model, options, VecDeque::new()), cancel)
  }

  /// Streaming counterpart of [`Generator::generate_from_string`]. The seed
  /// is validated before the producer starts.
  pub async fn generate_stream_from_string(
    &self,
    model: &Model,
    seed: &str,
    options: &GenerateOptions,
    cancel: CancellationToken,
  ) -> Result<GenerationStream, S::Error> {
    let tokens = self.tokenizer.tokenize_str(seed).map_err(Error::from)?;
    let seed = self.resolve_seed(tokens, options.max_length).await?;
    Ok(self.spawn(Stepper::new(model, options, seed), cancel))
  }

  pub async fn generate_stream_from_reader(
    &self,
    model: &Model,
    seed: impl BufRead + Send + 'static,
    options: &GenerateOptions,
    cancel: CancellationToken,
  ) -> Result<GenerationStream, S::Error> {
    let tokens = self.read_seed(seed)?;
    let seed = self.resolve_seed(tokens, options.max_length).await?;
    Ok(self.spawn(Stepper::new(model, options, seed), cancel))
  }

  fn read_seed(
    &self,
    seed: impl BufRead + Send + 'static,
  ) -> Result<Vec<Token>, S::Error> {
    Ok(
      self
        .tokenizer
        .tokens(Box::new(seed))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(Error::from)?,
    )
  }

  /// Map seed tokens to ids, failing on the first unknown one, then keep at
  /// most `max_length` of them.
  async fn resolve_seed(
    &self,
    tokens: Vec<Token>,
    max_length: usize,
  ) -> Result<VecDeque<(TokenId, String)>, S::Error> {
    let mut seed = VecDeque::with_capacity(tokens.len());
    for token in tokens {
      let id = self.store.vocab_int(&token.text).await?;
      seed.push_back((id, token.text));
    }
    seed.truncate(max_length);
    Ok(seed)
  }

  async fn run(
    &self,
    mut stepper: Stepper,
    cancel: &CancellationToken,
  ) -> Result<String, S::Error> {
    let mut out = String::new();
    loop {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled.into());
      }
      match stepper.step(&self.store, &*self.tokenizer).await? {
        Some(unit) => out.push_str(&unit),
        None => return Ok(out),
      }
    }
  }

  fn spawn(
    &self,
    mut stepper: Stepper,
    cancel: CancellationToken,
  ) -> GenerationStream {
    let (tx, rx) = mpsc::channel(1);
    let store = self.store.clone();
    let tokenizer = Arc::clone(&self.tokenizer);
    let producer_cancel = cancel.clone();

    tokio::spawn(async move {
      let cancel = producer_cancel;
      loop {
        if cancel.is_cancelled() {
          break;
        }

        let unit = tokio::select! {
          biased;
          _ = cancel.cancelled() => break,
          unit = stepper.step(&store, &*tokenizer) => unit,
        };

        let unit = match unit {
          // A suppressed EOC renders nothing; no unit is sent for it.
          Ok(Some(unit)) if unit.is_empty() => continue,
          Ok(Some(unit)) => unit,
          Ok(None) => break,
          Err(e) => {
            tracing::warn!(error = %e, "streaming generation stopped");
            break;
          }
        };

        tokio::select! {
          biased;
          _ = cancel.cancelled() => break,
          sent = tx.send(unit) => {
            if sent.is_err() {
              // Consumer went away.
              break;
            }
          }
        }
      }
    });

    GenerationStream { rx, cancel }
  }

  // ── Maintenance ───────────────────────────────────────────────────────

  pub async fn prune_model(
    &self,
    model: &Model,
    min_freq: u64,
  ) -> Result<u64, S::Error> {
    self.store.prune_model(model, min_freq).await
  }

  pub async fn vocabulary_prune(
    &self,
    min_freq: u64,
    cancel: &CancellationToken,
  ) -> Result<VocabularyPruneSummary, S::Error> {
    self.store.vocabulary_prune(min_freq, cancel).await
  }

  pub async fn stats(&self) -> Result<Stats, S::Error> { self.store.stats().await }

  // ── Interchange ───────────────────────────────────────────────────────

  /// Write `model` as a JSON [`ModelDocument`].
  pub async fn export_model(
    &self,
    model: &Model,
    writer: impl Write,
  ) -> Result<(), S::Error> {
    let document = self.store.export_model(model).await?;
    document.write_to(writer)?;
    Ok(())
  }

  /// Read a JSON [`ModelDocument`] and merge it into the store.
  pub async fn import_model(
    &self,
    reader: impl Read,
    cancel: &CancellationToken,
  ) -> Result<Model, S::Error> {
    let document = ModelDocument::read_from(reader)?;
    self.store.import_model(document, cancel).await
  }
}

// ─── Streaming consumer ──────────────────────────────────────────────────────

/// Receiving end of a streaming generation.
///
/// Yields output units in order; `None` means the producer has finished or
/// was cancelled.
pub struct GenerationStream {
  rx:     mpsc::Receiver<String>,
  cancel: CancellationToken,
}

impl GenerationStream {
  pub async fn next(&mut self) -> Option<String> {
    let unit = if self.cancel.is_cancelled() {
      None
    } else {
      tokio::select! {
        biased;
        _ = self.cancel.cancelled() => None,
        unit = self.rx.recv() => unit,
      }
    };

    // A unit that raced with cancellation is dropped, not delivered.
    if self.cancel.is_cancelled() {
      self.rx.close();
      return None;
    }
    unit
  }

  /// Drain the stream into one string.
  pub async fn collect_string(mut self) -> String {
    let mut out = String::new();
    while let Some(unit) = self.next().await {
      out.push_str(&unit);
    }
    out
  }
}

// ─── Stepping state machine ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Seeding,
  Stepping,
  Done,
}

/// One generation's progress through a chain.
struct Stepper {
  model_id:          ModelId,
  window:            PrefixWindow,
  seed:              VecDeque<(TokenId, String)>,
  phase:             Phase,
  /// Last rendered token text, used for separator and EOC rules.
  prev:              Option<String>,
  emitted:           usize,
  max_length:        usize,
  early_termination: bool,
  temperature:       f64,
  top_k:             usize,
  rng:               StdRng,
}

impl Stepper {
  fn new(
    model: &Model,
    options: &GenerateOptions,
    seed: VecDeque<(TokenId, String)>,
  ) -> Self {
    let rng = match options.rng_seed {
      Some(s) => StdRng::seed_from_u64(s),
      None => StdRng::from_os_rng(),
    };
    Self {
      model_id: model.model_id,
      window: PrefixWindow::new(model.order),
      seed,
      phase: Phase::Seeding,
      prev: None,
      emitted: 0,
      max_length: options.max_length,
      early_termination: options.early_termination,
      temperature: options.temperature,
      top_k: options.top_k,
      rng,
    }
  }

  /// Advance one step. Returns the text to append, or `None` once done.
  async fn step<S: ChainStore, T: Tokenizer>(
    &mut self,
    store: &S,
    tokenizer: &T,
  ) -> Result<Option<String>, S::Error> {
    if self.phase == Phase::Done {
      return Ok(None);
    }

    if self.emitted >= self.max_length {
      return Ok(Some(self.finish(tokenizer)));
    }

    if self.phase == Phase::Seeding {
      match self.seed.pop_front() {
        Some((id, text)) => return Ok(Some(self.emit(id, text, tokenizer))),
        None => self.phase = Phase::Stepping,
      }
    }

    let candidates = store.candidates(self.model_id, &self.window.key()).await?;
    let choice = sampling::select(
      &candidates,
      self.temperature,
      self.top_k,
      &mut self.rng,
    );

    match choice {
      // Dead end: the chain terminates implicitly.
      None => Ok(Some(self.finish(tokenizer))),
      Some(c) if c.token_id == EOC_ID => {
        self.emitted += 1;
        let out = self.render_eoc(tokenizer);
        if self.early_termination {
          self.phase = Phase::Done;
        } else {
          self.window.reset();
        }
        Ok(Some(out))
      }
      Some(c) => {
        let (id, text) = (c.token_id, c.text.clone());
        Ok(Some(self.emit(id, text, tokenizer)))
      }
    }
  }

  fn emit<T: Tokenizer>(&mut self, id: TokenId, text: String, tokenizer: &T) -> String {
    self.emitted += 1;
    self.window.push(id);
    let mut out = tokenizer.separator(self.prev.as_deref(), &text).to_owned();
    out.push_str(&text);
    self.prev = Some(text);
    out
  }

  fn render_eoc<T: Tokenizer>(&mut self, tokenizer: &T) -> String {
    let marker = tokenizer.eoc(self.prev.as_deref()).to_owned();
    if !marker.is_empty() {
      self.prev = Some(marker.clone());
    }
    marker
  }

  fn finish<T: Tokenizer>(&mut self, tokenizer: &T) -> String {
    self.phase = Phase::Done;
    self.render_eoc(tokenizer)
  }
}
