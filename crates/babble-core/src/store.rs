//! The `ChainStore` trait: the storage seam of the engine.
//!
//! The trait is implemented by storage backends (e.g. `babble-store-sqlite`).
//! [`Generator`](crate::Generator) depends on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{
  interchange::ModelDocument,
  model::{Model, ModelId, Stats, TrainSummary, VocabularyPruneSummary},
  options::TrainConfig,
  sampling::Candidate,
  token::TokenId,
  tokenizer::Tokens,
};

/// Abstraction over a chain store backend.
///
/// Every mutating operation is a single transaction: on error nothing it did
/// is observable. Reads may run concurrently with each other and with a
/// writer, subject to the backend's own locking.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ChainStore: Clone + Send + Sync + 'static {
  type Error: std::error::Error + From<crate::Error> + Send + Sync + 'static;

  // ── Models ────────────────────────────────────────────────────────────

  /// Create a model. Fails if the name is taken or `order` is zero.
  fn insert_model<'a>(
    &'a self,
    name: &'a str,
    order: usize,
  ) -> impl Future<Output = Result<Model, Self::Error>> + Send + 'a;

  /// Look a model up by name; a missing model is
  /// [`Error::ModelNotFound`](crate::Error::ModelNotFound).
  fn model_info<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Model, Self::Error>> + Send + 'a;

  /// All models, ordered by name.
  fn model_infos(
    &self,
  ) -> impl Future<Output = Result<Vec<Model>, Self::Error>> + Send + '_;

  /// Delete a model's chain links and then the model itself.
  fn remove_model<'a>(
    &'a self,
    model: &'a Model,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Vocabulary ────────────────────────────────────────────────────────

  fn vocab_str(
    &self,
    id: TokenId,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  fn vocab_int<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<TokenId, Self::Error>> + Send + 'a;

  // ── Chains ────────────────────────────────────────────────────────────

  /// Continuations of `prefix` (canonical prefix text) in `model`, most
  /// frequent first and lowest id first among equals.
  fn candidates<'a>(
    &'a self,
    model_id: ModelId,
    prefix: &'a str,
  ) -> impl Future<Output = Result<Vec<Candidate>, Self::Error>> + Send + 'a;

  /// Increment a single link by one, creating the prefix if needed.
  ///
  /// Bypasses batching; use [`ChainStore::train`] for bulk input.
  fn insert_token<'a>(
    &'a self,
    model: &'a Model,
    prefix: &'a [TokenId],
    token: TokenId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Consume `tokens` and add their transitions to `model`.
  fn train<'a>(
    &'a self,
    model: &'a Model,
    tokens: Tokens,
    config: &'a TrainConfig,
    cancel: &'a CancellationToken,
  ) -> impl Future<Output = Result<TrainSummary, Self::Error>> + Send + 'a;

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Delete `model`'s links with `frequency <= min_freq`. Returns the number
  /// of deleted links.
  fn prune_model<'a>(
    &'a self,
    model: &'a Model,
    min_freq: u64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Drop tokens whose summed frequency over all models is below
  /// `min_freq`, together with every prefix and link that mentions them.
  fn vocabulary_prune<'a>(
    &'a self,
    min_freq: u64,
    cancel: &'a CancellationToken,
  ) -> impl Future<Output = Result<VocabularyPruneSummary, Self::Error>> + Send + 'a;

  fn stats(&self) -> impl Future<Output = Result<Stats, Self::Error>> + Send + '_;

  // ── Interchange ───────────────────────────────────────────────────────

  fn export_model<'a>(
    &'a self,
    model: &'a Model,
  ) -> impl Future<Output = Result<ModelDocument, Self::Error>> + Send + 'a;

  /// Merge `document` into the store, adding frequencies to existing links.
  fn import_model<'a>(
    &'a self,
    document: ModelDocument,
    cancel: &'a CancellationToken,
  ) -> impl Future<Output = Result<Model, Self::Error>> + Send + 'a;

  /// Release the backend's connection and cached statements.
  fn close(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
