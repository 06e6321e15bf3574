//! The training transaction.
//!
//! Tokens are resolved to vocabulary ids as they arrive and collected into a
//! sentence buffer. Each closed sentence is padded and windowed into
//! `(prefix, next)` transitions, which are counted in memory and flushed to
//! `chains` every `batch_size` transitions. The whole call is one
//! transaction: any error rolls every write back.

use std::collections::HashMap;

use babble_core::{
  model::{Model, ModelId, PrefixId, TrainSummary},
  options::TrainConfig,
  prefix::{encode_prefix, pad_sentence, transitions},
  token::{Token, TokenId},
  tokenizer::Tokens,
};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::{Result, accessor};

pub fn train(
  conn: &mut Connection,
  model: &Model,
  tokens: Tokens,
  config: &TrainConfig,
  cancel: &CancellationToken,
) -> Result<TrainSummary> {
  let tx = conn.transaction()?;

  let summary = {
    let mut session = Session::new(&tx, model, config);
    for token in tokens {
      if cancel.is_cancelled() {
        return Err(babble_core::Error::Cancelled.into());
      }
      let token = token.map_err(babble_core::Error::from)?;
      session.push(token)?;
    }
    session.finish()?
  };

  tx.commit()?;
  Ok(summary)
}

/// Per-call state. The id caches live exactly as long as the transaction.
struct Session<'c> {
  conn:             &'c Connection,
  model_id:         ModelId,
  order:            usize,
  batch_size:       usize,
  max_sentence_len: usize,
  sentence:         Vec<TokenId>,
  batch:            HashMap<(PrefixId, TokenId), u64>,
  pending:          usize,
  token_ids:        HashMap<String, TokenId>,
  prefix_ids:       HashMap<String, PrefixId>,
  summary:          TrainSummary,
}

impl<'c> Session<'c> {
  fn new(conn: &'c Connection, model: &Model, config: &TrainConfig) -> Self {
    Self {
      conn,
      model_id: model.model_id,
      order: model.order,
      batch_size: config.batch_size.max(1),
      max_sentence_len: config.max_sentence_len.max(1),
      sentence: Vec::new(),
      batch: HashMap::new(),
      pending: 0,
      token_ids: HashMap::new(),
      prefix_ids: HashMap::new(),
      summary: TrainSummary::default(),
    }
  }

  fn push(&mut self, token: Token) -> Result<()> {
    let id = self.token_id(token.text)?;
    self.sentence.push(id);
    self.summary.tokens += 1;

    if token.is_eoc {
      self.close_sentence()?;
    } else if self.sentence.len() >= self.max_sentence_len {
      tracing::warn!(
        model_id = self.model_id,
        limit = self.max_sentence_len,
        "sentence reached the buffer limit, closing it early"
      );
      self.close_sentence()?;
    }
    Ok(())
  }

  fn token_id(&mut self, text: String) -> Result<TokenId> {
    if let Some(id) = self.token_ids.get(&text) {
      return Ok(*id);
    }
    let id = accessor::ensure_token(self.conn, &text)?;
    self.token_ids.insert(text, id);
    Ok(id)
  }

  fn prefix_id(&mut self, prefix: &[TokenId]) -> Result<PrefixId> {
    let text = encode_prefix(prefix);
    if let Some(id) = self.prefix_ids.get(&text) {
      return Ok(*id);
    }
    let id = accessor::ensure_prefix(self.conn, &text)?;
    self.prefix_ids.insert(text, id);
    Ok(id)
  }

  fn close_sentence(&mut self) -> Result<()> {
    if self.sentence.is_empty() {
      return Ok(());
    }

    let padded = pad_sentence(&self.sentence, self.order);
    self.sentence.clear();
    self.summary.sentences += 1;

    for (prefix, next) in transitions(&padded, self.order) {
      let prefix_id = self.prefix_id(prefix)?;
      *self.batch.entry((prefix_id, next)).or_insert(0) += 1;
      self.pending += 1;
      self.summary.transitions += 1;

      if self.pending >= self.batch_size {
        self.flush()?;
      }
    }
    Ok(())
  }

  fn flush(&mut self) -> Result<()> {
    if self.batch.is_empty() {
      return Ok(());
    }
    let links: Vec<(PrefixId, TokenId, u64)> = self
      .batch
      .drain()
      .map(|((prefix, next), freq)| (prefix, next, freq))
      .collect();
    tracing::debug!(
      model_id = self.model_id,
      transitions = self.pending,
      links = links.len(),
      "flushing training batch"
    );
    accessor::increment_links(self.conn, self.model_id, &links)?;
    self.pending = 0;
    Ok(())
  }

  /// Close a trailing unterminated sentence and flush what is left.
  fn finish(mut self) -> Result<TrainSummary> {
    self.close_sentence()?;
    self.flush()?;
    Ok(self.summary)
  }
}
