//! [`SqliteStore`], the SQLite implementation of [`ChainStore`].

use std::path::Path;

use babble_core::{
  Error as CoreError,
  interchange::ModelDocument,
  model::{Model, ModelId, ModelStats, Stats, TrainSummary, VocabularyPruneSummary},
  options::TrainConfig,
  prefix::{encode_prefix, start_prefix},
  sampling::Candidate,
  store::ChainStore,
  token::TokenId,
  tokenizer::Tokens,
};
use rusqlite::params;
use tokio_util::sync::CancellationToken;

use crate::{
  Result, accessor,
  encode::{RawModel, decode_count, encode_order},
  interchange, prune,
  schema::{PRAGMAS, SCHEMA},
  train,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A chain store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Statements
/// are compiled once per connection and cached.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.setup_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.setup_schema().await?;
    Ok(store)
  }

  /// Create the tables and reserved vocabulary rows if they are missing.
  /// Safe to call any number of times.
  pub async fn setup_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ChainStore impl ─────────────────────────────────────────────────────────

impl ChainStore for SqliteStore {
  type Error = crate::Error;

  // ── Models ────────────────────────────────────────────────────────────────

  async fn insert_model(&self, name: &str, order: usize) -> Result<Model> {
    if order == 0 {
      return Err(CoreError::InvalidOrder(order).into());
    }
    let name = name.to_owned();

    let model = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if accessor::model_by_name(&tx, &name)?.is_some() {
          return Ok(Err(crate::Error::from(CoreError::ModelExists(name))));
        }
        let model_id = accessor::insert_model(&tx, &name, encode_order(order))?;
        tx.commit()?;
        Ok(Ok(Model { model_id, name, order }))
      })
      .await??;

    tracing::info!(model = %model.name, order = model.order, "model created");
    Ok(model)
  }

  async fn model_info(&self, name: &str) -> Result<Model> {
    let name = name.to_owned();
    let lookup = name.clone();

    let raw = self
      .conn
      .call(move |conn| Ok(accessor::model_by_name(conn, &lookup)?))
      .await?;

    match raw {
      Some(raw) => raw.into_model(),
      None => Err(CoreError::ModelNotFound(name).into()),
    }
  }

  async fn model_infos(&self) -> Result<Vec<Model>> {
    let raws: Vec<RawModel> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT model_id, model_name, model_order FROM models ORDER BY model_name",
        )?;
        let rows = stmt
          .query_map([], RawModel::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawModel::into_model).collect()
  }

  async fn remove_model(&self, model: &Model) -> Result<()> {
    let model_id = model.model_id;

    let (links, removed) = self
      .conn
      .call(move |conn| {
        // Links first: they reference the model row.
        let tx = conn.transaction()?;
        let links = tx
          .prepare_cached("DELETE FROM chains WHERE model_id = ?1")?
          .execute(params![model_id])?;
        let removed = tx
          .prepare_cached("DELETE FROM models WHERE model_id = ?1")?
          .execute(params![model_id])?;
        tx.commit()?;
        Ok((links, removed))
      })
      .await?;

    if removed == 0 {
      return Err(CoreError::ModelNotFound(model.name.clone()).into());
    }
    tracing::info!(model = %model.name, links, "model removed");
    Ok(())
  }

  // ── Vocabulary ────────────────────────────────────────────────────────────

  async fn vocab_str(&self, id: TokenId) -> Result<String> {
    let text = self
      .conn
      .call(move |conn| Ok(accessor::token_text(conn, id)?))
      .await?;
    text.ok_or_else(|| CoreError::UnknownTokenId(id).into())
  }

  async fn vocab_int(&self, text: &str) -> Result<TokenId> {
    let text = text.to_owned();
    let lookup = text.clone();
    let id = self
      .conn
      .call(move |conn| Ok(accessor::token_id(conn, &lookup)?))
      .await?;
    id.ok_or_else(|| CoreError::UnknownToken(text).into())
  }

  // ── Chains ────────────────────────────────────────────────────────────────

  async fn candidates(&self, model_id: ModelId, prefix: &str) -> Result<Vec<Candidate>> {
    let prefix = prefix.to_owned();
    let rows = self
      .conn
      .call(move |conn| Ok(accessor::candidates(conn, model_id, &prefix)?))
      .await?;
    Ok(rows)
  }

  async fn insert_token(&self, model: &Model, prefix: &[TokenId], token: TokenId) -> Result<()> {
    if prefix.len() != model.order {
      return Err(
        CoreError::Consistency(format!(
          "prefix has {} ids, model {:?} has order {}",
          prefix.len(),
          model.name,
          model.order
        ))
        .into(),
      );
    }
    let model_id = model.model_id;
    let prefix_text = encode_prefix(prefix);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let prefix_id = accessor::ensure_prefix(&tx, &prefix_text)?;
        accessor::increment_links(&tx, model_id, &[(prefix_id, token, 1)])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn train(
    &self,
    model: &Model,
    tokens: Tokens,
    config: &TrainConfig,
    cancel: &CancellationToken,
  ) -> Result<TrainSummary> {
    let owned = model.clone();
    let config = config.clone();
    let cancel = cancel.clone();

    let summary = self
      .conn
      .call(move |conn| Ok(train::train(conn, &owned, tokens, &config, &cancel)))
      .await??;

    tracing::info!(
      model = %model.name,
      tokens = summary.tokens,
      sentences = summary.sentences,
      transitions = summary.transitions,
      "training committed"
    );
    Ok(summary)
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn prune_model(&self, model: &Model, min_freq: u64) -> Result<u64> {
    let model_id = model.model_id;
    let deleted = self
      .conn
      .call(move |conn| Ok(prune::prune_model(conn, model_id, min_freq)))
      .await??;

    tracing::info!(model = %model.name, min_freq, deleted, "model pruned");
    Ok(deleted)
  }

  async fn vocabulary_prune(
    &self,
    min_freq: u64,
    cancel: &CancellationToken,
  ) -> Result<VocabularyPruneSummary> {
    let cancel = cancel.clone();
    let summary = self
      .conn
      .call(move |conn| Ok(prune::vocabulary_prune(conn, min_freq, &cancel)))
      .await??;

    tracing::info!(
      min_freq,
      tokens = summary.tokens,
      prefixes = summary.prefixes,
      links = summary.links,
      "vocabulary pruned"
    );
    Ok(summary)
  }

  async fn stats(&self) -> Result<Stats> {
    let (vocabulary_size, prefix_count, rows) = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let vocabulary_size: i64 =
          tx.query_row("SELECT COUNT(*) FROM vocabulary", [], |r| r.get(0))?;
        let prefix_count: i64 =
          tx.query_row("SELECT COUNT(*) FROM prefixes", [], |r| r.get(0))?;

        let models = {
          let mut stmt = tx.prepare_cached(
            "SELECT m.model_id, m.model_name, m.model_order,
                    COUNT(c.prefix_id), COALESCE(SUM(c.frequency), 0)
             FROM models m
             LEFT JOIN chains c ON c.model_id = m.model_id
             GROUP BY m.model_id
             ORDER BY m.model_name",
          )?;
          let rows = stmt
            .query_map([], |r| {
              Ok((RawModel::from_row(r)?, r.get::<_, i64>(3)?, r.get::<_, i64>(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          rows
        };

        let mut rows = Vec::with_capacity(models.len());
        for (raw, links, total) in models {
          let order = usize::try_from(raw.model_order).unwrap_or(0);
          let starts: i64 = tx
            .prepare_cached(
              "SELECT COUNT(*)
               FROM chains c
               JOIN prefixes p ON p.prefix_id = c.prefix_id
               WHERE c.model_id = ?1 AND p.prefix_text = ?2",
            )?
            .query_row(params![raw.model_id, start_prefix(order)], |r| r.get(0))?;
          rows.push((raw, links, total, starts));
        }

        tx.commit()?;
        Ok((vocabulary_size, prefix_count, rows))
      })
      .await?;

    let models = rows
      .into_iter()
      .map(|(raw, links, total, starts)| -> Result<ModelStats> {
        Ok(ModelStats {
          model:           raw.into_model()?,
          links:           decode_count(links),
          total_frequency: decode_count(total),
          starts:          decode_count(starts),
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Stats {
      vocabulary_size: decode_count(vocabulary_size),
      prefix_count: decode_count(prefix_count),
      models,
    })
  }

  // ── Interchange ───────────────────────────────────────────────────────────

  async fn export_model(&self, model: &Model) -> Result<ModelDocument> {
    let model = model.clone();
    let document = self
      .conn
      .call(move |conn| Ok(interchange::export(conn, &model)))
      .await??;
    Ok(document)
  }

  async fn import_model(
    &self,
    document: ModelDocument,
    cancel: &CancellationToken,
  ) -> Result<Model> {
    let cancel = cancel.clone();
    let links = document.chains.len();
    let model = self
      .conn
      .call(move |conn| Ok(interchange::import(conn, &document, &cancel)))
      .await??;

    tracing::info!(model = %model.name, links, "model imported");
    Ok(model)
  }

  async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }
}
