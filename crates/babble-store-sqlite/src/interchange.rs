//! Export and import of [`ModelDocument`]s.
//!
//! Export resolves every id a model's links touch into text. Import walks
//! the document the other way: vocabulary texts are inserted or reused,
//! prefixes are rebuilt from the new token ids, and link frequencies are
//! added to whatever the store already holds.

use std::collections::{BTreeMap, HashMap, HashSet};

use babble_core::{
  Error as CoreError,
  interchange::{ChainEntry, ModelDocument},
  model::{Model, PrefixId},
  prefix::{decode_prefix, encode_prefix},
  token::{EOC_ID, SOC_ID, TokenId},
};
use rusqlite::{Connection, params};
use tokio_util::sync::CancellationToken;

use crate::{
  Result, accessor,
  encode::{decode_count, encode_order},
};

// ─── Export ──────────────────────────────────────────────────────────────────

pub fn export(conn: &mut Connection, model: &Model) -> Result<ModelDocument> {
  // A read transaction keeps the snapshot consistent with concurrent writers.
  let tx = conn.transaction()?;

  let rows = {
    let mut stmt = tx.prepare_cached(
      "SELECT c.prefix_id, p.prefix_text, c.next_token_id, v.token_text, c.frequency
       FROM chains c
       JOIN prefixes   p ON p.prefix_id = c.prefix_id
       JOIN vocabulary v ON v.token_id  = c.next_token_id
       WHERE c.model_id = ?1
       ORDER BY c.prefix_id, c.next_token_id",
    )?;
    let rows = stmt
      .query_map(params![model.model_id], |r| {
        Ok((
          r.get::<_, PrefixId>(0)?,
          r.get::<_, String>(1)?,
          r.get::<_, TokenId>(2)?,
          r.get::<_, String>(3)?,
          r.get::<_, i64>(4)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows
  };

  let mut vocabulary: BTreeMap<String, TokenId> = BTreeMap::new();
  let mut known: HashSet<TokenId> = HashSet::new();
  let mut prefixes: BTreeMap<String, PrefixId> = BTreeMap::new();
  let mut chains = Vec::with_capacity(rows.len());

  for (prefix_id, prefix_text, next_id, next_text, freq) in rows {
    if known.insert(next_id) {
      vocabulary.insert(next_text, next_id);
    }

    if !prefixes.contains_key(&prefix_text) {
      // Prefix components that never appear as a next token still need a
      // vocabulary entry in the document.
      for id in decode_prefix(&prefix_text)? {
        if known.contains(&id) {
          continue;
        }
        let text = accessor::token_text(&tx, id)?.ok_or(CoreError::UnknownTokenId(id))?;
        known.insert(id);
        vocabulary.insert(text, id);
      }
      prefixes.insert(prefix_text, prefix_id);
    }

    chains.push(ChainEntry {
      prefix_id,
      next_token_id: next_id,
      frequency: decode_count(freq),
    });
  }

  tx.commit()?;
  Ok(ModelDocument {
    name: model.name.clone(),
    order: model.order,
    vocabulary,
    prefixes,
    chains,
  })
}

// ─── Import ──────────────────────────────────────────────────────────────────

pub fn import(
  conn: &mut Connection,
  document: &ModelDocument,
  cancel: &CancellationToken,
) -> Result<Model> {
  if document.order == 0 {
    return Err(CoreError::InvalidOrder(0).into());
  }

  let tx = conn.transaction()?;

  let model = match accessor::model_by_name(&tx, &document.name)? {
    Some(raw) => {
      let existing = raw.into_model()?;
      if existing.order != document.order {
        return Err(
          CoreError::OrderMismatch {
            model:     existing.name,
            existing:  existing.order,
            requested: document.order,
          }
          .into(),
        );
      }
      existing
    }
    None => {
      let model_id = accessor::insert_model(&tx, &document.name, encode_order(document.order))?;
      Model { model_id, name: document.name.clone(), order: document.order }
    }
  };

  // Old id → new id. Reserved ids are constant across stores.
  let mut tokens: HashMap<TokenId, TokenId> =
    HashMap::from([(SOC_ID, SOC_ID), (EOC_ID, EOC_ID)]);
  // Old-id order, so new ids keep the relative order ties are broken by.
  let mut ordinary: Vec<(&str, TokenId)> = document.ordinary_tokens().collect();
  ordinary.sort_by_key(|&(_, old_id)| old_id);
  for (text, old_id) in ordinary {
    tokens.insert(old_id, accessor::ensure_token(&tx, text)?);
  }

  let mut prefixes: HashMap<PrefixId, PrefixId> = HashMap::with_capacity(document.prefixes.len());
  let mut by_id: Vec<(&String, &PrefixId)> = document.prefixes.iter().collect();
  by_id.sort_by_key(|&(_, old_id)| *old_id);
  for (text, old_id) in by_id {
    let old_ids = decode_prefix(text)?;
    if old_ids.len() != document.order {
      return Err(
        CoreError::Consistency(format!(
          "prefix {text:?} has {} ids, model order is {}",
          old_ids.len(),
          document.order
        ))
        .into(),
      );
    }
    let new_ids = old_ids
      .iter()
      .map(|id| {
        tokens.get(id).copied().ok_or_else(|| {
          CoreError::Consistency(format!("prefix {text:?} references unknown token id {id}"))
        })
      })
      .collect::<Result<Vec<_>, _>>()?;
    prefixes.insert(*old_id, accessor::ensure_prefix(&tx, &encode_prefix(&new_ids))?);
  }

  let mut links = Vec::with_capacity(accessor::LINK_CHUNK);
  for entry in &document.chains {
    if cancel.is_cancelled() {
      return Err(CoreError::Cancelled.into());
    }
    let prefix = *prefixes.get(&entry.prefix_id).ok_or_else(|| {
      CoreError::Consistency(format!("chain references unknown prefix id {}", entry.prefix_id))
    })?;
    let next = *tokens.get(&entry.next_token_id).ok_or_else(|| {
      CoreError::Consistency(format!(
        "chain references unknown token id {}",
        entry.next_token_id
      ))
    })?;
    if entry.frequency == 0 {
      continue;
    }

    links.push((prefix, next, entry.frequency));
    if links.len() >= accessor::LINK_CHUNK {
      accessor::increment_links(&tx, model.model_id, &links)?;
      links.clear();
    }
  }
  accessor::increment_links(&tx, model.model_id, &links)?;

  tx.commit()?;
  Ok(model)
}
