//! Global vocabulary pruning.
//!
//! Four phases inside one transaction:
//!
//! 1. find ordinary tokens whose frequency summed over every model is below
//!    the threshold;
//! 2. find prefixes that contain any of those tokens;
//! 3. delete chain links that lead to a doomed token or start from a doomed
//!    prefix;
//! 4. delete the doomed prefixes, then the doomed vocabulary rows.

use std::collections::HashSet;

use babble_core::{
  model::{PrefixId, VocabularyPruneSummary},
  prefix::decode_prefix,
  token::{EOC_ID, SOC_ID, TokenId},
};
use rusqlite::{Connection, params};
use tokio_util::sync::CancellationToken;

use crate::{Result, accessor, encode::encode_count};

pub fn vocabulary_prune(
  conn: &mut Connection,
  min_freq: u64,
  cancel: &CancellationToken,
) -> Result<VocabularyPruneSummary> {
  let tx = conn.transaction()?;
  let check = || -> Result<()> {
    if cancel.is_cancelled() {
      Err(babble_core::Error::Cancelled.into())
    } else {
      Ok(())
    }
  };

  // Phase 1.
  let doomed_tokens: Vec<TokenId> = {
    let mut stmt = tx.prepare_cached(
      "SELECT v.token_id
       FROM vocabulary v
       LEFT JOIN chains c ON c.next_token_id = v.token_id
       WHERE v.token_id NOT IN (?1, ?2)
       GROUP BY v.token_id
       HAVING COALESCE(SUM(c.frequency), 0) < ?3",
    )?;
    let rows = stmt
      .query_map(params![SOC_ID, EOC_ID, encode_count(min_freq)], |r| r.get(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows
  };
  tracing::debug!(tokens = doomed_tokens.len(), "vocabulary prune: tokens selected");

  if doomed_tokens.is_empty() {
    tx.commit()?;
    return Ok(VocabularyPruneSummary::default());
  }
  check()?;

  // Phase 2.
  let doomed_set: HashSet<TokenId> = doomed_tokens.iter().copied().collect();
  let doomed_prefixes: Vec<PrefixId> = {
    let mut stmt = tx.prepare_cached("SELECT prefix_id, prefix_text FROM prefixes")?;
    let all = stmt
      .query_map([], |r| Ok((r.get::<_, PrefixId>(0)?, r.get::<_, String>(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut doomed = Vec::new();
    for (id, text) in all {
      if decode_prefix(&text)?.iter().any(|t| doomed_set.contains(t)) {
        doomed.push(id);
      }
    }
    doomed
  };
  tracing::debug!(prefixes = doomed_prefixes.len(), "vocabulary prune: prefixes selected");
  check()?;

  // Phase 3.
  let mut links = accessor::delete_in(&tx, "chains", "next_token_id", &doomed_tokens)?;
  links += accessor::delete_in(&tx, "chains", "prefix_id", &doomed_prefixes)?;
  tracing::debug!(links, "vocabulary prune: links deleted");
  check()?;

  // Phase 4.
  let prefixes = accessor::delete_in(&tx, "prefixes", "prefix_id", &doomed_prefixes)?;
  let tokens = accessor::delete_in(&tx, "vocabulary", "token_id", &doomed_tokens)?;

  tx.commit()?;
  Ok(VocabularyPruneSummary { tokens, prefixes, links })
}

/// Delete one model's links at or below `min_freq`.
pub fn prune_model(conn: &Connection, model_id: i64, min_freq: u64) -> Result<u64> {
  let deleted = conn
    .prepare_cached("DELETE FROM chains WHERE model_id = ?1 AND frequency <= ?2")?
    .execute(params![model_id, encode_count(min_freq)])?;
  Ok(deleted as u64)
}
