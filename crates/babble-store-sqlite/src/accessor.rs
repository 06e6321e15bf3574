//! Prepared-statement accessors shared by every store operation.
//!
//! Each function takes a plain [`rusqlite::Connection`] (a transaction
//! derefs to one) and goes through `prepare_cached`, so repeated calls reuse
//! the compiled statement for the lifetime of the connection.

use babble_core::{
  model::{ModelId, PrefixId},
  sampling::Candidate,
  token::TokenId,
};
use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter};

use crate::encode::{RawModel, decode_count, encode_count};

/// Rows per multi-row link upsert (four parameters each).
pub const LINK_CHUNK: usize = 200;
/// Ids per `IN (...)` list, well under SQLite's parameter ceiling.
pub const DELETE_CHUNK: usize = 500;

// ─── Vocabulary ──────────────────────────────────────────────────────────────

pub fn token_id(conn: &Connection, text: &str) -> rusqlite::Result<Option<TokenId>> {
  conn
    .prepare_cached("SELECT token_id FROM vocabulary WHERE token_text = ?1")?
    .query_row(params![text], |r| r.get(0))
    .optional()
}

pub fn token_text(conn: &Connection, id: TokenId) -> rusqlite::Result<Option<String>> {
  conn
    .prepare_cached("SELECT token_text FROM vocabulary WHERE token_id = ?1")?
    .query_row(params![id], |r| r.get(0))
    .optional()
}

/// Return the id for `text`, inserting a vocabulary row on first sight.
pub fn ensure_token(conn: &Connection, text: &str) -> rusqlite::Result<TokenId> {
  if let Some(id) = token_id(conn, text)? {
    return Ok(id);
  }
  conn
    .prepare_cached("INSERT INTO vocabulary (token_text) VALUES (?1)")?
    .execute(params![text])?;
  Ok(conn.last_insert_rowid())
}

// ─── Prefixes ────────────────────────────────────────────────────────────────

pub fn prefix_id(conn: &Connection, text: &str) -> rusqlite::Result<Option<PrefixId>> {
  conn
    .prepare_cached("SELECT prefix_id FROM prefixes WHERE prefix_text = ?1")?
    .query_row(params![text], |r| r.get(0))
    .optional()
}

/// Return the id for prefix `text`, inserting it on first sight.
pub fn ensure_prefix(conn: &Connection, text: &str) -> rusqlite::Result<PrefixId> {
  if let Some(id) = prefix_id(conn, text)? {
    return Ok(id);
  }
  conn
    .prepare_cached("INSERT INTO prefixes (prefix_text) VALUES (?1)")?
    .execute(params![text])?;
  Ok(conn.last_insert_rowid())
}

// ─── Models ──────────────────────────────────────────────────────────────────

pub fn model_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<RawModel>> {
  conn
    .prepare_cached(
      "SELECT model_id, model_name, model_order FROM models WHERE model_name = ?1",
    )?
    .query_row(params![name], RawModel::from_row)
    .optional()
}

pub fn insert_model(conn: &Connection, name: &str, order: i64) -> rusqlite::Result<ModelId> {
  conn
    .prepare_cached("INSERT INTO models (model_name, model_order) VALUES (?1, ?2)")?
    .execute(params![name, order])?;
  Ok(conn.last_insert_rowid())
}

// ─── Chains ──────────────────────────────────────────────────────────────────

/// Continuations of a prefix, most frequent first, lowest id among equals.
pub fn candidates(
  conn: &Connection,
  model_id: ModelId,
  prefix_text: &str,
) -> rusqlite::Result<Vec<Candidate>> {
  let mut stmt = conn.prepare_cached(
    "SELECT c.next_token_id, v.token_text, c.frequency
     FROM chains c
     JOIN prefixes   p ON p.prefix_id = c.prefix_id
     JOIN vocabulary v ON v.token_id  = c.next_token_id
     WHERE c.model_id = ?1 AND p.prefix_text = ?2
     ORDER BY c.frequency DESC, c.next_token_id ASC",
  )?;
  let rows = stmt
    .query_map(params![model_id, prefix_text], |row| {
      Ok(Candidate {
        token_id:  row.get(0)?,
        text:      row.get(1)?,
        frequency: decode_count(row.get(2)?),
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Add `frequency` to each `(prefix, next)` link of `model_id`, creating
/// links that do not exist yet.
pub fn increment_links(
  conn: &Connection,
  model_id: ModelId,
  links: &[(PrefixId, TokenId, u64)],
) -> rusqlite::Result<()> {
  for chunk in links.chunks(LINK_CHUNK) {
    let rows = vec!["(?, ?, ?, ?)"; chunk.len()].join(", ");
    let sql = format!(
      "INSERT INTO chains (model_id, prefix_id, next_token_id, frequency)
       VALUES {rows}
       ON CONFLICT (model_id, prefix_id, next_token_id)
       DO UPDATE SET frequency = MIN(frequency + excluded.frequency, {max})",
      max = i64::MAX
    );
    let values = chunk.iter().flat_map(|&(prefix, next, freq)| {
      [model_id, prefix, next, encode_count(freq)]
    });
    conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
  }
  Ok(())
}

/// `DELETE FROM {table} WHERE {column} IN (...)`, in chunks.
pub fn delete_in(
  conn: &Connection,
  table: &str,
  column: &str,
  ids: &[i64],
) -> rusqlite::Result<u64> {
  let mut deleted = 0;
  for chunk in ids.chunks(DELETE_CHUNK) {
    let placeholders = vec!["?"; chunk.len()].join(", ");
    let sql = format!("DELETE FROM {table} WHERE {column} IN ({placeholders})");
    deleted += conn.prepare_cached(&sql)?.execute(params_from_iter(chunk))? as u64;
  }
  Ok(deleted)
}
