//! Conversions between engine types and the integer columns SQLite stores.
//!
//! Frequencies are unsigned in the engine and `INTEGER` (i64) on disk; the
//! conversion saturates rather than wrapping.

use babble_core::model::{Model, ModelId};

use crate::Result;

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

pub fn encode_order(order: usize) -> i64 { i64::try_from(order).unwrap_or(i64::MAX) }

/// Raw values read directly from a `models` row.
pub struct RawModel {
  pub model_id:    ModelId,
  pub model_name:  String,
  pub model_order: i64,
}

impl RawModel {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      model_id:    row.get(0)?,
      model_name:  row.get(1)?,
      model_order: row.get(2)?,
    })
  }

  pub fn into_model(self) -> Result<Model> {
    let order = usize::try_from(self.model_order)
      .ok()
      .filter(|o| *o > 0)
      .ok_or(babble_core::Error::InvalidOrder(0))?;
    Ok(Model { model_id: self.model_id, name: self.model_name, order })
  }
}
