//! The self-contained JSON document used to move a model between stores.
//!
//! Numeric ids inside a document are local to it. Only the texts (the map
//! keys) are portable; an importer re-resolves every id through them.

use std::{
  collections::BTreeMap,
  io::{Read, Write},
};

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  model::PrefixId,
  token::{TokenId, is_reserved},
};

/// A model's full closure: vocabulary, prefixes and chain links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDocument {
  pub name:       String,
  pub order:      usize,
  /// Token text → id in the exporting store.
  pub vocabulary: BTreeMap<String, TokenId>,
  /// Prefix text → id in the exporting store.
  pub prefixes:   BTreeMap<String, PrefixId>,
  pub chains:     Vec<ChainEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
  pub prefix_id:     PrefixId,
  pub next_token_id: TokenId,
  pub frequency:     u64,
}

impl ModelDocument {
  pub fn read_from(reader: impl Read) -> Result<Self> {
    Ok(serde_json::from_reader(reader)?)
  }

  pub fn write_to(&self, writer: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(writer, self)?;
    Ok(())
  }

  /// Vocabulary entries an importer must insert or reuse.
  pub fn ordinary_tokens(&self) -> impl Iterator<Item = (&str, TokenId)> {
    self
      .vocabulary
      .iter()
      .filter(|(_, id)| !is_reserved(**id))
      .map(|(text, id)| (text.as_str(), *id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_shape() {
    let doc = ModelDocument {
      name:       "m".into(),
      order:      1,
      vocabulary: BTreeMap::from([
        ("<SOC>".to_owned(), 0),
        ("<EOC>".to_owned(), 1),
        ("hi".to_owned(), 4),
      ]),
      prefixes:   BTreeMap::from([("0".to_owned(), 10), ("4".to_owned(), 11)]),
      chains:     vec![ChainEntry { prefix_id: 10, next_token_id: 4, frequency: 3 }],
    };

    let mut buf = Vec::new();
    doc.write_to(&mut buf).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(value["vocabulary"]["hi"], 4);
    assert_eq!(value["prefixes"]["0"], 10);
    assert_eq!(value["chains"][0]["next_token_id"], 4);

    let back = ModelDocument::read_from(buf.as_slice()).unwrap();
    let ordinary: Vec<_> = back.ordinary_tokens().collect();
    assert_eq!(ordinary, vec![("hi", 4)]);
  }
}
