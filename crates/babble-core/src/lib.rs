//! Core types and trait definitions for the Babble n-gram engine.
//!
//! This crate is deliberately free of database dependencies. Storage
//! backends (e.g. `babble-store-sqlite`) implement [`store::ChainStore`];
//! the [`generator::Generator`] drives training and generation on top of any
//! such backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod generator;
pub mod interchange;
pub mod model;
pub mod options;
pub mod prefix;
pub mod sampling;
pub mod store;
pub mod token;
pub mod tokenizer;

pub use error::{Error, Result};
pub use generator::{GenerationStream, Generator};
pub use options::{GenerateOptions, TrainConfig};
pub use tokenizer::{RegexTokenizer, RegexTokenizerConfig, Tokenizer};
