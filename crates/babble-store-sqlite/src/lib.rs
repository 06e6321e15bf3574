//! SQLite backend for the Babble n-gram engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every multi-statement write
//! runs inside one closure on that thread, wrapped in a single transaction.

mod accessor;
mod encode;
mod interchange;
mod prune;
mod schema;
mod store;
mod train;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
