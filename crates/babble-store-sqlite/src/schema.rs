//! SQL schema for the Babble SQLite store.
//!
//! Tables and columns are the durable on-disk contract; any reader of the
//! same data file relies on them exactly as written here.

/// Connection-level settings. Run outside any transaction.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// Full schema DDL plus the reserved vocabulary rows; idempotent thanks to
/// `IF NOT EXISTS` and `INSERT OR IGNORE`. Executed inside one transaction.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vocabulary (
    token_id   INTEGER PRIMARY KEY,
    token_text TEXT    NOT NULL UNIQUE
);

-- prefix_text is `order` token ids joined by single spaces, e.g. '0 0'.
-- Shared by every model.
CREATE TABLE IF NOT EXISTS prefixes (
    prefix_id   INTEGER PRIMARY KEY,
    prefix_text TEXT    NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS models (
    model_id    INTEGER PRIMARY KEY,
    model_name  TEXT    NOT NULL UNIQUE,
    model_order INTEGER NOT NULL CHECK (model_order > 0)
);

-- The only model-scoped table.
CREATE TABLE IF NOT EXISTS chains (
    model_id      INTEGER NOT NULL REFERENCES models(model_id),
    prefix_id     INTEGER NOT NULL REFERENCES prefixes(prefix_id),
    next_token_id INTEGER NOT NULL REFERENCES vocabulary(token_id),
    frequency     INTEGER NOT NULL CHECK (frequency > 0),
    PRIMARY KEY (model_id, prefix_id, next_token_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS chains_prefix_idx ON chains(prefix_id);
CREATE INDEX IF NOT EXISTS chains_next_idx   ON chains(next_token_id);

INSERT OR IGNORE INTO vocabulary (token_id, token_text)
VALUES (0, '<SOC>'), (1, '<EOC>');
";
