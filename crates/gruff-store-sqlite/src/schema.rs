//! SQL schema for the Gruff SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per stored document version, vertex or edge.
-- `body` is the document as JSON; the other columns are copies of body
-- fields kept for indexing. Timestamps use fixed microsecond precision so
-- that string order equals time order.
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key        TEXT NOT NULL,
    id         TEXT,            -- logical id of versioned vertices
    from_ref   TEXT,            -- edges: '<collection>/<key>'
    to_ref     TEXT,
    start      TEXT NOT NULL,
    end_at     TEXT,            -- NULL while current
    body       TEXT NOT NULL,
    PRIMARY KEY (collection, key)
);

CREATE INDEX IF NOT EXISTS documents_id_idx   ON documents(collection, id, start);
CREATE INDEX IF NOT EXISTS documents_from_idx ON documents(collection, from_ref);
CREATE INDEX IF NOT EXISTS documents_to_idx   ON documents(collection, to_ref);
CREATE INDEX IF NOT EXISTS documents_live_idx ON documents(collection, end_at);

CREATE UNIQUE INDEX IF NOT EXISTS users_username_idx
    ON documents(json_extract(body, '$.username'))
    WHERE collection = 'users';
CREATE UNIQUE INDEX IF NOT EXISTS users_email_idx
    ON documents(lower(json_extract(body, '$.email')))
    WHERE collection = 'users';

PRAGMA user_version = 1;
";
