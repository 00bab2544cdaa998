//! SQL schema for the Tome SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Daily free-tier generation counts. The bucket embeds the calendar day,
-- so old rows are simply never read again; no reset job exists.
CREATE TABLE IF NOT EXISTS usage_counts (
    identity  TEXT NOT NULL,
    bucket    TEXT NOT NULL,     -- 'YYYY-MM-DD' in the store clock
    count     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (identity, bucket)
);

-- One row per rate-limit hit. Rows older than the widest window are
-- removed lazily on each check and by the host's periodic sweep.
CREATE TABLE IF NOT EXISTS rate_hits (
    key     TEXT NOT NULL,
    hit_ms  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS rate_hits_key_idx ON rate_hits(key, hit_ms);

-- Caller-supplied upstream credentials, opaque to this layer.
CREATE TABLE IF NOT EXISTS credentials (
    identity    TEXT PRIMARY KEY,
    api_key     TEXT NOT NULL,
    updated_at  TEXT NOT NULL    -- ISO 8601 UTC
);

PRAGMA user_version = 1;
";
