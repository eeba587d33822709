//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Baton-Crawl database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per logical crawl
CREATE TABLE IF NOT EXISTS crawls (
    crawl_id TEXT PRIMARY KEY,
    frontier_address TEXT NOT NULL,
    base_url TEXT NOT NULL,
    path_keywords TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

-- Chained runs of a crawl
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id TEXT NOT NULL REFERENCES crawls(crawl_id),
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    continued_from INTEGER REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_runs_crawl_status ON runs(crawl_id, status);

-- Progress counters, one row per crawl
CREATE TABLE IF NOT EXISTS progress (
    crawl_id TEXT PRIMARY KEY,
    total_url_count INTEGER NOT NULL DEFAULT 0,
    run_url_count INTEGER NOT NULL DEFAULT 0,
    cycle INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Every path ever discovered, per frontier address
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    path TEXT NOT NULL,
    state TEXT NOT NULL,
    claim_key TEXT,
    discovered_at TEXT NOT NULL,
    claimed_at TEXT,
    finished_at TEXT,
    UNIQUE(address, path)
);

CREATE INDEX IF NOT EXISTS idx_frontier_pending ON frontier(address, state, id);
CREATE INDEX IF NOT EXISTS idx_frontier_claim ON frontier(address, claim_key);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
