//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the frontier,
//! progress and run ledger traits.

use crate::state::{CrawlContext, FrontierBatch, ProgressEntry, UrlState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    FrontierStore, ProgressTracker, RunLedger, StorageError, StorageResult,
};
use crate::storage::{RunRecord, RunStatus};
use crate::BatonError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;

const RUN_COLUMNS: &str =
    "id, crawl_id, started_at, finished_at, config_hash, status, continued_from";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(BatonError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, BatonError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, BatonError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        crawl_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Failed),
        continued_from: row.get(6)?,
    })
}

impl FrontierStore for SqliteStorage {
    fn enqueue(&mut self, address: &str, paths: &[String]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO frontier (address, path, state, discovered_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for path in paths {
                added += stmt.execute(params![
                    address,
                    path,
                    UrlState::Queued.to_db_string(),
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(added)
    }

    fn claim_batch(
        &mut self,
        address: &str,
        claim_key: &str,
        limit: u64,
    ) -> StorageResult<FrontierBatch> {
        let now = Utc::now().to_rfc3339();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        // IMMEDIATE takes the write lock up front so two processes sharing
        // the file cannot select the same pending rows.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut paths: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT path FROM frontier WHERE address = ?1 AND claim_key = ?2 AND state = ?3
                 ORDER BY id ASC LIMIT ?4",
            )?;
            let already_claimed = stmt
                .query_map(
                    params![address, claim_key, UrlState::Claimed.to_db_string(), limit],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            already_claimed
        };

        let remaining = limit - paths.len() as i64;
        if remaining > 0 {
            let pending: Vec<(i64, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, path FROM frontier WHERE address = ?1 AND state = ?2
                     ORDER BY id ASC LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(
                        params![address, UrlState::Queued.to_db_string(), remaining],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let mut update = tx.prepare(
                "UPDATE frontier SET state = ?1, claim_key = ?2, claimed_at = ?3 WHERE id = ?4",
            )?;
            for (id, path) in pending {
                update.execute(params![
                    UrlState::Claimed.to_db_string(),
                    claim_key,
                    now,
                    id
                ])?;
                paths.push(path);
            }
            drop(update);
        }

        tx.commit()?;

        Ok(FrontierBatch {
            claim_key: claim_key.to_string(),
            paths,
        })
    }

    fn complete_path(&mut self, address: &str, path: &str, state: UrlState) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE frontier SET state = ?1, finished_at = ?2 WHERE address = ?3 AND path = ?4",
            params![state.to_db_string(), now, address, path],
        )?;
        Ok(())
    }

    fn claimed_batches(&self, address: &str) -> StorageResult<Vec<FrontierBatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT claim_key, path FROM frontier WHERE address = ?1 AND state = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![address, UrlState::Claimed.to_db_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut batches: Vec<FrontierBatch> = Vec::new();
        for (claim_key, path) in rows {
            match batches.iter_mut().find(|b| b.claim_key == claim_key) {
                Some(batch) => batch.paths.push(path),
                None => batches.push(FrontierBatch {
                    claim_key,
                    paths: vec![path],
                }),
            }
        }
        Ok(batches)
    }

    fn count_by_state(&self, address: &str, state: UrlState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM frontier WHERE address = ?1 AND state = ?2",
            params![address, state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl ProgressTracker for SqliteStorage {
    fn get_progress(&self, crawl_id: &str) -> StorageResult<Option<ProgressEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT crawl_id, total_url_count, run_url_count, cycle
                 FROM progress WHERE crawl_id = ?1",
                params![crawl_id],
                |row| {
                    Ok(ProgressEntry {
                        crawl_id: row.get(0)?,
                        total_url_count: row.get::<_, i64>(1)? as u64,
                        run_url_count: row.get::<_, i64>(2)? as u64,
                        cycle: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;

        Ok(entry)
    }

    fn put_progress(&mut self, entry: &ProgressEntry) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO progress
             (crawl_id, total_url_count, run_url_count, cycle, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.crawl_id,
                entry.total_url_count as i64,
                entry.run_url_count as i64,
                entry.cycle as i64,
                now
            ],
        )?;
        Ok(())
    }
}

impl RunLedger for SqliteStorage {
    fn register_crawl(&mut self, ctx: &CrawlContext) -> StorageResult<()> {
        let keywords = serde_json::to_string(&ctx.path_keywords)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO crawls (crawl_id, frontier_address, base_url, path_keywords, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ctx.crawl_id,
                ctx.frontier_store_address,
                ctx.base_url,
                keywords,
                now
            ],
        )?;
        Ok(())
    }

    fn get_crawl(&self, crawl_id: &str) -> StorageResult<CrawlContext> {
        let row: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT crawl_id, frontier_address, base_url, path_keywords
                 FROM crawls WHERE crawl_id = ?1",
                params![crawl_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (crawl_id, frontier_store_address, base_url, keywords) =
            row.ok_or_else(|| StorageError::CrawlNotFound(crawl_id.to_string()))?;

        let path_keywords: Vec<String> = serde_json::from_str(&keywords)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(CrawlContext {
            crawl_id,
            frontier_store_address,
            base_url,
            path_keywords,
        })
    }

    fn create_run(
        &mut self,
        crawl_id: &str,
        config_hash: &str,
        continued_from: Option<i64>,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active: Option<i64> = tx
            .query_row(
                "SELECT id FROM runs WHERE crawl_id = ?1 AND status = ?2 LIMIT 1",
                params![crawl_id, RunStatus::Running.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(run_id) = active {
            return Err(StorageError::CrawlBusy {
                crawl_id: crawl_id.to_string(),
                run_id,
            });
        }

        tx.execute(
            "INSERT INTO runs (crawl_id, started_at, config_hash, status, continued_from)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                crawl_id,
                now,
                config_hash,
                RunStatus::Running.to_db_string(),
                continued_from
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(run_id)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn list_runs(&self, crawl_id: &str) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE crawl_id = ?1 ORDER BY id ASC",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let runs = stmt
            .query_map(params![crawl_id], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn interrupt_active_runs(&mut self, crawl_id: &str) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE crawl_id = ?3 AND status = ?4",
            params![
                RunStatus::Interrupted.to_db_string(),
                now,
                crawl_id,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "frontier:test";

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn registered(storage: &mut SqliteStorage, crawl_id: &str) -> CrawlContext {
        let ctx = CrawlContext::new(crawl_id, "https://example.com/");
        storage.register_crawl(&ctx).unwrap();
        ctx
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_enqueue_dedups_by_path() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let added = storage.enqueue(ADDR, &paths(&["/a", "/b", "/a"])).unwrap();
        assert_eq!(added, 2);

        let added = storage.enqueue(ADDR, &paths(&["/b", "/c"])).unwrap();
        assert_eq!(added, 1);

        assert_eq!(storage.count_by_state(ADDR, UrlState::Queued).unwrap(), 3);
    }

    #[test]
    fn test_frontier_addresses_are_isolated() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue("frontier:one", &paths(&["/a"])).unwrap();
        storage.enqueue("frontier:two", &paths(&["/a"])).unwrap();

        let batch = storage.claim_batch("frontier:one", "one#1", 10).unwrap();
        assert_eq!(batch.paths, paths(&["/a"]));
        assert_eq!(
            storage.count_by_state("frontier:two", UrlState::Queued).unwrap(),
            1
        );
    }

    #[test]
    fn test_claim_is_bounded_and_fifo() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .enqueue(ADDR, &paths(&["/1", "/2", "/3", "/4", "/5"]))
            .unwrap();

        let batch = storage.claim_batch(ADDR, "test#1", 3).unwrap();
        assert_eq!(batch.paths, paths(&["/1", "/2", "/3"]));
        assert_eq!(batch.claim_key, "test#1");
        assert_eq!(storage.count_by_state(ADDR, UrlState::Queued).unwrap(), 2);
        assert_eq!(storage.count_by_state(ADDR, UrlState::Claimed).unwrap(), 3);
    }

    #[test]
    fn test_claims_under_different_keys_never_overlap() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .enqueue(ADDR, &paths(&["/1", "/2", "/3", "/4"]))
            .unwrap();

        let first = storage.claim_batch(ADDR, "test#1", 2).unwrap();
        let second = storage.claim_batch(ADDR, "test#2", 10).unwrap();

        assert_eq!(first.paths, paths(&["/1", "/2"]));
        assert_eq!(second.paths, paths(&["/3", "/4"]));
    }

    #[test]
    fn test_reclaim_with_same_key_returns_same_batch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .enqueue(ADDR, &paths(&["/1", "/2", "/3", "/4"]))
            .unwrap();

        let first = storage.claim_batch(ADDR, "test#1", 2).unwrap();
        let retried = storage.claim_batch(ADDR, "test#1", 2).unwrap();

        assert_eq!(first.paths, retried.paths);
        assert_eq!(storage.count_by_state(ADDR, UrlState::Queued).unwrap(), 2);
    }

    #[test]
    fn test_reclaim_tops_up_a_short_batch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(ADDR, &paths(&["/1"])).unwrap();

        let first = storage.claim_batch(ADDR, "test#1", 3).unwrap();
        assert_eq!(first.len(), 1);

        storage.enqueue(ADDR, &paths(&["/2", "/3"])).unwrap();
        let retried = storage.claim_batch(ADDR, "test#1", 3).unwrap();
        assert_eq!(retried.paths, paths(&["/1", "/2", "/3"]));
    }

    #[test]
    fn test_claim_from_empty_frontier() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let batch = storage.claim_batch(ADDR, "test#1", 10).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_completed_paths_are_not_requeued() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(ADDR, &paths(&["/a"])).unwrap();
        storage.claim_batch(ADDR, "test#1", 1).unwrap();
        storage
            .complete_path(ADDR, "/a", UrlState::Visited)
            .unwrap();

        assert_eq!(storage.enqueue(ADDR, &paths(&["/a"])).unwrap(), 0);
        assert_eq!(storage.count_by_state(ADDR, UrlState::Visited).unwrap(), 1);
        assert!(storage.claim_batch(ADDR, "test#2", 1).unwrap().is_empty());
    }

    #[test]
    fn test_reclaim_skips_paths_already_finished() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(ADDR, &paths(&["/a", "/b"])).unwrap();
        storage.claim_batch(ADDR, "test#1", 2).unwrap();
        storage
            .complete_path(ADDR, "/a", UrlState::Visited)
            .unwrap();

        let retried = storage.claim_batch(ADDR, "test#1", 2).unwrap();
        assert_eq!(retried.paths, paths(&["/b"]));
    }

    #[test]
    fn test_claimed_batches_groups_unfinished_paths_by_key() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .enqueue(ADDR, &paths(&["/1", "/2", "/3", "/4", "/5"]))
            .unwrap();
        storage.claim_batch(ADDR, "test#1", 2).unwrap();
        storage.claim_batch(ADDR, "test#2", 2).unwrap();
        storage
            .complete_path(ADDR, "/1", UrlState::Visited)
            .unwrap();
        storage.complete_path(ADDR, "/3", UrlState::Failed).unwrap();
        storage
            .complete_path(ADDR, "/4", UrlState::Visited)
            .unwrap();

        let batches = storage.claimed_batches(ADDR).unwrap();
        assert_eq!(
            batches,
            vec![FrontierBatch {
                claim_key: "test#1".to_string(),
                paths: paths(&["/2"]),
            }]
        );
        assert!(storage.claimed_batches("frontier:other").unwrap().is_empty());
    }

    #[test]
    fn test_progress_get_and_put() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert_eq!(storage.get_progress("abc").unwrap(), None);

        let entry = ProgressEntry {
            crawl_id: "abc".to_string(),
            total_url_count: 6,
            run_url_count: 3,
            cycle: 2,
        };
        storage.put_progress(&entry).unwrap();
        assert_eq!(storage.get_progress("abc").unwrap(), Some(entry.clone()));

        let overwritten = entry.start_continuation();
        storage.put_progress(&overwritten).unwrap();
        assert_eq!(storage.get_progress("abc").unwrap(), Some(overwritten));
    }

    #[test]
    fn test_register_and_get_crawl() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let ctx = CrawlContext::new("abc", "https://example.com/docs/")
            .with_path_keywords(vec!["guide".to_string()]);
        storage.register_crawl(&ctx).unwrap();

        assert_eq!(storage.get_crawl("abc").unwrap(), ctx);
        assert!(matches!(
            storage.get_crawl("missing"),
            Err(StorageError::CrawlNotFound(_))
        ));
    }

    #[test]
    fn test_only_one_running_run_per_crawl() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        registered(&mut storage, "abc");
        registered(&mut storage, "other");

        let run_id = storage.create_run("abc", "hash", None).unwrap();
        let busy = storage.create_run("abc", "hash", None);
        assert!(matches!(
            busy,
            Err(StorageError::CrawlBusy { run_id: id, .. }) if id == run_id
        ));

        // Other crawls are unaffected
        assert!(storage.create_run("other", "hash", None).is_ok());

        storage.finish_run(run_id, RunStatus::Continued).unwrap();
        let next = storage.create_run("abc", "hash", Some(run_id)).unwrap();

        let record = storage.get_run(next).unwrap();
        assert_eq!(record.continued_from, Some(run_id));
        assert_eq!(record.status, RunStatus::Running);
    }

    #[test]
    fn test_list_and_finish_runs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        registered(&mut storage, "abc");

        let first = storage.create_run("abc", "hash", None).unwrap();
        storage.finish_run(first, RunStatus::Continued).unwrap();
        let second = storage.create_run("abc", "hash", Some(first)).unwrap();
        storage.finish_run(second, RunStatus::Completed).unwrap();

        let runs = storage.list_runs("abc").unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Continued);
        assert_eq!(runs[1].status, RunStatus::Completed);
        assert!(runs[1].finished_at.is_some());

        assert!(matches!(
            storage.finish_run(999, RunStatus::Failed),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[test]
    fn test_interrupt_active_runs_releases_the_crawl() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        registered(&mut storage, "abc");

        let stale = storage.create_run("abc", "hash", None).unwrap();
        assert_eq!(storage.interrupt_active_runs("abc").unwrap(), 1);
        assert_eq!(
            storage.get_run(stale).unwrap().status,
            RunStatus::Interrupted
        );

        assert!(storage.create_run("abc", "hash", None).is_ok());
    }
}
