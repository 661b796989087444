//! ClassificationCache: SQLite-backed, write-once store of classification results.
//!
//! Keyed by content fingerprint. A `put` either inserts, is a no-op for an
//! identical payload, or is rejected as a consistency violation; only a
//! forced put may replace a stored row.

mod rows;
pub mod schema;

use rows::EncodedRow;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::errors::CacheError;
use crate::model::{CachedResult, Fingerprint, FinalLabel};
use schema::CLASSIFICATION_SCHEMA;

/// What a `put` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// Identical payload already stored.
    Unchanged,
    /// Forced put replaced a divergent row.
    Overwritten,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub by_label: BTreeMap<FinalLabel, u64>,
}

#[derive(Clone)]
pub struct ClassificationCache {
    conn: Arc<Mutex<Connection>>,
}

impl ClassificationCache {
    /// Open a file-backed cache, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory cache (tests, dry runs).
    pub fn memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        // WAL for file-backed DBs (no-op for in-memory)
        let _ = conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()));
        conn.busy_timeout(Duration::from_millis(5000))?;
        conn.execute_batch(CLASSIFICATION_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Storage("cache connection lock poisoned".into()))
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResult>, CacheError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT verdict_set, category_scores, final_label, computed_at
                 FROM classifications WHERE fingerprint = ?1",
                [fingerprint.as_str()],
                EncodedRow::from_row,
            )
            .optional()?;
        drop(conn);
        row.map(|r| r.decode(fingerprint.as_str())).transpose()
    }

    /// Write-once insert. Same payload again is a no-op; a different payload
    /// is a `ConsistencyViolation` unless `force` is set.
    pub fn put(
        &self,
        fingerprint: &Fingerprint,
        result: &CachedResult,
        force: bool,
    ) -> Result<PutOutcome, CacheError> {
        if result.fingerprint != *fingerprint {
            return Err(CacheError::ConsistencyViolation {
                fingerprint: fingerprint.to_string(),
                field: "fingerprint".into(),
            });
        }
        let encoded = EncodedRow::encode(result)?;
        let conn = self.lock()?;

        // BEGIN IMMEDIATE takes the write lock up front
        conn.execute("BEGIN IMMEDIATE", [])?;
        let outcome = Self::put_inner(&conn, fingerprint, &encoded, force);
        match &outcome {
            Ok(_) => {
                if let Err(e) = conn.execute("COMMIT", []) {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e.into());
                }
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }
        outcome
    }

    fn put_inner(
        conn: &Connection,
        fingerprint: &Fingerprint,
        encoded: &EncodedRow,
        force: bool,
    ) -> Result<PutOutcome, CacheError> {
        let inserted = conn.execute(
            "INSERT INTO classifications (
                fingerprint, verdict_set, category_scores, final_label, computed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(fingerprint) DO NOTHING",
            params![
                fingerprint.as_str(),
                encoded.verdict_set,
                encoded.category_scores,
                encoded.final_label,
                encoded.computed_at,
            ],
        )?;
        if inserted == 1 {
            return Ok(PutOutcome::Inserted);
        }

        let stored = conn.query_row(
            "SELECT verdict_set, category_scores, final_label, computed_at
             FROM classifications WHERE fingerprint = ?1",
            [fingerprint.as_str()],
            EncodedRow::from_row,
        )?;
        let Some(field) = stored.diverging_field(encoded) else {
            return Ok(PutOutcome::Unchanged);
        };
        if !force {
            return Err(CacheError::ConsistencyViolation {
                fingerprint: fingerprint.to_string(),
                field: field.to_string(),
            });
        }
        conn.execute(
            "UPDATE classifications
             SET verdict_set = ?2, category_scores = ?3, final_label = ?4, computed_at = ?5
             WHERE fingerprint = ?1",
            params![
                fingerprint.as_str(),
                encoded.verdict_set,
                encoded.category_scores,
                encoded.final_label,
                encoded.computed_at,
            ],
        )?;
        Ok(PutOutcome::Overwritten)
    }

    /// `get` on the blocking pool.
    pub async fn get_async(
        &self,
        fingerprint: Fingerprint,
    ) -> Result<Option<CachedResult>, CacheError> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.get(&fingerprint))
            .await
            .map_err(|e| CacheError::Storage(format!("cache read task failed: {}", e)))?
    }

    /// `put` on the blocking pool, so the durable write never stalls the runtime.
    pub async fn put_async(
        &self,
        result: CachedResult,
        force: bool,
    ) -> Result<PutOutcome, CacheError> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.put(&result.fingerprint, &result, force))
            .await
            .map_err(|e| CacheError::Storage(format!("cache write task failed: {}", e)))?
    }

    pub fn len(&self) -> Result<u64, CacheError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM classifications", [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT final_label, COUNT(*) FROM classifications GROUP BY final_label ORDER BY final_label",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut stats = CacheStats::default();
        for row in rows {
            let (label, count) = row?;
            let label: FinalLabel = label.parse().map_err(CacheError::Storage)?;
            stats.entries += count as u64;
            stats.by_label.insert(label, count as u64);
        }
        Ok(stats)
    }

    /// Every stored result, ordered by fingerprint.
    pub fn list(&self) -> Result<Vec<CachedResult>, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, verdict_set, category_scores, final_label, computed_at
             FROM classifications ORDER BY fingerprint",
        )?;
        let rows = stmt.query_map([], |row| {
            let fp: String = row.get(0)?;
            let encoded = EncodedRow {
                verdict_set: row.get(1)?,
                category_scores: row.get(2)?,
                final_label: row.get(3)?,
                computed_at: row.get(4)?,
            };
            Ok((fp, encoded))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (fp, encoded) = row?;
            out.push(encoded.decode(&fp)?);
        }
        Ok(out)
    }
}
