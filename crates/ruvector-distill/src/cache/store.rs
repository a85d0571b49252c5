//! SQLite-backed document cache
//!
//! One row per fingerprint: saving any phase replaces whatever was stored for
//! that document before. A load only hits when the stored phase matches and
//! the entry is younger than the TTL.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ChunkAnalysis, DocumentFingerprint, LogicalSection};

use super::clock::{Clock, SystemClock};
use super::{CachePhase, CachedData};

/// Persistent, phase-keyed cache of stage outputs
pub struct DocumentCache {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub ttl_hours: i64,
}

impl DocumentCache {
    /// Create or open the cache database at the given path
    pub fn open<P: AsRef<Path>>(path: P, ttl_hours: i64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Cache(format!("Failed to open cache database: {}", e)))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )
        .map_err(|e| Error::Cache(format!("Failed to set pragmas: {}", e)))?;

        Self::from_connection(conn, ttl_hours)
    }

    /// Open the cache, or run without one. An unwritable directory or a
    /// locked or corrupt database is logged and yields `None`.
    pub fn open_or_disabled<P: AsRef<Path>>(path: P, ttl_hours: i64) -> Option<Self> {
        let path = path.as_ref();
        match Self::open(path, ttl_hours) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(
                    "Document cache at {} unavailable, continuing without it: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Create an in-memory cache (for tests and one-shot runs)
    pub fn in_memory(ttl_hours: i64) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Cache(format!("Failed to open in-memory cache: {}", e)))?;
        Self::from_connection(conn, ttl_hours)
    }

    fn from_connection(conn: Connection, ttl_hours: i64) -> Result<Self> {
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: Duration::hours(ttl_hours),
            clock: Arc::new(SystemClock),
        };
        cache.migrate()?;
        Ok(cache)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS document_cache (
                fingerprint TEXT PRIMARY KEY,
                phase TEXT NOT NULL,
                data TEXT NOT NULL,
                saved_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Cache(format!("Failed to create cache table: {}", e)))?;
        Ok(())
    }

    /// Store stage output for a document, replacing any previous entry.
    /// Failures are logged, never returned.
    pub fn save(&self, fingerprint: &DocumentFingerprint, data: &CachedData) {
        match self.try_save(fingerprint, data) {
            Ok(()) => tracing::debug!(
                "Cached {} ({} items) for {}",
                data.phase(),
                data.len(),
                fingerprint
            ),
            Err(e) => tracing::warn!("Cache write failed for {}: {}", fingerprint, e),
        }
    }

    fn try_save(&self, fingerprint: &DocumentFingerprint, data: &CachedData) -> Result<()> {
        let json = serde_json::to_string(data)?;
        let saved_at = self.clock.now().timestamp_millis();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO document_cache (fingerprint, phase, data, saved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![fingerprint.as_str(), data.phase().as_str(), json, saved_at],
        )?;
        Ok(())
    }

    /// Load stage output, or `None` on absence, phase mismatch, expiry or any
    /// storage error
    pub fn load(&self, fingerprint: &DocumentFingerprint, phase: CachePhase) -> Option<CachedData> {
        match self.try_load(fingerprint, phase) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", fingerprint, e);
                None
            }
        }
    }

    fn try_load(
        &self,
        fingerprint: &DocumentFingerprint,
        phase: CachePhase,
    ) -> Result<Option<CachedData>> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT phase, data, saved_at FROM document_cache WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((stored_phase, json, saved_at)) = row else {
            tracing::debug!("Cache miss ({}): no entry for {}", phase, fingerprint);
            return Ok(None);
        };

        if CachePhase::parse(&stored_phase) != Some(phase) {
            tracing::debug!(
                "Cache miss ({}): entry for {} holds {}",
                phase,
                fingerprint,
                stored_phase
            );
            return Ok(None);
        }

        let saved_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(saved_at)
            .single()
            .ok_or_else(|| Error::Cache(format!("Invalid timestamp {}", saved_at)))?;
        let age = self.clock.now().signed_duration_since(saved_at);
        if age >= self.ttl {
            tracing::debug!(
                "Cache miss ({}): entry for {} expired ({}h old)",
                phase,
                fingerprint,
                age.num_hours()
            );
            self.invalidate(fingerprint);
            return Ok(None);
        }

        let data: CachedData = serde_json::from_str(&json)?;
        if data.phase() != phase {
            return Err(Error::Cache(format!(
                "Entry for {} is tagged {} but decodes as {}",
                fingerprint,
                phase,
                data.phase()
            )));
        }

        tracing::debug!("Cache hit ({}) for {}", phase, fingerprint);
        Ok(Some(data))
    }

    /// Cached chunk analyses, if present and fresh
    pub fn load_analyses(&self, fingerprint: &DocumentFingerprint) -> Option<Vec<ChunkAnalysis>> {
        match self.load(fingerprint, CachePhase::Analyses)? {
            CachedData::Analyses(analyses) => Some(analyses),
            _ => None,
        }
    }

    /// Cached logical sections, if present and fresh
    pub fn load_sections(&self, fingerprint: &DocumentFingerprint) -> Option<Vec<LogicalSection>> {
        match self.load(fingerprint, CachePhase::Sections)? {
            CachedData::Sections(sections) => Some(sections),
            _ => None,
        }
    }

    /// Drop the entry for a document. Returns whether one existed.
    pub fn invalidate(&self, fingerprint: &DocumentFingerprint) -> bool {
        let conn = self.conn.lock();
        match conn.execute(
            "DELETE FROM document_cache WHERE fingerprint = ?1",
            params![fingerprint.as_str()],
        ) {
            Ok(n) => n > 0,
            Err(e) => {
                tracing::warn!("Cache invalidate failed for {}: {}", fingerprint, e);
                false
            }
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute("DELETE FROM document_cache", []) {
            tracing::warn!("Cache clear failed: {}", e);
        } else {
            tracing::info!("Document cache cleared");
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let conn = self.conn.lock();
        let entries = conn
            .query_row("SELECT COUNT(*) FROM document_cache", [], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap_or(0);

        CacheStats {
            entries: entries.max(0) as usize,
            ttl_hours: self.ttl.num_hours(),
        }
    }
}
