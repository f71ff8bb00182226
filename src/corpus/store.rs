//! SQLite corpus store with migrations
//!
//! Durable mapping from passage id to text and metadata, shared by both
//! indexes and the source of truth for rebuilds. Generations are recorded
//! here with a status lifecycle (building -> active -> retired); exactly one
//! generation is active at a time.

use crate::corpus::Passage;
use crate::error::{RagnarError, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const MIGRATIONS: &[&str] = &[
    // v1: documents, generations, passages
    "
    CREATE TABLE documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        blob_hash TEXT NOT NULL,
        has_pages INTEGER NOT NULL,
        added_at TEXT NOT NULL
    );

    CREATE TABLE generations (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('building', 'active', 'retired')),
        document_count INTEGER NOT NULL,
        passage_count INTEGER NOT NULL
    );

    CREATE TABLE passages (
        generation_id TEXT NOT NULL REFERENCES generations(id) ON DELETE CASCADE,
        id INTEGER NOT NULL,
        document TEXT NOT NULL,
        page INTEGER,
        position INTEGER NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        text TEXT NOT NULL,
        PRIMARY KEY (generation_id, id)
    );
    ",
];

/// A stored source document
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub name: String,
    pub blob_hash: String,
    pub has_pages: bool,
    pub added_at: DateTime<Utc>,
}

/// Corpus store statistics
#[derive(Debug)]
pub struct StoreStats {
    pub document_count: usize,
    pub generation_count: usize,
    pub active_passage_count: usize,
}

/// Corpus store backed by SQLite
pub struct CorpusStore {
    pool: DbPool,
}

impl CorpusStore {
    /// Open (or create) the corpus database
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagnarError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| RagnarError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| RagnarError::Config(format!("Failed to get connection: {}", e)))?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| RagnarError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying corpus store migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Register a source document, replacing a previous version of the same name
    pub fn upsert_document(&self, name: &str, blob_hash: &str, has_pages: bool) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO documents (name, blob_hash, has_pages, added_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                 blob_hash = excluded.blob_hash,
                 has_pages = excluded.has_pages,
                 added_at = excluded.added_at",
            params![name, blob_hash, has_pages, Utc::now().to_rfc3339()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM documents WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// All registered documents in insertion order
    pub fn documents(&self) -> Result<Vec<DocumentRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, blob_hash, has_pages, added_at FROM documents ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, name, blob_hash, has_pages, added_at) = row?;
            let added_at = DateTime::parse_from_rfc3339(&added_at)
                .map_err(|e| RagnarError::Config(format!("Bad timestamp in documents: {}", e)))?
                .with_timezone(&Utc);
            documents.push(DocumentRecord {
                id,
                name,
                blob_hash,
                has_pages,
                added_at,
            });
        }
        Ok(documents)
    }

    /// Record the start of a generation build
    pub fn begin_generation(&self, generation: Uuid, document_count: usize) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO generations (id, created_at, status, document_count, passage_count)
             VALUES (?1, ?2, 'building', ?3, 0)",
            params![
                generation.to_string(),
                Utc::now().to_rfc3339(),
                document_count as i64
            ],
        )?;
        Ok(())
    }

    /// Store the complete passage sequence of a generation
    pub fn insert_passages(&self, generation: Uuid, passages: &[Passage]) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO passages (generation_id, id, document, page, position, start_char, end_char, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for passage in passages {
                stmt.execute(params![
                    generation.to_string(),
                    passage.id as i64,
                    passage.document,
                    passage.page,
                    passage.position,
                    passage.start as i64,
                    passage.end as i64,
                    passage.text,
                ])?;
            }
        }

        tx.execute(
            "UPDATE generations SET passage_count = ?2 WHERE id = ?1",
            params![generation.to_string(), passages.len() as i64],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Atomically make `generation` the active one, retiring the previous
    pub fn mark_active(&self, generation: Uuid) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE generations SET status = 'retired' WHERE status = 'active'",
            [],
        )?;
        tx.execute(
            "UPDATE generations SET status = 'active' WHERE id = ?1",
            params![generation.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// The currently active generation, if any
    pub fn active_generation(&self) -> Result<Option<Uuid>> {
        let conn = self.get_conn()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM generations WHERE status = 'active'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            None => Ok(None),
            Some(id) => Uuid::parse_str(&id)
                .map(Some)
                .map_err(|e| RagnarError::Config(format!("Bad generation id in store: {}", e))),
        }
    }

    /// Load a generation's passages ordered by id
    pub fn passages(&self, generation: Uuid) -> Result<Vec<Passage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document, page, position, start_char, end_char, text
             FROM passages WHERE generation_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![generation.to_string()], |row| {
            Ok(Passage {
                id: row.get::<_, i64>(0)? as u64,
                document: row.get(1)?,
                page: row.get(2)?,
                position: row.get(3)?,
                start: row.get::<_, i64>(4)? as usize,
                end: row.get::<_, i64>(5)? as usize,
                text: row.get(6)?,
            })
        })?;

        let mut passages = Vec::new();
        for row in rows {
            passages.push(row?);
        }
        Ok(passages)
    }

    /// Delete a generation and its passages (failed or pruned builds).
    ///
    /// Passages are deleted explicitly rather than via cascade: the
    /// foreign_keys pragma is per-connection and pooled connections beyond
    /// the first never ran it.
    pub fn delete_generation(&self, generation: Uuid) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM passages WHERE generation_id = ?1",
            params![generation.to_string()],
        )?;
        tx.execute(
            "DELETE FROM generations WHERE id = ?1",
            params![generation.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Generations that are no longer active nor building
    pub fn retired_generations(&self) -> Result<Vec<Uuid>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM generations WHERE status = 'retired'")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut generations = Vec::new();
        for row in rows {
            let id = row?;
            generations.push(
                Uuid::parse_str(&id)
                    .map_err(|e| RagnarError::Config(format!("Bad generation id: {}", e)))?,
            );
        }
        Ok(generations)
    }

    /// Store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let document_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let generation_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM generations", [], |row| row.get(0))?;

        let active_passage_count: i64 = conn
            .query_row(
                "SELECT passage_count FROM generations WHERE status = 'active'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        Ok(StoreStats {
            document_count: document_count as usize,
            generation_count: generation_count as usize,
            active_passage_count: active_passage_count as usize,
        })
    }
}
