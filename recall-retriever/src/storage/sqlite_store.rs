//! SQLite implementation of [`VectorStore`]
//!
//! ## Database Schema
//!
//! ```sql
//! -- One row per chunk vector
//! CREATE TABLE vectors (
//!     id TEXT PRIMARY KEY,             -- "<document>#<chunk index>"
//!     embedding BLOB NOT NULL,         -- little-endian f32 per dimension
//!     metadata TEXT NOT NULL,          -- JSON object of string values
//!     content TEXT                     -- chunk text, NULL when unknown
//! );
//!
//! -- Single-row graph snapshot
//! CREATE TABLE graph (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     data BLOB NOT NULL
//! );
//!
//! -- Single-row embedder state (e.g. a TF-IDF vocabulary)
//! CREATE TABLE embedder_state (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     data BLOB NOT NULL
//! );
//! ```
//!
//! Databases created before the `content` column existed are upgraded in
//! place when opened.

use super::{Snapshot, Vector, VectorStore, decode_embedding, encode_embedding};
use anyhow::{Context, Result};
use async_trait::async_trait;
use recall_context::Metadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// SQLite-backed vector store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool, Some(path.to_path_buf())).await
    }

    /// Opens a private in-memory database for testing.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is its own database, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::new_with_pool(pool, None).await
    }

    async fn new_with_pool(pool: SqlitePool, path: Option<PathBuf>) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, path })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL,
                content TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS graph (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedder_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        let columns = sqlx::query("PRAGMA table_info(vectors)")
            .fetch_all(pool)
            .await?;
        let has_content = columns
            .iter()
            .any(|row| row.get::<String, _>("name") == "content");
        if !has_content {
            tracing::info!("Adding content column to existing vectors table");
            sqlx::query("ALTER TABLE vectors ADD COLUMN content TEXT")
                .execute(pool)
                .await?;
        }

        Ok(())
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert_vectors(tx: &mut Transaction<'_, Sqlite>, vectors: &[Vector]) -> Result<()> {
        for vector in vectors {
            let metadata = serde_json::to_string(&vector.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO vectors (id, embedding, metadata, content)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    content = excluded.content
                "#,
            )
            .bind(&vector.id)
            .bind(encode_embedding(&vector.embedding))
            .bind(metadata)
            .bind(vector.content.as_deref())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn delete_vectors(tx: &mut Transaction<'_, Sqlite>, ids: &[String]) -> Result<()> {
        for id in ids {
            sqlx::query("DELETE FROM vectors WHERE id = ?1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn put_singleton(tx: &mut Transaction<'_, Sqlite>, table: &str, data: &[u8]) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (id, data) VALUES (1, ?1) ON CONFLICT(id) DO UPDATE SET data = excluded.data"
        );
        sqlx::query(&sql).bind(data).execute(&mut **tx).await?;
        Ok(())
    }

    async fn get_singleton(&self, table: &str) -> Result<Option<Vec<u8>>> {
        let sql = format!("SELECT data FROM {table} WHERE id = 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>("data")))
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn save(&self, vectors: &[Vector]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_vectors(&mut tx, vectors).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Vector>> {
        let rows = sqlx::query("SELECT id, embedding, metadata, content FROM vectors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata");
            let content: Option<String> = row.get("content");

            let embedding = decode_embedding(&embedding_bytes)
                .with_context(|| format!("Corrupt embedding for vector {id}"))?;
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for vector {id}"))?;

            vectors.push(Vector {
                id,
                embedding,
                metadata,
                content,
            });
        }
        Ok(vectors)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::delete_vectors(&mut tx, ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_graph(&self, data: &[u8]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::put_singleton(&mut tx, "graph", data).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_graph(&self) -> Result<Option<Vec<u8>>> {
        self.get_singleton("graph").await
    }

    async fn save_embedder_state(&self, data: &[u8]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::put_singleton(&mut tx, "embedder_state", data).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_embedder_state(&self) -> Result<Option<Vec<u8>>> {
        self.get_singleton("embedder_state").await
    }

    async fn save_snapshot(&self, snapshot: Snapshot<'_>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::delete_vectors(&mut tx, snapshot.removed).await?;
        Self::upsert_vectors(&mut tx, snapshot.vectors).await?;
        Self::put_singleton(&mut tx, "graph", snapshot.graph).await?;
        if let Some(state) = snapshot.embedder_state {
            Self::put_singleton(&mut tx, "embedder_state", state).await?;
        }
        tx.commit().await?;
        tracing::debug!(
            "Saved snapshot: {} vectors, {} removed, {} graph bytes",
            snapshot.vectors.len(),
            snapshot.removed.len(),
            snapshot.graph.len()
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
