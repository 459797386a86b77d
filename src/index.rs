//! On-disk embedding index.
//!
//! The index is a single SQLite file (default
//! `vectorstores/codebase.sqlite`) holding the chunks produced by the
//! embed-and-store pipeline and one embedding vector per chunk. Retrieval
//! is brute-force cosine similarity in Rust over every stored vector.
//!
//! # Schema
//!
//! | Table | Contents |
//! |-------|----------|
//! | `chunks` | `id`, `source`, `chunk_index`, `text`, `hash` |
//! | `vectors` | `chunk_id`, `embedding` (little-endian f32 BLOB) |
//! | `index_meta` | `model`, `dims`, `built_at`, `chunk_count` |
//!
//! [`EmbeddingIndex::build`] replaces the entire contents inside one
//! transaction, so a concurrent reader sees either the previous index or
//! the new one.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, RetrievedChunk};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no embedding index found at {0}; run embed-and-store first")]
    Missing(PathBuf),
    #[error("index was built with model '{indexed}' but the query embedder is '{query}'")]
    ModelMismatch { indexed: String, query: String },
    #[error("got {vectors} vectors for {chunks} chunks")]
    LengthMismatch { chunks: usize, vectors: usize },
}

/// Summary of a built index.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub built_at: Option<String>,
}

/// A handle on the SQLite embedding index.
pub struct EmbeddingIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl EmbeddingIndex {
    /// Open the index at `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create index directory: {}", parent.display())
                })?;
            }
        }

        let index = Self::connect(path, true).await?;
        index.migrate().await?;
        Ok(index)
    }

    /// Open an existing index for querying.
    ///
    /// Fails with [`IndexError::Missing`] if nothing has been built at `path`.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IndexError::Missing(path.to_path_buf()).into());
        }
        let index = Self::connect(path, false).await?;
        index.migrate().await?;
        Ok(index)
    }

    async fn connect(path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open index: {}", path.display()))?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                UNIQUE(source, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the whole index with `chunks` and their `vectors`.
    pub async fn build(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
        dims: usize,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, source, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }

        let meta = [
            ("model", model.to_string()),
            ("dims", dims.to_string()),
            ("built_at", Utc::now().to_rfc3339()),
            ("chunk_count", chunks.len().to_string()),
        ];
        for (key, value) in meta {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            path = %self.path.display(),
            chunks = chunks.len(),
            model,
            "index rebuilt"
        );
        Ok(())
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Fail if the index was built with a different embedding model.
    pub async fn ensure_model(&self, model: &str) -> Result<()> {
        if let Some(indexed) = self.meta("model").await? {
            if indexed != model {
                return Err(IndexError::ModelMismatch {
                    indexed,
                    query: model.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Return the `top_k` chunks most similar to `query_vec`.
    ///
    /// Ranked by cosine similarity descending, ties broken by
    /// `(source, chunk_index)` ascending.
    pub async fn query(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.chunk_index, c.text, v.embedding
            FROM vectors v
            JOIN chunks c ON c.id = v.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                RetrievedChunk {
                    chunk_id: row.get("id"),
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &vec),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(IndexStats {
            chunk_count: chunk_count as usize,
            model: self.meta("model").await?,
            dims: self.meta("dims").await?.and_then(|d| d.parse().ok()),
            built_at: self.meta("built_at").await?,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(source: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("{}-{}", source, index),
            source: source.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_index() {
        let tmp = TempDir::new().unwrap();
        let err = EmbeddingIndex::load(&tmp.path().join("nope.sqlite"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Missing(_))));
    }

    #[tokio::test]
    async fn test_build_and_query_ranked() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("idx/codebase.sqlite");
        let index = EmbeddingIndex::open(&path).await.unwrap();

        let chunks = vec![chunk("a.py", 0, "alpha"), chunk("b.py", 0, "beta"), chunk("c.py", 0, "gamma")];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]];
        index.build(&chunks, &vectors, "test-model", 2).await.unwrap();

        let results = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "alpha");
        assert_eq!(results[1].text, "gamma");
        assert!(results[0].score > results[1].score);

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.model.as_deref(), Some("test-model"));
        assert_eq!(stats.dims, Some(2));
        index.close().await;
    }

    #[tokio::test]
    async fn test_rebuild_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("codebase.sqlite");
        let index = EmbeddingIndex::open(&path).await.unwrap();

        index
            .build(&[chunk("old.py", 0, "old")], &[vec![1.0]], "m", 1)
            .await
            .unwrap();
        index
            .build(&[chunk("new.py", 0, "new")], &[vec![1.0]], "m", 1)
            .await
            .unwrap();

        let results = index.query(&[1.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "new.py");
    }

    #[tokio::test]
    async fn test_ties_break_by_source() {
        let tmp = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&tmp.path().join("i.sqlite")).await.unwrap();
        let chunks = vec![chunk("z.py", 0, "z"), chunk("a.py", 1, "a1"), chunk("a.py", 0, "a0")];
        let vectors = vec![vec![1.0], vec![1.0], vec![1.0]];
        index.build(&chunks, &vectors, "m", 1).await.unwrap();

        let order: Vec<String> = index
            .query(&[1.0], 3)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(order, vec!["a0", "a1", "z"]);
    }

    #[tokio::test]
    async fn test_model_mismatch() {
        let tmp = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&tmp.path().join("i.sqlite")).await.unwrap();
        index.build(&[chunk("a", 0, "a")], &[vec![1.0]], "model-a", 1).await.unwrap();

        assert!(index.ensure_model("model-a").await.is_ok());
        let err = index.ensure_model("model-b").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::ModelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_length_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&tmp.path().join("i.sqlite")).await.unwrap();
        let err = index.build(&[chunk("a", 0, "a")], &[], "m", 1).await.unwrap_err();
        assert!(err.to_string().contains("got 0 vectors for 1 chunks"));
    }
}
