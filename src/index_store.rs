//! On-disk persistence for the vector index.
//!
//! The artifact is a single SQLite file (see [`crate::migrate`] for the
//! layout). [`IndexStore::persist`] builds a complete new artifact in a
//! sibling `*.tmp` file and renames it over the target, so readers and
//! crash recovery only ever see a whole artifact. [`IndexStore::load`]
//! refuses artifacts written by another format version, another vector
//! width or another embedding model.

use sqlx::Row;
use std::path::{Path, PathBuf};
use talk_to_docs_core::embedding::{blob_to_vec, vec_to_blob};
use talk_to_docs_core::index::VectorIndex;
use talk_to_docs_core::models::{ChunkMetadata, IndexEntry};
use talk_to_docs_core::{Error, Result};
use tokio::sync::Mutex;

use crate::db;
use crate::migrate::{self, FORMAT_VERSION};

/// What an artifact says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub format_version: i64,
    pub dims: usize,
    pub model: String,
    pub entries: usize,
}

pub struct IndexStore {
    path: PathBuf,
    /// Serializes writers; each persist replaces the whole artifact.
    write_lock: Mutex<()>,
}

fn storage(e: impl std::fmt::Display) -> Error {
    Error::storage(e.to_string())
}

fn unreadable(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::incompatible(format!("cannot open {} as an index artifact: {}", path.display(), e))
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        self.path.with_file_name(format!("{}.tmp", name))
    }

    /// Write every entry of `index` to the artifact, replacing it.
    pub async fn persist(&self, index: &VectorIndex, model: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let entries = index.snapshot();
        let tmp = self.temp_path();

        if tmp.exists() {
            tokio::fs::remove_file(&tmp).await.map_err(storage)?;
        }

        let pool = db::connect(&tmp, true).await.map_err(storage)?;
        let written = write_artifact(&pool, index.dims(), model, &entries).await;
        pool.close().await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage(e));
        }

        tokio::fs::rename(&tmp, &self.path).await.map_err(storage)?;
        tracing::debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "index persisted"
        );
        Ok(entries.len())
    }

    /// Load the artifact for an index of width `dims` built with `model`.
    ///
    /// A missing artifact yields an empty index.
    ///
    /// # Errors
    ///
    /// [`Error::IncompatibleIndex`] if the file is not an index artifact,
    /// was written by another format version, dimension or model, or
    /// contains a malformed row.
    pub async fn load(&self, dims: usize, model: &str) -> Result<VectorIndex> {
        if !self.exists() {
            return Ok(VectorIndex::new(dims));
        }

        let pool = db::connect(&self.path, false)
            .await
            .map_err(|e| unreadable(&self.path, e))?;
        let loaded = read_artifact(&pool, dims, model).await;
        pool.close().await;
        let index = loaded?;

        tracing::debug!(
            path = %self.path.display(),
            entries = index.size(),
            "index loaded"
        );
        Ok(index)
    }

    /// Read the artifact's header without loading its vectors.
    pub async fn read_header(&self) -> Result<Option<ArtifactHeader>> {
        if !self.exists() {
            return Ok(None);
        }
        let pool = db::connect(&self.path, false)
            .await
            .map_err(|e| unreadable(&self.path, e))?;
        let header = read_header(&pool).await;
        pool.close().await;
        header.map(Some)
    }

    /// Delete the artifact if present.
    pub async fn remove(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage(e)),
        }
    }
}

async fn write_artifact(
    pool: &sqlx::SqlitePool,
    dims: usize,
    model: &str,
    entries: &[IndexEntry],
) -> anyhow::Result<()> {
    migrate::create_schema(pool).await?;

    let mut tx = pool.begin().await?;
    for (key, value) in [
        ("format_version", FORMAT_VERSION.to_string()),
        ("dims", dims.to_string()),
        ("model", model.to_string()),
    ] {
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    for (seq, entry) in entries.iter().enumerate() {
        sqlx::query(
            "INSERT INTO entries (seq, chunk_id, vector, metadata_json) VALUES (?, ?, ?, ?)",
        )
        .bind(seq as i64)
        .bind(&entry.chunk_id)
        .bind(vec_to_blob(&entry.vector))
        .bind(serde_json::to_string(&entry.metadata)?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn meta_value(pool: &sqlx::SqlitePool, key: &str) -> Result<String> {
    sqlx::query_scalar::<_, String>("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::incompatible(format!("not an index artifact: {}", e)))?
        .ok_or_else(|| Error::incompatible(format!("artifact is missing '{}'", key)))
}

async fn read_header(pool: &sqlx::SqlitePool) -> Result<ArtifactHeader> {
    let format_version = meta_value(pool, "format_version")
        .await?
        .parse::<i64>()
        .map_err(|_| Error::incompatible("format_version is not a number"))?;
    let dims = meta_value(pool, "dims")
        .await?
        .parse::<usize>()
        .map_err(|_| Error::incompatible("dims is not a number"))?;
    let model = meta_value(pool, "model").await?;
    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::incompatible(format!("artifact has no entries table: {}", e)))?;

    Ok(ArtifactHeader {
        format_version,
        dims,
        model,
        entries: entries.max(0) as usize,
    })
}

fn malformed_row(e: sqlx::Error) -> Error {
    Error::incompatible(format!("malformed entry row: {}", e))
}

async fn read_artifact(pool: &sqlx::SqlitePool, dims: usize, model: &str) -> Result<VectorIndex> {
    let header = read_header(pool).await?;
    if header.format_version != FORMAT_VERSION {
        return Err(Error::incompatible(format!(
            "format version {} (expected {})",
            header.format_version, FORMAT_VERSION
        )));
    }
    if header.dims != dims {
        return Err(Error::incompatible(format!(
            "index has {}-dimensional vectors but the embedder produces {}",
            header.dims, dims
        )));
    }
    if header.model != model {
        return Err(Error::incompatible(format!(
            "index was built with model '{}' but the embedder is '{}'",
            header.model, model
        )));
    }

    let rows = sqlx::query("SELECT chunk_id, vector, metadata_json FROM entries ORDER BY seq ASC")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::incompatible(format!("unreadable entries table: {}", e)))?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let chunk_id: String = row.try_get("chunk_id").map_err(malformed_row)?;
        let blob: Vec<u8> = row.try_get("vector").map_err(malformed_row)?;
        let metadata_json: String = row.try_get("metadata_json").map_err(malformed_row)?;

        let vector = blob_to_vec(&blob)
            .ok_or_else(|| Error::incompatible(format!("malformed vector for chunk {}", chunk_id)))?;
        let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| Error::incompatible(format!("malformed metadata for chunk {}: {}", chunk_id, e)))?;
        entries.push(IndexEntry {
            chunk_id,
            vector,
            metadata,
        });
    }

    VectorIndex::from_entries(dims, entries).map_err(|e| Error::incompatible(e.to_string()))
}
