// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for chunk embeddings keyed by their owning entity.
//!
//! [`EmbeddingRecordStore`] is the contract the lifecycle manager and the
//! search engine depend on. [`SqliteStore`] implements it on a single SQLite
//! file and also keeps a small `owners` table mirroring the visibility status
//! of questions and documents, with `ON DELETE CASCADE` from owners to their
//! embeddings.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{ensure_dimension, EngineError, Result};
use crate::search::{rank_hits, similarity};

/// Embedding dimension of sentence-transformers/all-MiniLM-L6-v2, shared by
/// every stored vector.
pub const EMBEDDING_DIM: usize = 384;

const SCHEMA_VERSION: &str = "1";

/// Kind of entity that owns a set of embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Question,
    Document,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Question => "question",
            OwnerKind::Document => "document",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "question" | "q" => Ok(OwnerKind::Question),
            "document" | "doc" | "d" => Ok(OwnerKind::Document),
            other => Err(EngineError::invalid_input(format!(
                "Unknown owner kind: {}",
                other
            ))),
        }
    }
}

/// The single entity a chunk embedding belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    Question(String),
    Document(String),
}

impl Owner {
    pub fn question(id: impl Into<String>) -> Self {
        Owner::Question(id.into())
    }

    pub fn document(id: impl Into<String>) -> Self {
        Owner::Document(id.into())
    }

    /// Builds an owner from a pair of optional references, exactly one of
    /// which must be set.
    pub fn from_refs(question_id: Option<&str>, document_id: Option<&str>) -> Result<Self> {
        let question_id = question_id.map(str::trim).filter(|id| !id.is_empty());
        let document_id = document_id.map(str::trim).filter(|id| !id.is_empty());
        match (question_id, document_id) {
            (Some(id), None) => Ok(Owner::question(id)),
            (None, Some(id)) => Ok(Owner::document(id)),
            (Some(_), Some(_)) => Err(EngineError::invalid_input(
                "owner reference must name a question or a document, not both",
            )),
            (None, None) => Err(EngineError::invalid_input(
                "owner reference must name a question or a document",
            )),
        }
    }

    pub fn new(kind: OwnerKind, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EngineError::invalid_input("owner id must not be empty"));
        }
        Ok(match kind {
            OwnerKind::Question => Owner::Question(id),
            OwnerKind::Document => Owner::Document(id),
        })
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            Owner::Question(_) => OwnerKind::Question,
            Owner::Document(_) => OwnerKind::Document,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Owner::Question(id) | Owner::Document(id) => id,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Approval state of an owner. Only approved owners are searchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OwnerStatus {
    Pending,
    Approved,
    Disabled,
}

impl OwnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerStatus::Pending => "PENDING",
            OwnerStatus::Approved => "APPROVED",
            OwnerStatus::Disabled => "DISABLED",
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, OwnerStatus::Approved)
    }

    /// Status a newly registered owner starts in: documents are approved on
    /// upload, questions wait for review.
    pub fn initial_for(kind: OwnerKind) -> Self {
        match kind {
            OwnerKind::Question => OwnerStatus::Pending,
            OwnerKind::Document => OwnerStatus::Approved,
        }
    }
}

impl fmt::Display for OwnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(OwnerStatus::Pending),
            "APPROVED" => Ok(OwnerStatus::Approved),
            "DISABLED" => Ok(OwnerStatus::Disabled),
            other => Err(EngineError::invalid_input(format!(
                "Unknown owner status: {}",
                other
            ))),
        }
    }
}

/// What search results report about the owner of a matching chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub owner: Owner,
    pub status: OwnerStatus,
    /// Question text or document title.
    pub title: String,
    /// Approved answer for questions, if any.
    pub detail: Option<String>,
}

impl OwnerSummary {
    pub fn new(owner: Owner, title: impl Into<String>) -> Self {
        let status = OwnerStatus::initial_for(owner.kind());
        Self {
            owner,
            status,
            title: title.into(),
            detail: None,
        }
    }

    pub fn with_status(mut self, status: OwnerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One stored vector fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkEmbedding {
    pub id: String,
    pub owner: Owner,
    pub chunk_text: String,
    /// Always `EMBEDDING_DIM` floats.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// Position among the owner's chunks, unique per owner.
    pub chunk_index: u32,
    /// Length of `chunk_text` in characters.
    pub chunk_size: u32,
    /// JSON object describing how the chunk was produced.
    pub chunk_metadata: Option<String>,
    pub processing_model: String,
    pub processing_version: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl ChunkEmbedding {
    /// Creates a record with a fresh id, rejecting vectors of the wrong size.
    pub fn new(
        owner: Owner,
        chunk_text: impl Into<String>,
        embedding: Vec<f32>,
        chunk_index: u32,
    ) -> Result<Self> {
        ensure_dimension(&embedding, EMBEDDING_DIM)?;
        let chunk_text = chunk_text.into();
        let chunk_size = chunk_text.chars().count() as u32;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            chunk_text,
            embedding,
            chunk_index,
            chunk_size,
            chunk_metadata: None,
            processing_model: String::new(),
            processing_version: String::new(),
            created_at: now_millis(),
            updated_at: None,
        })
    }

    pub fn with_provenance(mut self, model: impl Into<String>, version: impl Into<String>) -> Self {
        self.processing_model = model.into();
        self.processing_version = version.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Option<String>) -> Self {
        self.chunk_metadata = metadata;
        self
    }
}

/// Which owners a search may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    All,
    Questions,
    Documents,
}

impl SearchScope {
    pub fn kind(&self) -> Option<OwnerKind> {
        match self {
            SearchScope::All => None,
            SearchScope::Questions => Some(OwnerKind::Question),
            SearchScope::Documents => Some(OwnerKind::Document),
        }
    }
}

/// Parameters of a nearest-neighbour query.
#[derive(Debug, Clone, Copy)]
pub struct NearestQuery {
    pub limit: usize,
    /// Inclusive lower bound on similarity.
    pub min_similarity: f32,
    pub scope: SearchScope,
}

/// A matching chunk with its similarity and owner summary.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record: ChunkEmbedding,
    /// `1 - cosine_distance`, clamped to `[0, 1]`.
    pub score: f32,
    pub owner: OwnerSummary,
}

/// Record count per processing model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCount {
    pub model: String,
    pub count: u64,
}

/// Aggregate numbers over the stored embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingStats {
    pub total_embeddings: u64,
    pub owners_with_embeddings: u64,
    pub avg_chunks_per_owner: f64,
    pub processing_models: Vec<ModelCount>,
    pub embedding_dimension: usize,
}

/// Persistence contract for chunk embeddings.
pub trait EmbeddingRecordStore: Send + Sync {
    /// Inserts records atomically. Every vector must be `EMBEDDING_DIM` long.
    fn insert_records(&self, records: &[ChunkEmbedding]) -> Result<()>;

    /// Deletes the owner's records and inserts `records` in one transaction.
    /// Returns the number of records removed.
    fn replace_records(&self, owner: &Owner, records: &[ChunkEmbedding]) -> Result<usize>;

    /// Deletes every record of `owner`; zero records is not an error.
    fn delete_records(&self, owner: &Owner) -> Result<usize>;

    /// Lists the owner's records ordered by chunk index.
    fn records_for(&self, owner: &Owner) -> Result<Vec<ChunkEmbedding>>;

    /// Returns the nearest records of visible owners, best first.
    fn nearest(&self, query: &[f32], params: &NearestQuery) -> Result<Vec<SearchHit>>;

    fn stats(&self) -> Result<EmbeddingStats>;
}

/// SQLite-based storage for embedding vectors.
///
/// Stores embeddings in `.vecsift/embeddings.sqlite` by default.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

const RECORD_COLUMNS: &str = r#"
    ce.id, ce.owner_kind, ce.owner_id, ce.chunk_text, ce.embedding, ce.chunk_index,
    ce.chunk_size, ce.chunk_metadata, ce.processing_model, ce.processing_version,
    ce.created_at, ce.updated_at
"#;

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| EngineError::StoreFailure {
                message: format!("Failed to create directory: {}", parent.display()),
                source: Some(Box::new(err)),
            })?;
        }

        let conn = Connection::open(&path)?;
        Self::from_connection(conn, path)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    /// Opens a store in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(".vecsift").join("embeddings.sqlite"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS owners (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                status TEXT NOT NULL,
                title TEXT NOT NULL,
                detail TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS chunk_embeddings (
                id TEXT PRIMARY KEY,
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                chunk_index INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                chunk_metadata TEXT,
                processing_model TEXT NOT NULL,
                processing_version TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER,
                UNIQUE (owner_kind, owner_id, chunk_index),
                FOREIGN KEY (owner_kind, owner_id)
                    REFERENCES owners(kind, id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_owner
                ON chunk_embeddings(owner_kind, owner_id);
            "#,
        )?;

        let stored_dim: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'embedding_dim'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match stored_dim {
            Some(dim) if dim != EMBEDDING_DIM.to_string() => {
                return Err(EngineError::store(format!(
                    "Store was created for {}-dimensional embeddings, this build uses {}",
                    dim, EMBEDDING_DIM
                )));
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('embedding_dim', ?1)",
                    params![EMBEDDING_DIM.to_string()],
                )?;
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
        }

        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers an owner or refreshes its status and summary.
    pub fn upsert_owner(&self, summary: &OwnerSummary) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO owners (kind, id, status, title, detail, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, id) DO UPDATE SET
                status = excluded.status,
                title = excluded.title,
                detail = excluded.detail,
                updated_at = excluded.updated_at
            "#,
            params![
                summary.owner.kind().as_str(),
                summary.owner.id(),
                summary.status.as_str(),
                summary.title,
                summary.detail,
                now_millis()
            ],
        )?;
        Ok(())
    }

    /// Registers a new owner. Returns false, changing nothing, if the owner
    /// already exists.
    pub fn insert_owner(&self, summary: &OwnerSummary) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO owners (kind, id, status, title, detail, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, id) DO NOTHING
            "#,
            params![
                summary.owner.kind().as_str(),
                summary.owner.id(),
                summary.status.as_str(),
                summary.title,
                summary.detail,
                now_millis()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Changes an owner's visibility. Returns false if the owner is unknown.
    pub fn set_owner_status(&self, owner: &Owner, status: OwnerStatus) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE owners SET status = ?3, updated_at = ?4 WHERE kind = ?1 AND id = ?2",
            params![owner.kind().as_str(), owner.id(), status.as_str(), now_millis()],
        )?;
        Ok(updated > 0)
    }

    pub fn owner(&self, owner: &Owner) -> Result<Option<OwnerSummary>> {
        let conn = self.lock()?;
        let summary = conn
            .query_row(
                "SELECT status, title, detail FROM owners WHERE kind = ?1 AND id = ?2",
                params![owner.kind().as_str(), owner.id()],
                |row| {
                    Ok(OwnerSummary {
                        owner: owner.clone(),
                        status: parse_column(row, 0)?,
                        title: row.get(1)?,
                        detail: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    /// Removes an owner; its embeddings go with it.
    pub fn remove_owner(&self, owner: &Owner) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM owners WHERE kind = ?1 AND id = ?2",
            params![owner.kind().as_str(), owner.id()],
        )?;
        Ok(removed > 0)
    }

    /// Counts stored records across all owners.
    pub fn count_records(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::store("SQLite connection lock poisoned"))
    }

    fn write_records(tx: &rusqlite::Transaction<'_>, records: &[ChunkEmbedding]) -> Result<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO chunk_embeddings (
                id, owner_kind, owner_id, chunk_text, embedding, chunk_index, chunk_size,
                chunk_metadata, processing_model, processing_version, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )?;

        for record in records {
            stmt.execute(params![
                record.id,
                record.owner.kind().as_str(),
                record.owner.id(),
                record.chunk_text,
                Self::embedding_to_blob(&record.embedding),
                record.chunk_index,
                record.chunk_size,
                record.chunk_metadata,
                record.processing_model,
                record.processing_version,
                record.created_at,
                record.updated_at
            ])?;
        }
        Ok(())
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkEmbedding> {
        let kind: OwnerKind = parse_column(row, 1)?;
        let owner_id: String = row.get(2)?;
        let blob: Vec<u8> = row.get(4)?;
        let embedding = Self::blob_to_embedding(&blob);
        ensure_dimension(&embedding, EMBEDDING_DIM)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(4, Type::Blob, Box::new(err)))?;
        Ok(ChunkEmbedding {
            id: row.get(0)?,
            owner: match kind {
                OwnerKind::Question => Owner::Question(owner_id),
                OwnerKind::Document => Owner::Document(owner_id),
            },
            chunk_text: row.get(3)?,
            embedding,
            chunk_index: row.get(5)?,
            chunk_size: row.get(6)?,
            chunk_metadata: row.get(7)?,
            processing_model: row.get(8)?,
            processing_version: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    /// Converts an embedding vector to a compact blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Converts a blob back to an embedding vector.
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl EmbeddingRecordStore for SqliteStore {
    fn insert_records(&self, records: &[ChunkEmbedding]) -> Result<()> {
        validate_records(records, None)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::write_records(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_records(&self, owner: &Owner, records: &[ChunkEmbedding]) -> Result<usize> {
        validate_records(records, Some(owner))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM chunk_embeddings WHERE owner_kind = ?1 AND owner_id = ?2",
            params![owner.kind().as_str(), owner.id()],
        )?;
        Self::write_records(&tx, records)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn delete_records(&self, owner: &Owner) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM chunk_embeddings WHERE owner_kind = ?1 AND owner_id = ?2",
            params![owner.kind().as_str(), owner.id()],
        )?;
        Ok(deleted)
    }

    fn records_for(&self, owner: &Owner) -> Result<Vec<ChunkEmbedding>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunk_embeddings ce
             WHERE ce.owner_kind = ?1 AND ce.owner_id = ?2
             ORDER BY ce.chunk_index",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![owner.kind().as_str(), owner.id()], |row| {
                Self::record_from_row(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Brute-force scan over visible owners' records.
    fn nearest(&self, query: &[f32], params: &NearestQuery) -> Result<Vec<SearchHit>> {
        ensure_dimension(query, EMBEDDING_DIM)?;
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let kind_filter = params.scope.kind().map(|kind| kind.as_str());
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, o.status, o.title, o.detail
             FROM chunk_embeddings ce
             INNER JOIN owners o ON o.kind = ce.owner_kind AND o.id = ce.owner_id
             WHERE o.status = ?1
               AND (?2 IS NULL OR ce.owner_kind = ?2)",
            RECORD_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![OwnerStatus::Approved.as_str(), kind_filter],
            |row| {
                let record = Self::record_from_row(row)?;
                let owner = OwnerSummary {
                    owner: record.owner.clone(),
                    status: parse_column(row, 12)?,
                    title: row.get(13)?,
                    detail: row.get(14)?,
                };
                Ok((record, owner))
            },
        )?;

        let mut hits = Vec::new();
        for row in rows {
            let (record, owner) = row?;
            let score = similarity(query, &record.embedding);
            if score >= params.min_similarity {
                hits.push(SearchHit {
                    record,
                    score,
                    owner,
                });
            }
        }

        rank_hits(&mut hits);
        hits.truncate(params.limit);
        Ok(hits)
    }

    fn stats(&self) -> Result<EmbeddingStats> {
        let conn = self.lock()?;
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| row.get(0))?;
        let owners: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (SELECT DISTINCT owner_kind, owner_id FROM chunk_embeddings)",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT processing_model, COUNT(*)
            FROM chunk_embeddings
            GROUP BY processing_model
            ORDER BY COUNT(*) DESC, processing_model
            "#,
        )?;
        let processing_models = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok(ModelCount {
                    model: row.get(0)?,
                    count: count as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let avg_chunks_per_owner = if owners > 0 {
            total as f64 / owners as f64
        } else {
            0.0
        };

        Ok(EmbeddingStats {
            total_embeddings: total as u64,
            owners_with_embeddings: owners as u64,
            avg_chunks_per_owner,
            processing_models,
            embedding_dimension: EMBEDDING_DIM,
        })
    }
}

fn validate_records(records: &[ChunkEmbedding], owner: Option<&Owner>) -> Result<()> {
    for record in records {
        ensure_dimension(&record.embedding, EMBEDDING_DIM)?;
        if let Some(owner) = owner {
            if &record.owner != owner {
                return Err(EngineError::invalid_input(format!(
                    "record {} belongs to {}, not {}",
                    record.id, record.owner, owner
                )));
            }
        }
    }
    Ok(())
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = EngineError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
