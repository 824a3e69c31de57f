// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keeps an owner's embedding records in step with its text.
//!
//! Callers commit the owner row first and then call [`LifecycleManager::create`].
//! If that fails, the owner has no embeddings and the caller is expected to
//! delete it again.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::embedding::storage::{ChunkEmbedding, EmbeddingRecordStore, Owner};
use crate::embedding::{EmbeddingGenerator, TextChunker};
use crate::errors::{EngineError, Result};

/// JSON stored in `chunk_metadata`.
#[derive(Debug, Serialize)]
struct ChunkMetadata<'a> {
    source: &'a str,
    chunk_count: usize,
    total_length: usize,
}

/// Creates, replaces and deletes embedding records per owner.
pub struct LifecycleManager {
    generator: Arc<EmbeddingGenerator>,
    store: Arc<dyn EmbeddingRecordStore>,
    chunker: TextChunker,
}

impl LifecycleManager {
    pub fn new(
        generator: Arc<EmbeddingGenerator>,
        store: Arc<dyn EmbeddingRecordStore>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            generator,
            store,
            chunker,
        }
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    /// Embeds `text` for a freshly committed owner and stores the records.
    pub async fn create(&self, owner: &Owner, text: &str) -> Result<Vec<ChunkEmbedding>> {
        let records = self.build_records(owner, text).await.map_err(|err| {
            error!(owner = %owner, error = %err, "failed to embed owner text");
            err
        })?;
        self.store.insert_records(&records).map_err(|err| {
            error!(owner = %owner, error = %err, "failed to store embeddings");
            err
        })?;

        info!(owner = %owner, chunks = records.len(), "created embeddings");
        Ok(records)
    }

    /// Replaces all of the owner's records with embeddings of `text`.
    ///
    /// New vectors are generated before anything is touched; the delete and
    /// insert then run in one store transaction. A failed generation leaves
    /// the previous records in place.
    pub async fn recreate(&self, owner: &Owner, text: &str) -> Result<Vec<ChunkEmbedding>> {
        let records = self.build_records(owner, text).await.map_err(|err| {
            error!(owner = %owner, error = %err, "failed to embed updated owner text");
            err
        })?;
        let deleted = self.store.replace_records(owner, &records)?;

        info!(
            owner = %owner,
            deleted,
            chunks = records.len(),
            "recreated embeddings"
        );
        Ok(records)
    }

    /// Deletes all records of `owner`. Deleting nothing is fine.
    pub async fn delete(&self, owner: &Owner) -> Result<usize> {
        let deleted = self.store.delete_records(owner)?;
        info!(owner = %owner, deleted, "deleted embeddings");
        Ok(deleted)
    }

    /// Lists the owner's records in chunk order.
    pub fn records(&self, owner: &Owner) -> Result<Vec<ChunkEmbedding>> {
        self.store.records_for(owner)
    }

    async fn build_records(&self, owner: &Owner, text: &str) -> Result<Vec<ChunkEmbedding>> {
        if owner.id().trim().is_empty() {
            return Err(EngineError::invalid_input("owner id must not be empty"));
        }
        if text.trim().is_empty() {
            return Err(EngineError::invalid_input(format!(
                "text for {} must not be empty",
                owner
            )));
        }

        let chunks = self.chunker.chunk(text);
        let vectors = match chunks.as_slice() {
            [single] => vec![self.generator.generate(single).await?],
            _ => self.generator.generate_batch(&chunks).await?,
        };
        let model = self.generator.model_info().await?;

        let metadata = serde_json::to_string(&ChunkMetadata {
            source: if chunks.len() == 1 {
                "single_chunk"
            } else {
                "chunked"
            },
            chunk_count: chunks.len(),
            total_length: text.chars().count(),
        })?;

        chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (chunk, vector))| -> Result<ChunkEmbedding> {
                Ok(ChunkEmbedding::new(owner.clone(), chunk, vector, index as u32)?
                    .with_provenance(model.model.as_str(), model.version.as_str())
                    .with_metadata(Some(metadata.clone())))
            })
            .collect()
    }
}
