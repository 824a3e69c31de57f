// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires the store, generator, lifecycle manager and search engine together.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::storage::{ChunkEmbedding, EmbeddingStats, OwnerSummary, SqliteStore};
use crate::embedding::{EmbeddingGenerator, EmbeddingRecordStore, TextChunker};
use crate::errors::{EngineError, Result};
use crate::lifecycle::LifecycleManager;
use crate::search::SimilaritySearchEngine;

/// One process-wide set of engine components sharing a generator and store.
pub struct Engine {
    store: Arc<SqliteStore>,
    generator: Arc<EmbeddingGenerator>,
    lifecycle: LifecycleManager,
    search: SimilaritySearchEngine,
}

impl Engine {
    /// Opens the configured store and prepares a lazily loaded generator.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_at(config, &config.storage().path())
    }

    /// Like [`Engine::open`] with an explicit database path.
    pub fn open_at(config: &Config, path: &Path) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        let embeddings = config.embeddings();
        let generator = Arc::new(EmbeddingGenerator::new(
            embeddings.generator_config(),
            embeddings.provider_factory(),
        ));
        Self::assemble(config, store, generator)
    }

    /// Builds an engine from existing components.
    pub fn assemble(
        config: &Config,
        store: Arc<SqliteStore>,
        generator: Arc<EmbeddingGenerator>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(config.chunking().chunk_config()?);
        let records: Arc<dyn EmbeddingRecordStore> = store.clone();
        let lifecycle = LifecycleManager::new(generator.clone(), records.clone(), chunker);
        let search = SimilaritySearchEngine::new(generator.clone(), records)
            .with_limits(config.search().limits());

        Ok(Self {
            store,
            generator,
            lifecycle,
            search,
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn generator(&self) -> &EmbeddingGenerator {
        &self.generator
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn search(&self) -> &SimilaritySearchEngine {
        &self.search
    }

    pub fn stats(&self) -> Result<EmbeddingStats> {
        self.store.stats()
    }

    /// Registers a new owner and embeds its text.
    ///
    /// The owner row is committed first. If embedding fails the row is
    /// removed again and the original error is returned, so no owner is left
    /// without embeddings. An owner that already exists is refused untouched;
    /// use [`LifecycleManager::recreate`] to change its text.
    pub async fn register_owner(
        &self,
        summary: &OwnerSummary,
        text: &str,
    ) -> Result<Vec<ChunkEmbedding>> {
        if !self.store.insert_owner(summary)? {
            return Err(EngineError::invalid_input(format!(
                "{} is already registered",
                summary.owner
            )));
        }

        match self.lifecycle.create(&summary.owner, text).await {
            Ok(records) => {
                info!(owner = %summary.owner, status = %summary.status, "registered owner");
                Ok(records)
            }
            Err(err) => {
                warn!(owner = %summary.owner, "embedding failed; removing owner");
                if let Err(cleanup) = self.store.remove_owner(&summary.owner) {
                    warn!(owner = %summary.owner, error = %cleanup, "failed to remove owner");
                }
                Err(err)
            }
        }
    }
}
