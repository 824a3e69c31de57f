// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - chunking, generation and storage of text vectors
//!
//! Text is split by [`TextChunker`], turned into vectors by the shared
//! [`EmbeddingGenerator`] and persisted through an [`EmbeddingRecordStore`].

pub mod cache;
pub mod chunker;
pub mod generator;
pub mod provider;
pub mod storage;

pub use cache::{CacheStats, EmbeddingCache};
pub use chunker::{ChunkConfig, TextChunk, TextChunker};
pub use generator::{EmbeddingGenerator, GeneratorConfig, ModelInfo, ProviderFactory};
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use provider::FastEmbedder;
pub use provider::{EmbeddingProvider, EmbeddingProviderConfig, HashingProvider};
pub use storage::{
    ChunkEmbedding, EmbeddingRecordStore, EmbeddingStats, Owner, OwnerKind, OwnerStatus,
    OwnerSummary, SearchHit, SearchScope, SqliteStore, EMBEDDING_DIM,
};
