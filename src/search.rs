// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity search over stored chunk embeddings.
//!
//! A query string is embedded through the shared [`EmbeddingGenerator`] and
//! compared against records whose owner is approved. Results are ordered by
//! descending similarity, then ascending chunk index, then earliest creation.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::embedding::storage::{EmbeddingRecordStore, NearestQuery, SearchHit, SearchScope};
use crate::embedding::EmbeddingGenerator;
use crate::errors::{EngineError, Result};

/// Default number of results.
pub const DEFAULT_LIMIT: usize = 5;
/// Largest `limit` a caller may request.
pub const DEFAULT_MAX_LIMIT: usize = 50;
/// Default inclusive similarity threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Similarity as `1 - cosine_distance`, clamped to `[0, 1]`.
///
/// Mismatched lengths and zero vectors score 0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    // 1 - (1 - cos) is cos itself; skip the round trip.
    (dot_product / (magnitude_a * magnitude_b)).clamp(0.0, 1.0)
}

/// Sorts hits best first: score descending, then chunk index, then age.
pub fn rank_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.chunk_index.cmp(&b.record.chunk_index))
            .then_with(|| a.record.created_at.cmp(&b.record.created_at))
    });
}

/// Bounds applied to caller-supplied search parameters.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_threshold: f32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            default_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Embeds queries and ranks visible chunks against them.
pub struct SimilaritySearchEngine {
    generator: Arc<EmbeddingGenerator>,
    store: Arc<dyn EmbeddingRecordStore>,
    limits: SearchLimits,
}

impl SimilaritySearchEngine {
    pub fn new(generator: Arc<EmbeddingGenerator>, store: Arc<dyn EmbeddingRecordStore>) -> Self {
        Self {
            generator,
            store,
            limits: SearchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    /// Searches chunks of every approved owner.
    pub async fn search(
        &self,
        query_text: &str,
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        self.search_scoped(query_text, SearchScope::All, limit, similarity_threshold)
            .await
    }

    /// Searches with the configured default limit and threshold.
    pub async fn search_with_defaults(&self, query_text: &str) -> Result<Vec<SearchHit>> {
        self.search(
            query_text,
            self.limits.default_limit,
            self.limits.default_threshold,
        )
        .await
    }

    /// Searches chunks of approved owners of the kind selected by `scope`.
    ///
    /// An empty result means nothing cleared `similarity_threshold`; every
    /// failure is an error.
    pub async fn search_scoped(
        &self,
        query_text: &str,
        scope: SearchScope,
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        if query_text.trim().is_empty() {
            return Err(EngineError::invalid_input("query text must not be empty"));
        }
        if limit == 0 || limit > self.limits.max_limit {
            return Err(EngineError::invalid_input(format!(
                "limit must be between 1 and {}, got {}",
                self.limits.max_limit, limit
            )));
        }
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(EngineError::invalid_input(format!(
                "similarity threshold must be within [0, 1], got {}",
                similarity_threshold
            )));
        }

        info!(
            limit,
            threshold = similarity_threshold,
            scope = ?scope,
            "similarity search"
        );

        let query_vector = self.generator.generate(query_text).await?;
        let mut hits = self.store.nearest(
            &query_vector,
            &NearestQuery {
                limit,
                min_similarity: similarity_threshold,
                scope,
            },
        )?;

        // Any EmbeddingRecordStore may be plugged in; visibility is enforced here too.
        hits.retain(|hit| hit.owner.status.is_visible() && hit.score >= similarity_threshold);
        rank_hits(&mut hits);
        hits.truncate(limit);

        debug!(
            hits = hits.len(),
            best = ?hits.first().map(|hit| hit.score),
            "similarity search finished"
        );
        Ok(hits)
    }
}
