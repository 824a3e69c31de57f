// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers are plain blocking functions from text to vectors. Caching,
//! lazy loading and the worker pool live in [`super::generator`].

use anyhow::{bail, Context, Result};
use std::borrow::Cow;

use super::storage::EMBEDDING_DIM;

/// Default model identifier recorded as `processing_model`.
pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";
/// Default number of texts per inference call.
pub const DEFAULT_BATCH_SIZE: usize = 32;
const MAX_BATCH_SIZE: usize = 1024;
/// Default per-text character cap before inference.
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// Configuration for the embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: String,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    /// Clamps batch size and character cap into usable ranges.
    pub fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.batch_size > MAX_BATCH_SIZE {
            tracing::warn!(
                batch_size = self.batch_size,
                max = MAX_BATCH_SIZE,
                "embedding batch size exceeds maximum; clamping"
            );
            self.batch_size = MAX_BATCH_SIZE;
        }
        if self.max_chars == 0 {
            self.max_chars = DEFAULT_MAX_CHARS;
        }
        self
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_ID.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations are shared across worker threads after loading, so they
/// take `&self` and synchronize internally where the backend needs it.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the model version recorded alongside each vector.
    fn model_version(&self) -> &str {
        "1.0"
    }

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts, index-aligned with the input.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub struct FastEmbedder {
    // The ONNX session needs exclusive access per call.
    embedder: std::sync::Mutex<fastembed::TextEmbedding>,
    config: EmbeddingProviderConfig,
    model_id: String,
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        use fastembed::{InitOptions, TextEmbedding};

        let config = config.sanitized();
        let model = parse_model(&config.model)?;
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder: std::sync::Mutex::new(embedder),
            model_id: config.model.clone(),
            config,
        })
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embedder = self
            .embedder
            .lock()
            .map_err(|_| anyhow::anyhow!("fastembed session lock poisoned"))?;
        let mut embeddings = embedder
            .embed(&prepared, Some(self.config.batch_size))
            .context("fastembed inference failed")?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn parse_model(raw: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel;

    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unsupported embedding model '{}'. Supported value: {}",
            other,
            DEFAULT_MODEL_ID
        ),
    }
}

/// Deterministic bag-of-words provider.
///
/// Lowercased alphanumeric tokens are hashed with blake3 into a fixed number
/// of buckets and the counts are L2 normalized. Texts sharing words score
/// high, texts sharing none score zero. Useful offline and in tests.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashingProvider {
    /// Creates a hashing provider producing vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "hashing-bow".to_string(),
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let mut prefix = [0_u8; 8];
            prefix.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(prefix) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

/// Scales `vector` to unit length in place; zero vectors are left alone.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
