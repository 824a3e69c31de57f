// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached, pooled embedding generation.
//!
//! [`EmbeddingGenerator`] owns the embedding model for the whole process. The
//! model is built by a factory on first use behind a one-time initializer, so
//! concurrent first callers share a single load. Results are cached by
//! content hash, and inference runs on blocking threads gated by a semaphore
//! of `max_concurrent` permits; callers beyond that queue for a permit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, error, info};

use super::cache::{content_hash, CacheStats, ContentHash, EmbeddingCache};
use super::provider::EmbeddingProvider;
use super::storage::EMBEDDING_DIM;
use crate::errors::{ensure_dimension, EngineError, Result};

/// Default LRU capacity.
pub const DEFAULT_CACHE_SIZE: usize = 1000;
/// Default number of concurrent inference workers.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
/// Default bound on a single inference dispatch.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the embedding model. Runs at most once per successful load.
pub type ProviderFactory =
    Arc<dyn Fn() -> anyhow::Result<Arc<dyn EmbeddingProvider>> + Send + Sync>;

/// Generator tuning.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    /// LRU capacity; 0 disables caching.
    pub cache_size: usize,
    /// Inference workers; clamped to at least 1.
    pub max_concurrent: usize,
    /// `None` waits for the model indefinitely.
    pub inference_timeout: Option<Duration>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            inference_timeout: Some(DEFAULT_INFERENCE_TIMEOUT),
        }
    }
}

/// Model provenance recorded on every stored vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub model: String,
    pub version: String,
}

/// Thread-safe, lazily initialized text-to-vector service.
pub struct EmbeddingGenerator {
    factory: ProviderFactory,
    model: OnceCell<Arc<dyn EmbeddingProvider>>,
    cache: EmbeddingCache,
    workers: Arc<Semaphore>,
    config: GeneratorConfig,
}

impl EmbeddingGenerator {
    /// Creates a generator that loads its model through `factory` on first use.
    pub fn new<F>(config: GeneratorConfig, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            factory: Arc::new(factory),
            model: OnceCell::new(),
            cache: EmbeddingCache::new(config.cache_size),
            workers: Arc::new(Semaphore::new(max_concurrent)),
            config: GeneratorConfig {
                max_concurrent,
                ..config
            },
        }
    }

    /// Creates a generator around an already loaded provider.
    pub fn with_provider(config: GeneratorConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let loaded = provider.clone();
        let generator = Self::new(config, move || Ok(provider.clone()));
        Self {
            model: OnceCell::new_with(Some(loaded)),
            ..generator
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns the model, loading it on the first call.
    pub async fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider = self
            .model
            .get_or_try_init(|| async {
                let factory = self.factory.clone();
                info!("Loading embedding model");
                let started = Instant::now();
                let provider = tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(|err| {
                        EngineError::GenerationFailure(format!("model load task failed: {}", err))
                    })?
                    .map_err(|err| {
                        error!(error = %format!("{:#}", err), "embedding model failed to load");
                        EngineError::generation(err)
                    })?;
                info!(
                    model = provider.model_id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "embedding model loaded"
                );
                Ok::<_, EngineError>(provider)
            })
            .await?;
        Ok(provider.clone())
    }

    /// Model id and version of the loaded provider.
    pub async fn model_info(&self) -> Result<ModelInfo> {
        let provider = self.provider().await?;
        Ok(ModelInfo {
            model: provider.model_id().to_string(),
            version: provider.model_version().to_string(),
        })
    }

    /// Embeds one text, serving byte-identical repeats from the cache.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        ensure_text(text)?;

        let key = content_hash(text);
        if let Some(hit) = self.cache.get(&key) {
            debug!(hash = %short_hash(&key), "embedding cache hit");
            return Ok(hit.as_ref().clone());
        }

        let mut vectors = self.infer(vec![text.to_string()]).await.map_err(|err| {
            error!(hash = %short_hash(&key), error = %err, "embedding generation failed");
            err
        })?;
        let vector = vectors
            .pop()
            .ok_or_else(|| EngineError::GenerationFailure("no embedding returned".to_string()))?;
        self.cache.insert(key, Arc::new(vector.clone()));
        Ok(vector)
    }

    /// Embeds many texts, index-aligned with the input.
    ///
    /// Cached texts are skipped, duplicates are embedded once, and the rest
    /// go to the model in provider-sized batches.
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_text(text)?;
        }

        let keys: Vec<ContentHash> = texts.iter().map(|text| content_hash(text)).collect();
        let mut resolved: HashMap<ContentHash, Arc<Vec<f32>>> = HashMap::new();
        let mut pending: Vec<(ContentHash, String)> = Vec::new();

        for (key, text) in keys.iter().zip(texts) {
            if resolved.contains_key(key) || pending.iter().any(|(k, _)| k == key) {
                continue;
            }
            match self.cache.get(key) {
                Some(hit) => {
                    resolved.insert(*key, hit);
                }
                None => pending.push((*key, text.clone())),
            }
        }

        debug!(
            total = texts.len(),
            cached = resolved.len(),
            to_embed = pending.len(),
            "batch embedding"
        );

        if !pending.is_empty() {
            let batch_size = self.provider().await?.batch_size().max(1);
            for batch in pending.chunks(batch_size) {
                let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
                let vectors = self.infer(inputs).await.map_err(|err| {
                    error!(batch = batch.len(), error = %err, "batch embedding failed");
                    err
                })?;
                for ((key, _), vector) in batch.iter().zip(vectors) {
                    let vector = Arc::new(vector);
                    self.cache.insert(*key, vector.clone());
                    resolved.insert(*key, vector);
                }
            }
        }

        keys.iter()
            .map(|key| {
                resolved
                    .get(key)
                    .map(|vector| vector.as_ref().clone())
                    .ok_or_else(|| {
                        EngineError::GenerationFailure("missing embedding for input".to_string())
                    })
            })
            .collect()
    }

    /// Runs one inference call on the worker pool.
    ///
    /// The permit moves into the blocking task, so a timed-out call keeps its
    /// worker slot until the model returns.
    async fn infer(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider().await?;
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::GenerationFailure("worker pool closed".to_string()))?;

        let expected = texts.len();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            provider.embed_texts(&texts)
        });

        let joined = match self.config.inference_timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                EngineError::GenerationFailure(format!(
                    "inference timed out after {} ms",
                    limit.as_millis()
                ))
            })?,
            None => task.await,
        };

        let vectors = joined
            .map_err(|err| {
                EngineError::GenerationFailure(format!("inference task failed: {}", err))
            })?
            .map_err(EngineError::generation)?;

        if vectors.len() != expected {
            return Err(EngineError::GenerationFailure(format!(
                "model returned {} embeddings for {} inputs",
                vectors.len(),
                expected
            )));
        }
        for vector in &vectors {
            ensure_dimension(vector, EMBEDDING_DIM)?;
        }

        Ok(vectors)
    }
}

fn ensure_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(EngineError::invalid_input(
            "cannot embed empty or whitespace-only text",
        ));
    }
    Ok(())
}

fn short_hash(key: &ContentHash) -> String {
    key[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::HashingProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the hashing provider, counting calls and optionally sleeping or
    /// failing.
    struct CountingProvider {
        inner: HashingProvider,
        calls: Arc<AtomicUsize>,
        texts: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
        dimension_override: Option<usize>,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                inner: HashingProvider::default(),
                calls: Arc::new(AtomicUsize::new(0)),
                texts: Arc::new(AtomicUsize::new(0)),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                delay: Duration::ZERO,
                fail: false,
                dimension_override: None,
            }
        }
    }

    impl EmbeddingProvider for CountingProvider {
        fn model_id(&self) -> &str {
            "counting"
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                anyhow::bail!("model exploded");
            }
            match self.dimension_override {
                Some(dim) => Ok(texts.iter().map(|_| vec![0.5; dim]).collect()),
                None => self.inner.embed_texts(texts),
            }
        }
    }

    fn generator(provider: CountingProvider, config: GeneratorConfig) -> EmbeddingGenerator {
        EmbeddingGenerator::with_provider(config, Arc::new(provider))
    }

    #[tokio::test]
    async fn test_generate_dimension() {
        let gen = generator(CountingProvider::new(), GeneratorConfig::default());
        let vector = gen.generate("How do I register for classes?").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_identical_text_hits_cache() {
        let provider = CountingProvider::new();
        let calls = provider.calls.clone();
        let gen = generator(provider, GeneratorConfig::default());

        let first = gen.generate("same text").await.unwrap();
        let second = gen.generate("same text").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gen.generate("other text").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gen.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_evicted_text_is_recomputed() {
        let provider = CountingProvider::new();
        let calls = provider.calls.clone();
        let gen = generator(
            provider,
            GeneratorConfig {
                cache_size: 1,
                ..Default::default()
            },
        );

        gen.generate("a").await.unwrap();
        gen.generate("b").await.unwrap();
        gen.generate("a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let provider = CountingProvider::new();
        let calls = provider.calls.clone();
        let gen = generator(provider, GeneratorConfig::default());

        assert!(gen.generate("").await.unwrap_err().is_invalid_input());
        assert!(gen.generate(" \n\t").await.unwrap_err().is_invalid_input());
        assert!(gen
            .generate_batch(&["ok".to_string(), "".to_string()])
            .await
            .unwrap_err()
            .is_invalid_input());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_is_aligned_and_deduplicated() {
        let provider = CountingProvider::new();
        let calls = provider.calls.clone();
        let texts_seen = provider.texts.clone();
        let gen = generator(provider, GeneratorConfig::default());

        gen.generate("cached").await.unwrap();
        let inputs: Vec<String> = [
            "alpha one two",
            "beta three four",
            "alpha one two",
            "cached",
            "gamma five six",
        ]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = gen.generate_batch(&inputs).await.unwrap();

        assert_eq!(vectors.len(), 5);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        assert_eq!(vectors[3], gen.generate("cached").await.unwrap());
        // "cached" once, then alpha/beta/gamma in batches of two.
        assert_eq!(texts_seen.load(Ordering::SeqCst), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let before = calls.load(Ordering::SeqCst);
        gen.generate("beta three four").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let gen = generator(CountingProvider::new(), GeneratorConfig::default());
        assert!(gen.generate_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_propagates_and_is_not_cached() {
        let mut provider = CountingProvider::new();
        provider.fail = true;
        let calls = provider.calls.clone();
        let gen = generator(provider, GeneratorConfig::default());

        let err = gen.generate("text").await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailure(ref m) if m.contains("model exploded")));
        assert!(gen.generate("text").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wrong_dimension_from_model() {
        let mut provider = CountingProvider::new();
        provider.dimension_override = Some(12);
        let gen = generator(provider, GeneratorConfig::default());

        let err = gen.generate("text").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: 12
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_concurrency() {
        let mut provider = CountingProvider::new();
        provider.delay = Duration::from_millis(40);
        let peak = provider.peak.clone();
        let gen = generator(
            provider,
            GeneratorConfig {
                max_concurrent: 2,
                ..Default::default()
            },
        );

        let (a, b, c, d, e, f) = tokio::join!(
            gen.generate("one"),
            gen.generate("two"),
            gen.generate("three"),
            gen.generate("four"),
            gen.generate("five"),
            gen.generate("six"),
        );
        for result in [a, b, c, d, e, f] {
            assert!(result.is_ok());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_is_generation_failure() {
        let mut provider = CountingProvider::new();
        provider.delay = Duration::from_millis(300);
        let gen = generator(
            provider,
            GeneratorConfig {
                inference_timeout: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        );

        let err = gen.generate("slow").await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailure(ref m) if m.contains("timed out")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_model_loads_once_under_concurrency() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let gen = EmbeddingGenerator::new(GeneratorConfig::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(HashingProvider::default()) as Arc<dyn EmbeddingProvider>)
        });
        assert!(!gen.is_loaded());

        let (a, b, c, d) = tokio::join!(
            gen.generate("a"),
            gen.generate("b"),
            gen.generate("c"),
            gen.generate("d"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok() && d.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(gen.is_loaded());
        assert_eq!(gen.model_info().await.unwrap().model, "hashing-bow");
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let gen = EmbeddingGenerator::new(GeneratorConfig::default(), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("weights missing");
            }
            Ok(Arc::new(HashingProvider::default()) as Arc<dyn EmbeddingProvider>)
        });

        let err = gen.generate("text").await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailure(_)));
        assert!(!gen.is_loaded());
        assert!(gen.generate("text").await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
