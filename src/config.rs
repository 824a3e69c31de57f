// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for vecsift
//!
//! Loads configuration from an explicit `--config` path, `.vecsift.toml` in the
//! current directory or `~/.config/vecsift/config.toml`, then applies
//! `VECSIFT_*` environment overrides.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::chunker::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::generator::{
    GeneratorConfig, DEFAULT_CACHE_SIZE, DEFAULT_INFERENCE_TIMEOUT, DEFAULT_MAX_CONCURRENT,
};
use crate::embedding::provider::{
    EmbeddingProvider, EmbeddingProviderConfig, HashingProvider, DEFAULT_BATCH_SIZE,
    DEFAULT_MAX_CHARS, DEFAULT_MODEL_ID,
};
use crate::search::{SearchLimits, DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, DEFAULT_SIMILARITY_THRESHOLD};

pub const ENV_CACHE_SIZE: &str = "VECSIFT_EMBEDDING_CACHE_SIZE";
pub const ENV_MAX_CONCURRENT: &str = "VECSIFT_MAX_CONCURRENT_EMBEDDINGS";
pub const ENV_BATCH_SIZE: &str = "VECSIFT_EMBEDDING_BATCH_SIZE";

const LOCAL_CONFIG: &str = ".vecsift.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local ONNX model through fastembed
    #[default]
    Builtin,
    /// Feature-hashed bag of words, no model download
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the builtin provider
    pub model: Option<String>,
    /// LRU cache capacity, 0 disables the cache
    pub cache_size: Option<usize>,
    /// Concurrent inference workers
    pub max_concurrent: Option<usize>,
    /// Texts per inference call
    pub batch_size: Option<usize>,
    /// Characters kept per text before inference
    pub max_chars: Option<usize>,
    /// L2 normalize model output
    pub normalize: Option<bool>,
    /// Inference timeout in milliseconds, 0 disables it
    pub inference_timeout_ms: Option<u64>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "all-MiniLM-L6-v2")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL_ID)
    }

    /// Get cache size (defaults to 1000)
    pub fn cache_size(&self) -> usize {
        self.cache_size.unwrap_or(DEFAULT_CACHE_SIZE)
    }

    /// Get worker count (defaults to 4)
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)
    }

    /// Get batch size (defaults to 32)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Get max chars (defaults to 2000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(DEFAULT_MAX_CHARS)
    }

    /// Get normalize flag (defaults to true)
    pub fn normalize(&self) -> bool {
        self.normalize.unwrap_or(true)
    }

    /// Get inference timeout (defaults to 30s, `None` when set to 0)
    pub fn inference_timeout(&self) -> Option<Duration> {
        match self.inference_timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(DEFAULT_INFERENCE_TIMEOUT),
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            cache_size: self.cache_size(),
            max_concurrent: self.max_concurrent(),
            inference_timeout: self.inference_timeout(),
        }
    }

    pub fn provider_config(&self) -> EmbeddingProviderConfig {
        EmbeddingProviderConfig {
            model: self.model().to_string(),
            batch_size: self.batch_size(),
            max_chars: self.max_chars(),
            normalize: self.normalize(),
        }
        .sanitized()
    }

    /// Returns a factory building the configured provider.
    ///
    /// The factory runs once, on the generator's first request.
    pub fn provider_factory(
        &self,
    ) -> impl Fn() -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static {
        let kind = self.provider();
        let config = self.provider_config();
        move || build_provider(kind, config.clone())
    }
}

fn build_provider(
    kind: EmbeddingProviderType,
    config: EmbeddingProviderConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match kind {
        EmbeddingProviderType::Hashing => {
            Ok(Arc::new(HashingProvider::default().with_batch_size(config.batch_size)))
        }
        #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
        EmbeddingProviderType::Builtin => {
            Ok(Arc::new(crate::embedding::provider::FastEmbedder::new(config)?))
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        EmbeddingProviderType::Builtin => {
            let _ = config;
            bail!("builtin embeddings are not available on this platform; use provider = \"hashing\"")
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks
    pub overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 1000)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get overlap (defaults to 200)
    pub fn overlap(&self) -> usize {
        self.overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    pub fn chunk_config(&self) -> crate::errors::Result<ChunkConfig> {
        ChunkConfig::new(self.chunk_size(), self.overlap())
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when no limit is given
    pub limit: Option<usize>,
    /// Largest limit a caller may request
    pub max_limit: Option<usize>,
    /// Threshold used when none is given
    pub similarity_threshold: Option<f32>,
}

impl SearchConfig {
    /// Get default limit (defaults to 5)
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Get max limit (defaults to 50)
    pub fn max_limit(&self) -> usize {
        self.max_limit.unwrap_or(DEFAULT_MAX_LIMIT)
    }

    /// Get default threshold (defaults to 0.7)
    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD)
    }

    /// Checks that the configured defaults are themselves acceptable searches.
    pub fn validate(&self) -> Result<()> {
        let (limit, max_limit, threshold) =
            (self.limit(), self.max_limit(), self.similarity_threshold());
        if max_limit == 0 {
            bail!("[search] max_limit must be at least 1");
        }
        if limit == 0 || limit > max_limit {
            bail!(
                "[search] limit must be between 1 and max_limit ({}), got {}",
                max_limit,
                limit
            );
        }
        if !(0.0..=1.0).contains(&threshold) {
            bail!(
                "[search] similarity_threshold must be within [0, 1], got {}",
                threshold
            );
        }
        Ok(())
    }

    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            default_limit: self.limit(),
            max_limit: self.max_limit(),
            default_threshold: self.similarity_threshold(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Get database path (defaults to `.vecsift/embeddings.sqlite`)
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".vecsift").join("embeddings.sqlite"))
    }
}

/// Configuration loaded from .vecsift.toml or ~/.config/vecsift/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,

    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Search configuration
    pub search: SearchConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from files and the environment
    ///
    /// Precedence (highest to lowest):
    /// 1. `explicit`, which must exist and parse
    /// 2. .vecsift.toml in current directory
    /// 3. ~/.config/vecsift/config.toml
    ///
    /// Environment overrides are applied on top of whichever file won.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::discover(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects section values that would make every default operation fail.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.chunking
            .chunk_config()
            .context("Invalid [chunking] section")?;
        Ok(())
    }

    fn discover() -> Self {
        // Try current directory first
        if let Some(config) = Self::load_from_path(Path::new(LOCAL_CONFIG)) {
            return config;
        }

        // Try home directory config
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("vecsift").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Parses a config file, failing on a missing file or bad TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::from_toml(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config");
                None
            }
        }
    }

    /// Applies `VECSIFT_*` variables over file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = parse_usize_env(ENV_CACHE_SIZE)? {
            self.embeddings.cache_size = Some(value);
        }
        if let Some(value) = parse_usize_env(ENV_MAX_CONCURRENT)? {
            if value == 0 {
                bail!("{} must be at least 1", ENV_MAX_CONCURRENT);
            }
            self.embeddings.max_concurrent = Some(value);
        }
        if let Some(value) = parse_usize_env(ENV_BATCH_SIZE)? {
            self.embeddings.batch_size = Some(value);
        }
        Ok(())
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the chunking configuration
    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Get the storage configuration
    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }
}

fn parse_usize_env(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(None)
            } else {
                value
                    .parse::<usize>()
                    .map(Some)
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.embeddings().model(), "all-MiniLM-L6-v2");
        assert_eq!(config.embeddings().cache_size(), 1000);
        assert_eq!(config.embeddings().max_concurrent(), 4);
        assert_eq!(
            config.embeddings().inference_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.chunking().chunk_size(), 1000);
        assert_eq!(config.chunking().overlap(), 200);
        assert_eq!(config.search().limit(), 5);
        assert_eq!(config.search().max_limit(), 50);
        assert!((config.search().similarity_threshold() - 0.7).abs() < f32::EPSILON);
        assert_eq!(
            config.storage().path(),
            PathBuf::from(".vecsift/embeddings.sqlite")
        );
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::from_toml(
            r#"
            [embeddings]
            provider = "hashing"
            cache_size = 0
            inference_timeout_ms = 0

            [chunking]
            chunk_size = 400
            overlap = 50

            [search]
            limit = 10
            similarity_threshold = 0.5

            [storage]
            path = "data/store.sqlite"
            "#,
        )
        .unwrap();

        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Hashing);
        assert_eq!(config.embeddings().generator_config().cache_size, 0);
        assert_eq!(config.embeddings().inference_timeout(), None);
        let chunk = config.chunking().chunk_config().unwrap();
        assert_eq!((chunk.chunk_size, chunk.overlap), (400, 50));
        let limits = config.search().limits();
        assert_eq!(limits.default_limit, 10);
        assert_eq!(limits.max_limit, 50);
        assert_eq!(config.storage().path(), PathBuf::from("data/store.sqlite"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(Config::from_toml("[embeddings]\nprovider = \"remote\"\n").is_err());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::from_file(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_invalid_chunking_is_reported() {
        let config = Config::from_toml("[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap();
        assert!(config.chunking().chunk_config().is_err());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_search_section_is_validated() {
        for section in [
            "[search]\nlimit = 60\n",
            "[search]\nlimit = 10\nmax_limit = 5\n",
            "[search]\nmax_limit = 0\n",
            "[search]\nlimit = 0\n",
            "[search]\nsimilarity_threshold = 1.5\n",
            "[search]\nsimilarity_threshold = -0.2\n",
        ] {
            let config = Config::from_toml(section).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("[search]"), "{}: {}", section, err);
        }

        let config =
            Config::from_toml("[search]\nlimit = 20\nmax_limit = 20\nsimilarity_threshold = 0.0\n")
                .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_bad_search_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[search]\nsimilarity_threshold = 2.0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_hashing_factory_builds_provider() {
        let config = Config::from_toml("[embeddings]\nprovider = \"hashing\"\nbatch_size = 8\n")
            .unwrap();
        let factory = config.embeddings().provider_factory();
        let provider = factory().unwrap();
        assert_eq!(provider.model_id(), "hashing-bow");
        assert_eq!(provider.batch_size(), 8);
    }
}
