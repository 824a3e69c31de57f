// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the embedding engine.

use thiserror::Error;

/// Errors surfaced by chunking, generation, persistence and search.
///
/// "No results" is never an error: a search that matches nothing returns an
/// empty list.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation failed: {0}")]
    GenerationFailure(String),

    #[error("Store failure: {message}")]
    StoreFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Wraps a provider error, keeping the whole context chain in the message.
    pub fn generation(err: anyhow::Error) -> Self {
        Self::GenerationFailure(format!("{:#}", err))
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreFailure {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreFailure {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreFailure {
            message: format!("Failed to encode chunk metadata: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Checks a vector against the process-wide embedding dimension.
pub fn ensure_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_check() {
        assert!(ensure_dimension(&[0.0; 4], 4).is_ok());
        let err = ensure_dimension(&[0.0; 3], 4).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_generation_keeps_context() {
        let err = anyhow::anyhow!("onnx session crashed").context("Failed to embed batch");
        let wrapped = EngineError::generation(err);
        let message = wrapped.to_string();
        assert!(message.contains("Failed to embed batch"));
        assert!(message.contains("onnx session crashed"));
    }

    #[test]
    fn test_sqlite_error_is_store_failure() {
        let err: EngineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, EngineError::StoreFailure { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
