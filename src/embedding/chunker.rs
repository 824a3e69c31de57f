// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! Splits long text into overlapping character windows. Each window is cut
//! back to the last whitespace or sentence terminator it contains so words
//! are not split, and the next window starts `overlap` characters before the
//! previous one ended.

use crate::errors::{EngineError, Result};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Configuration for the text chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig with the specified parameters.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(EngineError::invalid_input(
                "chunk_size must be greater than 0",
            ));
        }
        if overlap >= chunk_size {
            return Err(EngineError::invalid_input(format!(
                "overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

/// A chunk together with the character window it was carved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position among the chunks of one text.
    pub index: usize,
    /// First character of the window (inclusive).
    pub start: usize,
    /// End of the window (exclusive), in characters.
    pub end: usize,
    /// Window text with surrounding whitespace trimmed.
    pub text: String,
}

/// Splits text into overlapping chunks for embedding generation.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    /// Creates a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Splits `text` into chunk strings.
    ///
    /// Text no longer than `chunk_size` comes back as a single chunk equal to
    /// the input. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.chunk_spans(text)
            .into_iter()
            .map(|chunk| chunk.text)
            .collect()
    }

    /// Splits `text` into chunks, keeping the window boundaries.
    ///
    /// Algorithm:
    /// ```text
    /// start = 0
    /// while start < len:
    ///   end = start + chunk_size
    ///   if end < len:
    ///     cut = last whitespace/terminator in [start, end)
    ///     if cut > start: end = cut + 1
    ///   emit text[start..end].trim()
    ///   start = end - overlap   (or end, once the text is exhausted)
    /// ```
    pub fn chunk_spans(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char, plus the end of the string.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;

        if total <= self.config.chunk_size {
            return vec![TextChunk {
                index: 0,
                start: 0,
                end: total,
                text: text.to_string(),
            }];
        }

        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0_usize;

        while start < total {
            let mut end = start + self.config.chunk_size;

            if end < total {
                let cut = (start..end).rev().find(|&i| is_boundary(chars[i]));
                if let Some(cut) = cut.filter(|&cut| cut > start) {
                    end = cut + 1;
                }
            } else {
                end = total;
            }

            let window = text[offsets[start]..offsets[end]].trim();
            if !window.is_empty() {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    start,
                    end,
                    text: window.to_string(),
                });
            }

            if end >= total {
                break;
            }

            let next = end.saturating_sub(self.config.overlap);
            // A cut close to `start` must still advance the window.
            start = if next > start { next } else { end };
        }

        chunks
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | '!' | '?' | ';')
}
