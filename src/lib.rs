// SPDX-License-Identifier: MIT OR Apache-2.0

//! vecsift - Chunked text embeddings with similarity search
//!
//! Shared modules for the vecsift CLI tool.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod output;
pub mod search;

pub use engine::Engine;
pub use errors::{EngineError, Result};
