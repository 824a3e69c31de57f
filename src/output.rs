// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Text renderers for search hits, stored records and statistics. Colors
//! respect the NO_COLOR environment variable.

use colored::Colorize;

use crate::embedding::storage::{ChunkEmbedding, EmbeddingStats, OwnerSummary, SearchHit};

const PREVIEW_CHARS: usize = 160;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize owner reference (cyan)
pub fn colorize_owner(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize similarity score (green bold)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.3}", score);
    if use_color {
        text.green().bold().to_string()
    } else {
        text
    }
}

/// Colorize chunk index (yellow)
pub fn colorize_index(index: u32, use_color: bool) -> String {
    if use_color {
        index.to_string().yellow().to_string()
    } else {
        index.to_string()
    }
}

/// Colorize secondary text (dimmed)
pub fn colorize_dim(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Shortens text to one line of at most `PREVIEW_CHARS` characters.
pub fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

pub fn render_hits(hits: &[SearchHit], use_color: bool) -> String {
    if hits.is_empty() {
        return "No matches above the similarity threshold.\n".to_string();
    }

    let mut out = String::new();
    for (rank, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} {} [chunk {}] {}\n",
            rank + 1,
            colorize_score(hit.score, use_color),
            colorize_owner(&hit.owner.owner.to_string(), use_color),
            colorize_index(hit.record.chunk_index, use_color),
            hit.owner.title
        ));
        out.push_str(&format!(
            "   {}\n",
            colorize_dim(&preview(&hit.record.chunk_text), use_color)
        ));
        if let Some(detail) = &hit.owner.detail {
            out.push_str(&format!("   -> {}\n", preview(detail)));
        }
    }
    out
}

pub fn render_records(records: &[ChunkEmbedding], use_color: bool) -> String {
    if records.is_empty() {
        return "No embeddings stored.\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "{} [chunk {}] {} chars, {} {}\n",
            colorize_owner(&record.owner.to_string(), use_color),
            colorize_index(record.chunk_index, use_color),
            record.chunk_size,
            record.processing_model,
            record.processing_version
        ));
        out.push_str(&format!(
            "   {}\n",
            colorize_dim(&preview(&record.chunk_text), use_color)
        ));
    }
    out
}

pub fn render_chunks(chunks: &[String], use_color: bool) -> String {
    let mut out = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!(
            "[chunk {}] {} chars\n",
            colorize_index(index as u32, use_color),
            chunk.chars().count()
        ));
        out.push_str(chunk);
        out.push('\n');
    }
    out
}

pub fn render_owner(summary: &OwnerSummary, use_color: bool) -> String {
    format!(
        "{} {} {}\n",
        colorize_owner(&summary.owner.to_string(), use_color),
        summary.status,
        summary.title
    )
}

pub fn render_stats(stats: &EmbeddingStats) -> String {
    let mut out = format!(
        "Total embeddings:     {}\n\
         Owners with vectors:  {}\n\
         Avg chunks per owner: {:.2}\n\
         Embedding dimension:  {}\n",
        stats.total_embeddings,
        stats.owners_with_embeddings,
        stats.avg_chunks_per_owner,
        stats.embedding_dimension
    );
    for model in &stats.processing_models {
        out.push_str(&format!("  {}: {}\n", model.model, model.count));
    }
    out
}
