// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use vecsift::embedding::{OwnerKind, OwnerStatus, SearchScope};

/// vecsift - Chunked text embeddings with similarity search
///
/// Registers questions and documents, embeds their text in overlapping chunks
/// and answers nearest-neighbour queries over approved owners.
#[derive(Parser, Debug)]
#[command(name = "vecsift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Config file (defaults to .vecsift.toml or ~/.config/vecsift/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database (overrides [storage].path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Owner kind as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliOwnerKind {
    Question,
    Document,
}

impl From<CliOwnerKind> for OwnerKind {
    fn from(kind: CliOwnerKind) -> Self {
        match kind {
            CliOwnerKind::Question => OwnerKind::Question,
            CliOwnerKind::Document => OwnerKind::Document,
        }
    }
}

/// Owner status as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliOwnerStatus {
    Pending,
    Approved,
    Disabled,
}

impl From<CliOwnerStatus> for OwnerStatus {
    fn from(status: CliOwnerStatus) -> Self {
        match status {
            CliOwnerStatus::Pending => OwnerStatus::Pending,
            CliOwnerStatus::Approved => OwnerStatus::Approved,
            CliOwnerStatus::Disabled => OwnerStatus::Disabled,
        }
    }
}

/// Which owners a search may return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliScope {
    #[default]
    All,
    Questions,
    Documents,
}

impl From<CliScope> for SearchScope {
    fn from(scope: CliScope) -> Self {
        match scope {
            CliScope::All => SearchScope::All,
            CliScope::Questions => SearchScope::Questions,
            CliScope::Documents => SearchScope::Documents,
        }
    }
}

/// Identifies one owner
#[derive(Args, Debug, Clone)]
pub struct OwnerArgs {
    /// Question id
    #[arg(long, conflicts_with = "document")]
    pub question: Option<String>,

    /// Document id
    #[arg(long)]
    pub document: Option<String>,
}

/// Text given inline or read from a file
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TextArgs {
    /// Text to embed
    #[arg(long)]
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum OwnerCommands {
    /// Register an owner, optionally embedding its text
    Add {
        #[arg(value_enum)]
        kind: CliOwnerKind,

        /// Owner id
        id: String,

        /// Question text or document title
        #[arg(long)]
        title: String,

        /// Approved answer or other detail shown with results
        #[arg(long)]
        detail: Option<String>,

        /// Initial status (questions start pending, documents approved)
        #[arg(long, value_enum)]
        status: Option<CliOwnerStatus>,

        /// Text to embed right away; the owner is removed if embedding fails
        #[arg(long)]
        text: Option<String>,
    },

    /// Change an owner's approval status
    Status {
        #[command(flatten)]
        owner: OwnerArgs,

        #[arg(value_enum)]
        status: CliOwnerStatus,
    },

    /// Remove an owner together with its embeddings
    Remove {
        #[command(flatten)]
        owner: OwnerArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum EmbedCommands {
    /// Embed text for an owner that has none yet
    Create {
        #[command(flatten)]
        owner: OwnerArgs,

        #[command(flatten)]
        text: TextArgs,
    },

    /// Replace an owner's embeddings after its text changed
    Recreate {
        #[command(flatten)]
        owner: OwnerArgs,

        #[command(flatten)]
        text: TextArgs,
    },

    /// Delete an owner's embeddings
    Delete {
        #[command(flatten)]
        owner: OwnerArgs,
    },

    /// List an owner's stored chunks
    List {
        #[command(flatten)]
        owner: OwnerArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split text into overlapping chunks without embedding it
    Chunk {
        #[command(flatten)]
        text: TextArgs,

        /// Maximum characters per chunk (overrides [chunking].chunk_size)
        #[arg(long)]
        size: Option<usize>,

        /// Overlap between chunks (overrides [chunking].overlap)
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Manage questions and documents
    #[command(subcommand)]
    Owner(OwnerCommands),

    /// Create, replace, delete or list embeddings
    #[command(subcommand)]
    Embed(EmbedCommands),

    /// Find chunks similar to a query
    Search {
        /// Query text
        query: String,

        /// Maximum number of results
        #[arg(short = 'm', long)]
        limit: Option<usize>,

        /// Minimum similarity in [0, 1]
        #[arg(short = 't', long)]
        threshold: Option<f32>,

        /// Restrict results to one owner kind
        #[arg(long, value_enum, default_value_t = CliScope::All)]
        scope: CliScope,
    },

    /// Show embedding statistics
    Stats,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
