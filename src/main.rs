// SPDX-License-Identifier: MIT OR Apache-2.0

//! vecsift - Chunked text embeddings with similarity search
//!
//! Command line front end over a local SQLite store and an embedding model
//! loaded on first use.

mod cli;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, EmbedCommands, OutputFormat, OwnerArgs, OwnerCommands, TextArgs};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vecsift::config::Config;
use vecsift::embedding::{ChunkConfig, Owner, OwnerSummary, TextChunker};
use vecsift::output;
use vecsift::Engine;

fn main() -> Result<()> {
    // Initialize tracing with VECSIFT_LOG env var (e.g., VECSIFT_LOG=debug vecsift search "query")
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("VECSIFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let use_color = output::use_colors();

    // Neither of these needs the store or the model.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "vecsift", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Chunk {
            text,
            size,
            overlap,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let chunking = config.chunking();
            let chunk_config = ChunkConfig::new(
                size.unwrap_or_else(|| chunking.chunk_size()),
                overlap.unwrap_or_else(|| chunking.overlap()),
            )?;
            let chunks = TextChunker::new(chunk_config).chunk(&read_text(text)?);
            emit(format, &chunks, || output::render_chunks(&chunks, use_color))?;
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(cli.config.as_deref())?;
    let db = cli.db.unwrap_or_else(|| config.storage().path());
    let engine = Engine::open_at(&config, &db)
        .with_context(|| format!("Failed to open store {}", db.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(cli.command, &engine, format, use_color))
}

async fn run(command: Commands, engine: &Engine, format: OutputFormat, use_color: bool) -> Result<()> {
    match command {
        Commands::Owner(OwnerCommands::Add {
            kind,
            id,
            title,
            detail,
            status,
            text,
        }) => {
            let owner = Owner::new(kind.into(), id)?;
            let mut summary = OwnerSummary::new(owner, title);
            if let Some(status) = status {
                summary = summary.with_status(status.into());
            }
            if let Some(detail) = detail {
                summary = summary.with_detail(detail);
            }

            match text {
                Some(text) => {
                    let records = engine.register_owner(&summary, &text).await?;
                    emit(format, &records, || output::render_records(&records, use_color))?;
                }
                None => {
                    engine.store().upsert_owner(&summary)?;
                    emit(format, &summary, || output::render_owner(&summary, use_color))?;
                }
            }
        }
        Commands::Owner(OwnerCommands::Status { owner, status }) => {
            let owner = owner_ref(&owner)?;
            if !engine.store().set_owner_status(&owner, status.into())? {
                anyhow::bail!("Unknown owner {}", owner);
            }
            let summary = engine
                .store()
                .owner(&owner)?
                .with_context(|| format!("Unknown owner {}", owner))?;
            emit(format, &summary, || output::render_owner(&summary, use_color))?;
        }
        Commands::Owner(OwnerCommands::Remove { owner }) => {
            let owner = owner_ref(&owner)?;
            let removed = engine.store().remove_owner(&owner)?;
            emit(format, &serde_json::json!({ "owner": owner, "removed": removed }), || {
                if removed {
                    format!("Removed {}\n", owner)
                } else {
                    format!("No owner {}\n", owner)
                }
            })?;
        }
        Commands::Embed(EmbedCommands::Create { owner, text }) => {
            let owner = owner_ref(&owner)?;
            let records = engine.lifecycle().create(&owner, &read_text(&text)?).await?;
            emit(format, &records, || output::render_records(&records, use_color))?;
        }
        Commands::Embed(EmbedCommands::Recreate { owner, text }) => {
            let owner = owner_ref(&owner)?;
            let records = engine
                .lifecycle()
                .recreate(&owner, &read_text(&text)?)
                .await?;
            emit(format, &records, || output::render_records(&records, use_color))?;
        }
        Commands::Embed(EmbedCommands::Delete { owner }) => {
            let owner = owner_ref(&owner)?;
            let deleted = engine.lifecycle().delete(&owner).await?;
            emit(format, &serde_json::json!({ "owner": owner, "deleted": deleted }), || {
                format!("Deleted {} embeddings for {}\n", deleted, owner)
            })?;
        }
        Commands::Embed(EmbedCommands::List { owner }) => {
            let owner = owner_ref(&owner)?;
            let records = engine.lifecycle().records(&owner)?;
            emit(format, &records, || output::render_records(&records, use_color))?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
            scope,
        } => {
            let search = engine.search();
            let limits = search.limits();
            let hits = search
                .search_scoped(
                    &query,
                    scope.into(),
                    limit.unwrap_or(limits.default_limit),
                    threshold.unwrap_or(limits.default_threshold),
                )
                .await?;
            emit(format, &hits, || output::render_hits(&hits, use_color))?;
        }
        Commands::Stats => {
            let stats = engine.stats()?;
            emit(format, &stats, || output::render_stats(&stats))?;
        }
        Commands::Chunk { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn owner_ref(args: &OwnerArgs) -> Result<Owner> {
    Ok(Owner::from_refs(
        args.question.as_deref(),
        args.document.as_deref(),
    )?)
}

fn read_text(args: &TextArgs) -> Result<String> {
    match (&args.text, &args.file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => anyhow::bail!("Either --text or --file is required"),
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", text()),
    }
    Ok(())
}
