//! Index command - build, rebuild or inspect the persisted corpus index

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::time::Instant;

use book_rag::search::engine::{build_and_save, load_or_build};
use book_rag::search::{provider_from_settings, VectorIndex};
use book_rag::{RagError, Settings};

/// Run index command
pub fn run(settings: &Settings, status_only: bool, rebuild: bool, json: bool) -> Result<()> {
    if status_only {
        return show_status(&settings.index_path, json);
    }

    let provider = provider_from_settings(&settings.embedding)?;
    if !json {
        let verb = if rebuild { "Rebuilding" } else { "Loading" };
        println!(
            "{} {} index for {} ...",
            "→".dimmed(),
            verb,
            settings.corpus_dir.display()
        );
    }

    let started = Instant::now();
    let corpus = if rebuild {
        build_and_save(&settings.corpus_dir, &settings.index_path, provider)?
    } else {
        load_or_build(&settings.corpus_dir, &settings.index_path, provider)?
    };
    let duration_ms = started.elapsed().as_millis();
    let meta = corpus.meta();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "books": corpus.document_count(),
                "units": corpus.units().len(),
                "embedder": meta.embedder_id,
                "dim": meta.dim,
                "path": settings.index_path.display().to_string(),
                "duration_ms": duration_ms,
            })
        );
    } else {
        println!();
        println!(
            "{} {} books, {} units ready in {:.2}s",
            "✓".green().bold(),
            corpus.document_count().to_string().cyan(),
            corpus.units().len().to_string().cyan(),
            duration_ms as f64 / 1000.0
        );
        println!("  {} Embedder: {} (d{})", "→".dimmed(), meta.embedder_id, meta.dim);
        println!(
            "  {} Index saved to: {}",
            "→".dimmed(),
            settings.index_path.display()
        );
    }

    Ok(())
}

/// Show index status
fn show_status(index_path: &Path, json: bool) -> Result<()> {
    let stats = match VectorIndex::stats(index_path) {
        Ok(stats) => stats,
        Err(RagError::IndexNotFound(_)) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "exists": false,
                        "error": "Index not found"
                    })
                );
            } else {
                println!(
                    "{} Index not found. Run {} first.",
                    "!".yellow().bold(),
                    "bookrag index".cyan()
                );
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let built_at = chrono::DateTime::from_timestamp(stats.meta.built_at, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    if json {
        println!(
            "{}",
            serde_json::json!({
                "exists": true,
                "books": stats.document_count,
                "units": stats.unit_count,
                "embedder": stats.meta.embedder_id,
                "dim": stats.meta.dim,
                "corpus_fingerprint": stats.meta.corpus_fingerprint,
                "built_at": built_at,
                "file_size_bytes": stats.file_size,
            })
        );
    } else {
        println!("{}", "Index Status".bold());
        println!();
        println!(
            "  {} {} books indexed",
            "→".dimmed(),
            stats.document_count.to_string().cyan()
        );
        println!(
            "  {} {} units",
            "→".dimmed(),
            stats.unit_count.to_string().cyan()
        );
        println!(
            "  {} Embedder: {} (d{})",
            "→".dimmed(),
            stats.meta.embedder_id,
            stats.meta.dim
        );
        println!(
            "  {} Size: {:.2} KB",
            "→".dimmed(),
            stats.file_size as f64 / 1024.0
        );
        println!("  {} Built: {}", "→".dimmed(), built_at);
    }

    Ok(())
}
