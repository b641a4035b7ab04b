//! Search command - book search with catalog fallback

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::sync::Arc;

use book_rag::search::provider_from_settings;
use book_rag::{parse_toc, AladinCatalog, BookSearchTool, HybridRanker, ResultSource, Settings};

use super::{colored_score, truncate};

/// Run search command
pub fn run(
    settings: &Settings,
    query: &str,
    k: Option<usize>,
    weight: Option<f32>,
    no_fallback: bool,
    json: bool,
) -> Result<()> {
    let k = k.unwrap_or(settings.search.k);
    if let Some(w) = weight {
        if !(0.0..=1.0).contains(&w) {
            bail!("--weight must be within [0, 1], got {}", w);
        }
    }

    let provider = provider_from_settings(&settings.embedding)?;
    let ranker = HybridRanker::open(settings, provider).context("Failed to open book index")?;
    let catalog = AladinCatalog::new(&settings.catalog)?;

    let mut tool = BookSearchTool::new(Arc::new(ranker), Arc::new(catalog), settings);
    if let Some(w) = weight {
        tool = tool.with_semantic_weight(w);
    }
    if no_fallback {
        tool = tool.without_fallback();
    }

    let result = tool.search_books(query, k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.source == ResultSource::Catalog {
        let top = result
            .top_score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "none".to_string());
        println!(
            "{} Low index confidence (top {} < {:.2}), showing live catalog results",
            "!".yellow(),
            top,
            settings.search.confidence_threshold
        );
        println!();
    }

    if result.books.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return Ok(());
    }

    println!(
        "{} {} results for: {} ({})",
        "→".dimmed(),
        result.books.len(),
        query.cyan(),
        result.source
    );
    if let (ResultSource::Hybrid, Some(top)) = (result.source, result.top_score) {
        println!("  {} top score {}", "→".dimmed(), colored_score(top));
    }
    println!();

    for (i, book) in result.books.iter().enumerate() {
        println!("{}. {}", (i + 1).to_string().bold(), book.title.cyan());
        println!("   {} | {} | {}", book.author, book.pub_date, book.category_name);
        let toc = parse_toc(&book.toc);
        let outline = if toc.is_empty() {
            book.toc.clone()
        } else {
            toc.chapters
                .iter()
                .map(|c| c.title.as_str())
                .collect::<Vec<_>>()
                .join(" / ")
        };
        println!("   {}", truncate(&outline, 100).dimmed());
        println!();
    }

    Ok(())
}
