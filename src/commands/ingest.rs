//! Ingest command - harvest catalog records into the corpus directory

use anyhow::{Context, Result};
use colored::Colorize;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;

use book_rag::{AladinCatalog, CatalogBook, CatalogSearch, RawBookRecord, Settings};

lazy_static! {
    static ref UNSAFE_NAME_RE: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

/// Record file name: ISBN-13 when known, otherwise a slug of the title.
fn record_file_name(book: &CatalogBook) -> String {
    match &book.isbn13 {
        Some(isbn) => format!("{}.json", isbn),
        None => {
            let slug = UNSAFE_NAME_RE.replace_all(book.title.trim(), "_");
            format!("{}.json", slug.trim_matches('_'))
        }
    }
}

pub fn run(settings: &Settings, query: &str, limit: usize, json: bool) -> Result<()> {
    let catalog = AladinCatalog::new(&settings.catalog)?;
    let books = catalog.search_catalog(query, limit)?;

    std::fs::create_dir_all(&settings.corpus_dir)
        .with_context(|| format!("Failed to create {}", settings.corpus_dir.display()))?;
    let mut written: Vec<PathBuf> = Vec::with_capacity(books.len());
    for book in books {
        let path = settings.corpus_dir.join(record_file_name(&book));
        let record = RawBookRecord::from(book);
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "query": query,
                "written": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            })
        );
    } else if written.is_empty() {
        println!("{} Catalog returned no books for: {}", "→".dimmed(), query.cyan());
    } else {
        println!(
            "{} Wrote {} records to {}",
            "✓".green().bold(),
            written.len().to_string().cyan(),
            settings.corpus_dir.display()
        );
        for path in &written {
            println!("  {} {}", "→".dimmed(), path.display());
        }
        println!(
            "  {} Run {} to refresh the index",
            "→".dimmed(),
            "bookrag index".cyan()
        );
    }

    Ok(())
}
