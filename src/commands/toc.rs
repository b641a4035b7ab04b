//! Toc command - show how one record is split into chapters and units

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use book_rag::{parse_toc, to_units, RawBookRecord};

use super::truncate;

pub fn run(path: &Path, json: bool) -> Result<()> {
    let record = RawBookRecord::from_file(path)
        .with_context(|| format!("Failed to read record {}", path.display()))?;
    let toc = parse_toc(&record.toc);
    let units = to_units(&record);

    if json {
        let units_json: Vec<_> = units
            .iter()
            .map(|u| serde_json::json!({ "kind": u.kind.as_str(), "text": u.text }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "title": record.title,
                "chapters": toc.chapters,
                "units": units_json,
            }))?
        );
        return Ok(());
    }

    println!("{}", record.title.bold().cyan());
    println!();

    if toc.is_empty() {
        println!("{} No chapters found in table of contents", "!".yellow());
    } else {
        println!(
            "{} {} chapters, {} items",
            "→".dimmed(),
            toc.chapters.len(),
            toc.leaf_count()
        );
        for chapter in &toc.chapters {
            println!("  {}", chapter.title.bold());
            for item in &chapter.items {
                println!("    - {}", item);
            }
        }
    }

    println!();
    println!("{} {} units", "→".dimmed(), units.len().to_string().cyan());
    for unit in &units {
        println!("  [{}] {}", unit.kind.as_str().dimmed(), truncate(&unit.text, 80));
    }

    Ok(())
}
