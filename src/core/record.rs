//! Book records on disk and corpus loading.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagError, Result};

/// One book as stored in the corpus directory (one JSON file per book).
///
/// Field names follow the catalog payload the corpus is harvested from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBookRecord {
    pub title: String,
    pub author: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub description: String,
    #[serde(rename = "categoryName")]
    pub category_name: String,
    /// Table of contents as catalog markup (`<b>` headings, `<br>` items).
    pub toc: String,
}

/// Result of reading a corpus directory.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub records: Vec<RawBookRecord>,
    /// Per-file failures that were skipped (always `MalformedRecord`).
    pub skipped: Vec<RagError>,
}

impl RawBookRecord {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| RagError::MalformedRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(path, &raw)
    }

    fn from_json(path: &Path, raw: &str) -> Result<Self> {
        let record: RawBookRecord =
            serde_json::from_str(raw).map_err(|e| RagError::MalformedRecord {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if record.title.trim().is_empty() {
            return Err(RagError::MalformedRecord {
                path: path.to_path_buf(),
                reason: "empty title".to_string(),
            });
        }

        Ok(record)
    }
}

/// List `*.json` record files directly under `dir`, sorted by file name.
pub fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::CorpusRead {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| RagError::CorpusRead {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Read every record in the corpus directory.
///
/// Malformed files and duplicate titles are skipped and reported in
/// [`CorpusLoad::skipped`]. A directory without a single valid record is fatal.
pub fn load_corpus(dir: &Path) -> Result<CorpusLoad> {
    let files = record_files(dir)?;
    let mut load = CorpusLoad::default();
    let mut titles: HashSet<String> = HashSet::new();

    for path in &files {
        match RawBookRecord::from_file(path) {
            Ok(record) => {
                if !titles.insert(record.title.clone()) {
                    let err = RagError::MalformedRecord {
                        path: path.clone(),
                        reason: format!("duplicate title '{}'", record.title),
                    };
                    warn!(error = %err, "skipping record");
                    load.skipped.push(err);
                    continue;
                }
                load.records.push(record);
            }
            Err(err) => {
                warn!(error = %err, "skipping record");
                load.skipped.push(err);
            }
        }
    }

    if load.records.is_empty() {
        return Err(RagError::CorpusRead {
            path: dir.to_path_buf(),
            reason: format!(
                "no valid records ({} files, {} skipped)",
                files.len(),
                load.skipped.len()
            ),
        });
    }

    info!(
        dir = %dir.display(),
        records = load.records.len(),
        skipped = load.skipped.len(),
        "corpus loaded"
    );
    Ok(load)
}

/// Content hash of the corpus, used to detect a stale persisted index.
pub fn corpus_fingerprint(dir: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    for path in record_files(dir)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&fs::read(&path)?);
        hasher.update(&[0]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
