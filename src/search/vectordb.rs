//! Vector index over atomic units, persisted as one SQLite file.
//!
//! The file holds the unit metadata table (ordinal → unit) and the vectors in
//! the same rows, so both halves are always written and read as a pair.
//! Similarity is computed in Rust with an exact scan.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use super::embedding::{cosine_distance, EmbeddingProvider};
use crate::core::unit::{AtomicUnit, BookAttributes, UnitKind};
use crate::error::{RagError, Result};

const FORMAT_VERSION: &str = "1";

/// Build-time facts stored next to the vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub embedder_id: String,
    pub dim: usize,
    pub corpus_fingerprint: Option<String>,
    pub built_at: i64,
}

/// Summary of a persisted index, readable without loading vectors.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub unit_count: usize,
    pub document_count: usize,
    pub meta: IndexMeta,
    pub file_size: u64,
}

pub struct VectorIndex {
    units: Vec<AtomicUnit>,
    vectors: Vec<Vec<f32>>,
    meta: IndexMeta,
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("units", &self.units.len())
            .field("meta", &self.meta)
            .finish()
    }
}

impl VectorIndex {
    /// Embed every unit. Any provider failure aborts the whole build.
    pub fn build(units: Vec<AtomicUnit>, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            provider.embed_batch(&texts)?
        };

        if vectors.len() != units.len() {
            return Err(RagError::EmbeddingProvider(format!(
                "expected {} vectors, got {}",
                units.len(),
                vectors.len()
            )));
        }
        let dim = vectors.first().map(|v| v.len()).unwrap_or_else(|| provider.dim());
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(RagError::EmbeddingProvider(format!(
                "vector {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dim
            )));
        }

        let meta = IndexMeta {
            embedder_id: provider.id(),
            dim,
            corpus_fingerprint: None,
            built_at: chrono::Utc::now().timestamp(),
        };
        info!(units = units.len(), dim, embedder = %meta.embedder_id, "vector index built");

        Ok(Self {
            units,
            vectors,
            meta,
            provider,
        })
    }

    pub fn units(&self) -> &[AtomicUnit] {
        &self.units
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn set_corpus_fingerprint(&mut self, fingerprint: Option<String>) {
        self.meta.corpus_fingerprint = fingerprint;
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The `k` nearest units as `(ordinal, distance)`, nearest first.
    ///
    /// Distance is `1 - max(cos, 0)`, in [0, 1]; ties keep ordinal order.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<(usize, f32)>> {
        if k == 0 || self.units.is_empty() {
            return Ok(Vec::new());
        }

        let query = self
            .provider
            .embed(text)
            .map_err(|e| RagError::Query(format!("embedding query text: {}", e)))?;
        if query.len() != self.meta.dim {
            return Err(RagError::Query(format!(
                "query vector has dimension {}, index expects {}",
                query.len(),
                self.meta.dim
            )));
        }

        Ok(self.nearest(&query, k))
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, v)| (ordinal, cosine_distance(query, v)))
            .collect();

        scored.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);
        scored
    }

    /// Persist to `path` via a sibling temp file renamed into place, so a
    /// concurrent reader sees either the old file or the complete new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(path);
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }

        let written = self.write_db(&tmp);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, path)?;

        info!(path = %path.display(), units = self.units.len(), "index saved");
        Ok(())
    }

    fn write_db(&self, path: &Path) -> Result<()> {
        let mut conn = Connection::open(path)?;
        init_schema(&conn)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO units (ordinal, document_key, kind, text, author, pub_date, category_name, toc, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for (ordinal, (unit, vector)) in self.units.iter().zip(&self.vectors).enumerate() {
                stmt.execute(params![
                    ordinal as i64,
                    unit.document_key,
                    unit.kind.as_str(),
                    unit.text,
                    unit.attributes.author,
                    unit.attributes.pub_date,
                    unit.attributes.category_name,
                    unit.attributes.toc,
                    embedding_to_blob(vector),
                ])?;
            }

            let mut meta = tx.prepare("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")?;
            meta.execute(params!["format_version", FORMAT_VERSION])?;
            meta.execute(params!["embedder_id", self.meta.embedder_id])?;
            meta.execute(params!["dim", self.meta.dim.to_string()])?;
            meta.execute(params!["built_at", self.meta.built_at.to_string()])?;
            if let Some(fp) = &self.meta.corpus_fingerprint {
                meta.execute(params!["corpus_fingerprint", fp])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load a persisted index. `IndexNotFound` when nothing exists at `path`.
    pub fn load(path: &Path, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let conn = open_existing(path)?;
        let meta = read_meta(&conn)?;

        let mut stmt = conn.prepare(
            r#"
            SELECT document_key, kind, text, author, pub_date, category_name, toc, embedding
            FROM units ORDER BY ordinal
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                BookAttributes {
                    author: row.get(3)?,
                    pub_date: row.get(4)?,
                    category_name: row.get(5)?,
                    toc: row.get(6)?,
                },
                row.get::<_, Vec<u8>>(7)?,
            ))
        })?;

        let mut units = Vec::new();
        let mut vectors = Vec::new();
        for row in rows {
            let (document_key, kind, text, attributes, blob) = row?;
            let vector = blob_to_embedding(&blob);
            if vector.len() != meta.dim {
                return Err(RagError::Query(format!(
                    "stored vector for unit {} has dimension {}, expected {}",
                    units.len(),
                    vector.len(),
                    meta.dim
                )));
            }
            units.push(AtomicUnit {
                text,
                kind: kind.parse::<UnitKind>().map_err(RagError::Query)?,
                document_key,
                attributes,
            });
            vectors.push(vector);
        }

        info!(path = %path.display(), units = units.len(), "index loaded");
        Ok(Self {
            units,
            vectors,
            meta,
            provider,
        })
    }

    /// Read the summary of a persisted index.
    pub fn stats(path: &Path) -> Result<IndexStats> {
        let conn = open_existing(path)?;
        let meta = read_meta(&conn)?;
        let unit_count: i64 = conn.query_row("SELECT COUNT(*) FROM units", [], |row| row.get(0))?;
        let document_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT document_key) FROM units",
            [],
            |row| row.get(0),
        )?;
        let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        Ok(IndexStats {
            unit_count: unit_count as usize,
            document_count: document_count as usize,
            meta,
            file_size,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.db".into());
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

fn open_existing(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(RagError::IndexNotFound(path.to_path_buf()));
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS units (
            ordinal INTEGER PRIMARY KEY,
            document_key TEXT NOT NULL,
            kind TEXT NOT NULL,
            text TEXT NOT NULL,
            author TEXT NOT NULL,
            pub_date TEXT NOT NULL,
            category_name TEXT NOT NULL,
            toc TEXT NOT NULL,
            embedding BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_units_document ON units(document_key);
        "#,
    )?;
    Ok(())
}

fn read_meta(conn: &Connection) -> Result<IndexMeta> {
    let get = |key: &str| -> Result<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    };

    let version = get("format_version")?.unwrap_or_default();
    if version != FORMAT_VERSION {
        return Err(RagError::Query(format!(
            "unsupported index format '{}'",
            version
        )));
    }
    let embedder_id = get("embedder_id")?.unwrap_or_default();
    let dim = get("dim")?
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| RagError::Query("index metadata lacks 'dim'".into()))?;
    let built_at = get("built_at")?.and_then(|v| v.parse().ok()).unwrap_or(0);

    Ok(IndexMeta {
        embedder_id,
        dim,
        corpus_fingerprint: get("corpus_fingerprint")?,
        built_at,
    })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::HtpEmbedder;

    fn unit(key: &str, text: &str, kind: UnitKind) -> AtomicUnit {
        AtomicUnit {
            text: text.to_string(),
            kind,
            document_key: key.to_string(),
            attributes: BookAttributes {
                author: "Park".into(),
                pub_date: "2024-03-01".into(),
                category_name: "Exam".into(),
                toc: "<b>1</b>a<br>".into(),
            },
        }
    }

    fn sample() -> Vec<AtomicUnit> {
        vec![
            unit("Circuits", "Circuits", UnitKind::Title),
            unit("Circuits", "Ohm law and resistor networks", UnitKind::Description),
            unit("Cooking", "Cooking", UnitKind::Title),
            unit("Cooking", "Recipes for rice and soup", UnitKind::Description),
        ]
    }

    #[test]
    fn test_blob_conversion() {
        let embedding = vec![1.0, 2.0, 3.0, -0.5];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&embedding)), embedding);
    }

    #[test]
    fn test_query_nearest_first() {
        let index = VectorIndex::build(sample(), Arc::new(HtpEmbedder::new())).unwrap();
        let hits = index.query("Recipes for rice and soup", 4).unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].0, 3);
        assert!(hits[0].1 < 1e-4);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(hits.iter().all(|(_, d)| (0.0..=1.0).contains(d)));
    }

    #[test]
    fn test_zero_k_and_empty_index() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HtpEmbedder::new());
        let index = VectorIndex::build(sample(), provider.clone()).unwrap();
        assert!(index.query("anything", 0).unwrap().is_empty());

        let empty = VectorIndex::build(Vec::new(), provider).unwrap();
        assert!(empty.is_empty());
        assert!(empty.query("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.db");
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HtpEmbedder::new());

        let mut index = VectorIndex::build(sample(), provider.clone()).unwrap();
        index.set_corpus_fingerprint(Some("abc".into()));
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, provider).unwrap();
        assert_eq!(loaded.units(), index.units());
        assert_eq!(loaded.meta(), index.meta());
        assert_eq!(
            loaded.query("resistor", 3).unwrap(),
            index.query("resistor", 3).unwrap()
        );

        let stats = VectorIndex::stats(&path).unwrap();
        assert_eq!(stats.unit_count, 4);
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.meta.corpus_fingerprint.as_deref(), Some("abc"));
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HtpEmbedder::new());

        VectorIndex::build(sample(), provider.clone()).unwrap().save(&path).unwrap();
        VectorIndex::build(sample()[..2].to_vec(), provider.clone())
            .unwrap()
            .save(&path)
            .unwrap();

        assert_eq!(VectorIndex::load(&path, provider).unwrap().len(), 2);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_load_missing_is_index_not_found() {
        let err = VectorIndex::load(
            Path::new("/tmp/no-such-dir/index.db"),
            Arc::new(HtpEmbedder::new()),
        )
        .unwrap_err();
        assert!(matches!(err, RagError::IndexNotFound(_)));
        assert!(err.is_recoverable());
    }
}
