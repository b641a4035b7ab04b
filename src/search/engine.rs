//! Hybrid retrieval: vector + BM25 over one unit sequence, fused per book.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::embedding::EmbeddingProvider;
use super::lexical::LexicalIndex;
use super::vectordb::{IndexMeta, VectorIndex};
use crate::config::{FusionNormalization, Settings};
use crate::core::record::{corpus_fingerprint, load_corpus, RawBookRecord};
use crate::core::unit::{corpus_units, AtomicUnit, BookAttributes};
use crate::error::{RagError, Result};

/// A book ranked by the hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document_key: String,
    pub score: f32,
    pub attributes: BookAttributes,
}

/// Both indexes over the same ordered unit sequence. Immutable once built.
#[derive(Debug)]
pub struct IndexedCorpus {
    vector: VectorIndex,
    lexical: LexicalIndex,
}

impl IndexedCorpus {
    pub fn build(records: &[RawBookRecord], provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::from_units(corpus_units(records), provider)
    }

    pub fn from_units(units: Vec<AtomicUnit>, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let vector = VectorIndex::build(units, provider)?;
        let lexical = LexicalIndex::build(vector.units());
        Ok(Self { vector, lexical })
    }

    /// Restore the vector half from disk and re-derive the lexical half from
    /// the restored units.
    pub fn load(path: &Path, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let vector = VectorIndex::load(path, provider)?;
        let lexical = LexicalIndex::build(vector.units());
        Ok(Self { vector, lexical })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.vector.save(path)
    }

    pub fn units(&self) -> &[AtomicUnit] {
        self.vector.units()
    }

    pub fn meta(&self) -> &IndexMeta {
        self.vector.meta()
    }

    pub fn vector(&self) -> &VectorIndex {
        &self.vector
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn document_count(&self) -> usize {
        let mut keys: Vec<&str> = self.units().iter().map(|u| u.document_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    }

    /// Hybrid search returning at most `k` books.
    ///
    /// Each index is asked for `k` units. Vector hits contribute
    /// `semantic_weight * (1 - distance)`, lexical hits
    /// `(1 - semantic_weight) * bm25`, summed per book. A side whose weight is
    /// zero is not queried.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        semantic_weight: f32,
        normalization: FusionNormalization,
    ) -> Result<Vec<ScoredDocument>> {
        if !(0.0..=1.0).contains(&semantic_weight) {
            return Err(RagError::Query(format!(
                "semantic_weight must be within [0, 1], got {}",
                semantic_weight
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let lexical_weight = 1.0 - semantic_weight;
        let (vector_hits, lexical_hits) = std::thread::scope(|s| {
            let vector = s.spawn(|| {
                if semantic_weight > 0.0 {
                    self.vector.query(query, k)
                } else {
                    Ok(Vec::new())
                }
            });
            let lexical = if lexical_weight > 0.0 {
                self.lexical.query(query, k)
            } else {
                Vec::new()
            };
            let vector = vector
                .join()
                .unwrap_or_else(|_| Err(RagError::Query("vector query panicked".into())));
            (vector, lexical)
        });
        let vector_hits = vector_hits?;
        debug!(
            query,
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            "hybrid fan-out"
        );

        let mut semantic: Vec<(usize, f32)> = vector_hits
            .into_iter()
            .map(|(ordinal, distance)| (ordinal, 1.0 - distance))
            .collect();
        let mut lexical = lexical_hits;
        if normalization == FusionNormalization::MinMax {
            min_max(&mut semantic);
            min_max(&mut lexical);
        }

        let mut fused = Fusion::default();
        fused.add(self.units(), &semantic, semantic_weight);
        fused.add(self.units(), &lexical, lexical_weight);
        Ok(fused.ranked(k))
    }
}

/// Per-book score accumulator; attributes come from the first hit seen.
#[derive(Default)]
struct Fusion {
    docs: Vec<ScoredDocument>,
    by_key: HashMap<String, usize>,
}

impl Fusion {
    fn add(&mut self, units: &[AtomicUnit], hits: &[(usize, f32)], weight: f32) {
        for &(ordinal, score) in hits {
            let Some(unit) = units.get(ordinal) else { continue };
            let contribution = weight * score;
            match self.by_key.get(&unit.document_key) {
                Some(&i) => self.docs[i].score += contribution,
                None => {
                    self.by_key.insert(unit.document_key.clone(), self.docs.len());
                    self.docs.push(ScoredDocument {
                        document_key: unit.document_key.clone(),
                        score: contribution,
                        attributes: unit.attributes.clone(),
                    });
                }
            }
        }
    }

    /// Score descending; equal scores keep first-seen order.
    fn ranked(mut self, k: usize) -> Vec<ScoredDocument> {
        self.docs.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.docs.truncate(k);
        self.docs
    }
}

fn min_max(hits: &mut [(usize, f32)]) {
    let Some(min) = hits.iter().map(|h| h.1).reduce(f32::min) else { return };
    let max = hits.iter().map(|h| h.1).fold(min, f32::max);
    let span = max - min;
    for hit in hits.iter_mut() {
        hit.1 = if span > 0.0 { (hit.1 - min) / span } else { 1.0 };
    }
}

/// Build the corpus index from the record directory and persist it.
pub fn build_and_save(
    corpus_dir: &Path,
    index_path: &Path,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<IndexedCorpus> {
    let fingerprint = corpus_fingerprint(corpus_dir)?;
    let load = load_corpus(corpus_dir)?;
    let mut corpus = IndexedCorpus::build(&load.records, provider)?;
    corpus.vector.set_corpus_fingerprint(Some(fingerprint));
    corpus.save(index_path)?;
    info!(
        books = load.records.len(),
        units = corpus.units().len(),
        skipped = load.skipped.len(),
        "index rebuilt"
    );
    Ok(corpus)
}

/// Why a loaded index cannot be used as-is, if at all.
fn staleness(corpus: &IndexedCorpus, provider: &dyn EmbeddingProvider, fingerprint: Option<&str>) -> Option<String> {
    let meta = corpus.meta();
    if meta.embedder_id != provider.id() {
        return Some(format!(
            "index built with '{}', current provider is '{}'",
            meta.embedder_id,
            provider.id()
        ));
    }
    match (fingerprint, meta.corpus_fingerprint.as_deref()) {
        (Some(current), Some(stored)) if current != stored => Some("corpus changed".to_string()),
        (Some(_), None) => Some("index has no corpus fingerprint".to_string()),
        _ => None,
    }
}

/// Load the persisted index, rebuilding it at most once when it is missing
/// or stale. A failure after the rebuild is returned to the caller.
pub fn load_or_build(
    corpus_dir: &Path,
    index_path: &Path,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<IndexedCorpus> {
    const MAX_REBUILDS: usize = 1;
    let mut rebuilds = 0;

    loop {
        // a missing corpus dir leaves a persisted index usable
        let fingerprint = corpus_fingerprint(corpus_dir).ok();
        let reason = match IndexedCorpus::load(index_path, provider.clone()) {
            Ok(corpus) => match staleness(&corpus, provider.as_ref(), fingerprint.as_deref()) {
                None => return Ok(corpus),
                Some(reason) => reason,
            },
            Err(e) if e.is_recoverable() && rebuilds < MAX_REBUILDS => e.to_string(),
            Err(e) => return Err(e),
        };

        if rebuilds == MAX_REBUILDS {
            return Err(RagError::Query(format!(
                "index at {} unusable after rebuild: {}",
                index_path.display(),
                reason
            )));
        }
        rebuilds += 1;
        warn!(reason = %reason, path = %index_path.display(), "rebuilding index");
        build_and_save(corpus_dir, index_path, provider.clone())?;
    }
}

/// Shared, swappable handle to the current corpus index.
///
/// Queries clone the inner `Arc` and run without holding the lock; a rebuild
/// builds and saves a new corpus first and then swaps the pointer.
pub struct HybridRanker {
    current: RwLock<Arc<IndexedCorpus>>,
    rebuild_lock: Mutex<()>,
    provider: Arc<dyn EmbeddingProvider>,
    corpus_dir: PathBuf,
    index_path: PathBuf,
    semantic_weight: f32,
    normalization: FusionNormalization,
}

impl HybridRanker {
    pub fn new(
        corpus: IndexedCorpus,
        provider: Arc<dyn EmbeddingProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
            rebuild_lock: Mutex::new(()),
            provider,
            corpus_dir: settings.corpus_dir.clone(),
            index_path: settings.index_path.clone(),
            semantic_weight: settings.search.semantic_weight,
            normalization: settings.search.normalization,
        }
    }

    /// Load (or build once) the index named by `settings`.
    pub fn open(settings: &Settings, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let corpus = load_or_build(&settings.corpus_dir, &settings.index_path, provider.clone())?;
        Ok(Self::new(corpus, provider, settings))
    }

    pub fn corpus(&self) -> Arc<IndexedCorpus> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn semantic_weight(&self) -> f32 {
        self.semantic_weight
    }

    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        self.search_weighted(query, k, self.semantic_weight)
    }

    pub fn search_weighted(&self, query: &str, k: usize, semantic_weight: f32) -> Result<Vec<ScoredDocument>> {
        self.corpus()
            .search(query, k, semantic_weight, self.normalization)
    }

    /// Rebuild from the corpus directory, persist, then swap in.
    pub fn rebuild(&self) -> Result<()> {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let corpus = build_and_save(&self.corpus_dir, &self.index_path, self.provider.clone())?;
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(corpus);
        Ok(())
    }
}
