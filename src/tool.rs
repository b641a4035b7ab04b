//! The book-search tool handed to the conversational layer.
//!
//! Hybrid results are returned when the best book scores at least the
//! confidence threshold; otherwise they are dropped and the live catalog
//! answers instead.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::catalog::{BookSummary, CatalogSearch};
use crate::config::Settings;
use crate::error::Result;
use crate::search::engine::{HybridRanker, ScoredDocument};

/// Ranks indexed books for a query.
pub trait DocumentRanker: Send + Sync {
    fn rank(&self, query: &str, k: usize, semantic_weight: f32) -> Result<Vec<ScoredDocument>>;
}

impl DocumentRanker for HybridRanker {
    fn rank(&self, query: &str, k: usize, semantic_weight: f32) -> Result<Vec<ScoredDocument>> {
        self.search_weighted(query, k, semantic_weight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Hybrid,
    Catalog,
}

impl std::fmt::Display for ResultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultSource::Hybrid => write!(f, "hybrid"),
            ResultSource::Catalog => write!(f, "catalog"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookSearchResult {
    pub source: ResultSource,
    /// Best hybrid score, whichever source answered.
    pub top_score: Option<f32>,
    pub books: Vec<BookSummary>,
}

pub struct BookSearchTool {
    ranker: Arc<dyn DocumentRanker>,
    catalog: Arc<dyn CatalogSearch>,
    semantic_weight: f32,
    threshold: f32,
    fallback: bool,
}

impl BookSearchTool {
    pub fn new(ranker: Arc<dyn DocumentRanker>, catalog: Arc<dyn CatalogSearch>, settings: &Settings) -> Self {
        Self {
            ranker,
            catalog,
            semantic_weight: settings.search.semantic_weight,
            threshold: settings.search.confidence_threshold,
            fallback: true,
        }
    }

    pub fn with_semantic_weight(mut self, weight: f32) -> Self {
        self.semantic_weight = weight;
        self
    }

    /// Disable the catalog fallback; low-confidence hybrid results are
    /// returned as-is.
    pub fn without_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }

    pub fn search_books(&self, query: &str, k: usize) -> Result<BookSearchResult> {
        let ranked = self.ranker.rank(query, k, self.semantic_weight)?;
        let top_score = ranked.first().map(|d| d.score);
        let confident = top_score.map(|s| s >= self.threshold).unwrap_or(false);

        if confident || !self.fallback {
            return Ok(BookSearchResult {
                source: ResultSource::Hybrid,
                top_score,
                books: ranked.iter().map(BookSummary::from).collect(),
            });
        }

        info!(
            query,
            top_score = top_score.unwrap_or(0.0),
            threshold = self.threshold,
            "low confidence, falling back to catalog"
        );
        let books = self.catalog.search_catalog(query, k)?;
        Ok(BookSearchResult {
            source: ResultSource::Catalog,
            top_score,
            books: books.iter().map(BookSummary::from).collect(),
        })
    }
}
