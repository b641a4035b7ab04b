//! book-rag library
//!
//! Hybrid (vector + BM25) retrieval over a directory of book records, with a
//! live catalog fallback when the index is not confident.
//!
//! # Modules
//!
//! - `core`: book records, table-of-contents parsing, atomic units
//! - `search`: embedding providers, vector and lexical indexes, hybrid ranker
//! - `catalog`: live catalog client and `BookSummary`
//! - `tool`: the `search_books` tool with its confidence fallback

pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod search;
pub mod tool;

// Re-exports for convenience
pub use catalog::{AladinCatalog, BookSummary, CatalogBook, CatalogSearch};
pub use config::{FusionNormalization, Settings};
pub use crate::core::record::{load_corpus, RawBookRecord};
pub use crate::core::toc::{parse_toc, TableOfContents};
pub use crate::core::unit::{to_units, AtomicUnit, UnitKind};
pub use error::{RagError, Result};
pub use search::{load_or_build, EmbeddingProvider, HybridRanker, IndexedCorpus, ScoredDocument};
pub use tool::{BookSearchResult, BookSearchTool, DocumentRanker, ResultSource};
