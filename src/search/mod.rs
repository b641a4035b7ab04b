//! Retrieval engine
//!
//! Vector similarity and BM25 over the same atomic units, fused per book.

pub mod embedding;
pub mod engine;
pub mod lexical;
pub mod remote;
pub mod vectordb;

pub use embedding::{provider_from_settings, EmbeddingProvider, HtpEmbedder};
pub use engine::{load_or_build, HybridRanker, IndexedCorpus, ScoredDocument};
pub use lexical::LexicalIndex;
pub use remote::OpenAiEmbedder;
pub use vectordb::{IndexMeta, IndexStats, VectorIndex};
