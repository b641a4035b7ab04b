//! Layered settings.
//!
//! Merges built-in defaults, `bookrag.toml`, the file named by
//! `BOOKRAG_CONFIG` and `BOOKRAG_*` environment variables (`__` separates
//! nested keys, e.g. `BOOKRAG_SEARCH__SEMANTIC_WEIGHT=0.7`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

pub const CONFIG_FILE: &str = "bookrag.toml";
pub const ENV_PREFIX: &str = "BOOKRAG_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local Harmonic Token Projection, no network.
    Htp,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

/// How per-source scores are brought together before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionNormalization {
    /// Vector `1 - distance`, BM25 untouched.
    #[default]
    Raw,
    /// Per-query min-max of each source into [0, 1].
    MinMax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub k: usize,
    pub semantic_weight: f32,
    pub confidence_threshold: f32,
    pub normalization: FusionNormalization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("books"),
            index_path: PathBuf::from("books_index/index.db"),
            embedding: EmbeddingSettings::default(),
            search: SearchSettings::default(),
            catalog: CatalogSettings::default(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Htp,
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            batch_size: 64,
            timeout_secs: 30,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            k: 5,
            semantic_weight: 0.5,
            confidence_threshold: 0.5,
            normalization: FusionNormalization::Raw,
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "http://www.aladin.co.kr/ttb/api".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings relative to the current directory.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE));
        if let Ok(extra) = std::env::var("BOOKRAG_CONFIG") {
            figment = figment.merge(Toml::file(extra));
        }
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        let settings = settings.with_vendor_keys();
        settings.validate()?;
        Ok(settings)
    }

    /// Load from one explicit TOML file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .extract()?;
        let settings = settings.with_vendor_keys();
        settings.validate()?;
        Ok(settings)
    }

    /// Fall back to the provider-conventional key variables.
    fn with_vendor_keys(mut self) -> Self {
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.catalog.api_key.is_none() {
            self.catalog.api_key = std::env::var("ALADIN_API_KEY").ok();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let w = self.search.semantic_weight;
        if !(0.0..=1.0).contains(&w) {
            return Err(RagError::Config(format!(
                "search.semantic_weight must be within [0, 1], got {}",
                w
            )));
        }
        if self.search.confidence_threshold < 0.0 {
            return Err(RagError::Config(
                "search.confidence_threshold must not be negative".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
