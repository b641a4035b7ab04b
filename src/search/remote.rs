//! OpenAI-compatible embedding provider over HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::embedding::EmbeddingProvider;
use crate::config::EmbeddingSettings;
use crate::error::{RagError, Result};

/// One pooled client per provider instance, reused for every call.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            RagError::Config("embedding.api_key (or OPENAI_API_KEY) is required for the openai provider".into())
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| RagError::EmbeddingProvider(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            batch_size: settings.batch_size.max(1),
        })
    }

    fn request(&self, input: &[&str]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .map_err(|e| RagError::EmbeddingProvider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RagError::EmbeddingProvider(format!(
                "{} returned {}: {}",
                self.endpoint, status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| RagError::EmbeddingProvider(format!("bad response body: {}", e)))?;
        if parsed.data.len() != input.len() {
            return Err(RagError::EmbeddingProvider(format!(
                "expected {} embeddings, got {}",
                input.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn id(&self) -> String {
        format!("openai:{}", self.model)
    }

    fn dim(&self) -> usize {
        model_dim(&self.model)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| RagError::EmbeddingProvider("empty response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!(size = chunk.len(), "embedding batch");
            out.extend(self.request(chunk)?);
        }
        Ok(out)
    }
}

fn model_dim(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}
