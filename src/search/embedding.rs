//! Embedding providers.
//!
//! The index depends only on [`EmbeddingProvider`]. Two implementations ship:
//! - [`HtpEmbedder`]: Harmonic Token Projection, deterministic and local
//!   (<https://arxiv.org/html/2511.20665>)
//! - [`super::remote::OpenAiEmbedder`]: OpenAI-compatible HTTP endpoint

use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::{EmbeddingSettings, ProviderKind};
use crate::error::Result;

use super::remote::OpenAiEmbedder;

/// Narrow capability the indexes need: text in, vector out.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identity of provider + model, persisted with the index.
    fn id(&self) -> String;

    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Build the configured provider once; callers share the returned handle.
pub fn provider_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    match settings.provider {
        ProviderKind::Htp => Ok(Arc::new(HtpEmbedder::new())),
        ProviderKind::Openai => Ok(Arc::new(OpenAiEmbedder::new(settings)?)),
    }
}

/// 192 moduli → 384 dimensions
pub const HTP_DIM: usize = 384;

const MAX_TOKEN_CHARS: usize = 64;

/// Harmonic Token Projection embedder.
///
/// Each token is read as a base-2^16 integer N; for the i-th prime modulus
/// m_i the pair `[sin(2π·(N mod m_i)/m_i), cos(..)]` is emitted. Token vectors
/// are mean-pooled and L2 normalized.
pub struct HtpEmbedder {
    moduli: Vec<u64>,
}

impl HtpEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: first_primes(HTP_DIM / 2),
        }
    }

    fn embed_token(&self, token: &str, out: &mut [f64]) {
        let n = token
            .chars()
            .take(MAX_TOKEN_CHARS)
            .fold(0u64, |acc, c| acc.wrapping_mul(65536).wrapping_add(c as u64));

        for (i, &m) in self.moduli.iter().enumerate() {
            let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
            out[2 * i] += theta.sin();
            out[2 * i + 1] += theta.cos();
        }
    }
}

impl Default for HtpEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for HtpEmbedder {
    fn id(&self) -> String {
        format!("htp:d{}", HTP_DIM)
    }

    fn dim(&self) -> usize {
        HTP_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        let mut sum = vec![0.0f64; HTP_DIM];
        if tokens.is_empty() {
            return Ok(vec![0.0; HTP_DIM]);
        }

        for token in &tokens {
            self.embed_token(token, &mut sum);
        }
        let count = tokens.len() as f64;
        for v in &mut sum {
            *v /= count;
        }

        let norm = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        Ok(sum
            .iter()
            .map(|x| if norm > 0.0 { (x / norm) as f32 } else { *x as f32 })
            .collect())
    }
}

fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Cosine distance bounded to [0, 1]: `1 - max(cos, 0)`.
///
/// Orthogonal, opposed and zero vectors are all at distance 1, so unrelated
/// text contributes no similarity.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b).max(0.0)).clamp(0.0, 1.0)
}
