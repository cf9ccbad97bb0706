//! Embedding capability: provider abstraction + OpenAI-compatible HTTP client.
//!
//! The dedup stage only needs `embed(texts, max_text_len) -> vectors`. Any
//! failure is a failure of the whole batch; there is no partial fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ingest::types::truncate_chars;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding capability unavailable: {0}")]
    Unavailable(String),
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },
    #[error("embedding {index} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
}

/// Batch text-in, vector-out. One vector per text, same order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], max_text_len: usize) -> Result<Vec<Vec<f32>>, EmbedError>;
    fn name(&self) -> &'static str;
}

pub type DynEmbedder = Arc<dyn Embedder>;

/// Deterministic prefix truncation applied before any text reaches a model.
pub fn truncate_texts(texts: &[String], max_text_len: usize) -> Vec<String> {
    texts
        .iter()
        .map(|t| truncate_chars(t, max_text_len).to_string())
        .collect()
}

/// Fails every call; used when no embedding endpoint is configured.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _texts: &[String], _max_text_len: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Unavailable("no embedding endpoint configured".into()))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// Full endpoint, e.g. `http://localhost:8080/v1/embeddings`.
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl HttpEmbedderConfig {
    /// Reads `EMBEDDING_API_URL`, `EMBEDDING_API_KEY`, `EMBEDDING_MODEL`.
    /// Returns `None` when no URL is set.
    pub fn from_env(batch_size: usize) -> Option<Self> {
        let url = std::env::var("EMBEDDING_API_URL").ok()?.trim().to_string();
        if url.is_empty() {
            return None;
        }
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "bert-base-uncased".to_string());
        Some(Self {
            url,
            api_key,
            model,
            batch_size: batch_size.max(1),
            timeout: Duration::from_secs(30),
        })
    }
}

/// Client for `/v1/embeddings`-style endpoints (OpenAI, TEI, vLLM, Ollama compat).
pub struct HttpEmbedder {
    http: reqwest::Client,
    cfg: HttpEmbedderConfig,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbedReq<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResp {
    data: Vec<EmbedRow>,
}

#[derive(Deserialize)]
struct EmbedRow {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(cfg: HttpEmbedderConfig, dimension: usize) -> Result<Self, EmbedError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-dedup-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
        Ok(Self::with_client(http, cfg, dimension))
    }

    /// Same as `new` with a caller-built client (proxy, TLS or timeout policy).
    pub fn with_client(http: reqwest::Client, cfg: HttpEmbedderConfig, dimension: usize) -> Self {
        Self { http, cfg, dimension }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut req = self.http.post(&self.cfg.url).json(&EmbedReq {
            model: &self.cfg.model,
            input: batch,
        });
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| EmbedError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EmbedError::Request(format!("HTTP status {status}")));
        }
        let mut body: EmbedResp = resp
            .json()
            .await
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        body.data.sort_by_key(|r| r.index);
        Ok(body.data.into_iter().map(|r| r.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String], max_text_len: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        let truncated = truncate_texts(texts, max_text_len);
        let mut out = Vec::with_capacity(truncated.len());
        for batch in truncated.chunks(self.cfg.batch_size.max(1)) {
            let vectors = self.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                });
            }
            out.extend(vectors);
        }
        if let Some((index, v)) = out.iter().enumerate().find(|(_, v)| v.len() != self.dimension) {
            return Err(EmbedError::DimensionMismatch {
                index,
                expected: self.dimension,
                got: v.len(),
            });
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Factory: HTTP embedder when configured, otherwise the disabled one.
pub fn build_embedder_from_env(batch_size: usize, dimension: usize) -> DynEmbedder {
    match HttpEmbedderConfig::from_env(batch_size) {
        Some(cfg) => match HttpEmbedder::new(cfg, dimension) {
            Ok(e) => Arc::new(e),
            Err(e) => {
                tracing::warn!(error = %e, "embedding client init failed");
                Arc::new(DisabledEmbedder)
            }
        },
        None => Arc::new(DisabledEmbedder),
    }
}
