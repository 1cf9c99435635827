//! Embedding provider backed by an Azure OpenAI embeddings deployment.
//!
//! Calls `POST /openai/deployments/{deployment}/embeddings` with a batch of
//! inputs and returns vectors in input order. Also provides
//! [`cosine_similarity`], used by the in-memory index.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{EmbeddingConfig, HttpConfig, OpenAiSettings};
use crate::error::{Error, Result};
use crate::http::ServiceClient;
use crate::traits::Embedder;

pub struct AzureOpenAiEmbedder {
    client: ServiceClient,
    deployment: String,
    dims: usize,
}

impl AzureOpenAiEmbedder {
    pub fn new(settings: &OpenAiSettings, embedding: &EmbeddingConfig, http: &HttpConfig) -> Result<Self> {
        let client = ServiceClient::new(
            "openai",
            &settings.endpoint,
            &settings.api_key,
            &settings.api_version,
            http,
        )?;
        Ok(Self::with_client(client, &settings.embed_deployment, embedding.dims))
    }

    pub fn with_client(client: ServiceClient, deployment: &str, dims: usize) -> Self {
        Self {
            client,
            deployment: deployment.to_string(),
            dims,
        }
    }
}

#[async_trait]
impl Embedder for AzureOpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.deployment
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({ "input": texts });
        let resp = self
            .client
            .post(
                &format!("openai/deployments/{}/embeddings", self.deployment),
                &body,
            )
            .await?;

        let vectors = parse_embeddings_response(&resp.body)?;
        if vectors.len() != texts.len() {
            return Err(Error::invalid_response(
                "openai",
                format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embeddings_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::invalid_response("openai", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::invalid_response("openai", "missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
