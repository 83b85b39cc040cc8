use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use isaac_core::{HashEmbedder, HashEmbedderConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Hash,
    #[serde(alias = "nvidia", alias = "openai-compatible")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model: None,
            base_url: None,
            api_key: None,
            dimensions: default_dimensions(),
            request_timeout_secs: None,
        }
    }
}

fn default_dimensions() -> usize {
    HashEmbedderConfig::default().dimensions
}

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

/// Process-wide text → vector function; the model identity is fixed when the
/// client is built.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        match config.provider {
            EmbeddingProvider::OpenAi => Ok(Self {
                backend: EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(config)?),
            }),
            EmbeddingProvider::Hash => Ok(Self {
                backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                    dimensions: config.dimensions,
                    ..Default::default()
                })),
            }),
        }
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig::default())),
        }
    }

    pub fn model_name(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => embedder.model_name(),
            EmbeddingBackend::OpenAi(client) => client.model.clone(),
        }
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Ok(inputs
                .iter()
                .map(|text| embedder.embed_text(text))
                .collect()),
            EmbeddingBackend::OpenAi(client) => client.embed_batch(inputs).await,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        let mut output = self.embed_batch(&inputs).await?;
        output
            .pop()
            .ok_or_else(|| anyhow!("embedding service returned no vectors"))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| anyhow!("embedding model is required for the openai provider"))?;
        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow!("embedding base url is required for the openai provider"))?;
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder.build().context("failed to build http client")?,
            model,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let mut request = self.http.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("embeddings request to {url} failed"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "embeddings request failed: {}",
                response.status()
            ));
        }
        let mut parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .context("failed to decode embeddings response")?;
        parsed.data.sort_by_key(|d| d.index);
        if parsed.data.len() != inputs.len() {
            return Err(anyhow!(
                "embeddings response has {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            ));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_backend_respects_configured_dimensions() {
        let client = EmbeddingClient::new(&EmbeddingConfig {
            dimensions: 32,
            ..Default::default()
        })
        .unwrap();
        let vector = client.embed("lactate 4.2").await.unwrap();
        assert_eq!(vector.len(), 32);
        assert_eq!(client.model_name(), "hash-32-1337");
        let batch = client
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn openai_backend_requires_model_and_url() {
        let mut config = EmbeddingConfig {
            provider: EmbeddingProvider::OpenAi,
            ..Default::default()
        };
        assert!(EmbeddingClient::new(&config).is_err());
        config.model = Some("nvidia/nv-embedqa-e5-v5".to_string());
        assert!(EmbeddingClient::new(&config).is_err());
        config.base_url = Some("https://integrate.api.nvidia.com/v1".to_string());
        let client = EmbeddingClient::new(&config).unwrap();
        assert_eq!(client.model_name(), "nvidia/nv-embedqa-e5-v5");
    }
}
