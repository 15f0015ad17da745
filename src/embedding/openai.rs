//! OpenAI embeddings backend.

use super::Embedder;
use crate::config::EmbeddingSettings;
use crate::error::{LektorError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Maximum inputs sent in one embeddings request.
const BATCH_SIZE: usize = 100;

/// Embedder backed by the OpenAI embeddings endpoint.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbedder {
    /// Create an embedder from settings.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client: Client::with_config(OpenAIConfig::default()).with_http_client(http),
            model: settings.model.clone(),
            dimensions: settings.dimensions as usize,
        })
    }

    /// Model used for embedding requests.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| LektorError::Embedding("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(batch.to_vec()))
                .dimensions(self.dimensions as u32)
                .build()
                .map_err(|e| LektorError::Embedding(e.to_string()))?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| LektorError::Embedding(format!("Embedding API error: {}", e)))?;

            let mut data = response.data;
            data.sort_by_key(|d| d.index);
            vectors.extend(data.into_iter().map(|d| d.embedding));
        }

        debug!("Embedded {} texts with {}", vectors.len(), self.model);
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
