//! Deterministic stand-ins for the external services.
//!
//! Built for unit tests and behind the `testing` feature for integration tests.

use crate::embedding::Embedder;
use crate::error::{LektorError, Result};
use crate::llm::{LlmClient, LlmRequest, LlmResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One pre-programmed reply of a [`ScriptedLlm`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Response(LlmResponse),
    /// Fail the call with this transport error message.
    Error(String),
}

/// An LLM client that replays a fixed script and records every request.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Copies of every request received, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests
            .lock()
            .map_err(|e| LektorError::Llm(e.to_string()))?
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .map_err(|e| LektorError::Llm(e.to_string()))?
            .pop_front();

        match reply {
            Some(ScriptedReply::Response(response)) => Ok(response),
            Some(ScriptedReply::Error(message)) => Err(LektorError::Llm(message)),
            None => Err(LektorError::Llm("script exhausted".to_string())),
        }
    }
}

/// Bag-of-words embedder: each lowercase word is hashed into one of `dimensions` buckets.
///
/// Texts sharing words get a positive cosine similarity, which is enough to
/// exercise ranking and course-name resolution without a network call.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a
        let hash = word.bytes().fold(0xcbf29ce484222325u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x100000001b3)
        });
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[self.bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::cosine_similarity;

    #[tokio::test]
    async fn test_hash_embedder_similarity() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Introduction to MCP").await.unwrap();
        let b = embedder.embed("mcp introduction").await.unwrap();
        let c = embedder.embed("zebra").await.unwrap();

        assert!(cosine_similarity(&a, &b) > 0.5);
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
