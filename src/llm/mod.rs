//! LLM client abstraction.
//!
//! The orchestration engine only ever talks to an [`LlmClient`]: one request in,
//! one response out. The wire types mirror the Anthropic Messages API so that
//! content blocks round-trip without translation.

mod anthropic;
mod types;

pub use anthropic::AnthropicClient;
pub use types::{
    ContentBlock, LlmRequest, LlmResponse, Message, MessageContent, Role, StopReason, ToolChoice,
};

use crate::error::Result;
use async_trait::async_trait;

/// A provider that turns a request into a single model response.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one request and wait for the complete response.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}
