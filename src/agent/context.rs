//! Per-query conversation state threaded through the round loop.

use super::tools::{ToolDefinition, ToolRegistry};
use crate::llm::Message;
use serde::{Deserialize, Serialize};

/// A human-readable reference to the course material a passage came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    /// Label such as "Course Title - Lesson 2".
    pub text: String,
    /// Deep link to the lesson, when the provider has one.
    pub link: Option<String>,
}

impl SourceCitation {
    pub fn new(text: impl Into<String>, link: Option<String>) -> Self {
        Self {
            text: text.into(),
            link,
        }
    }
}

/// Mutable state of a single query.
///
/// Owned by the engine for the duration of one call and never shared, so
/// concurrent queries cannot observe each other's messages or citations.
pub struct ConversationContext<'a> {
    system_prompt: String,
    messages: Vec<Message>,
    round_count: usize,
    max_rounds: usize,
    tools: Option<Vec<ToolDefinition>>,
    registry: Option<&'a ToolRegistry>,
    citations: Vec<SourceCitation>,
    llm_calls: usize,
    tool_calls: usize,
}

impl<'a> ConversationContext<'a> {
    /// Start a conversation with the user's query as the only message.
    ///
    /// `max_rounds` is clamped to at least one.
    pub fn new(
        query: &str,
        system_prompt: String,
        max_rounds: usize,
        tools: Option<&[ToolDefinition]>,
        registry: Option<&'a ToolRegistry>,
    ) -> Self {
        Self {
            system_prompt,
            messages: vec![Message::user(query)],
            round_count: 0,
            max_rounds: max_rounds.max(1),
            tools: tools.map(<[ToolDefinition]>::to_vec),
            registry,
            citations: Vec::new(),
            llm_calls: 0,
            tool_calls: 0,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message. The log is append-only.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn round_count(&self) -> usize {
        self.round_count
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Whether the current round is the last one allowed.
    pub fn is_last_round(&self) -> bool {
        self.round_count + 1 >= self.max_rounds
    }

    pub fn advance_round(&mut self) {
        self.round_count += 1;
    }

    /// Tools are offered only when both definitions and a dispatcher exist.
    pub fn tools_enabled(&self) -> bool {
        self.registry.is_some() && self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn tool_definitions(&self) -> Option<&[ToolDefinition]> {
        self.tools.as_deref()
    }

    pub fn registry(&self) -> Option<&'a ToolRegistry> {
        self.registry
    }

    /// Citations from the most recent search in this query.
    pub fn last_citations(&self) -> &[SourceCitation] {
        &self.citations
    }

    /// Overwrite citations with those of the latest search.
    pub fn replace_citations(&mut self, citations: Vec<SourceCitation>) {
        self.citations = citations;
    }

    /// Read and clear citations in one step.
    pub fn take_citations(&mut self) -> Vec<SourceCitation> {
        std::mem::take(&mut self.citations)
    }

    pub fn record_llm_call(&mut self) {
        self.llm_calls += 1;
    }

    pub fn record_tool_call(&mut self) {
        self.tool_calls += 1;
    }

    pub fn llm_calls(&self) -> usize {
        self.llm_calls
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }
}
