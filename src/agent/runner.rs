//! Round-bounded tool-calling loop.
//!
//! Each round sends the conversation to the model. A reply without tool calls
//! ends the query; a reply with tool calls has every call executed in order and
//! the results appended before the next round. Once the round budget is spent
//! the model is asked one last time with tools stripped, which forces a
//! synthesized answer. A query therefore costs at most `max_rounds + 1` calls.

use super::context::{ConversationContext, SourceCitation};
use super::tools::{ToolDefinition, ToolRegistry};
use crate::config::{LlmSettings, RetrySettings};
use crate::error::Result;
use crate::llm::{ContentBlock, LlmClient, LlmRequest, LlmResponse, Message, ToolChoice};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Answer returned when any tool call in a round fails.
pub const TOOL_FAILURE_ANSWER: &str = "Tool execution failed";

/// Rounds allowed when the caller does not say otherwise.
pub const DEFAULT_MAX_ROUNDS: usize = 2;

/// How transient LLM transport failures are retried before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure. Zero means fail immediately.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single-shot: a failed call is reported straight away.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without requesting tools.
    NoToolUse,
    /// Tools ran in the last allowed round; answer came from the tool-less call.
    MaxRoundsReached,
    /// Tool results exist but no tools are on offer; answer came from the tool-less call.
    NoToolsAvailable,
    /// The loop ran out of rounds without terminating in its body.
    RoundsExhausted,
    /// An LLM request failed.
    LlmError,
    /// A tool call failed.
    ToolError,
}

/// Final result of one query.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Natural-language answer text.
    pub text: String,
    /// Citations from the most recent search executed during this query.
    pub citations: Vec<SourceCitation>,
    /// LLM requests made (retries not counted).
    pub llm_calls: usize,
    /// Tool calls dispatched.
    pub tool_calls: usize,
    pub termination: Termination,
}

enum RoundOutcome {
    Continue,
    Finished(String, Termination),
}

/// Drives the model through bounded rounds of tool use.
pub struct ResponseGenerator {
    client: Arc<dyn LlmClient>,
    instructions: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl ResponseGenerator {
    /// Create a generator with deterministic sampling and no retries.
    pub fn new(client: Arc<dyn LlmClient>, instructions: &str) -> Self {
        Self {
            client,
            instructions: instructions.to_string(),
            temperature: 0.0,
            max_tokens: 800,
            retry: RetryPolicy::none(),
        }
    }

    /// Create a generator using the sampling and retry settings from config.
    pub fn from_settings(client: Arc<dyn LlmClient>, instructions: &str, settings: &LlmSettings) -> Self {
        Self::new(client, instructions)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens)
            .with_retry_policy(RetryPolicy::from(&settings.retry))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Instruction block, followed by the prior conversation when there is one.
    pub fn build_system_prompt(&self, history: Option<&str>) -> String {
        match history {
            Some(history) if !history.trim().is_empty() => {
                format!("{}\n\nPrevious conversation:\n{}", self.instructions, history)
            }
            _ => self.instructions.clone(),
        }
    }

    /// Answer a query, calling tools for up to `max_rounds` rounds.
    ///
    /// Never fails: transport and tool failures are reported as answer text.
    #[instrument(skip_all, fields(max_rounds = max_rounds))]
    pub async fn generate(
        &self,
        query: &str,
        history: Option<&str>,
        tools: Option<&[ToolDefinition]>,
        dispatcher: Option<&ToolRegistry>,
        max_rounds: usize,
    ) -> Answer {
        let system_prompt = self.build_system_prompt(history);
        let mut ctx = ConversationContext::new(query, system_prompt, max_rounds, tools, dispatcher);

        while ctx.round_count() < ctx.max_rounds() {
            debug!("Starting round {} of {}", ctx.round_count() + 1, ctx.max_rounds());

            match self.execute_round(&mut ctx).await {
                RoundOutcome::Continue => ctx.advance_round(),
                RoundOutcome::Finished(text, termination) => {
                    return Self::finish(ctx, text, termination);
                }
            }
        }

        let text = self.final_answer(&mut ctx).await;
        Self::finish(ctx, text, Termination::RoundsExhausted)
    }

    async fn execute_round(&self, ctx: &mut ConversationContext<'_>) -> RoundOutcome {
        let offer_tools = ctx.tools_enabled();
        let response = match self.call_model(ctx, offer_tools).await {
            Ok(response) => response,
            Err(e) => {
                warn!("LLM request failed: {}", e);
                return RoundOutcome::Finished(
                    format!("Error generating response: {}", e),
                    Termination::LlmError,
                );
            }
        };

        let registry = match ctx.registry() {
            Some(registry) if response.requests_tools() => registry,
            _ => return RoundOutcome::Finished(response.text(), Termination::NoToolUse),
        };

        if !self.run_tool_calls(ctx, registry, &response).await {
            return RoundOutcome::Finished(TOOL_FAILURE_ANSWER.to_string(), Termination::ToolError);
        }

        if ctx.is_last_round() {
            info!("Round limit reached, requesting final answer");
            let text = self.final_answer(ctx).await;
            return RoundOutcome::Finished(text, Termination::MaxRoundsReached);
        }

        if !ctx.tools_enabled() {
            let text = self.final_answer(ctx).await;
            return RoundOutcome::Finished(text, Termination::NoToolsAvailable);
        }

        RoundOutcome::Continue
    }

    /// Execute every requested tool call in order.
    ///
    /// Returns `false` as soon as one call fails; the remaining calls are skipped.
    async fn run_tool_calls(
        &self,
        ctx: &mut ConversationContext<'_>,
        registry: &ToolRegistry,
        response: &LlmResponse,
    ) -> bool {
        ctx.push(Message::assistant(response.content.clone()));

        let mut results = Vec::new();
        for call in response.tool_uses() {
            ctx.record_tool_call();

            match registry.execute(call.name, call.input.clone()).await {
                Ok(output) => {
                    if let Some(citations) = output.citations {
                        ctx.replace_citations(citations);
                    }
                    results.push(ContentBlock::tool_result(call.id, output.text));
                }
                Err(e) => {
                    warn!("Tool '{}' failed: {}", call.name, e);
                    results.push(ContentBlock::tool_error(
                        call.id,
                        format!("Tool execution failed: {}", e),
                    ));
                    ctx.push(Message::tool_results(results));
                    return false;
                }
            }
        }

        ctx.push(Message::tool_results(results));
        true
    }

    /// One last request with tools stripped, so the model has to answer.
    async fn final_answer(&self, ctx: &mut ConversationContext<'_>) -> String {
        match self.call_model(ctx, false).await {
            Ok(response) => response.text(),
            Err(e) => {
                warn!("Final LLM request failed: {}", e);
                format!("Error generating response: {}", e)
            }
        }
    }

    async fn call_model(&self, ctx: &mut ConversationContext<'_>, offer_tools: bool) -> Result<LlmResponse> {
        let request = LlmRequest {
            system: ctx.system_prompt().to_string(),
            messages: ctx.messages().to_vec(),
            tools: if offer_tools {
                ctx.tool_definitions().map(<[ToolDefinition]>::to_vec)
            } else {
                None
            },
            tool_choice: offer_tools.then_some(ToolChoice::Auto),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        ctx.record_llm_call();

        let mut attempt = 0;
        loop {
            match self.client.complete(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!("LLM request failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn finish(mut ctx: ConversationContext<'_>, text: String, termination: Termination) -> Answer {
        info!(
            "Query finished ({:?}) after {} LLM call(s) and {} tool call(s), {} source(s)",
            termination,
            ctx.llm_calls(),
            ctx.tool_calls(),
            ctx.last_citations().len()
        );

        Answer {
            text,
            citations: ctx.take_citations(),
            llm_calls: ctx.llm_calls(),
            tool_calls: ctx.tool_calls(),
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ParamType, Tool, ToolOutput, ToolParameter};
    use crate::error::LektorError;
    use crate::llm::StopReason;
    use crate::testing::{ScriptedLlm, ScriptedReply};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSearch {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingSearch {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("search_course_content", "Search").with_parameter(
                ToolParameter::required("query", ParamType::String, "What to search for"),
            )
        }

        async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolOutput::text(format!("result for {}", input["query"]))
                .with_citations(vec![SourceCitation::new(format!("Course - Lesson {}", n), None)]))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("broken", "Always fails")
        }

        async fn execute(&self, _input: serde_json::Value) -> Result<ToolOutput> {
            Err(LektorError::VectorStore("index unavailable".to_string()))
        }
    }

    fn registry() -> (ToolRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingSearch { calls: calls.clone() }));
        registry.register(Arc::new(BrokenTool));
        (registry, calls)
    }

    fn tool_use(id: &str, name: &str, input: serde_json::Value) -> LlmResponse {
        LlmResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
        }
    }

    fn search_call(id: &str, query: &str) -> ScriptedReply {
        ScriptedReply::Response(tool_use(id, "search_course_content", json!({"query": query})))
    }

    fn text(reply: &str) -> ScriptedReply {
        ScriptedReply::Response(LlmResponse::text_reply(reply))
    }

    fn generator(llm: &Arc<ScriptedLlm>) -> ResponseGenerator {
        ResponseGenerator::new(llm.clone(), "You answer course questions.")
    }

    #[tokio::test]
    async fn test_no_tools_single_call() {
        let llm = Arc::new(ScriptedLlm::new(vec![text("MCP is a protocol.")]));

        let answer = generator(&llm).generate("What is MCP?", None, None, None, 2).await;

        assert_eq!(answer.text, "MCP is a protocol.");
        assert!(answer.citations.is_empty());
        assert_eq!(llm.call_count(), 1);
        assert_eq!(answer.termination, Termination::NoToolUse);
        assert!(!llm.requests()[0].has_tools());
    }

    #[tokio::test]
    async fn test_direct_answer_never_dispatches() {
        let llm = Arc::new(ScriptedLlm::new(vec![text("General knowledge.")]));
        let (registry, calls) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("What is 2+2?", None, Some(defs.as_slice()), Some(&registry), 2)
            .await;

        assert_eq!(answer.text, "General knowledge.");
        assert_eq!(llm.call_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let requests = llm.requests();
        let first = &requests[0];
        assert!(first.has_tools());
        assert_eq!(first.tool_choice, Some(ToolChoice::Auto));
        assert_eq!(first.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            search_call("toolu_1", "MCP overview"),
            text("MCP connects models to tools."),
        ]));
        let (registry, calls) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("What is MCP?", None, Some(defs.as_slice()), Some(&registry), 2)
            .await;

        assert_eq!(answer.text, "MCP connects models to tools.");
        assert_eq!(llm.call_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(answer.citations, vec![SourceCitation::new("Course - Lesson 1", None)]);

        // Second request carries: user query, assistant tool_use, tool results.
        let requests = llm.requests();
        let second = &requests[1];
        assert_eq!(second.messages.len(), 3);
        assert!(matches!(
            &second.messages[2].blocks()[0],
            ContentBlock::ToolResult { tool_use_id, is_error: false, .. } if tool_use_id == "toolu_1"
        ));
        assert!(second.has_tools());
    }

    #[tokio::test]
    async fn test_multiple_calls_share_one_result_message() {
        let mut round = tool_use("a", "search_course_content", json!({"query": "first"}));
        round.content.push(ContentBlock::ToolUse {
            id: "b".to_string(),
            name: "search_course_content".to_string(),
            input: json!({"query": "second"}),
        });

        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedReply::Response(round),
            text("Both lessons covered."),
        ]));
        let (registry, calls) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("Compare", None, Some(defs.as_slice()), Some(&registry), 2)
            .await;

        assert_eq!(answer.text, "Both lessons covered.");
        assert_eq!(answer.tool_calls, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let requests = llm.requests();
        let second = &requests[1];
        assert_eq!(second.messages.len(), 3);

        let ids: Vec<&str> = second.messages[2]
            .blocks()
            .iter()
            .map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, is_error: false, .. } => tool_use_id.as_str(),
                other => panic!("Expected successful tool result, got {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        // The later call's citations win.
        assert_eq!(answer.citations[0].text, "Course - Lesson 2");
    }

    #[tokio::test]
    async fn test_dispatcher_without_definitions_forces_final_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            search_call("toolu_1", "stray call"),
            text("Answer without tools."),
        ]));
        let (registry, calls) = registry();

        let answer = generator(&llm)
            .generate("Question", None, None, Some(&registry), 3)
            .await;

        assert_eq!(answer.text, "Answer without tools.");
        assert_eq!(answer.termination, Termination::NoToolsAvailable);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let requests = llm.requests();
        assert!(!requests[0].has_tools());
        assert!(!requests[1].has_tools());
        assert_eq!(requests[1].tool_choice, None);
    }

    #[tokio::test]
    async fn test_every_round_uses_tools() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            search_call("toolu_1", "outline"),
            search_call("toolu_2", "details"),
            text("Synthesized answer."),
        ]));
        let (registry, calls) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("Compare lessons", None, Some(defs.as_slice()), Some(&registry), 2)
            .await;

        assert_eq!(answer.text, "Synthesized answer.");
        assert_eq!(llm.call_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(answer.termination, Termination::MaxRoundsReached);

        let requests = llm.requests();
        assert!(requests[0].has_tools());
        assert!(requests[1].has_tools());
        assert!(!requests[2].has_tools());
        assert_eq!(requests[2].tool_choice, None);

        // Only the most recent search is cited.
        assert_eq!(answer.citations[0].text, "Course - Lesson 2");
    }

    #[tokio::test]
    async fn test_call_budget_holds_for_any_round_limit() {
        for max_rounds in 1..=5 {
            let replies = (0..max_rounds + 1)
                .map(|i| search_call(&format!("toolu_{}", i), "again"))
                .collect();
            let llm = Arc::new(ScriptedLlm::new(replies));
            let (registry, calls) = registry();
            let defs = registry.definitions();

            let answer = generator(&llm)
                .generate("Keep searching", None, Some(defs.as_slice()), Some(&registry), max_rounds)
                .await;

            assert_eq!(llm.call_count(), max_rounds + 1);
            assert_eq!(answer.llm_calls, max_rounds + 1);
            assert_eq!(calls.load(Ordering::SeqCst), max_rounds);
        }
    }

    #[tokio::test]
    async fn test_tool_failure_on_first_round_is_fatal() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedReply::Response(tool_use("toolu_1", "broken", json!({}))),
            text("never reached"),
        ]));
        let (registry, calls) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("Break", None, Some(defs.as_slice()), Some(&registry), 2)
            .await;

        assert_eq!(answer.text, TOOL_FAILURE_ANSWER);
        assert_eq!(answer.termination, Termination::ToolError);
        assert_eq!(llm.call_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tool_failure_on_second_round_stops_remaining_calls() {
        let mut failing_round = tool_use("toolu_2", "broken", json!({}));
        failing_round.content.push(ContentBlock::ToolUse {
            id: "toolu_3".to_string(),
            name: "search_course_content".to_string(),
            input: json!({"query": "skipped"}),
        });

        let llm = Arc::new(ScriptedLlm::new(vec![
            search_call("toolu_1", "first"),
            ScriptedReply::Response(failing_round),
            text("never reached"),
        ]));
        let (registry, calls) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("Break later", None, Some(defs.as_slice()), Some(&registry), 3)
            .await;

        assert_eq!(answer.text, TOOL_FAILURE_ANSWER);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(answer.tool_calls, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedReply::Response(tool_use(
            "toolu_1",
            "does_not_exist",
            json!({}),
        ))]));
        let (registry, _) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("?", None, Some(defs.as_slice()), Some(&registry), 2)
            .await;

        assert_eq!(answer.text, TOOL_FAILURE_ANSWER);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_reported_without_retry() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedReply::Error("connection reset".to_string()),
            text("never reached"),
        ]));

        let answer = generator(&llm).generate("Hi", None, None, None, 2).await;

        assert!(answer.text.starts_with("Error generating response:"));
        assert!(answer.text.contains("connection reset"));
        assert_eq!(answer.termination, Termination::LlmError);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_policy_recovers_transient_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedReply::Error("503".to_string()),
            text("Recovered."),
        ]));
        let generator = generator(&llm).with_retry_policy(RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
        });

        let answer = generator.generate("Hi", None, None, None, 2).await;

        assert_eq!(answer.text, "Recovered.");
        assert_eq!(llm.call_count(), 2);
        assert_eq!(answer.llm_calls, 1);
    }

    #[tokio::test]
    async fn test_tool_request_without_dispatcher_returns_text() {
        let mut reply = tool_use("toolu_1", "search_course_content", json!({"query": "x"}));
        reply.content.insert(0, ContentBlock::text("Partial thought."));
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedReply::Response(reply)]));

        let answer = generator(&llm).generate("Hi", None, None, None, 2).await;

        assert_eq!(answer.text, "Partial thought.");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_history_is_appended_to_system_prompt() {
        let llm = Arc::new(ScriptedLlm::new(vec![text("ok")]));
        let generator = generator(&llm);

        generator
            .generate("Next?", Some("User: Hi\nAssistant: Hello"), None, None, 2)
            .await;

        let requests = llm.requests();
        let system = &requests[0].system;
        assert!(system.starts_with("You answer course questions."));
        assert!(system.ends_with("Previous conversation:\nUser: Hi\nAssistant: Hello"));
        assert_eq!(generator.build_system_prompt(None), "You answer course questions.");
    }

    #[tokio::test]
    async fn test_final_call_failure_still_answers() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            search_call("toolu_1", "x"),
            ScriptedReply::Error("timeout".to_string()),
        ]));
        let (registry, _) = registry();
        let defs = registry.definitions();

        let answer = generator(&llm)
            .generate("Q", None, Some(defs.as_slice()), Some(&registry), 1)
            .await;

        assert!(answer.text.contains("timeout"));
        assert_eq!(llm.call_count(), 2);
    }
}
