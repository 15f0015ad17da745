//! Tool-calling orchestration for answering course questions.
//!
//! A [`ResponseGenerator`] drives a bounded number of model rounds, dispatching
//! tool calls through a shared, read-only [`ToolRegistry`]. Per-query state,
//! including the citations gathered by the search tool, lives in a
//! [`ConversationContext`] owned by that query alone.

mod context;
mod outline;
mod runner;
mod search;
mod tools;

pub use context::{ConversationContext, SourceCitation};
pub use outline::{format_outline, CourseOutlineTool, OUTLINE_TOOL_NAME};
pub use runner::{
    Answer, ResponseGenerator, RetryPolicy, Termination, DEFAULT_MAX_ROUNDS, TOOL_FAILURE_ANSWER,
};
pub use search::{CourseSearchTool, SEARCH_TOOL_NAME};
pub use tools::{
    parse_arguments, ParamType, Tool, ToolDefinition, ToolOutput, ToolParameter, ToolRegistry,
};
