//! Content search over the course store.

use super::context::SourceCitation;
use super::tools::{parse_arguments, ParamType, Tool, ToolDefinition, ToolOutput, ToolParameter};
use crate::error::Result;
use crate::vector_store::{SearchResults, VectorStore};
use async_trait::async_trait;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::debug;

pub const SEARCH_TOOL_NAME: &str = "search_course_content";

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_lesson_number")]
    lesson_number: Option<u32>,
}

/// Models sometimes send the lesson as a string, so `"2"` is read as `2`.
fn lenient_lesson_number<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid lesson number '{}'", text))),
    }
}

/// Searches course passages, optionally filtered by course and lesson.
///
/// Every run replaces the query's citations: one per returned passage, or
/// none when the search came back empty or failed.
pub struct CourseSearchTool {
    store: Arc<dyn VectorStore>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    fn format_results(results: &SearchResults) -> (String, Vec<SourceCitation>) {
        let mut blocks = Vec::with_capacity(results.len());
        let mut citations = Vec::with_capacity(results.len());

        for (doc, meta) in results.documents.iter().zip(&results.metadata) {
            let label = match meta.lesson_number {
                Some(n) => format!("{} - Lesson {}", meta.course_title, n),
                None => meta.course_title.clone(),
            };
            let link = meta
                .lesson_number
                .and_then(|n| results.lesson_link(&meta.course_title, n))
                .map(str::to_string);

            blocks.push(format!("[{}]\n{}", label, doc));
            citations.push(SourceCitation::new(label, link));
        }

        (blocks.join("\n\n"), citations)
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            SEARCH_TOOL_NAME,
            "Search course materials with smart course name matching and lesson filtering",
        )
        .with_parameter(ToolParameter::required(
            "query",
            ParamType::String,
            "What to search for in the course content",
        ))
        .with_parameter(ToolParameter::optional(
            "course_name",
            ParamType::String,
            "Course title (partial matches work, e.g. 'MCP', 'Introduction')",
        ))
        .with_parameter(ToolParameter::optional(
            "lesson_number",
            ParamType::Integer,
            "Specific lesson number to search within (e.g. 1, 2, 3)",
        ))
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput> {
        let args: SearchArgs = parse_arguments(SEARCH_TOOL_NAME, input)?;
        let results = self
            .store
            .search(&args.query, args.course_name.as_deref(), args.lesson_number)
            .await;

        if let Some(error) = results.error {
            debug!("Search reported: {}", error);
            return Ok(ToolOutput::text(error).with_citations(Vec::new()));
        }

        if results.is_empty() {
            let mut filters = String::new();
            if let Some(course) = &args.course_name {
                filters.push_str(&format!(" in course '{}'", course));
            }
            if let Some(lesson) = args.lesson_number {
                filters.push_str(&format!(" in lesson {}", lesson));
            }
            return Ok(
                ToolOutput::text(format!("No relevant content found{}.", filters))
                    .with_citations(Vec::new()),
            );
        }

        let (text, citations) = Self::format_results(&results);
        Ok(ToolOutput::text(text).with_citations(citations))
    }
}
