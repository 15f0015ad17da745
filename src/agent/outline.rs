//! Course outline lookup.

use super::tools::{parse_arguments, ParamType, Tool, ToolDefinition, ToolOutput, ToolParameter};
use crate::course::Course;
use crate::error::Result;
use crate::vector_store::{no_course_error, VectorStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub const OUTLINE_TOOL_NAME: &str = "get_course_outline";

#[derive(Debug, Deserialize)]
struct OutlineArgs {
    course_name: String,
}

/// Renders a course's title, link and lesson list.
pub struct CourseOutlineTool {
    store: Arc<dyn VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

/// Text rendering of a course outline.
pub fn format_outline(course: &Course) -> String {
    let mut lines = vec![
        format!("**{}**", course.title),
        format!(
            "Course Link: {}",
            course.link.as_deref().unwrap_or("No link available")
        ),
        String::new(),
        "**Lessons:**".to_string(),
    ];

    if course.lessons.is_empty() {
        lines.push("No lessons available".to_string());
    }
    for lesson in &course.lessons {
        lines.push(format!("{}. {}", lesson.number, lesson.title));
    }

    lines.join("\n")
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            OUTLINE_TOOL_NAME,
            "Get complete course outline including title, course link, and all lessons with their numbers and titles",
        )
        .with_parameter(ToolParameter::required(
            "course_name",
            ParamType::String,
            "Course title (partial matches work, e.g. 'MCP', 'Introduction', 'Building')",
        ))
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput> {
        let args: OutlineArgs = parse_arguments(OUTLINE_TOOL_NAME, input)?;

        let text = match self.store.course_outline(&args.course_name).await {
            Ok(Some(course)) => format_outline(&course),
            Ok(None) => no_course_error(&args.course_name),
            Err(e) => {
                warn!("Outline lookup failed: {}", e);
                format!("Outline lookup failed: {}", e)
            }
        };

        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::parse_course;
    use crate::testing::HashEmbedder;
    use crate::vector_store::MemoryVectorStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_outline_lists_lessons() {
        let store = MemoryVectorStore::new(Arc::new(HashEmbedder::default()), 5);
        let (course, _) = parse_course(
            r#"{
                "course_title": "Prompt Compression and Query Optimization",
                "course_link": "https://example.com/pc",
                "lessons": [
                    {"lesson_number": 1, "lesson_title": "Vector Search"},
                    {"lesson_number": 0, "lesson_title": "Introduction"}
                ]
            }"#,
        )
        .unwrap();
        store.add_course(&course).await.unwrap();

        let tool = CourseOutlineTool::new(Arc::new(store));
        let output = tool
            .execute(json!({"course_name": "prompt compression"}))
            .await
            .unwrap();

        assert_eq!(
            output.text,
            "**Prompt Compression and Query Optimization**\n\
             Course Link: https://example.com/pc\n\n\
             **Lessons:**\n\
             0. Introduction\n\
             1. Vector Search"
        );
        assert!(output.citations.is_none());
    }

    #[tokio::test]
    async fn test_unknown_course_is_not_an_error() {
        let store = MemoryVectorStore::new(Arc::new(HashEmbedder::default()), 5);
        let tool = CourseOutlineTool::new(Arc::new(store));
        let output = tool.execute(json!({"course_name": "Haskell"})).await.unwrap();
        assert_eq!(output.text, "No course found matching 'Haskell'");
    }
}
