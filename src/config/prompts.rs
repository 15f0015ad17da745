//! Prompt templates for Lektor.
//!
//! The system instruction block can be replaced by placing a `system.toml`
//! file in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub system: SystemPrompts,
}

/// Instructions sent as the system prompt of every answer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemPrompts {
    pub instructions: String,
    /// Wrapper around the user's question; `{{question}}` is replaced.
    pub query: String,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self {
            instructions: r#"You are an assistant for questions about course materials, with tools for looking up course content and course outlines.

Tool usage:
- Use get_course_outline for questions about a course's structure, link or lesson list
- Use search_course_content for questions about specific material covered in a course
- Make at most two tool calls per query, and only when the answer depends on course content
- If a search returns nothing relevant, say so plainly

When answering:
- Answer general knowledge questions directly without searching
- For outline questions, give the course title, course link and every lesson with its number and title
- Do not mention the tools, the search or the search results in the answer
- Do not explain your reasoning or how you found the information

Answers must be brief, accurate and educational. Include examples when they help."#
                .to_string(),
            query: "Answer this question about course materials: {{question}}".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, overriding the defaults with files from `custom_dir`.
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let system_path = custom_path.join("system.toml");
            if system_path.exists() {
                let content = std::fs::read_to_string(&system_path)?;
                prompts.system = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Wrap a user question in the query template.
    pub fn render_query(&self, question: &str) -> String {
        self.system.query.replace("{{question}}", question)
    }
}
