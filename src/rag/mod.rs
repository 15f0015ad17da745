//! Caller-facing question answering over the course store.
//!
//! [`RagSystem::query`] runs one question through the tool-calling engine and
//! returns the answer with the sources the search tool cited.

mod session;
mod system;

pub use session::SessionManager;
pub use system::RagSystem;

use crate::agent::SourceCitation;
use serde::Serialize;

/// Answer to a query, with its sources and the session it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub session_id: String,
}

impl RagResponse {
    /// Format the response for terminal display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.answer.clone();

        if !self.sources.is_empty() {
            output.push_str("\n\n--- Sources ---");
            for source in &self.sources {
                output.push_str(&format!("\n{}", source.text));
                if let Some(link) = &source.link {
                    output.push_str(&format!("\n  {}", link));
                }
            }
        }

        output
    }
}

/// Summary of the stored courses.
#[derive(Debug, Clone, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}
