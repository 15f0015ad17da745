//! Courses command implementation.

use crate::agent::format_outline;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::vector_store::open_store;
use anyhow::Result;
use std::sync::Arc;

/// Run the courses command.
pub async fn run_courses(lessons: bool, settings: Settings) -> Result<()> {
    preflight::check(Operation::Browse, &settings)?;

    let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
    let store = open_store(&settings.vector_store, embedder)?;

    let titles = store.course_titles().await?;
    if titles.is_empty() {
        Output::info("No courses ingested yet. Use 'lektor ingest <path>' to add some.");
        return Ok(());
    }

    Output::header(&format!("Courses ({})", titles.len()));

    for title in &titles {
        if !lessons {
            Output::list_item(title);
            continue;
        }

        // Exact titles resolve without an embedding call.
        match store.course_outline(title).await? {
            Some(course) => println!("\n{}", format_outline(&course)),
            None => Output::list_item(title),
        }
    }

    Ok(())
}
