//! Ask command implementation.

use super::with_overrides;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::RagSystem;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    model: Option<String>,
    max_rounds: Option<usize>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let settings = with_overrides(settings, model, max_rounds);
    let system = RagSystem::new(&settings)?;

    if system.course_analytics().await?.total_courses == 0 {
        Output::warning("No courses ingested yet. Run 'lektor ingest <path>' first.");
    }

    let spinner = Output::spinner("Thinking...");
    let response = system.query(question, None).await;
    spinner.finish_and_clear();

    let response = response?;
    Output::answer(&response.answer, &response.sources);

    Ok(())
}
