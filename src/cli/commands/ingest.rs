//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::vector_store::open_store;
use crate::{course, LektorError};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Run the ingest command.
pub async fn run_ingest(path: &str, clear: bool, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let path = PathBuf::from(shellexpand::tilde(path).to_string());
    if !path.exists() {
        return Err(LektorError::InvalidInput(format!("Path not found: {}", path.display())).into());
    }

    let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
    let store = open_store(&settings.vector_store, embedder)?;

    if clear {
        store.clear().await?;
        Output::info("Cleared existing courses.");
    }

    let files = if path.is_dir() {
        course::course_files_in(&path)?
    } else {
        vec![path]
    };

    let existing = store.course_titles().await?;
    let mut added = 0;

    for file in &files {
        let spinner = Output::spinner(&format!("Ingesting {}...", file.display()));
        let parsed = course::load_course_file(file);

        let (course, chunks) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                spinner.finish_and_clear();
                Output::warning(&format!("Skipping {}: {}", file.display(), e));
                continue;
            }
        };

        if existing.contains(&course.title) {
            spinner.finish_and_clear();
            Output::info(&format!("Already ingested: {}", course.title));
            continue;
        }

        store.add_course(&course).await?;
        let stored = store.add_chunks(&chunks).await?;
        spinner.finish_and_clear();

        Output::success(&format!(
            "{} ({} lessons, {} passages)",
            course.title,
            course.lessons.len(),
            stored
        ));
        added += 1;
    }

    Output::info(&format!(
        "Added {} course(s); {} stored in total.",
        added,
        store.course_count().await?
    ));

    Ok(())
}
