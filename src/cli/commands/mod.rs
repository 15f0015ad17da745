//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod courses;
mod ingest;
mod serve;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use courses::run_courses;
pub use ingest::run_ingest;
pub use serve::run_serve;

use crate::config::Settings;

/// Apply per-invocation model overrides to the loaded settings.
pub(crate) fn with_overrides(
    mut settings: Settings,
    model: Option<String>,
    max_rounds: Option<usize>,
) -> Settings {
    if let Some(model) = model {
        settings.llm.model = model;
    }
    if let Some(max_rounds) = max_rounds {
        settings.llm.max_rounds = max_rounds;
    }
    settings
}
