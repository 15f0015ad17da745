//! Configuration module for Lektor.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, SystemPrompts};
pub use settings::{
    EmbeddingSettings, GeneralSettings, LlmSettings, PromptSettings, RetrySettings,
    ServerSettings, SessionSettings, Settings, VectorStoreSettings,
};
