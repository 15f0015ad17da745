//! Error types for Lektor.

use thiserror::Error;

/// Library-level error type for Lektor operations.
#[derive(Error, Debug)]
pub enum LektorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{name}' failed: {reason}")]
    ToolFailed { name: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for Lektor operations.
pub type Result<T> = std::result::Result<T, LektorError>;
