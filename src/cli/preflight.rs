//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{LektorError, Result};

/// Variable read by the embeddings client.
pub const EMBEDDING_KEY_ENV: &str = "OPENAI_API_KEY";

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Answering questions needs the model key and the embeddings key.
    Ask,
    /// Ingesting course files needs the embeddings key.
    Ingest,
    /// Listing stored courses has no external requirements.
    Browse,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Ask => {
            check_env(&settings.llm.api_key_env)?;
            check_env(EMBEDDING_KEY_ENV)?;
        }
        Operation::Ingest => check_env(EMBEDDING_KEY_ENV)?,
        Operation::Browse => {}
    }
    Ok(())
}

fn check_env(name: &str) -> Result<()> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(()),
        Ok(_) => Err(LektorError::Config(format!(
            "{} is empty. Set it with: export {}='...'",
            name, name
        ))),
        Err(_) => Err(LektorError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            name, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browse_has_no_requirements() {
        assert!(check(Operation::Browse, &Settings::default()).is_ok());
    }

    #[test]
    fn test_missing_model_key_is_reported() {
        let mut settings = Settings::default();
        settings.llm.api_key_env = "LEKTOR_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let err = check(Operation::Ask, &settings).unwrap_err();
        assert!(err.to_string().contains("LEKTOR_TEST_KEY_THAT_IS_NEVER_SET not set"));
    }
}
