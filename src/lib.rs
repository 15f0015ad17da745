//! Lektor - questions and answers over course material
//!
//! Lektor ingests course files into a vector store and answers questions
//! about them with a language model that can call two tools: a content search
//! and a course outline lookup.
//!
//! # Architecture
//!
//! - `llm` - Messages API types and the HTTP client
//! - `agent` - Tool contract, registry and the round-bounded orchestration engine
//! - `course` - Course types and the course file loader
//! - `embedding` - Embedding generation
//! - `vector_store` - Retrieval provider abstraction (SQLite, in-memory)
//! - `rag` - Caller-facing query entry point with conversation sessions
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use lektor::config::Settings;
//! use lektor::rag::RagSystem;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let system = RagSystem::new(&settings)?;
//!
//!     let response = system.query("What does lesson 2 of the MCP course cover?", None).await?;
//!     println!("{}", response.format_for_display());
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod course;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod rag;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vector_store;

pub use error::{LektorError, Result};
