//! CLI module for Lektor.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Lektor - answers questions about course material
///
/// Ingests course files into a local vector store and answers questions about
/// them with a tool-calling language model.
#[derive(Parser, Debug)]
#[command(name = "lektor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question about the ingested courses
    Ask {
        /// The question to ask
        question: String,

        /// Model to use for answering
        #[arg(short, long)]
        model: Option<String>,

        /// Tool-calling rounds allowed before a final answer is forced
        #[arg(short = 'r', long)]
        max_rounds: Option<usize>,
    },

    /// Start an interactive chat session
    Chat {
        /// Model to use for answering
        #[arg(short, long)]
        model: Option<String>,

        /// Tool-calling rounds allowed before a final answer is forced
        #[arg(short = 'r', long)]
        max_rounds: Option<usize>,
    },

    /// Ingest a course file or a directory of course files
    Ingest {
        /// Path to a course JSON file or a directory of them
        path: String,

        /// Remove all stored courses before ingesting
        #[arg(long)]
        clear: bool,
    },

    /// List ingested courses
    Courses {
        /// Show the lesson list of each course
        #[arg(short, long)]
        lessons: bool,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Dotted configuration key (e.g., llm.max_rounds)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_overrides() {
        let cli = Cli::try_parse_from(["lektor", "-vv", "ask", "What is MCP?", "-r", "3"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ask {
                question,
                max_rounds,
                model,
            } => {
                assert_eq!(question, "What is MCP?");
                assert_eq!(max_rounds, Some(3));
                assert!(model.is_none());
            }
            other => panic!("Expected ask, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from(["lektor", "config", "set", "llm.model", "m"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set { .. }
            }
        ));
    }
}
