//! Interactive chat command.

use super::with_overrides;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::RagSystem;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Run the interactive chat command.
pub async fn run_chat(
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
    let mut session_id = system.sessions().create_session()?;

    println!("\n{}", style("Lektor Chat").bold().cyan());
    println!(
        "{}\n",
        style("Ask about your courses, or 'exit' to quit. Use 'clear' to reset the conversation.")
            .dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            system.sessions().clear(&session_id)?;
            session_id = system.sessions().create_session()?;
            Output::info("Conversation history cleared.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let response = system.query(input, Some(&session_id)).await;
        spinner.finish_and_clear();

        match response {
            Ok(response) => {
                debug!("Session {}", response.session_id);
                print!("{}", style("Lektor:").cyan().bold());
                Output::answer(&response.answer, &response.sources);
                println!();
            }
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    Ok(())
}
