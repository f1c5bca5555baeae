//! Interactive multi-turn chat command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::{Conversation, Role};
use crate::orchestrator::Orchestrator;
use crate::rag::RagEngine;
use anyhow::{anyhow, Result};
use console::style;
use std::io::{self, BufRead, Write};
use uuid::Uuid;

/// Run the interactive chat command.
pub async fn run_chat(conversation_id: Option<String>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Answer, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let engine = orchestrator.engine(None, None);

    let mut conversation = match conversation_id {
        Some(raw) => resume(&engine, &raw).await?,
        None => Conversation::new(),
    };

    println!("\n{}", style("Wiseone Chat").bold().cyan());
    println!(
        "{}\n",
        style("Ask anything. Commands: 'sources', 'retry', 'clear', 'exit'.").dim()
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
            conversation.clear();
            Output::info("Started a new conversation.");
            continue;
        }

        if input.eq_ignore_ascii_case("sources") {
            if conversation.last_sources().is_empty() {
                Output::info("The last answer cited no sources.");
            } else {
                Output::citations(conversation.last_sources());
            }
            continue;
        }

        let spinner = Output::spinner("Reflecting...");
        let result = if input.eq_ignore_ascii_case("retry") {
            engine.retry(&mut conversation).await
        } else {
            engine.turn(&mut conversation, input).await
        };
        spinner.finish_and_clear();

        match result {
            Ok(outcome) => {
                println!("\n{} {}\n", style("Wiseone:").cyan().bold(), outcome.answer);
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
                if conversation.pending_question().is_some() {
                    Output::info("Type 'retry' to try this question again, or 'clear' to start over.");
                }
            }
        }
    }

    Ok(())
}

async fn resume(engine: &RagEngine, raw: &str) -> Result<Conversation> {
    let id = Uuid::parse_str(raw).map_err(|e| anyhow!("Invalid conversation id {}: {}", raw, e))?;
    let conversation = engine
        .conversations()
        .load_conversation(id)
        .await?
        .ok_or_else(|| anyhow!("Conversation not found: {}", id))?;

    Output::info(&format!(
        "Resuming \"{}\" ({} messages)",
        conversation.title.as_deref().unwrap_or("untitled"),
        conversation.messages().len()
    ));
    for message in conversation.recent(4) {
        let who = match message.role {
            Role::User => style("You:").green().bold(),
            _ => style("Wiseone:").cyan().bold(),
        };
        println!("{} {}", who, message.content);
    }
    if let Some(question) = conversation.pending_question() {
        Output::warning(&format!("Unanswered: {} (type 'retry')", question));
    }
    Ok(conversation)
}
