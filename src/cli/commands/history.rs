//! History command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;

/// Run the history command.
pub async fn run_history(limit: usize, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let conversations = orchestrator.conversations().list_conversations(limit).await?;

    if conversations.is_empty() {
        Output::info("No conversations yet. Start one with 'wiseone chat'.");
        return Ok(());
    }

    Output::header(&format!("Conversations ({})", conversations.len()));
    for conversation in &conversations {
        println!(
            "  {} {} {} ({} messages)",
            style("*").cyan(),
            style(conversation.created_at.format("%Y-%m-%d %H:%M")).dim(),
            style(&conversation.title).bold(),
            conversation.message_count
        );
        println!("      {}", style(conversation.id).dim());
    }
    println!();
    Output::info("Resume one with 'wiseone chat --conversation <id>'.");

    Ok(())
}
