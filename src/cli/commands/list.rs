//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let store = orchestrator.transcripts();

    let sessions = match store.list_transcripts().await {
        Ok(sessions) => sessions,
        Err(e) => {
            Output::error(&format!("Failed to list sessions: {}", e));
            return Err(e.into());
        }
    };

    if sessions.is_empty() {
        Output::info("No sessions ingested yet. Use 'wiseone ingest <dir>' to add transcripts.");
        return Ok(());
    }

    Output::header(&format!("Ingested Sessions ({})", sessions.len()));
    println!();
    for session in &sessions {
        Output::session_info(session);
    }

    let stats = store.stats().await?;
    println!();
    Output::kv("Sessions", &stats.transcripts.to_string());
    Output::kv("Chunks", &stats.chunks.to_string());
    Output::kv("Conversations", &stats.conversations.to_string());

    Ok(())
}
