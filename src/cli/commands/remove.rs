//! Remove command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Delete one transcript and its chunks from the knowledge base.
pub async fn run_remove(filename: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    if orchestrator.transcripts().delete_transcript(filename).await? {
        Output::success(&format!("Removed {}", filename));
    } else {
        Output::warning(&format!("No stored transcript named {}", filename));
    }
    Ok(())
}
