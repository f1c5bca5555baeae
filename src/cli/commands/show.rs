//! Show command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;

/// Print the stored chunks of one transcript.
pub async fn run_show(filename: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let chunks = orchestrator.transcripts().chunks(filename).await?;

    if chunks.is_empty() {
        Output::warning(&format!("No stored transcript named {}", filename));
        return Ok(());
    }

    let tokens: usize = chunks.iter().map(|c| c.token_count).sum();
    Output::header(&format!("{} ({} chunks, ~{} tokens)", filename, chunks.len(), tokens));
    for chunk in &chunks {
        println!(
            "\n{} {}",
            style(format!("#{}", chunk.chunk_index)).cyan(),
            style(chunk.section_header.as_deref().unwrap_or("(no section)")).bold()
        );
        println!("{}", chunk.content);
    }

    Ok(())
}
