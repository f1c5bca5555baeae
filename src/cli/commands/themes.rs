//! Themes command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the themes command.
pub async fn run_themes(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let themes = orchestrator.transcripts().theme_counts().await?;

    if themes.is_empty() {
        Output::info("No themes recorded. Themes come from the 'Key themes' line of each transcript.");
        return Ok(());
    }

    Output::header(&format!("Themes ({})", themes.len()));
    let width = themes.iter().map(|t| t.theme.chars().count()).max().unwrap_or(0);
    for theme in &themes {
        Output::list_item(&format!("{:<width$}  {}", theme.theme, theme.count, width = width));
    }

    Ok(())
}
