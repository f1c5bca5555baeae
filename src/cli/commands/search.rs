//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: usize,
    threshold: Option<f32>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let mut retriever = orchestrator.retriever().with_top_k(limit);
    if let Some(t) = threshold {
        retriever = retriever.with_threshold(t);
    }

    let spinner = Output::spinner("Searching...");
    let results = retriever.retrieve(query, Some(query)).await;
    spinner.finish_and_clear();

    match results {
        Ok(candidates) if candidates.is_empty() => {
            Output::warning("No passages matched your query.");
        }
        Ok(candidates) => {
            Output::success(&format!("Found {} passages", candidates.len()));
            for candidate in &candidates {
                Output::search_result(candidate);
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
