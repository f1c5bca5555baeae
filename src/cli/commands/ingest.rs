//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{FileStatus, IngestOptions, Orchestrator};
use anyhow::Result;
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(dir: &str, options: IngestOptions, settings: Settings) -> Result<()> {
    if !options.dry_run {
        if let Err(e) = preflight::check(Operation::Ingest, &settings) {
            Output::error(&e.to_string());
            return Err(e.into());
        }
    }

    let dir = Settings::expand_path(dir);
    let orchestrator = Orchestrator::new(settings)?;

    let total = orchestrator.transcript_files(&dir, &options)?.len();
    if total == 0 {
        Output::warning(&format!("No transcript files found in {}", dir.display()));
        return Ok(());
    }

    let label = if options.dry_run { "Previewing" } else { "Ingesting" };
    let pb = Output::progress_bar(total as u64, label);

    let report = orchestrator
        .ingest_directory(&dir, &options, |file| {
            pb.set_message(file.filename.clone());
            pb.inc(1);
            for warning in &file.warnings {
                pb.suspend(|| Output::warning(&format!("{}: {}", file.filename, warning)));
            }
            if let FileStatus::Failed(error) = &file.status {
                pb.suspend(|| Output::error(&format!("{}: {}", file.filename, error)));
            }
        })
        .await?;
    pb.finish_and_clear();

    if options.dry_run {
        Output::header("Dry run");
        for file in &report.files {
            if file.status == FileStatus::Previewed {
                Output::list_item(&format!(
                    "{} - {} ({} chunks, ~{} tokens)",
                    file.filename,
                    file.title.as_deref().unwrap_or("untitled"),
                    file.chunks,
                    file.tokens
                ));
            }
        }
        println!();
        Output::kv("Would ingest", &report.previewed().to_string());
    } else {
        Output::header("Ingestion complete");
        Output::kv("Ingested", &report.ingested().to_string());
        Output::kv("Skipped (already stored)", &report.skipped().to_string());
    }
    Output::kv("Failed", &report.failed().to_string());
    Output::kv("Chunks", &report.total_chunks().to_string());
    Output::kv("Estimated tokens", &report.total_tokens().to_string());

    if report.failed() > 0 {
        Output::warning(&format!(
            "{} file(s) failed; fix them and run the command again",
            report.failed()
        ));
    } else if report.ingested() > 0 {
        Output::success(&format!("Knowledge base updated from {}", display_dir(&dir)));
    }

    Ok(())
}

fn display_dir(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string())
}
