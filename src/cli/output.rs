//! CLI output formatting utilities.

use crate::conversation::Citation;
use crate::store::{RetrievedCandidate, TranscriptSummary};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one ingested session.
    pub fn session_info(summary: &TranscriptSummary) {
        let mut details = vec![summary.filename.clone(), format!("{} chunks", summary.chunk_count)];
        if let Some(duration) = &summary.duration {
            details.push(duration.clone());
        }
        println!(
            "  {} {} {} ({})",
            style("*").cyan(),
            style(summary.session_date).cyan(),
            style(&summary.title).bold(),
            style(details.join(", ")).dim()
        );
        if !summary.themes.is_empty() {
            println!("      {}", style(summary.themes.join(", ")).dim());
        }
    }

    /// Print the sources cited by an answer.
    pub fn citations(citations: &[Citation]) {
        if citations.is_empty() {
            return;
        }
        Output::header("Sources");
        for (i, citation) in citations.iter().enumerate() {
            println!(
                "  {} {} {}",
                style(format!("[{}]", i + 1)).cyan(),
                citation.label(),
                style(format!("({:.0}%)", citation.similarity * 100.0)).dim()
            );
        }
    }

    /// Print search result.
    pub fn search_result(candidate: &RetrievedCandidate) {
        let location = match &candidate.section_header {
            Some(section) => format!("{} > {}", candidate.title, section),
            None => candidate.title.clone(),
        };
        let lexical = candidate
            .lexical_score
            .map(|s| format!(", lexical: {:.2}", s))
            .unwrap_or_default();
        println!(
            "\n{} {} {} (score: {:.2}, vector: {:.2}{})",
            style(">>").green(),
            style(candidate.session_date).cyan(),
            style(location).bold(),
            candidate.score,
            candidate.vector_similarity,
            lexical
        );
        println!("   {}", content_preview(&candidate.content, 200));
        println!(
            "   {}",
            style(format!("{} #{}", candidate.filename, candidate.chunk_index)).dim()
        );
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Collapse newlines and truncate with an ellipsis on a char boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short\ntext", 20), "short text");
        assert_eq!(content_preview("abcdef", 3), "abc...");
        // Multi-byte characters must not split.
        assert_eq!(content_preview("ééééé", 2), "éé...");
    }
}
