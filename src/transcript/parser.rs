//! Metadata extraction from transcript markdown.
//!
//! Header conventions understood here:
//! - filename `YYYY-MM-DD[-topic].<ext>` (`_` also accepted as separator)
//! - `# Title` as the first H1
//! - `**Date:** YYYY-MM-DD ...` when the filename carries no date
//! - a `## Participants` list, or `**Participants (known):** a, b`
//! - `**Key themes:** a, b`, else `**Topic:** a, b`, else the `###` headings under `## Summary`
//! - `**Duration:** 1h 20m`

use super::Transcript;
use crate::error::{Result, WiseoneError};
use chrono::NaiveDate;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Files in a transcript directory that are never sessions.
const IGNORED_FILES: &[&str] = &["INDEX.md", "_TEMPLATE.md"];

/// Extensions treated as transcript documents.
const TRANSCRIPT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:[-_](.+?))?\.([A-Za-z0-9]+)$").expect("valid regex")
    })
}

fn bold_field_re(label: &str) -> Regex {
    // Matches `**Label:** value` and `**Label**: value`.
    Regex::new(&format!(r"(?mi)^\s*\*\*{}:?\*\*:?[ \t]*(.+)$", label)).expect("valid regex")
}

/// Split a transcript filename into its session date and optional topic slug.
pub fn parse_filename(filename: &str) -> Option<(NaiveDate, Option<String>)> {
    let caps = filename_re().captures(filename)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    let topic = caps.get(2).map(|m| m.as_str().to_string());
    Some((date, topic))
}

/// Whether a path looks like a session transcript worth ingesting.
pub fn is_transcript_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') || IGNORED_FILES.contains(&name) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TRANSCRIPT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parse a transcript document into structured metadata plus raw text.
pub fn parse_transcript(filename: &str, text: &str) -> Result<Transcript> {
    let from_name = parse_filename(filename);

    let session_date = match &from_name {
        Some((date, _)) => *date,
        None => date_from_header(text).ok_or_else(|| {
            WiseoneError::ingestion(
                filename,
                "no session date: expected a YYYY-MM-DD filename or a **Date:** line",
            )
        })?,
    };

    let topic = from_name.and_then(|(_, topic)| topic);
    let title = first_heading(text)
        .or_else(|| topic.map(|t| t.replace(['-', '_'], " ")))
        .unwrap_or_else(|| file_stem(filename));

    Ok(Transcript {
        filename: filename.to_string(),
        session_date,
        title,
        themes: themes(text),
        participants: participants(text),
        duration: bold_field(text, "Duration"),
        raw_content: text.to_string(),
    })
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn bold_field(text: &str, label: &str) -> Option<String> {
    bold_field_re(label)
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

fn date_from_header(text: &str) -> Option<NaiveDate> {
    let value = bold_field(text, "Date")?;
    let first = value.split_whitespace().next()?;
    NaiveDate::parse_from_str(first, "%Y-%m-%d").ok()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('.').trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lines between a `## <name>` heading and the next heading of level 1 or 2.
fn section_lines<'a>(text: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let mut lines = text.lines();
    lines.by_ref().find(|line| {
        line.strip_prefix("## ")
            .map(|h| {
                let h = h.trim().to_ascii_lowercase();
                h == name || h.starts_with(&format!("{} ", name)) || h.starts_with(&format!("{}:", name))
            })
            .unwrap_or(false)
    })?;
    Some(
        lines
            .take_while(|line| !(line.starts_with("# ") || line.starts_with("## ")))
            .collect(),
    )
}

fn participants(text: &str) -> Vec<String> {
    let listed = section_lines(text, "participants")
        .or_else(|| section_lines(text, "participant"))
        .map(|lines| {
            lines
                .into_iter()
                .map(|line| line.trim().trim_start_matches(['-', '*', ' ']))
                .filter(|line| !line.is_empty())
                .filter_map(|line| line.split(['(', '[']).next())
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if !listed.is_empty() {
        return listed;
    }

    bold_field(text, r"Participants?(?: \([^)]*\))?")
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn themes(text: &str) -> Vec<String> {
    if let Some(v) = bold_field(text, "Key themes?") {
        return split_list(&v);
    }
    if let Some(v) = bold_field(text, "Topics?") {
        return split_list(&v);
    }
    section_lines(text, "summary")
        .map(|lines| {
            lines
                .into_iter()
                .filter_map(|line| line.strip_prefix("### "))
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
