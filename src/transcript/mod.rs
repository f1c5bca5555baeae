//! Transcript documents and their metadata.
//!
//! A transcript is one mentorship session, identified by its filename.

mod parser;

pub use parser::{is_transcript_file, parse_filename, parse_transcript};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One source document of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Unique filename (e.g. `2026-02-08-ego-and-awakening.md`).
    pub filename: String,
    /// Date the session took place.
    pub session_date: NaiveDate,
    /// Session title.
    pub title: String,
    /// Theme labels, in document order.
    pub themes: Vec<String>,
    /// Participant names, in document order.
    pub participants: Vec<String>,
    /// Free-form duration label (e.g. "1h 20m").
    pub duration: Option<String>,
    /// Full raw text.
    pub raw_content: String,
}

impl Transcript {
    /// Create a transcript with no themes, participants or duration.
    pub fn new(filename: &str, session_date: NaiveDate, title: &str, raw_content: &str) -> Self {
        Self {
            filename: filename.to_string(),
            session_date,
            title: title.to_string(),
            themes: Vec::new(),
            participants: Vec::new(),
            duration: None,
            raw_content: raw_content.to_string(),
        }
    }

    /// Set the theme labels.
    pub fn with_themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.themes = themes.into_iter().map(Into::into).collect();
        self
    }
}
