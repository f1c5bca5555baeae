//! Conversation state: an append-only message log per session.

use crate::error::WiseoneError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const TITLE_MAX_CHARS: usize = 60;
const SUMMARY_MESSAGE_CHARS: usize = 400;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WiseoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(WiseoneError::Store(format!("Unknown message role '{}'", other))),
        }
    }
}

/// Reference from an answer back to one retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub filename: String,
    pub title: String,
    pub session_date: NaiveDate,
    pub chunk_index: usize,
    pub section_header: Option<String>,
    /// Ranking score of the chunk when it was retrieved.
    pub similarity: f32,
}

impl Citation {
    /// "2026-02-08 - Ego and Awakening > Key Teachings"
    pub fn label(&self) -> String {
        match &self.section_header {
            Some(section) => format!("{} - {} > {}", self.session_date, self.title, section),
            None => format!("{} - {}", self.session_date, self.title),
        }
    }
}

/// One immutable entry in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Citation>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            created_at: Utc::now(),
        }
    }
}

/// A chat session.
///
/// `id` is `None` until the first turn persists the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<Uuid>,
    pub title: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a stored conversation.
    pub fn from_parts(id: Uuid, title: String, messages: Vec<Message>) -> Self {
        Self {
            id: Some(id),
            title: Some(title),
            messages,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Start over with an empty, unsaved session.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// The trailing user message that has no answer yet.
    pub fn pending_question(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Messages before the pending question (all of them if nothing is pending).
    pub fn prior_messages(&self) -> &[Message] {
        match self.pending_question() {
            Some(_) => &self.messages[..self.messages.len() - 1],
            None => &self.messages,
        }
    }

    /// The last `n` prior messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let prior = self.prior_messages();
        &prior[prior.len().saturating_sub(n)..]
    }

    /// Sources attached to the latest assistant message.
    pub fn last_sources(&self) -> &[Citation] {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.sources.as_slice())
            .unwrap_or(&[])
    }

    /// Plain-text digest of the last `n` prior messages.
    pub fn summary(&self, n: usize) -> String {
        self.recent(n)
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "User",
                    _ => "Assistant",
                };
                format!("{}: {}", speaker, truncate_chars(m.content.trim(), SUMMARY_MESSAGE_CHARS))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text to embed for retrieval. With `contextual`, the previous user
    /// question is prepended so short follow-ups keep their subject.
    pub fn retrieval_query(&self, question: &str, contextual: bool) -> String {
        if !contextual {
            return question.to_string();
        }
        let previous = self
            .prior_messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.trim());
        match previous {
            Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, question),
            _ => question.to_string(),
        }
    }
}

/// Session title from the first question: its first line, at most 60 chars.
pub fn derive_title(question: &str) -> String {
    let line = question.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.is_empty() {
        return "New conversation".to_string();
    }
    if line.chars().count() <= TITLE_MAX_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
