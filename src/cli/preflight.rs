//! Pre-flight checks before expensive operations.
//!
//! Validates that required credentials are available before starting
//! operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{Result, WiseoneError};
use crate::generation::is_anthropic_model;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion embeds chunks.
    Ingest,
    /// Answering embeds the query and calls the chat models.
    Answer,
    /// Search embeds the query.
    Search,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    require_env("OPENAI_API_KEY", "sk-...")?;

    if let Operation::Answer = operation {
        let generation = &settings.generation;
        if is_anthropic_model(&generation.chat_model)
            || is_anthropic_model(generation.reflection_model())
        {
            require_env("ANTHROPIC_API_KEY", "sk-ant-...")?;
        }
    }
    Ok(())
}

fn require_env(name: &str, example: &str) -> Result<()> {
    check_value(name, std::env::var(name).ok().as_deref(), example)
}

fn check_value(name: &str, value: Option<&str>, example: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        Some(_) => Err(WiseoneError::Config(format!(
            "{} is empty. Set it with: export {}='{}'",
            name, name, example
        ))),
        None => Err(WiseoneError::Config(format!(
            "{} not set. Set it with: export {}='{}'",
            name, name, example
        ))),
    }
}
