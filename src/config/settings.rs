//! Configuration settings for Wiseone.

use crate::chunking::ChunkingStrategy;
use crate::error::{Result, WiseoneError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV_VAR: &str = "WISEONE_CONFIG";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub generation: GenerationSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.wiseone".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.wiseone/wiseone.db".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Chunks embedded per API call during ingestion.
    pub batch_size: usize,
    /// Extra attempts for a failed embedding batch during ingestion.
    pub max_retries: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 20,
            max_retries: 2,
        }
    }
}

/// Transcript chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Chunking strategy (sections, windows).
    pub strategy: ChunkingStrategy,
    /// Target chunk size in tokens.
    pub chunk_size: usize,
    /// Overlap between consecutive windows in tokens.
    pub chunk_overlap: usize,
    /// Tokens a chunk may run past `chunk_size`. Defaults to a fifth of the size.
    pub tolerance: Option<usize>,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Sections,
            chunk_size: 1000,
            chunk_overlap: 200,
            tolerance: None,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of transcript chunks to retrieve.
    pub top_k: usize,
    /// Minimum cosine similarity for a pure vector hit (0.0-1.0).
    pub similarity_threshold: f32,
    /// Combine vector similarity with keyword matching.
    pub hybrid: bool,
    /// Prefix follow-up questions with the previous question when embedding.
    pub contextual_queries: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.30,
            hybrid: true,
            contextual_queries: true,
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Maximum size of the assembled context block, in characters.
    pub max_chars: usize,
    /// Word-set similarity above which two chunks count as duplicates.
    pub dedup_similarity: f32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_chars: 12_000,
            dedup_similarity: 0.9,
        }
    }
}

/// Language model settings for the reflection and response stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Model for the user-facing response ("gpt-4o", "gpt-4o-mini", "claude-...").
    pub chat_model: String,
    /// Model for the reflection stage. Falls back to `chat_model`.
    pub reflection_model: Option<String>,
    /// Sampling temperature for the response stage.
    pub temperature: f32,
    /// Sampling temperature for the reflection stage.
    pub reflection_temperature: f32,
    /// Max tokens per generation call.
    pub max_tokens: u32,
    /// Prior messages included in the response prompt.
    pub history_messages: usize,
    /// Upper bound on one question-to-answer turn, in seconds.
    pub turn_timeout_secs: u64,
    /// Upper bound on one HTTP request to a model provider, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o".to_string(),
            reflection_model: None,
            temperature: 0.75,
            reflection_temperature: 0.4,
            max_tokens: 2000,
            history_messages: 10,
            turn_timeout_secs: 120,
            request_timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GenerationSettings {
    /// Model used by the reflection stage.
    pub fn reflection_model(&self) -> &str {
        self.reflection_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.chat_model)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from `WISEONE_CONFIG` or the default configuration file.
    pub fn load() -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV_VAR)
            .ok()
            .filter(|p| !p.is_empty())
            .map(|p| Self::expand_path(&p));
        Self::load_from(from_env.as_ref())
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check every option against its allowed range.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(WiseoneError::Config(msg));

        if self.chunking.chunk_size == 0 {
            return fail("chunking.chunk_size must be positive".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return fail(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return fail(format!(
                "retrieval.similarity_threshold must be within [0, 1], got {}",
                self.retrieval.similarity_threshold
            ));
        }
        if self.retrieval.top_k == 0 {
            return fail("retrieval.top_k must be at least 1".to_string());
        }
        if self.context.max_chars == 0 {
            return fail("context.max_chars must be positive".to_string());
        }
        if !(self.context.dedup_similarity > 0.0 && self.context.dedup_similarity <= 1.0) {
            return fail(format!(
                "context.dedup_similarity must be within (0, 1], got {}",
                self.context.dedup_similarity
            ));
        }
        for (key, value) in [
            ("generation.temperature", self.generation.temperature),
            ("generation.reflection_temperature", self.generation.reflection_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return fail(format!("{} must be within [0, 2], got {}", key, value));
            }
        }
        if self.generation.chat_model.trim().is_empty() {
            return fail("generation.chat_model must not be empty".to_string());
        }
        if self.generation.turn_timeout_secs == 0 || self.generation.request_timeout_secs == 0 {
            return fail("generation timeouts must be positive".to_string());
        }
        if self.embedding.dimensions == 0 {
            return fail("embedding.dimensions must be positive".to_string());
        }
        if self.embedding.batch_size == 0 {
            return fail("embedding.batch_size must be positive".to_string());
        }

        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WiseoneError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wiseone")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.retrieval.top_k, 5);
        assert!((settings.retrieval.similarity_threshold - 0.30).abs() < f32::EPSILON);
        assert_eq!(settings.generation.reflection_model(), "gpt-4o");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut settings = Settings::default();
        settings.chunking.chunk_overlap = settings.chunking.chunk_size;
        assert!(matches!(settings.validate(), Err(WiseoneError::Config(_))));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut settings = Settings::default();
        settings.retrieval.similarity_threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [generation]
            chat_model = "claude-3-5-sonnet-20241022"

            [retrieval]
            top_k = 8
            "#,
        )
        .unwrap();

        assert_eq!(settings.retrieval.top_k, 8);
        assert!(settings.retrieval.hybrid);
        assert_eq!(settings.chunking.chunk_size, 1000);
        assert_eq!(settings.generation.reflection_model(), "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_load_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n").unwrap();

        let result = Settings::load_from(Some(&path));
        assert!(matches!(result, Err(WiseoneError::Config(_))));
    }
}
