//! Configuration module for Wiseone.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, ReflectionPrompts, ResponsePrompts};
pub use settings::{
    ChunkingSettings, ContextSettings, EmbeddingSettings, GeneralSettings, GenerationSettings,
    PromptSettings, RetrievalSettings, Settings, StoreSettings, CONFIG_ENV_VAR,
};
