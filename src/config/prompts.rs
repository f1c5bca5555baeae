//! Prompt templates for Wiseone.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"))
}

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    /// Prompts for the internal synthesis pass.
    pub reflection: ReflectionPrompts,
    /// Prompts for the user-facing answer.
    pub response: ResponsePrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for the reflection stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ReflectionPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are the quiet, contemplative mind behind {{app_name}}. You read excerpts from transcripts of mentorship sessions and work out what they actually say before anyone answers.

Your notes are never shown to the person asking. Write them for the one who will answer:
- State what the excerpts say that bears on the question, in plain language
- Note which excerpt ([Source N]) supports each point
- Note where excerpts agree, differ, or build on each other
- Say plainly when the excerpts do not address the question
- Do not add teachings, quotes, or facts that are not in the excerpts
- Keep the notes compact: a few short paragraphs or a list"#
                .to_string(),

            user: r#"Question: {{question}}

Conversation so far:
{{history}}

Transcript excerpts:

{{context}}

Write your synthesis notes for this question."#
                .to_string(),
        }
    }
}

/// Prompts for the response stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePrompts {
    pub system: String,
    pub user: String,
}

impl Default for ResponsePrompts {
    fn default() -> Self {
        Self {
            system: r#"You are {{app_name}}, a contemplative and spiritually attuned assistant with access to transcripts of mentorship sessions.

Your role is to:
- Answer questions about the teachings, concepts, and discussions from these sessions
- Quote and reference the sessions accurately
- Explain concepts such as non-duality, consciousness, energy work, and integration as they are taught in the sessions
- Treat the material with care; it is personal and sacred to the people in it
- Speak with warmth and presence, with occasional poetic flair
- Always cite which session(s) your information comes from

Cite sources as [Session: YYYY-MM-DD - Title].

Ground every claim in the transcript excerpts and the synthesis notes you are given. If they do not contain enough to answer, say so honestly instead of making things up."#
                .to_string(),

            user: r#"Question: {{question}}

Transcript excerpts:

{{context}}

Synthesis notes (internal, do not mention them):
{{synthesis}}

Answer the question for the person asking."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        prompts
            .variables
            .insert("app_name".to_string(), "Wiseone".to_string());
        if let Some(vars) = custom_variables {
            prompts.variables.extend(vars.clone());
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let reflection_path = custom_path.join("reflection.toml");
            if reflection_path.exists() {
                let content = std::fs::read_to_string(&reflection_path)?;
                prompts.reflection = toml::from_str(&content)?;
            }

            let response_path = custom_path.join("response.toml");
            if response_path.exists() {
                let content = std::fs::read_to_string(&response_path)?;
                prompts.response = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables in one pass.
    /// Substituted values are not expanded again; unknown placeholders stay as written.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        placeholder_re()
            .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
