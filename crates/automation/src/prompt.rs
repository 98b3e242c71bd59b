//! System prompt resolution
//!
//! A short instruction appended to every question, mainly to keep the chat
//! UI from switching into its canvas editor, which breaks text extraction.
//! Resolution order: environment variable, prompt file in the working
//! directory, prompt file in the home directory, built-in default.

use std::path::PathBuf;
use tracing::debug;

pub const CANVAS_SUPPRESSION_PROMPT: &str =
    "<ATTENTION> never start the canvas mode! write everything always as normal text </ATTENTION>";

pub const PROMPT_ENV_VAR: &str = "GEMINI_SYSTEM_PROMPT";
pub const PROMPT_FILE_NAME: &str = ".gemini_prompt";

#[derive(Debug, Clone, Default)]
pub enum SystemPrompt {
    /// Resolve from environment, prompt files, then the built-in default.
    #[default]
    Resolved,
    /// Use exactly this text.
    Custom(String),
    /// Send the question bare.
    Disabled,
}

impl SystemPrompt {
    pub fn resolve(&self) -> Option<String> {
        match self {
            SystemPrompt::Resolved => Some(resolve_default()),
            SystemPrompt::Custom(text) => Some(text.clone()),
            SystemPrompt::Disabled => None,
        }
    }
}

fn resolve_default() -> String {
    if let Ok(prompt) = std::env::var(PROMPT_ENV_VAR) {
        if !prompt.trim().is_empty() {
            debug!(source = PROMPT_ENV_VAR, "system prompt from environment");
            return prompt;
        }
    }
    let candidates = [
        Some(PathBuf::from(PROMPT_FILE_NAME)),
        dirs::home_dir().map(|home| home.join(PROMPT_FILE_NAME)),
    ];
    for path in candidates.into_iter().flatten() {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                debug!(path = %path.display(), "system prompt from file");
                return trimmed.to_string();
            }
        }
    }
    CANVAS_SUPPRESSION_PROMPT.to_string()
}

/// The text actually typed into the page: question plus suffix, verbatim.
pub fn effective_prompt(question: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{question} {suffix}"),
        None => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_appended_verbatim() {
        assert_eq!(
            effective_prompt("what is 2+2?", Some("PLAIN TEXT ONLY")),
            "what is 2+2? PLAIN TEXT ONLY"
        );
        assert_eq!(effective_prompt("what is 2+2?", None), "what is 2+2?");
    }

    #[test]
    fn custom_prompt_resolves_to_itself() {
        let prompt = SystemPrompt::Custom("be terse".to_string());
        assert_eq!(prompt.resolve().as_deref(), Some("be terse"));
    }

    #[test]
    fn disabled_prompt_resolves_to_none() {
        assert!(SystemPrompt::Disabled.resolve().is_none());
    }

    #[test]
    fn default_prompt_suppresses_canvas() {
        assert!(CANVAS_SUPPRESSION_PROMPT.contains("canvas"));
    }
}
