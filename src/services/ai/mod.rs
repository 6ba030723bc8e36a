pub mod generation;
pub mod groq;
pub mod intent;
pub mod ollama;
pub mod rules;
pub mod sentiment;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use crate::models::ChatMessage as Message;

/// Per-call knobs. `model` overrides the provider's default model.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f32,
    pub json: bool,
    pub model: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            json: false,
            model: None,
        }
    }
}

impl ChatOptions {
    /// Low-temperature JSON call on a specific model, used by the classifiers.
    pub fn tool(model: &str) -> Self {
        Self {
            temperature: 0.1,
            json: true,
            model: Some(model.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> anyhow::Result<Completion>;
}

/// Pulls the JSON object out of a model reply that may be wrapped in a
/// Markdown fence or surrounded by prose.
pub fn extract_json(response: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(response) {
        if value.is_object() {
            return Some(value);
        }
    }

    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&cleaned[start..=end])
        .ok()
        .filter(|v| v.is_object())
}
