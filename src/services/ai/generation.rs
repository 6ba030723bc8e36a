use serde_json::Value;

use super::{extract_json, ChatOptions, LlmProvider, Message};
use crate::models::{RawDirective, TokenCounts};

/// Any of these aborts the turn.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("response generation failed: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("generation output is not a JSON object")]
    InvalidJson,

    #[error("generation output missing `{0}`")]
    MissingKey(&'static str),

    #[error("generation output has invalid `{key}`: {message}")]
    InvalidField { key: &'static str, message: String },
}

/// The model's reply before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReply {
    pub response_text: String,
    pub kanban_status: String,
    pub directive: RawDirective,
    /// Set when the directive block was unusable and replaced with `normal`.
    pub warning: Option<String>,
    pub usage: TokenCounts,
}

/// The three required keys of a generation reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGeneration {
    pub response_text: String,
    pub kanban_status: String,
    pub directive: RawDirective,
    pub warning: Option<String>,
}

pub fn parse_generation(content: &str) -> Result<ParsedGeneration, GenerationError> {
    let value = extract_json(content).ok_or(GenerationError::InvalidJson)?;

    let response_text = match value.get("response_text") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(GenerationError::InvalidField {
                key: "response_text",
                message: "expected a string".to_string(),
            })
        }
        None => return Err(GenerationError::MissingKey("response_text")),
    };

    let kanban_status = match value.get("kanban_status") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(GenerationError::InvalidField {
                key: "kanban_status",
                message: "expected a string".to_string(),
            })
        }
        None => return Err(GenerationError::MissingKey("kanban_status")),
    };

    let directives = value
        .get("directives")
        .ok_or(GenerationError::MissingKey("directives"))?;
    let (directive, warning) = parse_directive(directives);

    Ok(ParsedGeneration {
        response_text,
        kanban_status,
        directive,
        warning,
    })
}

/// A malformed directive block degrades to `normal` instead of failing the turn.
fn parse_directive(value: &Value) -> (RawDirective, Option<String>) {
    if !value.is_object() {
        return (
            RawDirective::default(),
            Some(format!("directives was not an object ({value}), using normal")),
        );
    }
    match serde_json::from_value::<RawDirective>(value.clone()) {
        Ok(directive) => (directive, None),
        Err(e) => (
            RawDirective::default(),
            Some(format!("directives did not match the schema ({e}), using normal")),
        ),
    }
}

pub async fn generate_reply(
    llm: &dyn LlmProvider,
    system_prompt: &str,
    history: &[Message],
    user_message: &str,
) -> Result<GeneratedReply, GenerationError> {
    let mut messages: Vec<Message> = history.to_vec();
    messages.push(Message {
        role: "user".to_string(),
        content: user_message.to_string(),
    });

    let options = ChatOptions {
        temperature: 0.2,
        json: true,
        model: None,
    };
    let completion = llm
        .chat(system_prompt, &messages, &options)
        .await
        .map_err(GenerationError::Provider)?;

    let parsed = parse_generation(&completion.content)?;
    if let Some(warning) = &parsed.warning {
        tracing::warn!(stage = "generate", %warning, "generation directive replaced");
    }

    Ok(GeneratedReply {
        response_text: parsed.response_text,
        kanban_status: parsed.kanban_status,
        directive: parsed.directive,
        warning: parsed.warning,
        usage: TokenCounts::default().add(completion.prompt_tokens, completion.completion_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::testing::ScriptedLlm;

    #[test]
    fn test_parse_complete_output() {
        let parsed = parse_generation(
            r#"{"response_text":"Oi!","kanban_status":"Em Atendimento","directives":{"type":"normal"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.response_text, "Oi!");
        assert_eq!(parsed.kanban_status, "Em Atendimento");
        assert_eq!(parsed.directive.kind(), "normal");
        assert!(parsed.warning.is_none());
    }

    #[test]
    fn test_missing_keys_are_fatal() {
        assert!(matches!(
            parse_generation(r#"{"kanban_status":"x","directives":{}}"#),
            Err(GenerationError::MissingKey("response_text"))
        ));
        assert!(matches!(
            parse_generation(r#"{"response_text":"x","directives":{}}"#),
            Err(GenerationError::MissingKey("kanban_status"))
        ));
        assert!(matches!(
            parse_generation(r#"{"response_text":"x","kanban_status":"y"}"#),
            Err(GenerationError::MissingKey("directives"))
        ));
        assert!(matches!(parse_generation("sorry, I can't"), Err(GenerationError::InvalidJson)));
    }

    #[test]
    fn test_malformed_directive_degrades_to_normal() {
        for directives in [r#""normal""#, "null", r#"{"type": 7}"#, "[1]"] {
            let content = format!(
                r#"{{"response_text":"x","kanban_status":"y","directives":{directives}}}"#
            );
            let parsed = parse_generation(&content).unwrap();
            assert_eq!(parsed.directive, RawDirective::default(), "{directives}");
            assert_eq!(parsed.directive.kind(), "normal");
            assert!(parsed.warning.is_some(), "{directives}");
        }
    }

    #[tokio::test]
    async fn test_generate_reply_counts_tokens() {
        let llm = ScriptedLlm::new(vec![Ok(
            "```json\n{\"response_text\":\"Hi\",\"kanban_status\":\"Inquiry\",\"directives\":{\"type\":\"normal\"}}\n```"
                .to_string(),
        )]);
        let reply = generate_reply(&llm, "system", &[], "oi").await.unwrap();
        assert_eq!(reply.response_text, "Hi");
        assert_eq!(reply.usage.total, 15);
    }

    #[tokio::test]
    async fn test_provider_error_is_fatal() {
        let llm = ScriptedLlm::new(vec![Err("503".to_string())]);
        assert!(matches!(
            generate_reply(&llm, "system", &[], "oi").await,
            Err(GenerationError::Provider(_))
        ));
    }
}
