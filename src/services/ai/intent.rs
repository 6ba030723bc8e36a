use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use super::rules::{first_match, format_history, Classified, Rule};
use super::{extract_json, ChatOptions, LlmProvider, Message};
use crate::models::{ChatMessage, ClassificationSource, Intent, IntentResult, TokenCounts};
use crate::services::cache::{cache_key, Cache};

const SYSTEM_PROMPT: &str = r#"You are an intent classification specialist for a scheduling bot.

Classify the user's intent into ONE of these categories:

- SCHEDULING: wants to book, asks about availability, or accepts a suggested time.
- RESCHEDULE: wants to change the date or time of an existing booking.
- CANCELLATION: wants to cancel a booking or give up on the service.
- INFO: asks for information (price, address, how it works) or general questions.
- HUMAN_HANDOFF: asks to talk to an attendant, a real person, or is very frustrated.

Return ONLY JSON:
{"intent": "SCHEDULING" | "RESCHEDULE" | "CANCELLATION" | "INFO" | "HUMAN_HANDOFF", "reason": "short explanation (max 100 chars)"}"#;

/// Pattern tier in priority order.
const RULES: &[(Intent, &str, &[&str])] = &[
    (
        Intent::HumanHandoff,
        "pattern: handoff",
        &[
            r"\b(falar|conversar)\s+com\s+(alguém|atendente|humano|pessoa)\b",
            r"\b(preciso de ajuda|não estou entendendo)\b",
            r"\b(falar|ligar)\s+na\s+clínica\b",
            r"\b(talk|speak)\s+(to|with)\s+(a\s+)?(human|person|someone|attendant|agent)\b",
            r"\b(real person|human agent)\b",
        ],
    ),
    (
        Intent::Cancellation,
        "pattern: cancellation",
        &[
            r"\b(cancelar|desmarcar|anular)\b",
            r"\b(não vou|não quero)\s+(mais|ir|comparecer)\b",
            r"\b(desisto|esquece)\b",
            r"\b(cancel|call off)\b",
        ],
    ),
    (
        Intent::Reschedule,
        "pattern: reschedule",
        &[
            r"\b(trocar|mudar|alterar|remarcar|reagendar)\b",
            r"\b(não posso|imprevisto|surgiu um problema)\b.*\b(ir|comparecer)\b",
            r"\b(outra data|outro dia|outro horário)\b",
            r"\b(adiar|postergar)\b",
            r"\b(reschedule|postpone|move my appointment|another day|another time)\b",
        ],
    ),
    (
        Intent::Scheduling,
        "pattern: scheduling",
        &[
            r"\b(marcar|agendar|reservar)\b",
            r"\b(tem|têm)\s+(horário|vaga|disponibilidade)\b",
            r"\b(quero|gostaria de)\s+(ir|passar|fazer)\b",
            r"\b(pode ser|topo|fechado|combinado)\b",
            r"\b(segunda|terça|quarta|quinta|sexta|sábado|domingo|amanhã|hoje)\b",
            r"\b\d{1,2}(h|:\d{2})",
            r"\b(book|schedule|appointment|availability|available)\b",
            r"\b(tomorrow|today|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        ],
    ),
    (
        Intent::Info,
        "pattern: info",
        &[
            r"\b(quanto|qual|valor|preço|custo)\b",
            r"\b(onde|endereço|local|fica)\b",
            r"\b(como funciona|quais os procedimentos)\b",
            r"\b(aceita|convênio|plano)\b",
            r"\b(how much|price|cost|where|address|insurance)\b",
        ],
    ),
];

#[derive(Deserialize)]
struct ModelIntent {
    intent: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct IntentClassifier {
    rules: Vec<Rule<Intent>>,
    cache: Arc<dyn Cache<IntentResult>>,
    ttl: Duration,
    model: String,
}

impl IntentClassifier {
    pub fn new(
        cache: Arc<dyn Cache<IntentResult>>,
        ttl: Duration,
        model: String,
    ) -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|(label, _, patterns)| Rule::compile(*label, patterns))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            cache,
            ttl,
            model,
        })
    }

    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn pattern_match(&self, message: &str) -> Option<IntentResult> {
        let intent = first_match(&self.rules, message)?;
        let reason = RULES
            .iter()
            .find(|(label, _, _)| *label == intent)
            .map(|(_, reason, _)| *reason)
            .unwrap_or("pattern");
        Some(IntentResult {
            intent,
            reason: reason.to_string(),
            source: ClassificationSource::Pattern,
        })
    }

    pub async fn classify(
        &self,
        llm: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
    ) -> Classified<IntentResult> {
        let key = cache_key("intent", message, history);
        if let Some(mut cached) = self.cache.get(&key) {
            tracing::debug!("intent cache hit");
            cached.source = ClassificationSource::Cache;
            return Classified::ok(cached);
        }

        if let Some(result) = self.pattern_match(message) {
            self.cache.set(key, result.clone(), self.ttl);
            return Classified::ok(result);
        }

        match self.call_model(llm, message, history).await {
            Ok((result, usage)) => {
                self.cache.set(key, result.clone(), self.ttl);
                Classified {
                    result,
                    warning: None,
                    usage,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed, using fallback");
                Classified {
                    result: IntentResult::fallback(),
                    warning: Some(format!("intent classification failed: {e}")),
                    usage: TokenCounts::default(),
                }
            }
        }
    }

    async fn call_model(
        &self,
        llm: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
    ) -> anyhow::Result<(IntentResult, TokenCounts)> {
        let prompt = format!(
            "Classify the customer's intent.\nHISTORY:\n{}\nMESSAGE: \"{message}\"\nReturn JSON.",
            format_history(history)
        );
        let messages = [Message {
            role: "user".to_string(),
            content: prompt,
        }];

        let completion = llm
            .chat(SYSTEM_PROMPT, &messages, &ChatOptions::tool(&self.model))
            .await
            .context("intent model call failed")?;

        let value = extract_json(&completion.content)
            .ok_or_else(|| anyhow::anyhow!("intent model returned no JSON object"))?;
        let parsed: ModelIntent = serde_json::from_value(value).context("malformed intent JSON")?;
        let intent = Intent::parse(&parsed.intent)
            .ok_or_else(|| anyhow::anyhow!("unknown intent label: {}", parsed.intent))?;

        let result = IntentResult {
            intent,
            reason: parsed.reason.unwrap_or_default(),
            source: ClassificationSource::Model,
        };
        let usage = TokenCounts::default().add(completion.prompt_tokens, completion.completion_tokens);
        Ok((result, usage))
    }
}
