use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use super::rules::{first_match, format_history, Classified, Rule};
use super::{extract_json, ChatOptions, LlmProvider, Message};
use crate::models::{ChatMessage, ClassificationSource, Sentiment, SentimentResult, TokenCounts};
use crate::services::cache::{cache_key, Cache};

const SYSTEM_PROMPT: &str = r#"You are a sentiment analysis specialist for an appointment-booking assistant.

Classify the customer's sentiment into ONE category:
- positive: satisfied, cooperative, excited
- neutral: neutral, just informative
- negative: dissatisfied but controlled
- angry: irritated, aggressive
- anxious: worried, urgent
- confused: lost, does not understand
- sad: going through an emotional difficulty

Return ONLY JSON:
{"sentiment": "<category>", "score": <0-100 intensity>, "confidence": "low" | "medium" | "high"}

Use the recent history to judge how the customer's mood is evolving."#;

/// Pattern tier: label, score and confidence for each rule, in priority order.
const RULES: &[(Sentiment, u8, &str, &[&str])] = &[
    (
        Sentiment::Angry,
        85,
        "high",
        &[
            r"\b(absurdo|ridículo|inadmissível|vergonha|palhaçada)\b",
            r"\b(não aguento|estou farto|chega|basta)\b",
            r"\b(ridiculous|unacceptable|outrageous|fed up)\b",
            r"!{2,}",
        ],
    ),
    (
        Sentiment::Positive,
        80,
        "high",
        &[
            r"\b(obrigad[oa]|agradeço|perfeito|ótimo|excelente|maravilhoso)\b",
            r"\b(pode marcar|confirmo|fechado|topo|combinado)\b",
            r"\b(thanks|thank you|perfect|great|excellent|wonderful)\b",
        ],
    ),
    (
        Sentiment::Anxious,
        75,
        "medium",
        &[
            r"\b(urgente|rápido|agora|hoje mesmo|preciso)\b",
            r"\b(não posso esperar|é para já)\b",
            r"\b(urgent|asap|right now|can't wait)\b",
        ],
    ),
    (
        Sentiment::Confused,
        70,
        "medium",
        &[
            r"\b(não entend[io]|como assim|o que é)\b",
            r"\b(explica|dúvida|confus[oa])\b",
            r"\b(don't understand|what do you mean|confused)\b",
            r"\?{2,}",
        ],
    ),
    (
        Sentiment::Sad,
        70,
        "medium",
        &[
            r"\b(difícil|complicad[oa]|não consigo)\b",
            r"\b(problema|situação difícil)\b",
            r"\b(hard time|difficult|struggling)\b",
        ],
    ),
];

#[derive(Deserialize)]
struct ModelSentiment {
    sentiment: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    confidence: Option<String>,
}

fn normalize_confidence(raw: Option<&str>) -> String {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("high" | "alta") => "high",
        Some("medium" | "média" | "media") => "medium",
        _ => "low",
    }
    .to_string()
}

pub struct SentimentClassifier {
    rules: Vec<Rule<Sentiment>>,
    scores: Vec<(Sentiment, u8, &'static str)>,
    cache: Arc<dyn Cache<SentimentResult>>,
    ttl: Duration,
    model: String,
}

impl SentimentClassifier {
    pub fn new(
        cache: Arc<dyn Cache<SentimentResult>>,
        ttl: Duration,
        model: String,
    ) -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|(label, _, _, patterns)| Rule::compile(*label, patterns))
            .collect::<Result<Vec<_>, _>>()?;
        let scores = RULES
            .iter()
            .map(|(label, score, confidence, _)| (*label, *score, *confidence))
            .collect();
        Ok(Self {
            rules,
            scores,
            cache,
            ttl,
            model,
        })
    }

    /// Drops expired cache entries; returns how many went.
    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn pattern_match(&self, message: &str) -> Option<SentimentResult> {
        let label = first_match(&self.rules, message)?;
        let (_, score, confidence) = self.scores.iter().find(|(l, _, _)| *l == label)?;
        Some(SentimentResult {
            sentiment: label,
            score: *score,
            confidence: confidence.to_string(),
            source: ClassificationSource::Pattern,
        })
    }

    /// Cache, then patterns, then the model. Never fails: errors degrade to a
    /// neutral result carried with a warning.
    pub async fn classify(
        &self,
        llm: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
    ) -> Classified<SentimentResult> {
        let key = cache_key("sentiment", message, history);
        if let Some(mut cached) = self.cache.get(&key) {
            tracing::debug!("sentiment cache hit");
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
                tracing::warn!(error = %e, "sentiment classification failed, using fallback");
                Classified {
                    result: SentimentResult::fallback(),
                    warning: Some(format!("sentiment classification failed: {e}")),
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
    ) -> anyhow::Result<(SentimentResult, TokenCounts)> {
        let prompt = format!(
            "Analyse the sentiment of this customer message.\n\nRECENT HISTORY:\n{}\n\nCURRENT MESSAGE:\n\"{message}\"\n\nReturn ONLY the JSON result.",
            format_history(history)
        );
        let messages = [Message {
            role: "user".to_string(),
            content: prompt,
        }];

        let completion = llm
            .chat(SYSTEM_PROMPT, &messages, &ChatOptions::tool(&self.model))
            .await
            .context("sentiment model call failed")?;

        let value = extract_json(&completion.content)
            .ok_or_else(|| anyhow::anyhow!("sentiment model returned no JSON object"))?;
        let parsed: ModelSentiment =
            serde_json::from_value(value).context("malformed sentiment JSON")?;
        let sentiment = Sentiment::parse(&parsed.sentiment)
            .ok_or_else(|| anyhow::anyhow!("unknown sentiment label: {}", parsed.sentiment))?;

        let result = SentimentResult {
            sentiment,
            score: parsed.score.unwrap_or(50.0).clamp(0.0, 100.0) as u8,
            confidence: normalize_confidence(parsed.confidence.as_deref()),
            source: ClassificationSource::Model,
        };
        let usage = TokenCounts::default().add(completion.prompt_tokens, completion.completion_tokens);
        Ok((result, usage))
    }
}
