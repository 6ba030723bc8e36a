use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Angry,
    Anxious,
    Confused,
    Sad,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Angry => "ANGRY",
            Sentiment::Anxious => "ANXIOUS",
            Sentiment::Confused => "CONFUSED",
            Sentiment::Sad => "SAD",
        }
    }

    /// Accepts the labels a model tends to emit, in English or Portuguese.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "positivo" => Some(Sentiment::Positive),
            "neutral" | "neutro" => Some(Sentiment::Neutral),
            "negative" | "negativo" => Some(Sentiment::Negative),
            "angry" | "anger" | "raiva" => Some(Sentiment::Angry),
            "anxious" | "ansioso" => Some(Sentiment::Anxious),
            "confused" | "confuso" => Some(Sentiment::Confused),
            "sad" | "triste" => Some(Sentiment::Sad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Scheduling,
    Reschedule,
    Cancellation,
    Info,
    HumanHandoff,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Scheduling => "SCHEDULING",
            Intent::Reschedule => "RESCHEDULE",
            Intent::Cancellation => "CANCELLATION",
            Intent::Info => "INFO",
            Intent::HumanHandoff => "HUMAN_HANDOFF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SCHEDULING" => Some(Intent::Scheduling),
            "RESCHEDULE" => Some(Intent::Reschedule),
            "CANCELLATION" => Some(Intent::Cancellation),
            "INFO" => Some(Intent::Info),
            "HUMAN_HANDOFF" => Some(Intent::HumanHandoff),
            _ => None,
        }
    }

    /// Intents that ask the availability matcher for concrete slots.
    pub fn is_scheduling_family(&self) -> bool {
        matches!(self, Intent::Scheduling | Intent::Reschedule)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Pattern,
    Model,
    Cache,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    pub score: u8,
    pub confidence: String,
    pub source: ClassificationSource,
}

impl SentimentResult {
    pub fn fallback() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            score: 50,
            confidence: "low".to_string(),
            source: ClassificationSource::Fallback,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent: Intent,
    pub reason: String,
    pub source: ClassificationSource,
}

impl IntentResult {
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Info,
            reason: "classification failed, defaulted to INFO".to_string(),
            source: ClassificationSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_parse_portuguese() {
        assert_eq!(Sentiment::parse("raiva"), Some(Sentiment::Angry));
        assert_eq!(Sentiment::parse(" Positivo "), Some(Sentiment::Positive));
        assert_eq!(Sentiment::parse("envergonhado"), None);
    }

    #[test]
    fn test_intent_scheduling_family() {
        assert!(Intent::Scheduling.is_scheduling_family());
        assert!(Intent::Reschedule.is_scheduling_family());
        assert!(!Intent::Cancellation.is_scheduling_family());
        assert_eq!(Intent::parse("human_handoff"), Some(Intent::HumanHandoff));
    }

    #[test]
    fn test_serialized_labels() {
        assert_eq!(serde_json::to_string(&Intent::HumanHandoff).unwrap(), "\"HUMAN_HANDOFF\"");
        assert_eq!(serde_json::to_string(&Sentiment::Neutral).unwrap(), "\"NEUTRAL\"");
    }
}
