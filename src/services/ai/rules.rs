use regex::Regex;

use crate::models::{ChatMessage, TokenCounts};

/// One label and the patterns that select it. Rule lists are evaluated in
/// order and the first hit wins.
pub struct Rule<T> {
    pub label: T,
    patterns: Vec<Regex>,
}

impl<T: Copy> Rule<T> {
    pub fn compile(label: T, patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { label, patterns })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }
}

pub fn first_match<T: Copy>(rules: &[Rule<T>], message: &str) -> Option<T> {
    let lowered = message.to_lowercase();
    rules.iter().find(|r| r.matches(&lowered)).map(|r| r.label)
}

/// Output of one classifier run: the result, plus any recovered error and the
/// tokens a model call spent.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified<T> {
    pub result: T,
    pub warning: Option<String>,
    pub usage: TokenCounts,
}

impl<T> Classified<T> {
    pub fn ok(result: T) -> Self {
        Self {
            result,
            warning: None,
            usage: TokenCounts::default(),
        }
    }
}

/// Last four turns rendered for the classifier prompt.
pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "(no previous messages)".to_string();
    }
    let start = history.len().saturating_sub(4);
    history[start..]
        .iter()
        .map(|m| {
            let who = if m.role == "user" { "Customer" } else { "Agent" };
            format!("{who}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_respects_order() {
        let rules = vec![
            Rule::compile("first", &[r"\bcancel\b"]).unwrap(),
            Rule::compile("second", &[r"\bbook\b", r"\bcancel\b"]).unwrap(),
        ];
        assert_eq!(first_match(&rules, "Please CANCEL and book"), Some("first"));
        assert_eq!(first_match(&rules, "book me"), Some("second"));
        assert_eq!(first_match(&rules, "hello"), None);
    }

    #[test]
    fn test_format_history_keeps_last_four() {
        let history: Vec<ChatMessage> = (0..6)
            .map(|i| ChatMessage {
                role: if i % 2 == 0 { "user" } else { "assistant" }.to_string(),
                content: format!("m{i}"),
            })
            .collect();
        let text = format_history(&history);
        assert!(!text.contains("m1"));
        assert!(text.starts_with("Customer: m2"));
        assert!(text.ends_with("Agent: m5"));
        assert_eq!(format_history(&[]), "(no previous messages)");
    }
}
