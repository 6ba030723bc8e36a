use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persona parameters supplied by the backend for each company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    #[serde(default = "default_niche", alias = "nicho_mercado")]
    pub niche: String,
    #[serde(default = "default_bot_name", alias = "nome_bot")]
    pub bot_name: String,
    #[serde(default = "default_tone", alias = "tom_voz")]
    pub tone: String,
    #[serde(default = "default_language", alias = "idioma")]
    pub language: String,
    #[serde(default = "default_emoji_usage", alias = "uso_emojis")]
    pub emoji_usage: String,
    #[serde(default = "default_response_length", alias = "extensao_respostas")]
    pub response_length: String,
    #[serde(default, alias = "vocabularios_especificos")]
    pub vocabulary: BTreeMap<String, String>,
    #[serde(default, alias = "enfase_confidencialidade")]
    pub confidentiality_emphasis: bool,
    #[serde(default, alias = "permitir_girias")]
    pub allow_slang: bool,
    #[serde(default)]
    pub custom_instructions: String,
}

fn default_niche() -> String {
    "General Services".to_string()
}

fn default_bot_name() -> String {
    "Assistant".to_string()
}

fn default_tone() -> String {
    "professional".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_emoji_usage() -> String {
    "moderate".to_string()
}

fn default_response_length() -> String {
    "concise".to_string()
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            niche: default_niche(),
            bot_name: default_bot_name(),
            tone: default_tone(),
            language: default_language(),
            emoji_usage: default_emoji_usage(),
            response_length: default_response_length(),
            vocabulary: BTreeMap::new(),
            confidentiality_emphasis: false,
            allow_slang: false,
            custom_instructions: String::new(),
        }
    }
}

impl CompanyConfig {
    pub fn to_prompt(&self) -> String {
        let mut lines = vec![
            format!("Your name is {}.", self.bot_name),
            format!("You are a scheduling assistant for a {} business.", self.niche),
            format!("Always reply in the customer's language (default: {}).", self.language),
        ];

        match self.tone.to_lowercase().as_str() {
            "friendly" | "amigável" => lines.push(
                "Use a warm, friendly tone. Be personable and approachable.".to_string(),
            ),
            "formal" => lines.push("Use a formal, courteous tone.".to_string()),
            // professional needs no extra instruction
            _ => {}
        }

        match self.emoji_usage.to_lowercase().as_str() {
            "none" | "nenhum" => lines.push("Do not use emojis.".to_string()),
            "intense" | "intenso" => {
                lines.push("Use emojis freely to keep the conversation lively.".to_string())
            }
            _ => lines.push("Use at most one emoji per message.".to_string()),
        }

        if self.response_length.to_lowercase().starts_with("detail") {
            lines.push("Detailed answers are welcome when the customer asks questions.".to_string());
        } else {
            lines.push("Keep replies short: two or three sentences.".to_string());
        }

        if !self.allow_slang {
            lines.push("Avoid slang.".to_string());
        }

        if self.confidentiality_emphasis {
            lines.push(
                "Remind the customer that their information is confidential when asking for personal data."
                    .to_string(),
            );
        }

        if !self.vocabulary.is_empty() {
            let terms: Vec<String> = self
                .vocabulary
                .iter()
                .map(|(from, to)| format!("say \"{to}\" instead of \"{from}\""))
                .collect();
            lines.push(format!("Vocabulary: {}.", terms.join("; ")));
        }

        if !self.custom_instructions.is_empty() {
            lines.push(self.custom_instructions.clone());
        }

        format!("Personality and behavior:\n{}", lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt() {
        let prompt = CompanyConfig::default().to_prompt();
        assert!(prompt.contains("Your name is Assistant."));
        assert!(prompt.contains("two or three sentences"));
        assert!(prompt.contains("at most one emoji"));
        assert!(!prompt.contains("Vocabulary"));
    }

    #[test]
    fn test_portuguese_keys() {
        let json = r#"{
            "nicho_mercado": "Clínica de Estética",
            "nome_bot": "Sofia",
            "tom_voz": "amigável",
            "uso_emojis": "nenhum",
            "vocabularios_especificos": {"cliente": "paciente"},
            "enfase_confidencialidade": true
        }"#;
        let config: CompanyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bot_name, "Sofia");
        assert_eq!(config.language, "pt-BR");

        let prompt = config.to_prompt();
        assert!(prompt.contains("Clínica de Estética"));
        assert!(prompt.contains("warm, friendly tone"));
        assert!(prompt.contains("Do not use emojis."));
        assert!(prompt.contains("say \"paciente\" instead of \"cliente\""));
        assert!(prompt.contains("confidential"));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let config: CompanyConfig = serde_json::from_str(r#"{"estilo_despedida":"Cordial"}"#).unwrap();
        assert_eq!(config.tone, "professional");
    }

    #[test]
    fn test_custom_instructions_appended() {
        let config = CompanyConfig {
            custom_instructions: "Always mention free parking".to_string(),
            ..CompanyConfig::default()
        };
        assert!(config.to_prompt().ends_with("Always mention free parking"));
    }
}
