use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerProfile {
    #[serde(alias = "telefone")]
    pub phone: String,
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Recomputed by the integrity gate every turn; never read from input.
    #[serde(default, skip_deserializing)]
    pub is_data_complete: bool,
}

impl CustomerProfile {
    pub fn to_prompt_text(&self) -> String {
        format!(
            "Name: {}\nPhone: {}\nEmail: {}\nRegistration: {}",
            self.name.as_deref().unwrap_or("not provided"),
            self.phone,
            self.email.as_deref().unwrap_or("not provided"),
            if self.is_data_complete { "COMPLETE" } else { "PENDING" },
        )
    }
}
