use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialised with the backend's Portuguese keys; English names are
/// accepted on input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileUpdate {
    #[serde(default, rename = "nome", alias = "name")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "telefone", alias = "phone")]
    pub phone: Option<String>,
}

/// A booking that has been checked against the agenda.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    #[serde(rename = "profissional_id", alias = "professional_id")]
    pub professional_id: String,
    #[serde(rename = "servico_id", alias = "service_id")]
    pub service_id: String,
    #[serde(rename = "data", alias = "date")]
    pub date: String,
    #[serde(rename = "hora", alias = "time")]
    pub time: String,
    #[serde(rename = "profissional_name", alias = "professional_name")]
    pub professional_name: String,
    #[serde(rename = "servico_name", alias = "service_name")]
    pub service_name: String,
}

/// Machine-actionable instruction for the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    #[default]
    Normal,
    #[serde(rename = "update_user")]
    UpdateProfile { payload_update: ProfileUpdate },
    AppointmentConfirmation { payload_appointment: Appointment },
}

impl Directive {
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::Normal => "normal",
            Directive::UpdateProfile { .. } => "update_user",
            Directive::AppointmentConfirmation { .. } => "appointment_confirmation",
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Directive::Normal)
    }
}

/// The generator's untyped guess at a directive, as it came off the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawDirective {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub payload_update: Option<Value>,
    #[serde(default)]
    pub payload_appointment: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl RawDirective {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().map(str::trim).unwrap_or("normal")
    }

    pub fn update_payload(&self) -> Option<&Value> {
        self.payload_update.as_ref().or(self.payload.as_ref())
    }

    pub fn appointment_payload(&self) -> Option<&Value> {
        self.payload_appointment.as_ref().or(self.payload.as_ref())
    }
}

/// Appointment fields before validation; the generator may use the
/// backend's Portuguese field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawAppointment {
    #[serde(default, alias = "profissional_id")]
    pub professional_id: Option<String>,
    #[serde(default, alias = "servico_id")]
    pub service_id: Option<String>,
    #[serde(default, alias = "data")]
    pub date: Option<String>,
    #[serde(default, alias = "hora")]
    pub time: Option<String>,
}
