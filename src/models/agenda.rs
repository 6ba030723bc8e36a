use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// professional id → service id → ISO date → slot times.
pub type AvailabilityMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfessionalInfo {
    pub name: String,
    #[serde(default, alias = "serviceIds", alias = "service_ids")]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(alias = "durationMinutes", alias = "duration_minutes")]
    pub duration: u32,
    pub price: f64,
}

/// Per-turn schedule snapshot. Never mutated once a turn starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Agenda {
    #[serde(default)]
    pub professionals: BTreeMap<String, ProfessionalInfo>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceInfo>,
    #[serde(default)]
    pub availability: AvailabilityMap,
}

impl Agenda {
    pub fn is_empty(&self) -> bool {
        self.professionals.is_empty() && self.services.is_empty()
    }

    pub fn offers(&self, professional_id: &str, service_id: &str) -> bool {
        self.professionals
            .get(professional_id)
            .map(|p| p.services.iter().any(|s| s == service_id))
            .unwrap_or(false)
    }

    pub fn slots_for(
        &self,
        professional_id: &str,
        service_id: &str,
    ) -> Option<&BTreeMap<String, Vec<String>>> {
        self.availability.get(professional_id)?.get(service_id)
    }

    /// Slot membership treats the listed times as a set and compares parsed
    /// times, so "9:00" and "09:00" are the same slot.
    pub fn has_slot(&self, professional_id: &str, service_id: &str, date: &str, time: &str) -> bool {
        let Some(wanted) = parse_slot_time(time) else {
            return false;
        };
        self.slots_for(professional_id, service_id)
            .and_then(|dates| dates.get(date))
            .map(|times| times.iter().filter_map(|t| parse_slot_time(t)).any(|t| t == wanted))
            .unwrap_or(false)
    }

    /// Ids referenced by `availability` that are missing from the top-level maps.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (prof_id, by_service) in &self.availability {
            if !self.professionals.contains_key(prof_id) {
                problems.push(format!("unknown professional {prof_id} in availability"));
            }
            for service_id in by_service.keys() {
                if !self.services.contains_key(service_id) {
                    problems.push(format!(
                        "unknown service {service_id} in availability of {prof_id}"
                    ));
                }
            }
        }
        problems
    }

    /// Compact text rendering used as prompt context when no filtered view exists.
    pub fn to_prompt_text(&self) -> String {
        if self.professionals.is_empty() {
            return "NO SLOTS AVAILABLE AT THE MOMENT.".to_string();
        }

        let mut text = String::new();
        for (prof_id, prof) in &self.professionals {
            text.push_str(&format!("\nProfessional: {} (ID: {prof_id})\n", prof.name));

            let services: Vec<String> = prof
                .services
                .iter()
                .filter_map(|id| self.services.get(id).map(|s| (id, s)))
                .map(|(id, s)| format!("{} (ID: {id}, {}min, {:.2})", s.name, s.duration, s.price))
                .collect();
            text.push_str(&format!("  Services: {}\n", services.join(", ")));

            match self.availability.get(prof_id) {
                Some(by_service) if !by_service.is_empty() => {
                    for (service_id, dates) in by_service {
                        for (date, times) in dates {
                            if times.is_empty() {
                                text.push_str(&format!("  {service_id} {date}: (full)\n"));
                            } else {
                                text.push_str(&format!(
                                    "  {service_id} {date}: {}\n",
                                    times.join(", ")
                                ));
                            }
                        }
                    }
                }
                _ => text.push_str("  - No free slots.\n"),
            }
        }
        text
    }
}

pub fn parse_slot_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgendaOption {
    pub professional: String,
    pub professional_id: String,
    pub date: String,
    pub slots: Vec<String>,
}

/// Bounded read-only view of the agenda for one service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilteredAgenda {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<u32>,
    pub options: Vec<AgendaOption>,
}

impl FilteredAgenda {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn first_slot(&self) -> Option<(&AgendaOption, &str)> {
        let option = self.options.first()?;
        let slot = option.slots.first()?;
        Some((option, slot.as_str()))
    }

    pub fn to_prompt_text(&self) -> String {
        let Some(service_name) = &self.service_name else {
            return "No matching service found in the schedule.".to_string();
        };
        if self.options.is_empty() {
            return format!("{service_name}: no upcoming slots available.");
        }

        let mut lines = vec![format!(
            "Service: {service_name} (ID: {}) | {}min | {:.2}",
            self.service_id.as_deref().unwrap_or("?"),
            self.duration.unwrap_or_default(),
            self.price.unwrap_or_default(),
        )];
        for option in &self.options {
            lines.push(format!(
                "- {} (ID: {}) on {}: {}",
                option.professional,
                option.professional_id,
                option.date,
                option.slots.join(", ")
            ));
        }
        lines.join("\n")
    }
}
