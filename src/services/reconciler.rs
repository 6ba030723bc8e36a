//! Post-generation check of the model's proposed directive against the
//! turn's agenda. Nothing leaves this module as an appointment unless the
//! slot exists; every failure degrades to `Directive::Normal`.

use crate::models::agenda::parse_slot_time;
use crate::models::{
    Agenda, Appointment, CrmStatus, Directive, FilteredAgenda, ProfileUpdate, RawAppointment,
    RawDirective,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("missing appointment fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("professional {0} not in agenda")]
    UnknownProfessional(String),
    #[error("service {0} not in agenda")]
    UnknownService(String),
    #[error("professional {professional_id} does not offer service {service_id}")]
    NotOffered {
        professional_id: String,
        service_id: String,
    },
    #[error("slot {date} {time} not available")]
    SlotUnavailable { date: String, time: String },
    #[error("malformed {kind} payload: {message}")]
    MalformedPayload { kind: &'static str, message: String },
    #[error("unknown directive type: {0}")]
    UnknownType(String),
}

/// Checks run in order; the first failure wins.
pub fn validate_appointment(agenda: &Agenda, raw: &RawAppointment) -> Result<Appointment, Rejection> {
    let field = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let professional_id = field(&raw.professional_id);
    let service_id = field(&raw.service_id);
    let date = field(&raw.date);
    let time = field(&raw.time);

    let mut missing = Vec::new();
    if professional_id.is_none() {
        missing.push("professional_id");
    }
    if service_id.is_none() {
        missing.push("service_id");
    }
    if date.is_none() {
        missing.push("date");
    }
    if time.is_none() {
        missing.push("time");
    }
    let (Some(professional_id), Some(service_id), Some(date), Some(time)) =
        (professional_id, service_id, date, time)
    else {
        return Err(Rejection::MissingFields(missing));
    };

    let professional = agenda
        .professionals
        .get(&professional_id)
        .ok_or_else(|| Rejection::UnknownProfessional(professional_id.clone()))?;
    let service = agenda
        .services
        .get(&service_id)
        .ok_or_else(|| Rejection::UnknownService(service_id.clone()))?;
    if !agenda.offers(&professional_id, &service_id) {
        return Err(Rejection::NotOffered {
            professional_id,
            service_id,
        });
    }
    if !agenda.has_slot(&professional_id, &service_id, &date, &time) {
        return Err(Rejection::SlotUnavailable { date, time });
    }

    let time = parse_slot_time(&time)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or(time);

    Ok(Appointment {
        professional_name: professional.name.clone(),
        service_name: service.name.clone(),
        professional_id,
        service_id,
        date,
        time,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub directive: Directive,
    /// Why a proposed directive was dropped or repaired.
    pub notes: Vec<String>,
    pub repaired: bool,
}

/// Directive type as the reconciler compares it; blank means normal.
fn normalized_kind(raw: &RawDirective) -> String {
    match raw.kind().to_ascii_lowercase() {
        kind if kind.is_empty() => "normal".to_string(),
        kind => kind,
    }
}

fn parse_proposed(raw: &RawDirective, agenda: &Agenda) -> Result<Directive, Rejection> {
    match normalized_kind(raw).as_str() {
        "normal" => Ok(Directive::Normal),
        "update_user" => {
            let payload = raw.update_payload().ok_or_else(|| Rejection::MalformedPayload {
                kind: "update_user",
                message: "payload missing".to_string(),
            })?;
            let update: ProfileUpdate =
                serde_json::from_value(payload.clone()).map_err(|e| Rejection::MalformedPayload {
                    kind: "update_user",
                    message: e.to_string(),
                })?;
            Ok(Directive::UpdateProfile {
                payload_update: update,
            })
        }
        "appointment_confirmation" => {
            let payload = raw.appointment_payload().ok_or(Rejection::MissingFields(vec![
                "professional_id",
                "service_id",
                "date",
                "time",
            ]))?;
            let appointment: RawAppointment =
                serde_json::from_value(payload.clone()).map_err(|e| Rejection::MalformedPayload {
                    kind: "appointment_confirmation",
                    message: e.to_string(),
                })?;
            let appointment = validate_appointment(agenda, &appointment)?;
            Ok(Directive::AppointmentConfirmation {
                payload_appointment: appointment,
            })
        }
        other => Err(Rejection::UnknownType(other.to_string())),
    }
}

/// One reconstruction from the first offered slot. Called at most once.
fn reconstruct(agenda: &Agenda, filtered: Option<&FilteredAgenda>) -> Result<Appointment, String> {
    let filtered = filtered.ok_or("no filtered agenda for this turn")?;
    let (option, slot) = filtered
        .first_slot()
        .ok_or("filtered agenda has no options")?;
    let raw = RawAppointment {
        professional_id: Some(option.professional_id.clone()),
        service_id: filtered.service_id.clone(),
        date: Some(option.date.clone()),
        time: Some(slot.to_string()),
    };
    validate_appointment(agenda, &raw).map_err(|e| e.to_string())
}

pub fn reconcile(
    raw: &RawDirective,
    status: CrmStatus,
    agenda: &Agenda,
    filtered: Option<&FilteredAgenda>,
) -> Reconciled {
    let mut notes = Vec::new();

    let directive = match parse_proposed(raw, agenda) {
        Ok(directive) => directive,
        Err(reason) => {
            tracing::warn!(
                stage = "reconcile",
                directive_type = raw.kind(),
                reason = %reason,
                "directive rejected, reverting to normal"
            );
            notes.push(format!("directive rejected: {reason}"));
            Directive::Normal
        }
    };

    // Narrow contradiction: the model says booked but proposed no booking.
    let contradiction = status == CrmStatus::Scheduled && normalized_kind(raw) == "normal";
    if contradiction {
        match reconstruct(agenda, filtered) {
            Ok(appointment) => {
                tracing::info!(
                    stage = "reconcile",
                    professional_id = %appointment.professional_id,
                    date = %appointment.date,
                    time = %appointment.time,
                    "reconstructed appointment from first offered slot"
                );
                notes.push("appointment reconstructed from first offered slot".to_string());
                return Reconciled {
                    directive: Directive::AppointmentConfirmation {
                        payload_appointment: appointment,
                    },
                    notes,
                    repaired: true,
                };
            }
            Err(reason) => {
                tracing::warn!(
                    stage = "reconcile",
                    reason = %reason,
                    "status says scheduled but no appointment could be reconstructed"
                );
                notes.push(format!("reconstruction failed: {reason}"));
            }
        }
    }

    Reconciled {
        directive,
        notes,
        repaired: false,
    }
}
