use chrono::{NaiveDate, NaiveDateTime};

use crate::models::agenda::parse_slot_time;
use crate::models::{Agenda, AgendaOption, FilteredAgenda, Intent};
use crate::services::entities::{ExtractedEntities, TimeBucket};

/// Dates inspected per professional.
const DATES_PER_PROFESSIONAL: usize = 3;
/// Slots shown per option.
const SLOTS_PER_OPTION: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub professional_id: Option<String>,
    pub professional_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub time_preference: Option<TimeBucket>,
}

impl SearchParams {
    pub fn from_entities(entities: &ExtractedEntities, today: NaiveDate) -> Self {
        Self {
            service_id: entities.service_id.clone(),
            service_name: entities.service_name.clone(),
            professional_id: entities.professional_id.clone(),
            professional_name: entities.professional_name.clone(),
            date: entities.requested_date(today),
            time_preference: entities.time_preference,
        }
    }
}

pub struct AvailabilityMatcher {
    max_results: usize,
}

impl AvailabilityMatcher {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results: max_results.clamp(1, 10),
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// `None` when the intent does not call for concrete slots.
    pub fn filter(
        &self,
        agenda: &Agenda,
        entities: &ExtractedEntities,
        intent: Intent,
        now: NaiveDateTime,
    ) -> Option<FilteredAgenda> {
        if !intent.is_scheduling_family() {
            tracing::debug!(intent = intent.as_str(), "intent does not need agenda filtering");
            return None;
        }
        let params = SearchParams::from_entities(entities, now.date());
        Some(self.search(agenda, &params, now))
    }

    pub fn search(&self, agenda: &Agenda, params: &SearchParams, now: NaiveDateTime) -> FilteredAgenda {
        let Some(service_id) = resolve_service(agenda, params) else {
            tracing::debug!("no service resolved, returning empty agenda view");
            return FilteredAgenda::empty();
        };
        let Some(service) = agenda.services.get(&service_id) else {
            return FilteredAgenda::empty();
        };

        let today = now.date();
        let current_time = now.time();
        let mut options = Vec::new();

        'professionals: for prof_id in resolve_professionals(agenda, &service_id, params) {
            let Some(prof) = agenda.professionals.get(&prof_id) else {
                continue;
            };
            let Some(dates) = agenda.slots_for(&prof_id, &service_id) else {
                continue;
            };

            let mut candidates: Vec<NaiveDate> = dates
                .keys()
                .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .collect();
            candidates.sort();
            if let Some(requested) = params.date {
                if let Some(pos) = candidates.iter().position(|d| *d == requested) {
                    let date = candidates.remove(pos);
                    candidates.insert(0, date);
                }
            }

            for date in candidates.into_iter().take(DATES_PER_PROFESSIONAL) {
                if date < today {
                    continue;
                }
                let key = date.format("%Y-%m-%d").to_string();
                let Some(raw_times) = dates.get(&key) else {
                    continue;
                };

                let mut times: Vec<_> = raw_times.iter().filter_map(|t| parse_slot_time(t)).collect();
                times.sort();
                times.dedup();
                if date == today {
                    times.retain(|t| *t > current_time);
                }
                if let Some(bucket) = params.time_preference {
                    times.retain(|t| bucket.contains(*t));
                }
                if times.is_empty() {
                    continue;
                }

                options.push(AgendaOption {
                    professional: prof.name.clone(),
                    professional_id: prof_id.clone(),
                    date: key,
                    slots: times
                        .iter()
                        .take(SLOTS_PER_OPTION)
                        .map(|t| t.format("%H:%M").to_string())
                        .collect(),
                });

                if options.len() >= self.max_results {
                    break 'professionals;
                }
            }
        }

        tracing::info!(
            service_id = %service_id,
            options = options.len(),
            "availability filtered"
        );

        FilteredAgenda {
            service_id: Some(service_id),
            service_name: Some(service.name.clone()),
            price: Some(service.price),
            duration: Some(service.duration),
            options,
        }
    }
}

fn resolve_service(agenda: &Agenda, params: &SearchParams) -> Option<String> {
    if let Some(id) = &params.service_id {
        if agenda.services.contains_key(id) {
            return Some(id.clone());
        }
    }

    let wanted = params.service_name.as_deref()?.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    agenda
        .services
        .iter()
        .find(|(_, s)| s.name.to_lowercase() == wanted)
        .or_else(|| {
            agenda.services.iter().find(|(_, s)| {
                let name = s.name.to_lowercase();
                name.contains(&wanted) || wanted.contains(&name)
            })
        })
        .map(|(id, _)| id.clone())
}

fn resolve_professionals(agenda: &Agenda, service_id: &str, params: &SearchParams) -> Vec<String> {
    let offering: Vec<&String> = agenda
        .professionals
        .keys()
        .filter(|id| agenda.offers(id, service_id))
        .collect();

    if let Some(id) = &params.professional_id {
        if offering.contains(&id) {
            return vec![id.clone()];
        }
    }

    if let Some(name) = params.professional_name.as_deref() {
        let wanted = name.trim().to_lowercase();
        let named: Vec<String> = offering
            .iter()
            .filter(|id| {
                agenda
                    .professionals
                    .get(id.as_str())
                    .map(|p| {
                        let full = p.name.to_lowercase();
                        !wanted.is_empty() && (full.contains(&wanted) || wanted.contains(&full))
                    })
                    .unwrap_or(false)
            })
            .map(|id| (*id).clone())
            .collect();
        if !named.is_empty() {
            return named;
        }
    }

    offering.into_iter().cloned().collect()
}
