use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Agenda;

/// Symbolic date hint, resolved against "today" by the availability matcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelativeDate {
    Today,
    Tomorrow,
    DayAfterTomorrow,
    Weekday(Weekday),
    NextWeek,
    NextMonth,
}

impl RelativeDate {
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            RelativeDate::Today => today,
            RelativeDate::Tomorrow => today + Duration::days(1),
            RelativeDate::DayAfterTomorrow => today + Duration::days(2),
            RelativeDate::Weekday(day) => {
                let ahead = (day.num_days_from_monday() + 7
                    - today.weekday().num_days_from_monday())
                    % 7;
                today + Duration::days(ahead as i64)
            }
            RelativeDate::NextWeek => {
                let ahead = 7 - today.weekday().num_days_from_monday();
                today + Duration::days(ahead as i64)
            }
            RelativeDate::NextMonth => {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
}

impl TimeBucket {
    pub fn of(time: NaiveTime) -> Self {
        match time.hour() {
            h if h < 12 => TimeBucket::Morning,
            h if h < 18 => TimeBucket::Afternoon,
            _ => TimeBucket::Evening,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        TimeBucket::of(time) == *self
    }
}

/// Search hints pulled from the message. Never authoritative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntities {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub professional_id: Option<String>,
    pub professional_name: Option<String>,
    pub date_intent: Option<RelativeDate>,
    pub specific_date: Option<NaiveDate>,
    pub time_preference: Option<TimeBucket>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Concrete date the customer asked for, if any.
    pub fn requested_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.specific_date
            .or_else(|| self.date_intent.map(|d| d.resolve(today)))
    }
}

const RELATIVE_LEXICON: &[(&str, RelativeDate)] = &[
    ("depois de amanhã", RelativeDate::DayAfterTomorrow),
    ("day after tomorrow", RelativeDate::DayAfterTomorrow),
    ("próxima semana", RelativeDate::NextWeek),
    ("semana que vem", RelativeDate::NextWeek),
    ("next week", RelativeDate::NextWeek),
    ("mês que vem", RelativeDate::NextMonth),
    ("próximo mês", RelativeDate::NextMonth),
    ("next month", RelativeDate::NextMonth),
    ("amanhã", RelativeDate::Tomorrow),
    ("amanha", RelativeDate::Tomorrow),
    ("tomorrow", RelativeDate::Tomorrow),
    ("hoje", RelativeDate::Today),
    ("today", RelativeDate::Today),
    ("segunda", RelativeDate::Weekday(Weekday::Mon)),
    ("monday", RelativeDate::Weekday(Weekday::Mon)),
    ("terça", RelativeDate::Weekday(Weekday::Tue)),
    ("tuesday", RelativeDate::Weekday(Weekday::Tue)),
    ("quarta", RelativeDate::Weekday(Weekday::Wed)),
    ("wednesday", RelativeDate::Weekday(Weekday::Wed)),
    ("quinta", RelativeDate::Weekday(Weekday::Thu)),
    ("thursday", RelativeDate::Weekday(Weekday::Thu)),
    ("sexta", RelativeDate::Weekday(Weekday::Fri)),
    ("friday", RelativeDate::Weekday(Weekday::Fri)),
    ("sábado", RelativeDate::Weekday(Weekday::Sat)),
    ("sabado", RelativeDate::Weekday(Weekday::Sat)),
    ("saturday", RelativeDate::Weekday(Weekday::Sat)),
    ("domingo", RelativeDate::Weekday(Weekday::Sun)),
    ("sunday", RelativeDate::Weekday(Weekday::Sun)),
];

/// Checked in order, before any literal hour.
const TIME_WORDS: &[(&str, TimeBucket)] = &[
    ("manhã", TimeBucket::Morning),
    ("cedo", TimeBucket::Morning),
    ("matinal", TimeBucket::Morning),
    ("morning", TimeBucket::Morning),
    ("early", TimeBucket::Morning),
    ("tarde", TimeBucket::Afternoon),
    ("depois do almoço", TimeBucket::Afternoon),
    ("afternoon", TimeBucket::Afternoon),
    ("noite", TimeBucket::Evening),
    ("fim do dia", TimeBucket::Evening),
    ("evening", TimeBucket::Evening),
    ("night", TimeBucket::Evening),
];

pub struct EntityExtractor {
    relative: Vec<(Regex, RelativeDate)>,
    time_words: Vec<(Regex, TimeBucket)>,
    iso_date: Regex,
    full_date: Regex,
    day_month: Regex,
    day_only: Regex,
    hour: Regex,
}

impl EntityExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let mut lexicon: Vec<&(&str, RelativeDate)> = RELATIVE_LEXICON.iter().collect();
        lexicon.sort_by_key(|(phrase, _)| std::cmp::Reverse(phrase.chars().count()));
        let relative = lexicon
            .into_iter()
            .map(|(phrase, date)| word_regex(phrase).map(|re| (re, *date)))
            .collect::<Result<Vec<_>, _>>()?;
        let time_words = TIME_WORDS
            .iter()
            .map(|(word, bucket)| word_regex(word).map(|re| (re, *bucket)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            relative,
            time_words,
            iso_date: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b")?,
            full_date: Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b")?,
            day_month: Regex::new(r"\b(\d{1,2})/(\d{1,2})\b")?,
            day_only: Regex::new(r"\b(?:dia|day)\s+(\d{1,2})\b")?,
            hour: Regex::new(r"\b(\d{1,2})(?::\d{2}|h|\s?(am|pm)\b)")?,
        })
    }

    /// Pure over `(message, agenda, today)`. Errors only when a name from the
    /// agenda cannot be turned into a pattern.
    pub fn extract(
        &self,
        message: &str,
        agenda: &Agenda,
        today: NaiveDate,
    ) -> Result<ExtractedEntities, regex::Error> {
        let lowered = message.to_lowercase();
        let (service_id, service_name) = match self.match_service(&lowered, agenda)? {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };
        let (professional_id, professional_name) = match self.match_professional(&lowered, agenda)? {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };

        Ok(ExtractedEntities {
            service_id,
            service_name,
            professional_id,
            professional_name,
            date_intent: self.match_relative(&lowered),
            specific_date: self.match_specific_date(&lowered, today),
            time_preference: self.match_time_preference(&lowered),
        })
    }

    /// Full service names win over single keywords; keywords must be longer
    /// than three characters.
    fn match_service(
        &self,
        message: &str,
        agenda: &Agenda,
    ) -> Result<Option<(String, String)>, regex::Error> {
        for (id, service) in &agenda.services {
            let full = service.name.trim().to_lowercase();
            if !full.is_empty() && word_regex(&full)?.is_match(message) {
                return Ok(Some((id.clone(), service.name.clone())));
            }
        }
        for (id, service) in &agenda.services {
            for word in service.name.to_lowercase().split_whitespace() {
                if word.chars().count() <= 3 {
                    continue;
                }
                if word_regex(word)?.is_match(message) {
                    return Ok(Some((id.clone(), service.name.clone())));
                }
            }
        }
        Ok(None)
    }

    fn match_professional(
        &self,
        message: &str,
        agenda: &Agenda,
    ) -> Result<Option<(String, String)>, regex::Error> {
        for (id, prof) in &agenda.professionals {
            let full = prof.name.trim().to_lowercase();
            if !full.is_empty() && word_regex(&full)?.is_match(message) {
                return Ok(Some((id.clone(), prof.name.clone())));
            }
        }
        for (id, prof) in &agenda.professionals {
            let full = prof.name.to_lowercase();
            let Some(first) = full
                .split_whitespace()
                .find(|w| !matches!(*w, "dr." | "dr" | "dra." | "dra"))
            else {
                continue;
            };
            if first.chars().count() >= 3 && word_regex(first)?.is_match(message) {
                return Ok(Some((id.clone(), prof.name.clone())));
            }
        }
        Ok(None)
    }

    fn match_relative(&self, message: &str) -> Option<RelativeDate> {
        self.relative
            .iter()
            .find(|(re, _)| re.is_match(message))
            .map(|(_, date)| *date)
    }

    fn match_specific_date(&self, message: &str, today: NaiveDate) -> Option<NaiveDate> {
        let num = |s: &str| s.parse::<u32>().ok();

        if let Some(caps) = self.iso_date.captures(message) {
            let year = caps[1].parse::<i32>().ok()?;
            return NaiveDate::from_ymd_opt(year, num(&caps[2])?, num(&caps[3])?);
        }
        if let Some(caps) = self.full_date.captures(message) {
            let year = caps[3].parse::<i32>().ok()?;
            return NaiveDate::from_ymd_opt(year, num(&caps[2])?, num(&caps[1])?);
        }
        if let Some(caps) = self.day_month.captures(message) {
            return NaiveDate::from_ymd_opt(today.year(), num(&caps[2])?, num(&caps[1])?);
        }
        if let Some(caps) = self.day_only.captures(message) {
            return NaiveDate::from_ymd_opt(today.year(), today.month(), num(&caps[1])?);
        }
        None
    }

    fn match_time_preference(&self, message: &str) -> Option<TimeBucket> {
        if let Some((_, bucket)) = self.time_words.iter().find(|(re, _)| re.is_match(message)) {
            return Some(*bucket);
        }

        let caps = self.hour.captures(message)?;
        let mut hour: u32 = caps[1].parse().ok()?;
        match caps.get(2).map(|m| m.as_str()) {
            Some("pm") if hour < 12 => hour += 12,
            Some("am") if hour == 12 => hour = 0,
            _ => {}
        }
        let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
        Some(TimeBucket::of(time))
    }
}

fn word_regex(word: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{}\b", regex::escape(word)))
}
