use chrono::NaiveDateTime;
use serde::Serialize;

/// Tokens spent by one completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub company_id: String,
    pub session_id: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub recorded_at: NaiveDateTime,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePeriod {
    Daily,
    Monthly,
    Yearly,
    Total,
}

impl UsagePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsagePeriod::Daily => "daily",
            UsagePeriod::Monthly => "monthly",
            UsagePeriod::Yearly => "yearly",
            UsagePeriod::Total => "total",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Some(UsagePeriod::Daily),
            "monthly" => Some(UsagePeriod::Monthly),
            "yearly" => Some(UsagePeriod::Yearly),
            "total" => Some(UsagePeriod::Total),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UsageTokens {
    pub input: i64,
    pub output: i64,
    pub total: i64,
}

/// One bucket of the usage report: a day (`2025-12-10`), a month
/// (`2025-12`), a year (`2025`) or `TOTAL`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageMetric {
    pub period: String,
    pub interactions: i64,
    pub tokens: UsageTokens,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse() {
        assert_eq!(UsagePeriod::parse("Monthly"), Some(UsagePeriod::Monthly));
        assert_eq!(UsagePeriod::parse(" total "), Some(UsagePeriod::Total));
        assert_eq!(UsagePeriod::parse("weekly"), None);
        assert_eq!(UsagePeriod::Yearly.as_str(), "yearly");
    }
}
