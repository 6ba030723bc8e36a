//! Read-modify-write helpers over the session row. Callers hold the
//! connection lock for the whole call, which keeps each update atomic.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde_json::json;

use crate::db::queries;
use crate::models::{
    CustomerProfile, Decision, HistoryMessage, IntentResult, PauseState, SenderType, Session,
    SentimentResult,
};

pub fn load_or_new(
    conn: &Connection,
    session_id: &str,
    company_id: &str,
    now: NaiveDateTime,
    ttl: Duration,
) -> anyhow::Result<Session> {
    Ok(queries::get_session(conn, session_id, &now)?
        .unwrap_or_else(|| Session::new(session_id, company_id, now, ttl)))
}

/// Stores an inbound customer message without answering it.
pub fn record_user_message(
    conn: &Connection,
    session_id: &str,
    company_id: &str,
    text: &str,
    customer: Option<&CustomerProfile>,
    now: NaiveDateTime,
    ttl: Duration,
) -> anyhow::Result<Session> {
    let mut session = load_or_new(conn, session_id, company_id, now, ttl)?;
    session.messages.push(HistoryMessage {
        role: "user".to_string(),
        content: text.to_string(),
        timestamp: now,
        metadata: json!({ "deferred": true }),
    });
    if let Some(profile) = customer {
        session.customer = Some(profile.clone());
    }
    session.last_sender = SenderType::User;
    session.updated_at = now;
    session.expires_at = now + ttl;
    queries::save_session(conn, &session)?;
    Ok(session)
}

/// An operator reply (re)opens the pause window and takes ownership.
pub fn record_owner_message(
    conn: &Connection,
    session_id: &str,
    company_id: &str,
    text: &str,
    now: NaiveDateTime,
    window: Duration,
    ttl: Duration,
) -> anyhow::Result<Session> {
    let mut session = load_or_new(conn, session_id, company_id, now, ttl)?;
    session.messages.push(HistoryMessage {
        role: "assistant".to_string(),
        content: text.to_string(),
        timestamp: now,
        metadata: json!({ "sender": "owner" }),
    });
    session.pause = PauseState::on_owner_message(now, window);
    session.last_sender = SenderType::Owner;
    session.updated_at = now;
    session.expires_at = now + ttl;
    queries::save_session(conn, &session)?;
    Ok(session)
}

pub struct TurnRecord<'a> {
    pub session_id: &'a str,
    pub company_id: &'a str,
    pub user_message: &'a str,
    /// False when the user message was stored at deferral time.
    pub append_user_message: bool,
    pub customer: Option<&'a CustomerProfile>,
    pub sentiment: &'a SentimentResult,
    pub intent: &'a IntentResult,
    pub decision: &'a Decision,
}

/// Appends the turn to history and rolls the summary forward. Pause state is
/// left as stored so an operator takeover mid-turn is not lost.
pub fn record_turn(
    conn: &Connection,
    record: &TurnRecord<'_>,
    now: NaiveDateTime,
    ttl: Duration,
) -> anyhow::Result<Session> {
    let mut session = load_or_new(conn, record.session_id, record.company_id, now, ttl)?;
    session.company_id = record.company_id.to_string();

    if record.append_user_message {
        session.messages.push(HistoryMessage {
            role: "user".to_string(),
            content: record.user_message.to_string(),
            timestamp: now,
            metadata: json!({
                "sentiment": record.sentiment.sentiment.as_str(),
                "intent": record.intent.intent.as_str(),
            }),
        });
        session.last_sender = SenderType::User;
    }
    session.messages.push(HistoryMessage {
        role: "assistant".to_string(),
        content: record.decision.reply_text.clone(),
        timestamp: now,
        metadata: json!({
            "status": record.decision.status.as_str(),
            "directive": record.decision.directive.kind(),
        }),
    });

    let summary = &mut session.summary;
    summary.total_interactions += 1;
    summary
        .sentiment_history
        .push(record.sentiment.sentiment.as_str().to_string());
    summary
        .intent_history
        .push(record.intent.intent.as_str().to_string());
    summary.last_status = Some(record.decision.status.as_str().to_string());

    if let Some(profile) = record.customer {
        session.customer = Some(profile.clone());
    }
    session.updated_at = now;
    session.expires_at = now + ttl;

    queries::save_session(conn, &session)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{ClassificationSource, CrmStatus, Intent, Sentiment};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_owner_message_pauses_and_user_message_keeps_pause() {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2025-12-10 10:00");
        let ttl = Duration::hours(24);

        let session =
            record_owner_message(&conn, "s1", "c1", "I'll take it from here", now, Duration::minutes(30), ttl)
                .unwrap();
        assert_eq!(session.last_sender, SenderType::Owner);
        assert!(session.pause.is_paused(dt("2025-12-10 10:10")));

        let session = record_user_message(&conn, "s1", "c1", "ok", None, dt("2025-12-10 10:05"), ttl).unwrap();
        assert_eq!(session.last_sender, SenderType::User);
        assert_eq!(session.pause.paused_until(), Some(dt("2025-12-10 10:30")));
        assert_eq!(session.messages.len(), 2);
    }

    #[test]
    fn test_record_turn_updates_summary() {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2025-12-10 10:00");
        let sentiment = SentimentResult {
            sentiment: Sentiment::Positive,
            score: 80,
            confidence: "high".to_string(),
            source: ClassificationSource::Pattern,
        };
        let intent = IntentResult {
            intent: Intent::Scheduling,
            reason: "pattern: scheduling".to_string(),
            source: ClassificationSource::Pattern,
        };
        let mut decision = Decision::fallback("s1", "c1", vec![]);
        decision.reply_text = "Tenho 09:00 com a Ana.".to_string();
        decision.status = CrmStatus::InService;

        let record = TurnRecord {
            session_id: "s1",
            company_id: "c1",
            user_message: "quero marcar",
            append_user_message: true,
            customer: None,
            sentiment: &sentiment,
            intent: &intent,
            decision: &decision,
        };
        record_turn(&conn, &record, now, Duration::hours(24)).unwrap();
        let session = record_turn(
            &conn,
            &TurnRecord {
                append_user_message: false,
                ..record
            },
            now,
            Duration::hours(24),
        )
        .unwrap();

        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[0].metadata["intent"], "SCHEDULING");
        assert_eq!(session.summary.total_interactions, 2);
        assert_eq!(session.summary.last_status.as_deref(), Some("InService"));
        assert_eq!(session.summary.sentiment_history, vec!["POSITIVE", "POSITIVE"]);
    }
}
