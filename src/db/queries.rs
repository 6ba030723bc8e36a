use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    CustomerProfile, DeadLetterRecord, HistoryMessage, PauseState, SenderType, Session,
    SessionSummary, UsageMetric, UsagePeriod, UsageRecord, UsageTokens,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s, TS_FORMAT)?)
}

// ── Sessions ──

pub fn get_session(
    conn: &Connection,
    session_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<Session>> {
    let row = conn
        .query_row(
            "SELECT session_id, company_id, customer_profile, messages, summary, paused_until,
                    last_sender_type, created_at, updated_at, expires_at
             FROM sessions WHERE session_id = ?1 AND expires_at > ?2",
            params![session_id, fmt_ts(now)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            },
        )
        .optional()?;

    let Some((
        session_id,
        company_id,
        customer_json,
        messages_json,
        summary_json,
        paused_until,
        last_sender,
        created_at,
        updated_at,
        expires_at,
    )) = row
    else {
        return Ok(None);
    };

    let customer: Option<CustomerProfile> = match customer_json {
        Some(json) => serde_json::from_str(&json).ok(),
        None => None,
    };
    let messages: Vec<HistoryMessage> = serde_json::from_str(&messages_json).unwrap_or_default();
    let summary: SessionSummary = serde_json::from_str(&summary_json).unwrap_or_default();
    let paused_until = match paused_until {
        Some(s) => Some(parse_ts(&s)?),
        None => None,
    };

    Ok(Some(Session {
        session_id,
        company_id,
        customer,
        messages,
        summary,
        pause: PauseState::from_column(paused_until),
        last_sender: SenderType::parse(&last_sender),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        expires_at: parse_ts(&expires_at)?,
    }))
}

pub fn save_session(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    let customer_json = match &session.customer {
        Some(profile) => Some(serde_json::to_string(profile)?),
        None => None,
    };
    let messages_json = serde_json::to_string(&session.messages)?;
    let summary_json = serde_json::to_string(&session.summary)?;
    let paused_until = session.pause.paused_until().map(|ts| fmt_ts(&ts));

    conn.execute(
        "INSERT INTO sessions (session_id, company_id, customer_profile, messages, summary,
                               paused_until, last_sender_type, created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(session_id) DO UPDATE SET
           company_id = excluded.company_id,
           customer_profile = excluded.customer_profile,
           messages = excluded.messages,
           summary = excluded.summary,
           paused_until = excluded.paused_until,
           last_sender_type = excluded.last_sender_type,
           updated_at = excluded.updated_at,
           expires_at = excluded.expires_at",
        params![
            session.session_id,
            session.company_id,
            customer_json,
            messages_json,
            summary_json,
            paused_until,
            session.last_sender.as_str(),
            fmt_ts(&session.created_at),
            fmt_ts(&session.updated_at),
            fmt_ts(&session.expires_at),
        ],
    )?;
    Ok(())
}

pub fn expire_old_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![fmt_ts(now)],
    )?;
    Ok(count)
}

// ── Dead letters ──

pub fn insert_dead_letter(conn: &Connection, record: &DeadLetterRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO dead_letters (id, session_id, company_id, endpoint, payload, error, attempts, failed_at, reprocessed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.session_id,
            record.company_id,
            record.endpoint,
            serde_json::to_string(&record.payload)?,
            record.error,
            record.attempts,
            fmt_ts(&record.failed_at),
            record.reprocessed as i32,
        ],
    )?;
    Ok(())
}

pub fn list_dead_letters(
    conn: &Connection,
    session_id: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<DeadLetterRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, company_id, endpoint, payload, error, attempts, failed_at, reprocessed
         FROM dead_letters
         WHERE (?1 IS NULL OR session_id = ?1)
         ORDER BY failed_at DESC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![session_id, limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, u32>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, i32>(8)? != 0,
        ))
    })?;

    let mut records = vec![];
    for row in rows {
        let (id, session_id, company_id, endpoint, payload, error, attempts, failed_at, reprocessed) =
            row?;
        records.push(DeadLetterRecord {
            id,
            session_id,
            company_id,
            endpoint,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            error,
            attempts,
            failed_at: parse_ts(&failed_at)?,
            reprocessed,
        });
    }
    Ok(records)
}

pub fn mark_dead_letter_reprocessed(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE dead_letters SET reprocessed = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(count > 0)
}

// ── Token usage ──

pub fn insert_usage(conn: &Connection, record: &UsageRecord) -> anyhow::Result<()> {
    let at = &record.recorded_at;
    conn.execute(
        "INSERT INTO token_usage (company_id, session_id, model, input_tokens, output_tokens,
                                  total_tokens, created_at, date_str, month_str, year_str)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.company_id,
            record.session_id,
            record.model,
            record.input_tokens,
            record.output_tokens,
            record.total_tokens(),
            fmt_ts(at),
            at.format("%Y-%m-%d").to_string(),
            at.format("%Y-%m").to_string(),
            at.format("%Y").to_string(),
        ],
    )?;
    Ok(())
}

/// Usage buckets for one company, most recent first.
pub fn usage_metrics(
    conn: &Connection,
    company_id: &str,
    period: UsagePeriod,
) -> anyhow::Result<Vec<UsageMetric>> {
    let bucket = match period {
        UsagePeriod::Daily => "date_str",
        UsagePeriod::Monthly => "month_str",
        UsagePeriod::Yearly => "year_str",
        UsagePeriod::Total => "'TOTAL'",
    };
    let sql = format!(
        "SELECT {bucket} AS bucket, COUNT(*), SUM(input_tokens), SUM(output_tokens), SUM(total_tokens)
         FROM token_usage
         WHERE company_id = ?1
         GROUP BY bucket
         ORDER BY bucket DESC"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(params![company_id], |row| {
        Ok(UsageMetric {
            period: row.get(0)?,
            interactions: row.get(1)?,
            tokens: UsageTokens {
                input: row.get(2)?,
                output: row.get(3)?,
                total: row.get(4)?,
            },
        })
    })?;

    let mut metrics = vec![];
    for row in rows {
        metrics.push(row?);
    }
    Ok(metrics)
}
