use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

use crate::catalog::{SLUG_BOOK_TITLE, SLUG_WEEKLY_RATE, SLUG_WORD_COUNT};
use crate::db;

/// Accumulating-state fields inherit the most recent explicit value when a
/// day left them unrecorded. Everything else is a daily event and resets to
/// absent each day.
pub const CARRY_FORWARD_SLUGS: [&str; 3] = [SLUG_BOOK_TITLE, SLUG_WORD_COUNT, SLUG_WEEKLY_RATE];

pub fn carries_forward(slug: &str) -> bool {
    CARRY_FORWARD_SLUGS.contains(&slug)
}

/// Most recent explicit (non-null) value for `slug` at or before `date`.
///
/// The query already filters on `date <= ?`; the returned source date is
/// checked again and any value that somehow resolves from after the requested
/// date collapses to absent instead of leaking future state.
pub fn last_explicit_value(
    conn: &Connection,
    owner_id: i64,
    date: &str,
    slug: &str,
) -> Result<Option<Value>, rusqlite::Error> {
    if !db::is_safe_column_name(slug) {
        return Ok(None);
    }
    let sql = format!(
        "SELECT \"{slug}\", date FROM daily_reports
         WHERE owner_id = ? AND \"{slug}\" IS NOT NULL AND date <= ?
         ORDER BY date DESC LIMIT 1"
    );
    let row: Option<(Value, String)> = conn
        .query_row(&sql, (owner_id, date), |r| Ok((r.get(0)?, r.get(1)?)))
        .optional()?;
    let Some((value, source_date)) = row else {
        return Ok(None);
    };
    if source_date.as_str() > date {
        return Ok(None);
    }
    Ok(Some(value))
}

/// Numeric coercion for resolved values: a text form containing a decimal
/// separator parses as a float, anything else as an integer. A failed parse
/// yields null rather than an error.
pub fn coerce_value(raw: &Value, numeric: bool) -> serde_json::Value {
    match raw {
        Value::Null => serde_json::Value::Null,
        Value::Integer(v) => serde_json::json!(v),
        Value::Real(v) => serde_json::json!(v),
        Value::Text(s) => {
            if !numeric {
                return serde_json::json!(s);
            }
            if s.contains('.') {
                match s.parse::<f64>() {
                    Ok(v) => serde_json::json!(v),
                    Err(_) => serde_json::Value::Null,
                }
            } else {
                match s.parse::<i64>() {
                    Ok(v) => serde_json::json!(v),
                    Err(_) => serde_json::Value::Null,
                }
            }
        }
        Value::Blob(_) => serde_json::Value::Null,
    }
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(n) => Some(*n),
        Value::Real(f) => Some(f.trunc() as i64),
        Value::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Integer(n) => Some(*n as f64),
        Value::Real(f) => Some(*f),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Real(f) => Some(f.to_string()),
        _ => None,
    }
}

pub fn carried_i64(
    conn: &Connection,
    owner_id: i64,
    date: &str,
    slug: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    Ok(last_explicit_value(conn, owner_id, date, slug)?
        .as_ref()
        .and_then(value_as_i64))
}

pub fn carried_f64(
    conn: &Connection,
    owner_id: i64,
    date: &str,
    slug: &str,
) -> Result<Option<f64>, rusqlite::Error> {
    Ok(last_explicit_value(conn, owner_id, date, slug)?
        .as_ref()
        .and_then(value_as_f64))
}

pub fn carried_text(
    conn: &Connection,
    owner_id: i64,
    date: &str,
    slug: &str,
) -> Result<Option<String>, rusqlite::Error> {
    Ok(last_explicit_value(conn, owner_id, date, slug)?
        .as_ref()
        .and_then(value_as_text))
}

/// Whether a weekly reading rate was ever recorded for this owner, on any
/// date. The 35000-word default applies only while this is false.
pub fn rate_ever_set(conn: &Connection, owner_id: i64) -> Result<bool, rusqlite::Error> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM daily_reports
             WHERE owner_id = ? AND expected_weekly_reading_rate IS NOT NULL LIMIT 1",
            [owner_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// The carried rate, falling back to `default_rate` only when no rate was
/// ever recorded for the owner.
pub fn applicable_rate(
    conn: &Connection,
    owner_id: i64,
    carried: Option<i64>,
    default_rate: i64,
) -> Result<Option<i64>, rusqlite::Error> {
    if carried.is_some() {
        return Ok(carried);
    }
    if rate_ever_set(conn, owner_id)? {
        Ok(None)
    } else {
        Ok(Some(default_rate))
    }
}

/// Reading state carried into a week: the most recent report at or before the
/// day preceding Monday.
#[derive(Debug, Clone, Default)]
pub struct WeekContext {
    pub accumulated: Option<f64>,
    pub book_title: Option<String>,
    pub word_count: Option<i64>,
    pub rate: Option<i64>,
}

pub fn week_context(
    conn: &Connection,
    owner_id: i64,
    cutoff_date: &str,
) -> Result<WeekContext, rusqlite::Error> {
    let row = conn
        .query_row(
            "SELECT accumulated_reading_percent, book_title, word_count, expected_weekly_reading_rate
             FROM daily_reports
             WHERE owner_id = ? AND date <= ?
             ORDER BY date DESC LIMIT 1",
            (owner_id, cutoff_date),
            |r| {
                Ok(WeekContext {
                    accumulated: r.get(0)?,
                    book_title: r.get(1)?,
                    word_count: r.get(2)?,
                    rate: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row.unwrap_or_default())
}
