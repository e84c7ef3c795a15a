use crate::calc;
use crate::catalog::{
    self, SLUG_ACCUMULATED_PERCENT, SLUG_ACCUMULATED_WEEKLY_PERCENT, SLUG_ACTUAL_MATH_POINTS,
    SLUG_BOOK_TITLE, SLUG_DAILY_PERCENT, SLUG_EXPECTED_DAILY_PERCENT, SLUG_EXPECTED_MATH_POINTS,
    SLUG_EXPECTED_WEEKLY_PERCENT, SLUG_MATH_TIME, SLUG_WEEKLY_RATE, SLUG_WORD_COUNT,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::resolve;
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn db_err(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn get_owner_id(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    params
        .get("ownerId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing ownerId".to_string(),
            details: None,
        })
}

fn get_date(params: &serde_json::Value) -> Result<(String, NaiveDate), HandlerErr> {
    let raw = params
        .get("date")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing date".to_string(),
            details: None,
        })?;
    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: "date must be YYYY-MM-DD".to_string(),
        details: Some(json!({ "date": raw })),
    })?;
    Ok((raw.to_string(), parsed))
}

fn bad_numeric(slug: &str) -> HandlerErr {
    HandlerErr {
        code: "bad_params",
        message: format!("field \"{}\" requires a numeric value", slug),
        details: Some(json!({ "slug": slug })),
    }
}

/// A payload entry counts as supplied only when it is non-null and, for
/// strings, non-empty. "" from a cleared form input means "not recorded".
fn payload_raw<'a>(
    fields: &'a serde_json::Map<String, serde_json::Value>,
    slug: &str,
) -> Option<&'a serde_json::Value> {
    let v = fields.get(slug)?;
    if v.is_null() {
        return None;
    }
    if let Some(s) = v.as_str() {
        if s.trim().is_empty() {
            return None;
        }
    }
    Some(v)
}

fn payload_i64(
    fields: &serde_json::Map<String, serde_json::Value>,
    slug: &str,
) -> Result<Option<i64>, HandlerErr> {
    let Some(v) = payload_raw(fields, slug) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| bad_numeric(slug)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| bad_numeric(slug)),
        _ => Err(bad_numeric(slug)),
    }
}

fn payload_f64(
    fields: &serde_json::Map<String, serde_json::Value>,
    slug: &str,
) -> Result<Option<f64>, HandlerErr> {
    let Some(v) = payload_raw(fields, slug) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| bad_numeric(slug)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| bad_numeric(slug)),
        _ => Err(bad_numeric(slug)),
    }
}

/// Payload value for a generic numeric field, coerced the same way resolution
/// coerces stored text: a decimal separator means float, otherwise integer.
fn payload_number_value(
    fields: &serde_json::Map<String, serde_json::Value>,
    slug: &str,
) -> Result<Option<Value>, HandlerErr> {
    let Some(v) = payload_raw(fields, slug) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(Value::Integer(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(Some(Value::Real(f)))
            } else {
                Err(bad_numeric(slug))
            }
        }
        serde_json::Value::String(s) => {
            let t = s.trim();
            if t.contains('.') {
                t.parse::<f64>()
                    .map(|f| Some(Value::Real(f)))
                    .map_err(|_| bad_numeric(slug))
            } else {
                t.parse::<i64>()
                    .map(|i| Some(Value::Integer(i)))
                    .map_err(|_| bad_numeric(slug))
            }
        }
        _ => Err(bad_numeric(slug)),
    }
}

fn payload_text(
    fields: &serde_json::Map<String, serde_json::Value>,
    slug: &str,
) -> Option<String> {
    let v = payload_raw(fields, slug)?;
    match v {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn quoted_columns(defs: &[catalog::FieldDef]) -> Vec<String> {
    defs.iter()
        .filter(|d| db::is_safe_column_name(&d.slug))
        .map(|d| format!("\"{}\"", d.slug))
        .collect()
}

/// Effective values for every in-scope field on one day: the stored value if
/// explicit, carry-forward for the accumulating slugs, absent otherwise.
fn report_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let (date, _) = get_date(params)?;

    let defs: Vec<catalog::FieldDef> = catalog::in_scope(conn, owner_id)
        .map_err(db_err)?
        .into_iter()
        .filter(|d| db::is_safe_column_name(&d.slug))
        .collect();
    if defs.is_empty() {
        // Nothing defined yet; avoid building bad SQL.
        return Ok(json!({ "exists": false, "report": {} }));
    }

    let columns = quoted_columns(&defs).join(", ");
    let sql = format!(
        "SELECT {} FROM daily_reports WHERE owner_id = ? AND date = ?",
        columns
    );
    let row: Option<Vec<Value>> = conn
        .query_row(&sql, (owner_id, &date), |r| {
            let mut values = Vec::with_capacity(defs.len());
            for i in 0..defs.len() {
                values.push(r.get::<_, Value>(i)?);
            }
            Ok(values)
        })
        .optional()
        .map_err(db_err)?;

    let exists = row.is_some();
    let mut report = serde_json::Map::new();
    for (i, def) in defs.iter().enumerate() {
        let mut raw = row
            .as_ref()
            .map(|values| values[i].clone())
            .unwrap_or(Value::Null);
        if matches!(raw, Value::Null) && resolve::carries_forward(&def.slug) {
            raw = resolve::last_explicit_value(conn, owner_id, &date, &def.slug)
                .map_err(db_err)?
                .unwrap_or(Value::Null);
        }
        report.insert(
            def.slug.clone(),
            resolve::coerce_value(&raw, def.field_type.is_numeric()),
        );
    }

    Ok(json!({ "exists": exists, "report": report }))
}

/// The write path: reconcile one day's submission with carried state, compute
/// the derived reading fields, and replace the whole row atomically.
fn report_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let (date, parsed_date) = get_date(params)?;
    let Some(fields) = params.get("fields").and_then(|v| v.as_object()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing fields".to_string(),
            details: None,
        });
    };

    let defs: Vec<catalog::FieldDef> = catalog::in_scope(conn, owner_id)
        .map_err(db_err)?
        .into_iter()
        .filter(|d| db::is_safe_column_name(&d.slug))
        .collect();
    if defs.is_empty() {
        return Err(HandlerErr {
            code: "not_found",
            message: "no field definitions for owner; call catalog.ensureDefaults first".to_string(),
            details: None,
        });
    }

    // The whole read-compute-write sequence runs in one transaction so a
    // concurrent fault can never leave a partially reconciled row.
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    let word_count = match payload_i64(fields, SLUG_WORD_COUNT)? {
        Some(v) => Some(v),
        None => resolve::carried_i64(&tx, owner_id, &date, SLUG_WORD_COUNT).map_err(db_err)?,
    };
    let rate = match payload_i64(fields, SLUG_WEEKLY_RATE)? {
        Some(v) => Some(v),
        None => {
            let carried =
                resolve::carried_i64(&tx, owner_id, &date, SLUG_WEEKLY_RATE).map_err(db_err)?;
            resolve::applicable_rate(&tx, owner_id, carried, calc::DEFAULT_WEEKLY_READING_RATE)
                .map_err(db_err)?
        }
    };
    let book_title = match payload_text(fields, SLUG_BOOK_TITLE) {
        Some(t) => Some(t),
        None => resolve::carried_text(&tx, owner_id, &date, SLUG_BOOK_TITLE).map_err(db_err)?,
    };

    let expected_weekly = calc::expected_weekly_reading_percent(
        rate.map(|v| v as f64),
        word_count.map(|v| v as f64),
    );
    let expected_daily = match payload_f64(fields, SLUG_EXPECTED_DAILY_PERCENT)? {
        Some(v) => Some(v),
        None => expected_weekly.map(|p| p / 7.0),
    };

    let accumulated = match payload_f64(fields, SLUG_ACCUMULATED_PERCENT)? {
        Some(v) => v,
        None => resolve::carried_f64(&tx, owner_id, &date, SLUG_ACCUMULATED_PERCENT)
            .map_err(db_err)?
            .unwrap_or(0.0),
    };

    let prev_date = parsed_date
        .pred_opt()
        .map(|d| d.format("%Y-%m-%d").to_string());
    let (prev_accumulated, prev_title) = match prev_date.as_deref() {
        Some(prev) => (
            resolve::carried_f64(&tx, owner_id, prev, SLUG_ACCUMULATED_PERCENT).map_err(db_err)?,
            resolve::carried_text(&tx, owner_id, prev, SLUG_BOOK_TITLE).map_err(db_err)?,
        ),
        None => (None, None),
    };
    let daily_percent = calc::daily_reading_delta(
        Some(accumulated),
        prev_accumulated,
        book_title.as_deref(),
        prev_title.as_deref(),
    );

    let monday = parsed_date
        - Duration::days(parsed_date.weekday().num_days_from_monday() as i64);
    let prior_deltas: f64 = if parsed_date > monday {
        tx.query_row(
            "SELECT COALESCE(SUM(daily_reading_percent), 0)
             FROM daily_reports
             WHERE owner_id = ? AND date BETWEEN ? AND ?",
            (
                owner_id,
                monday.format("%Y-%m-%d").to_string(),
                prev_date.clone().unwrap_or_default(),
            ),
            |r| r.get(0),
        )
        .map_err(db_err)?
    } else {
        0.0
    };
    let accumulated_weekly = prior_deltas + daily_percent;

    let mut columns: Vec<String> = Vec::with_capacity(defs.len());
    let mut values: Vec<Value> = Vec::with_capacity(defs.len() + 2);
    values.push(Value::Integer(owner_id));
    values.push(Value::Text(date.clone()));
    for def in &defs {
        let value = match def.slug.as_str() {
            SLUG_BOOK_TITLE => book_title.clone().map(Value::Text).unwrap_or(Value::Null),
            SLUG_WORD_COUNT => word_count.map(Value::Integer).unwrap_or(Value::Null),
            SLUG_WEEKLY_RATE => rate.map(Value::Integer).unwrap_or(Value::Null),
            SLUG_EXPECTED_WEEKLY_PERCENT => {
                expected_weekly.map(Value::Real).unwrap_or(Value::Null)
            }
            SLUG_EXPECTED_DAILY_PERCENT => expected_daily.map(Value::Real).unwrap_or(Value::Null),
            SLUG_ACCUMULATED_PERCENT => Value::Real(accumulated),
            SLUG_DAILY_PERCENT => Value::Real(daily_percent),
            SLUG_ACCUMULATED_WEEKLY_PERCENT => Value::Real(accumulated_weekly),
            SLUG_EXPECTED_MATH_POINTS | SLUG_ACTUAL_MATH_POINTS | SLUG_MATH_TIME => {
                payload_i64(fields, &def.slug)?
                    .map(Value::Integer)
                    .unwrap_or(Value::Null)
            }
            _ => {
                if def.field_type.is_numeric() {
                    payload_number_value(fields, &def.slug)?.unwrap_or(Value::Null)
                } else {
                    payload_text(fields, &def.slug)
                        .map(Value::Text)
                        .unwrap_or(Value::Null)
                }
            }
        };
        columns.push(format!("\"{}\"", def.slug));
        values.push(value);
    }

    let placeholders = std::iter::repeat("?")
        .take(values.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO daily_reports(owner_id, date, {}) VALUES({})",
        columns.join(", "),
        placeholders
    );
    tx.execute(&sql, params_from_iter(values)).map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "daily_reports" })),
    })?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({}))
}

fn report_last_known(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let (date, _) = get_date(params)?;

    let mut out = serde_json::Map::new();
    let probes: [(&str, bool); 4] = [
        (SLUG_BOOK_TITLE, false),
        (SLUG_WORD_COUNT, true),
        (SLUG_ACCUMULATED_PERCENT, true),
        (SLUG_WEEKLY_RATE, true),
    ];
    for (slug, numeric) in probes {
        let raw = resolve::last_explicit_value(conn, owner_id, &date, slug)
            .map_err(db_err)?
            .unwrap_or(Value::Null);
        out.insert(slug.to_string(), resolve::coerce_value(&raw, numeric));
    }
    Ok(serde_json::Value::Object(out))
}

/// The strictly-prior calendar day's row; no backward scan.
fn report_previous_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let (_, parsed_date) = get_date(params)?;
    let Some(prev) = parsed_date.pred_opt() else {
        return Ok(json!({}));
    };

    let row = conn
        .query_row(
            "SELECT book_title, word_count, accumulated_reading_percent
             FROM daily_reports
             WHERE owner_id = ? AND date = ?",
            (owner_id, prev.format("%Y-%m-%d").to_string()),
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, Option<i64>>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;

    match row {
        Some((book_title, word_count, accumulated)) => Ok(json!({
            "book_title": book_title,
            "word_count": word_count,
            "accumulated_reading_percent": accumulated,
        })),
        None => Ok(json!({})),
    }
}

fn report_has_data(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM daily_reports WHERE owner_id = ?",
            [owner_id],
            |r| r.get(0),
        )
        .map_err(db_err)?;
    Ok(json!({ "hasData": count > 0 }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "report.open" => Some(with_conn(state, req, report_open)),
        "report.submit" => Some(with_conn(state, req, report_submit)),
        "report.lastKnown" => Some(with_conn(state, req, report_last_known)),
        "report.previousDay" => Some(with_conn(state, req, report_previous_day)),
        "report.hasData" => Some(with_conn(state, req, report_has_data)),
        _ => None,
    }
}
