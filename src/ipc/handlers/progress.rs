use crate::calc::{self, WEEKDAYS_FULL, WEEKDAYS_SHORT};
use crate::catalog::{self, FieldType, SLUG_EXPECTED_MATH_POINTS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::resolve;
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

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

#[derive(Debug, Clone, Serialize)]
struct DayRow {
    date: String,
    day: String,
    expected_math_points: i64,
    actual_math_points: i64,
    math_time: i64,
    expected_math_time: i64,
    daily_reading_percent: f64,
    expected_daily_reading_percent: i64,
}

#[derive(Debug, Clone, Serialize)]
struct WeekTotals {
    total_actual_math_points: i64,
    total_expected_math_points: i64,
    total_actual_reading_percent: i64,
    total_expected_reading_percent: i64,
}

/// One loaded report row inside the scanned week. Custom text cells ride
/// along positionally with the text definitions that selected them.
struct WeekReportRow {
    actual_math_points: Option<i64>,
    math_time: Option<i64>,
    accumulated: Option<f64>,
    word_count: Option<i64>,
    rate: Option<i64>,
    book_title: Option<String>,
    text_cells: Vec<Value>,
}

fn cell_is_filled(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Text(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn load_week_rows(
    conn: &Connection,
    owner_id: i64,
    monday: &str,
    sunday: &str,
    text_defs: &[catalog::FieldDef],
) -> Result<HashMap<String, WeekReportRow>, HandlerErr> {
    let mut columns = vec![
        "date".to_string(),
        "actual_math_points".to_string(),
        "math_time".to_string(),
        "accumulated_reading_percent".to_string(),
        "word_count".to_string(),
        "expected_weekly_reading_rate".to_string(),
        "book_title".to_string(),
    ];
    for def in text_defs {
        columns.push(format!("\"{}\"", def.slug));
    }
    let sql = format!(
        "SELECT {} FROM daily_reports
         WHERE owner_id = ? AND date BETWEEN ? AND ?
         ORDER BY date ASC",
        columns.join(", ")
    );

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let text_count = text_defs.len();
    let rows = stmt
        .query_map((owner_id, monday, sunday), |r| {
            let date: String = r.get(0)?;
            let mut text_cells = Vec::with_capacity(text_count);
            for i in 0..text_count {
                text_cells.push(r.get::<_, Value>(7 + i)?);
            }
            Ok((
                date,
                WeekReportRow {
                    actual_math_points: r.get(1)?,
                    math_time: r.get(2)?,
                    accumulated: r.get(3)?,
                    word_count: r.get(4)?,
                    rate: r.get(5)?,
                    book_title: r.get(6)?,
                    text_cells,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    Ok(rows.into_iter().collect())
}

/// Weekly plan for the math target plus every custom text slug, keyed by full
/// weekday name. Math values parse as integers, defaulting to 0; text values
/// are stored trimmed, an empty string meaning "not planned".
fn load_plan(
    conn: &Connection,
    owner_id: i64,
    text_defs: &[catalog::FieldDef],
) -> Result<(HashMap<String, i64>, HashMap<String, serde_json::Map<String, serde_json::Value>>), HandlerErr>
{
    let mut slugs: Vec<String> = vec![SLUG_EXPECTED_MATH_POINTS.to_string()];
    slugs.extend(text_defs.iter().map(|d| d.slug.clone()));

    let placeholders = std::iter::repeat("?")
        .take(slugs.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT pe.day_of_week, td.slug, pe.value
         FROM plan_entries pe
         JOIN task_definitions td ON td.id = pe.task_def_id
         WHERE pe.owner_id = ? AND td.slug IN ({})",
        placeholders
    );
    let mut bind: Vec<Value> = vec![Value::Integer(owner_id)];
    for slug in &slugs {
        bind.push(Value::Text(slug.clone()));
    }

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut math_plan: HashMap<String, i64> = HashMap::new();
    let mut text_plan: HashMap<String, serde_json::Map<String, serde_json::Value>> =
        text_defs.iter().map(|d| (d.slug.clone(), serde_json::Map::new())).collect();
    for (day, slug, value) in rows {
        if slug == SLUG_EXPECTED_MATH_POINTS {
            let points = value
                .as_deref()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0);
            math_plan.insert(day, points);
        } else if let Some(day_plan) = text_plan.get_mut(&slug) {
            let text = value.unwrap_or_default().trim().to_string();
            day_plan.insert(day, json!(text));
        }
    }

    Ok((math_plan, text_plan))
}

/// Aggregate a Monday-Sunday week into per-day rows, weekly totals, and the
/// text-task completion matrix.
fn weekly_progress(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = params
        .get("ownerId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing ownerId".to_string(),
            details: None,
        })?;
    let date_raw = params
        .get("date")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing date".to_string(),
            details: None,
        })?;
    let date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: "date must be YYYY-MM-DD".to_string(),
        details: Some(json!({ "date": date_raw })),
    })?;

    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let sunday = monday + Duration::days(6);
    let day_before_monday = monday - Duration::days(1);
    let monday_str = monday.format("%Y-%m-%d").to_string();
    let sunday_str = sunday.format("%Y-%m-%d").to_string();

    let defs = catalog::in_scope(conn, owner_id).map_err(db_err)?;
    let text_defs: Vec<catalog::FieldDef> = defs
        .into_iter()
        .filter(|d| {
            d.field_type == FieldType::Text && !d.is_default && db::is_safe_column_name(&d.slug)
        })
        .collect();

    let (math_plan, text_plan) = load_plan(conn, owner_id, &text_defs)?;
    let week_rows = load_week_rows(conn, owner_id, &monday_str, &sunday_str, &text_defs)?;

    // Reading state entering the week: the most recent report before Monday.
    let ctx = resolve::week_context(
        conn,
        owner_id,
        &day_before_monday.format("%Y-%m-%d").to_string(),
    )
    .map_err(db_err)?;
    let mut prev_read = ctx.accumulated;
    let mut prev_title = ctx.book_title;
    let mut applicable_count = ctx.word_count;
    let mut applicable_rate = resolve::applicable_rate(
        conn,
        owner_id,
        ctx.rate,
        calc::DEFAULT_WEEKLY_READING_RATE,
    )
    .map_err(db_err)?;

    let mut completion: HashMap<String, [bool; 7]> = text_defs
        .iter()
        .map(|d| (d.slug.clone(), [false; 7]))
        .collect();

    let mut daily_rows: Vec<DayRow> = Vec::with_capacity(7);
    let mut total_actual_math_points = 0_i64;
    let mut total_expected_math_points = 0_i64;
    let mut total_actual_reading = 0.0_f64;
    let mut total_expected_reading = 0_i64;

    for i in 0..7 {
        let current = monday + Duration::days(i as i64);
        let date_str = current.format("%Y-%m-%d").to_string();
        let row = week_rows.get(&date_str);

        let actual_points = row.and_then(|r| r.actual_math_points).unwrap_or(0);
        let math_time = row.and_then(|r| r.math_time).unwrap_or(0);
        let accumulated = row.and_then(|r| r.accumulated).or(prev_read);
        let current_title = row.and_then(|r| r.book_title.clone());

        // A day that explicitly set a rate or word count changes the running
        // state for the rest of the scan.
        if let Some(r) = row {
            if r.rate.is_some() {
                applicable_rate = r.rate;
            }
            if r.word_count.is_some() {
                applicable_count = r.word_count;
            }
        }

        let expected_reading = calc::expected_daily_reading_percent(
            applicable_rate.map(|v| v as f64),
            applicable_count.map(|v| v as f64),
        )
        .map(calc::round_half_up)
        .unwrap_or(0);

        let expected_points = math_plan.get(WEEKDAYS_FULL[i]).copied().unwrap_or(0);
        let expected_time = calc::expected_math_time(expected_points);

        let daily_reading = calc::daily_reading_delta(
            accumulated,
            prev_read,
            current_title.as_deref(),
            prev_title.as_deref(),
        );

        prev_read = accumulated;
        prev_title = current_title;

        for (ti, def) in text_defs.iter().enumerate() {
            let filled = row
                .map(|r| cell_is_filled(&r.text_cells[ti]))
                .unwrap_or(false);
            if filled {
                if let Some(days) = completion.get_mut(&def.slug) {
                    days[i] = true;
                }
            }
        }

        total_actual_math_points += actual_points;
        total_expected_math_points += expected_points;
        total_actual_reading += daily_reading;
        total_expected_reading += expected_reading;

        daily_rows.push(DayRow {
            date: date_str,
            day: WEEKDAYS_SHORT[i].to_string(),
            expected_math_points: expected_points,
            actual_math_points: actual_points,
            math_time,
            expected_math_time: expected_time,
            daily_reading_percent: daily_reading,
            expected_daily_reading_percent: expected_reading,
        });
    }

    let totals = WeekTotals {
        total_actual_math_points,
        total_expected_math_points,
        total_actual_reading_percent: calc::round_half_up(total_actual_reading),
        total_expected_reading_percent: total_expected_reading,
    };

    let mut labels = serde_json::Map::new();
    let mut completion_out = serde_json::Map::new();
    let mut plan_out = serde_json::Map::new();
    for def in &text_defs {
        labels.insert(def.slug.clone(), json!(def.label));
        let days = completion.get(&def.slug).copied().unwrap_or([false; 7]);
        let mut day_map = serde_json::Map::new();
        for (i, short) in WEEKDAYS_SHORT.iter().enumerate() {
            day_map.insert(short.to_string(), json!(days[i]));
        }
        completion_out.insert(def.slug.clone(), serde_json::Value::Object(day_map));
        let plan_days = text_plan.get(&def.slug).cloned().unwrap_or_default();
        plan_out.insert(def.slug.clone(), serde_json::Value::Object(plan_days));
    }

    Ok(json!({
        "dailyData": daily_rows,
        "summary": totals,
        "textTasks": {
            "labels": labels,
            "completion": completion_out,
            "plan": plan_out,
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.weekly" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            Some(match weekly_progress(conn, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(error) => error.response(&req.id),
            })
        }
        _ => None,
    }
}
