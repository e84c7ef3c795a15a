use crate::calc::WEEKDAYS_FULL;
use crate::catalog::{self, FieldType};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
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

/// The full weekly plan: `{ days: { "Monday": { slug: value }, ... } }`,
/// always carrying all seven day keys.
fn plan_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;

    let mut days = serde_json::Map::new();
    for day in WEEKDAYS_FULL {
        days.insert(day.to_string(), json!({}));
    }

    let mut stmt = conn
        .prepare(
            "SELECT td.slug, pe.day_of_week, pe.value
             FROM plan_entries pe
             JOIN task_definitions td ON td.id = pe.task_def_id
             WHERE pe.owner_id = ?",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([owner_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    for (slug, day, value) in rows {
        if let Some(day_obj) = days.get_mut(&day).and_then(|v| v.as_object_mut()) {
            day_obj.insert(slug, json!(value));
        }
    }

    Ok(json!({ "days": days }))
}

fn plan_value_to_text(
    slug: &str,
    field_type: FieldType,
    value: &serde_json::Value,
) -> Result<Option<String>, HandlerErr> {
    if value.is_null() {
        return Ok(None);
    }
    if field_type.is_numeric() {
        // Point targets are integers; anything else is rejected up front so a
        // bad cell never lands in the plan store.
        let as_int = match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(None);
                }
                t.parse::<i64>().ok()
            }
            _ => None,
        };
        let Some(n) = as_int else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("task \"{}\" requires an integer value", slug),
                details: Some(json!({ "slug": slug })),
            });
        };
        return Ok(Some(n.to_string()));
    }
    match value {
        serde_json::Value::String(s) => {
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.clone()))
            }
        }
        other => Ok(Some(other.to_string())),
    }
}

/// Full replace of the owner's plan: `{ ownerId, days: { "Monday": { slug:
/// value }, ... } }`. Unknown slugs and empty values are dropped.
fn plan_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let Some(days) = params.get("days").and_then(|v| v.as_object()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing days".to_string(),
            details: None,
        });
    };
    for day in days.keys() {
        if !WEEKDAYS_FULL.contains(&day.as_str()) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("unknown day: {}", day),
                details: None,
            });
        }
    }

    let defs = catalog::list_all(conn, owner_id).map_err(db_err)?;
    let by_slug: HashMap<&str, &catalog::FieldDef> =
        defs.iter().map(|d| (d.slug.as_str(), d)).collect();

    // Validate every cell before touching the store; a bad value rejects the
    // whole request with no partial write.
    let mut to_insert: Vec<(String, String, String)> = Vec::new();
    for (day, tasks) in days {
        let Some(tasks) = tasks.as_object() else {
            continue;
        };
        for (slug, value) in tasks {
            let Some(def) = by_slug.get(slug.as_str()) else {
                continue;
            };
            if let Some(text) = plan_value_to_text(slug, def.field_type, value)? {
                to_insert.push((def.id.clone(), day.clone(), text));
            }
        }
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute("DELETE FROM plan_entries WHERE owner_id = ?", [owner_id])
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "plan_entries" })),
        })?;
    for (task_def_id, day, value) in &to_insert {
        tx.execute(
            "INSERT INTO plan_entries(owner_id, task_def_id, day_of_week, value)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(owner_id, task_def_id, day_of_week) DO UPDATE SET
               value = excluded.value",
            (owner_id, task_def_id, day, value),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "plan_entries" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({}))
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
        "plan.get" => Some(with_conn(state, req, plan_get)),
        "plan.update" => Some(with_conn(state, req, plan_update)),
        _ => None,
    }
}
