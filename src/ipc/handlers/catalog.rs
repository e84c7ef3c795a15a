use crate::catalog::{self, FieldType};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

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

fn definition_json(def: &catalog::FieldDef) -> serde_json::Value {
    json!({
        "id": def.id,
        "slug": def.slug,
        "label": def.label,
        "fieldType": def.field_type.as_str(),
        "isDefault": def.is_default,
        "isActive": def.is_active,
        "readonly": def.readonly,
    })
}

fn list_definitions(conn: &Connection, owner_id: i64) -> Result<serde_json::Value, HandlerErr> {
    let defs = catalog::list_all(conn, owner_id).map_err(db_err)?;
    let out: Vec<serde_json::Value> = defs.iter().map(definition_json).collect();
    Ok(json!({ "definitions": out }))
}

fn ensure_defaults(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let seeded = catalog::seed_defaults(conn, owner_id).map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "task_definitions" })),
    })?;
    Ok(json!({ "seeded": seeded }))
}

/// Bulk replace of the owner's custom definitions: customs absent from the
/// incoming set are deleted, present ones updated, new ones inserted. A new
/// custom field also gets its daily_reports column here, so the report store
/// always has a column for every in-scope slug before the engine reads it.
fn update_definitions(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let owner_id = get_owner_id(params)?;
    let Some(items) = params.get("definitions").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing definitions".to_string(),
            details: None,
        });
    };

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    let incoming_ids: Vec<String> = items
        .iter()
        .filter_map(|d| d.get("id").and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if incoming_ids.is_empty() {
        tx.execute(
            "DELETE FROM task_definitions WHERE owner_id = ? AND is_default = 0",
            [owner_id],
        )
        .map_err(db_err)?;
    } else {
        let placeholders = std::iter::repeat("?")
            .take(incoming_ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "DELETE FROM task_definitions
             WHERE owner_id = ? AND is_default = 0 AND id NOT IN ({})",
            placeholders
        );
        let mut bind: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Integer(owner_id)];
        for id in &incoming_ids {
            bind.push(rusqlite::types::Value::Text(id.clone()));
        }
        tx.execute(&sql, rusqlite::params_from_iter(bind))
            .map_err(db_err)?;
    }

    let mut existing_slugs: HashSet<String> = catalog::list_all(&tx, owner_id)
        .map_err(db_err)?
        .into_iter()
        .map(|d| d.slug)
        .collect();

    for item in items {
        let label = item
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let field_type_raw = item
            .get("fieldType")
            .and_then(|v| v.as_str())
            .unwrap_or("text");
        let Some(field_type) = FieldType::parse(field_type_raw) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("unknown fieldType: {}", field_type_raw),
                details: Some(json!({ "label": label })),
            });
        };
        let is_active = item.get("isActive").and_then(|v| v.as_bool()).unwrap_or(true);

        let slug = match item.get("slug").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => catalog::snake_case(&label),
        };
        if slug.is_empty() {
            continue;
        }

        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        if let Some(id) = id {
            tx.execute(
                "UPDATE task_definitions
                 SET label = ?, field_type = ?, is_active = ?
                 WHERE id = ? AND owner_id = ? AND is_default = 0",
                (&label, field_type.as_str(), is_active as i64, id, owner_id),
            )
            .map_err(|e| HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "task_definitions" })),
            })?;
            continue;
        }

        if label.is_empty() || existing_slugs.contains(&slug) {
            continue;
        }
        db::ensure_report_column(&tx, &slug, field_type.sql_type()).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "slug": slug })),
        })?;
        let new_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO task_definitions(id, owner_id, slug, label, field_type, is_default, is_active, readonly)
             VALUES(?, ?, ?, ?, ?, 0, ?, 0)",
            (&new_id, owner_id, &slug, &label, field_type.as_str(), is_active as i64),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "task_definitions" })),
        })?;
        existing_slugs.insert(slug);
    }

    let result = list_definitions(&tx, owner_id)?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(result)
}

fn set_active_status(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(definition_id) = params.get("definitionId").and_then(|v| v.as_str()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing definitionId".to_string(),
            details: None,
        });
    };
    let Some(is_active) = params.get("isActive").and_then(|v| v.as_bool()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "isActive must be true or false".to_string(),
            details: None,
        });
    };
    let updated = conn
        .execute(
            "UPDATE task_definitions SET is_active = ? WHERE id = ?",
            (is_active as i64, definition_id),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "task_definitions" })),
        })?;
    if updated == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: "task definition not found".to_string(),
            details: None,
        });
    }
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
        "catalog.ensureDefaults" => Some(with_conn(state, req, ensure_defaults)),
        "catalog.list" => Some(with_conn(state, req, |conn, params| {
            let owner_id = get_owner_id(params)?;
            list_definitions(conn, owner_id)
        })),
        "catalog.updateDefinitions" => Some(with_conn(state, req, update_definitions)),
        "catalog.setActiveStatus" => Some(with_conn(state, req, set_active_status)),
        _ => None,
    }
}
