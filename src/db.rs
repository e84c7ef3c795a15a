use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("studylog.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS task_definitions(
            id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            slug TEXT NOT NULL,
            label TEXT NOT NULL,
            field_type TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            readonly INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(owner_id, slug)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_task_definitions_owner ON task_definitions(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS plan_entries(
            owner_id INTEGER NOT NULL,
            task_def_id TEXT NOT NULL,
            day_of_week TEXT NOT NULL,
            value TEXT,
            PRIMARY KEY(owner_id, task_def_id, day_of_week),
            FOREIGN KEY(task_def_id) REFERENCES task_definitions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plan_entries_owner ON plan_entries(owner_id)",
        [],
    )?;

    // One row per (owner, date). Every tracked field is a nullable column:
    // NULL means "not recorded that day", which is distinct from 0 or ''.
    // Custom catalog fields add further columns via ensure_report_column.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_reports(
            owner_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            book_title TEXT,
            word_count INTEGER,
            expected_weekly_reading_rate INTEGER,
            expected_weekly_reading_percent REAL,
            expected_daily_reading_percent REAL,
            accumulated_reading_percent REAL,
            daily_reading_percent REAL,
            accumulated_weekly_reading_percent REAL,
            expected_math_points INTEGER,
            actual_math_points INTEGER,
            math_time INTEGER,
            PRIMARY KEY(owner_id, date)
        )",
        [],
    )?;

    Ok(conn)
}

/// Add a nullable column for a custom catalog slug if it is not already
/// present. Slugs are snake_case identifiers, so plain double-quoting is safe.
pub fn ensure_report_column(conn: &Connection, slug: &str, sql_type: &str) -> anyhow::Result<bool> {
    if !is_safe_column_name(slug) {
        anyhow::bail!("invalid column name: {}", slug);
    }
    if table_has_column(conn, "daily_reports", slug)? {
        return Ok(false);
    }
    let sql = format!("ALTER TABLE daily_reports ADD COLUMN \"{}\" {}", slug, sql_type);
    conn.execute(&sql, [])?;
    Ok(true)
}

pub fn is_safe_column_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
