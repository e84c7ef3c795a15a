use rusqlite::Connection;
use uuid::Uuid;

pub const SLUG_BOOK_TITLE: &str = "book_title";
pub const SLUG_WORD_COUNT: &str = "word_count";
pub const SLUG_WEEKLY_RATE: &str = "expected_weekly_reading_rate";
pub const SLUG_EXPECTED_WEEKLY_PERCENT: &str = "expected_weekly_reading_percent";
pub const SLUG_EXPECTED_DAILY_PERCENT: &str = "expected_daily_reading_percent";
pub const SLUG_ACCUMULATED_PERCENT: &str = "accumulated_reading_percent";
pub const SLUG_DAILY_PERCENT: &str = "daily_reading_percent";
pub const SLUG_ACCUMULATED_WEEKLY_PERCENT: &str = "accumulated_weekly_reading_percent";
pub const SLUG_EXPECTED_MATH_POINTS: &str = "expected_math_points";
pub const SLUG_ACTUAL_MATH_POINTS: &str = "actual_math_points";
pub const SLUG_MATH_TIME: &str = "math_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    Percent,
    Text,
}

impl FieldType {
    pub fn parse(s: &str) -> Option<FieldType> {
        match s {
            "number" => Some(FieldType::Number),
            "percent" => Some(FieldType::Percent),
            "text" => Some(FieldType::Text),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::Percent => "percent",
            FieldType::Text => "text",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Percent)
    }

    pub fn sql_type(self) -> &'static str {
        if self.is_numeric() {
            "INTEGER"
        } else {
            "TEXT"
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub id: String,
    pub slug: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_default: bool,
    pub is_active: bool,
    pub readonly: bool,
}

/// turn "My New Field" into "my_new_field"
pub fn snake_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_underscore = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

fn query_defs(
    conn: &Connection,
    owner_id: i64,
    where_scope: &str,
) -> Result<Vec<FieldDef>, rusqlite::Error> {
    let sql = format!(
        "SELECT id, slug, label, field_type, is_default, is_active, readonly
         FROM task_definitions
         WHERE owner_id = ?{}
         ORDER BY is_default DESC, created_at ASC, rowid ASC",
        where_scope
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([owner_id], |r| {
        let field_type_raw: String = r.get(3)?;
        Ok(FieldDef {
            id: r.get(0)?,
            slug: r.get(1)?,
            label: r.get(2)?,
            // Unknown stored types degrade to text rather than failing the read.
            field_type: FieldType::parse(&field_type_raw).unwrap_or(FieldType::Text),
            is_default: r.get::<_, i64>(4)? != 0,
            is_active: r.get::<_, i64>(5)? != 0,
            readonly: r.get::<_, i64>(6)? != 0,
        })
    })?;
    rows.collect()
}

/// Every definition for the owner, defaults first.
pub fn list_all(conn: &Connection, owner_id: i64) -> Result<Vec<FieldDef>, rusqlite::Error> {
    query_defs(conn, owner_id, "")
}

/// Definitions in scope for resolution: defaults plus active customs.
pub fn in_scope(conn: &Connection, owner_id: i64) -> Result<Vec<FieldDef>, rusqlite::Error> {
    query_defs(conn, owner_id, " AND (is_active = 1 OR is_default = 1)")
}

/// The system fields every owner tracks. Labels mirror what the companion UI
/// shows; the slugs are also base columns of daily_reports.
pub fn default_definitions() -> [(&'static str, &'static str, FieldType); 11] {
    [
        (SLUG_EXPECTED_MATH_POINTS, "Math (Pts)", FieldType::Number),
        (SLUG_ACTUAL_MATH_POINTS, "Math (Pts)", FieldType::Number),
        (SLUG_MATH_TIME, "Math Time (mins)", FieldType::Number),
        (SLUG_BOOK_TITLE, "Book Title", FieldType::Text),
        (SLUG_WORD_COUNT, "Word Count", FieldType::Number),
        (
            SLUG_EXPECTED_DAILY_PERCENT,
            "Expected Daily Reading (%)",
            FieldType::Number,
        ),
        (
            SLUG_ACCUMULATED_PERCENT,
            "Reading Progress (%)",
            FieldType::Number,
        ),
        (
            SLUG_EXPECTED_WEEKLY_PERCENT,
            "Expected Weekly Reading Progress (%)",
            FieldType::Number,
        ),
        (
            SLUG_WEEKLY_RATE,
            "Number of Words Read per Week",
            FieldType::Number,
        ),
        (
            SLUG_DAILY_PERCENT,
            "Actual Daily Reading Progress (%)",
            FieldType::Number,
        ),
        (
            SLUG_ACCUMULATED_WEEKLY_PERCENT,
            "Reading Progress (reset each week) (%)",
            FieldType::Number,
        ),
    ]
}

/// Seed the default definitions for an owner. Returns false if the owner
/// already has them (the call is a no-op then).
pub fn seed_defaults(conn: &Connection, owner_id: i64) -> Result<bool, rusqlite::Error> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM task_definitions WHERE owner_id = ? AND is_default = 1",
        [owner_id],
        |r| r.get(0),
    )?;
    if existing > 0 {
        return Ok(false);
    }
    for (slug, label, field_type) in default_definitions() {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO task_definitions(id, owner_id, slug, label, field_type, is_default, is_active, readonly)
             VALUES(?, ?, ?, ?, ?, 1, 1, 0)",
            (&id, owner_id, slug, label, field_type.as_str()),
        )?;
    }
    Ok(true)
}
