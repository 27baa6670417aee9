use crate::grid::{LogicalKey, SlotAssignment, TimeSlot, WeekGrid, Weekday};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "timetables.sqlite3";

pub const ACADEMIC_TYPES: [&str; 2] = ["full-time", "part-time"];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetables(
            id TEXT PRIMARY KEY,
            program TEXT NOT NULL,
            branch TEXT NOT NULL,
            semester TEXT NOT NULL,
            academic_type TEXT NOT NULL,
            batch TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetables_key
            ON timetables(program, branch, semester, academic_type, batch)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid academic type {0:?}; expected full-time or part-time")]
    InvalidAcademicType(String),

    #[error("a timetable for {key} already exists")]
    DuplicateKey { key: String, existing_id: String },

    #[error("timetable not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for PersistError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Db(e.into())
    }
}

impl PersistError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) | Self::InvalidAcademicType(_) => "bad_params",
            Self::DuplicateKey { .. } => "duplicate_timetable",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::MissingField(field) => Some(json!({ "field": field })),
            Self::InvalidAcademicType(value) => Some(json!({ "field": "type", "value": value })),
            Self::DuplicateKey { key, existing_id } => {
                Some(json!({ "key": key, "existingId": existing_id }))
            }
            Self::NotFound(id) => Some(json!({ "id": id })),
            Self::Db(_) => None,
        }
    }
}

/// Identity fields must be filled in and the academic type must be known.
pub fn validate_timetable(grid: &WeekGrid) -> Result<(), PersistError> {
    let required = [
        ("program", &grid.program),
        ("branch", &grid.branch),
        ("semester", &grid.semester),
        ("type", &grid.academic_type),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(PersistError::MissingField(name));
        }
    }
    if !ACADEMIC_TYPES.contains(&grid.academic_type.trim()) {
        return Err(PersistError::InvalidAcademicType(grid.academic_type.clone()));
    }
    Ok(())
}

fn row_to_grid(id: String, body: &str, created_at: Option<String>, updated_at: Option<String>) -> WeekGrid {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "unreadable timetable body; treating as empty");
            Value::Null
        }
    };
    let mut grid = WeekGrid::from_value(&value);
    grid.id = Some(id);
    grid.created_at = created_at.or(grid.created_at);
    grid.updated_at = updated_at.or(grid.updated_at);
    grid
}

pub fn list_timetables(conn: &Connection) -> anyhow::Result<Vec<WeekGrid>> {
    let mut stmt = conn.prepare(
        "SELECT id, body, created_at, updated_at FROM timetables
         ORDER BY program, branch, semester, academic_type, batch, rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(id, body, c, u)| row_to_grid(id, &body, c, u))
        .collect())
}

pub fn get_timetable(conn: &Connection, id: &str) -> anyhow::Result<Option<WeekGrid>> {
    let row = conn
        .query_row(
            "SELECT id, body, created_at, updated_at FROM timetables WHERE id = ?",
            [id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;
    Ok(row.map(|(id, body, c, u)| row_to_grid(id, &body, c, u)))
}

/// Id of another record with the same logical key, if any.
pub fn find_by_key(
    conn: &Connection,
    key: &LogicalKey,
    exclude_id: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let found = conn
        .query_row(
            "SELECT id FROM timetables
             WHERE program = ? AND branch = ? AND semester = ? AND academic_type = ? AND batch = ?
               AND (? IS NULL OR id <> ?)
             LIMIT 1",
            (
                key.program.trim(),
                key.branch.trim(),
                key.semester.trim(),
                key.academic_type.trim(),
                key.batch.trim(),
                exclude_id,
                exclude_id,
            ),
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(found)
}

fn ensure_unique(conn: &Connection, grid: &WeekGrid, exclude_id: Option<&str>) -> Result<(), PersistError> {
    let key = grid.key();
    if let Some(existing_id) = find_by_key(conn, &key, exclude_id)? {
        tracing::warn!(key = %key, existing = %existing_id, "rejected duplicate timetable");
        return Err(PersistError::DuplicateKey {
            key: key.to_string(),
            existing_id,
        });
    }
    Ok(())
}

fn write_row(conn: &Connection, grid: &WeekGrid, insert: bool) -> Result<(), PersistError> {
    let id = grid.id.as_deref().unwrap_or_default();
    let body = serde_json::to_string(grid).map_err(anyhow::Error::from)?;
    let params = (
        id,
        grid.program.trim(),
        grid.branch.trim(),
        grid.semester.trim(),
        grid.academic_type.trim(),
        grid.batch.trim(),
        body,
        grid.created_at.as_deref(),
        grid.updated_at.as_deref(),
    );
    if insert {
        conn.execute(
            "INSERT INTO timetables(id, program, branch, semester, academic_type, batch, body, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params,
        )?;
    } else {
        conn.execute(
            "UPDATE timetables
             SET program = ?2, branch = ?3, semester = ?4, academic_type = ?5, batch = ?6,
                 body = ?7, created_at = ?8, updated_at = ?9
             WHERE id = ?1",
            params,
        )?;
    }
    Ok(())
}

/// Stores a new timetable under a fresh id and returns the stored copy.
pub fn create_timetable(conn: &Connection, grid: &WeekGrid) -> Result<WeekGrid, PersistError> {
    validate_timetable(grid)?;
    ensure_unique(conn, grid, None)?;

    let now = now_rfc3339();
    let mut stored = grid.clone();
    stored.id = Some(Uuid::new_v4().to_string());
    stored.created_at = Some(now.clone());
    stored.updated_at = Some(now);
    stored.fill_missing_cells();
    write_row(conn, &stored, true)?;

    tracing::info!(id = ?stored.id, key = %stored.key(), "created timetable");
    Ok(stored)
}

pub fn update_timetable(conn: &Connection, id: &str, grid: &WeekGrid) -> Result<WeekGrid, PersistError> {
    let Some(existing) = get_timetable(conn, id)? else {
        return Err(PersistError::NotFound(id.to_string()));
    };
    validate_timetable(grid)?;
    ensure_unique(conn, grid, Some(id))?;

    let mut stored = grid.clone();
    if existing.key() != stored.key() {
        // Recorded conflicts were computed under the old identity.
        stored.set_key(grid.key());
    }
    stored.id = Some(id.to_string());
    stored.created_at = existing.created_at;
    stored.updated_at = Some(now_rfc3339());
    stored.fill_missing_cells();
    write_row(conn, &stored, false)?;

    tracing::debug!(id, key = %stored.key(), "updated timetable");
    Ok(stored)
}

/// Replaces one cell of a stored timetable. The cell's derived conflicts are
/// discarded.
pub fn update_timetable_slot(
    conn: &Connection,
    id: &str,
    day: Weekday,
    slot: TimeSlot,
    assignment: SlotAssignment,
) -> Result<WeekGrid, PersistError> {
    let Some(mut grid) = get_timetable(conn, id)? else {
        return Err(PersistError::NotFound(id.to_string()));
    };
    grid.set_slot(day, slot, assignment);
    update_timetable(conn, id, &grid)
}

pub fn delete_timetable(conn: &Connection, id: &str) -> Result<(), PersistError> {
    let n = conn.execute("DELETE FROM timetables WHERE id = ?", [id])?;
    if n == 0 {
        return Err(PersistError::NotFound(id.to_string()));
    }
    tracing::info!(id, "deleted timetable");
    Ok(())
}
