use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "learnpulse.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS datasets(
            id TEXT PRIMARY KEY,
            course_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            file_path TEXT NOT NULL,
            file_format TEXT NOT NULL,
            columns_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            user_modified INTEGER
        )",
        [],
    )?;
    ensure_datasets_checksum(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_datasets_course ON datasets(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS models(
            id TEXT PRIMARY KEY,
            course_id INTEGER NOT NULL,
            dataset_id TEXT,
            model_name TEXT NOT NULL,
            backend_model_id TEXT,
            model_path TEXT,
            algorithm TEXT NOT NULL,
            features_json TEXT,
            accuracy REAL,
            metrics_json TEXT,
            active INTEGER NOT NULL DEFAULT 0,
            train_status TEXT NOT NULL,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            user_modified INTEGER,
            FOREIGN KEY(dataset_id) REFERENCES datasets(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_models_course_active ON models(course_id, active)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_models_dataset ON models(dataset_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS predictions(
            id TEXT PRIMARY KEY,
            model_id TEXT NOT NULL,
            course_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            pass_prob REAL NOT NULL,
            risk_value INTEGER NOT NULL,
            prediction_json TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(model_id) REFERENCES models(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_predictions_course_user ON predictions(course_id, user_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_predictions_model ON predictions(model_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS suggestions(
            id TEXT PRIMARY KEY,
            prediction_id TEXT NOT NULL,
            course_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            cm_id INTEGER,
            cm_name TEXT,
            resource_type TEXT NOT NULL,
            priority INTEGER NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL,
            viewed INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(prediction_id) REFERENCES predictions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_prediction ON suggestions(prediction_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_user ON suggestions(course_id, user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS training_log(
            id TEXT PRIMARY KEY,
            model_id TEXT NOT NULL,
            event TEXT NOT NULL,
            message TEXT NOT NULL,
            level TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(model_id) REFERENCES models(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_training_log_model ON training_log(model_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS learners(
            course_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            features_json TEXT NOT NULL,
            activities_json TEXT NOT NULL,
            grades_json TEXT NOT NULL,
            course_grade_pct REAL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(course_id, user_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat_interactions(
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            query TEXT NOT NULL,
            category TEXT NOT NULL,
            success INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chat_interactions_category ON chat_interactions(category)",
        [],
    )?;

    Ok(conn)
}

// Checksums were added after the first dataset uploads shipped.
fn ensure_datasets_checksum(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "datasets", "checksum")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE datasets ADD COLUMN checksum TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
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

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

/// Timestamps are stored as RFC 3339 UTC with microseconds so that
/// lexical order matches creation order.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
