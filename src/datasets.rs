use crate::db;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const PREVIEW_ROWS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Json,
}

impl DatasetFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("file extension must be .{0}")]
    InvalidExtension(&'static str),
    #[error("source file not found: {0}")]
    MissingFile(String),
    #[error("could not read columns: {0}")]
    Parse(String),
    #[error("dataset not found")]
    NotFound,
    #[error("dataset does not belong to course {0}")]
    WrongCourse(i64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl DatasetError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidExtension(_) => "invalid_file_extension",
            Self::MissingFile(_) => "not_found",
            Self::Parse(_) => "bad_params",
            Self::NotFound => "not_found",
            Self::WrongCourse(_) => "dataset_not_in_course",
            Self::Io(_) => "io_failed",
            Self::Db(_) => "db_tx_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub id: String,
    pub course_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub file_path: String,
    pub format: DatasetFormat,
    pub columns: Vec<String>,
    pub checksum: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DatasetRow {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "courseId": self.course_id,
            "name": self.name,
            "description": self.description,
            "filePath": self.file_path,
            "fileFormat": self.format.as_str(),
            "columns": self.columns,
            "checksum": self.checksum,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

pub struct NewDataset<'a> {
    pub course_id: i64,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub format: DatasetFormat,
    pub source_path: &'a Path,
    pub user_id: Option<i64>,
}

const DATASET_COLUMNS: &str = "id, course_id, name, description, file_path, file_format,
    columns_json, checksum, created_at, updated_at";

fn dataset_from_row(row: &Row) -> rusqlite::Result<DatasetRow> {
    let format_raw: String = row.get(5)?;
    let columns_raw: String = row.get(6)?;
    Ok(DatasetRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        file_path: row.get(4)?,
        format: DatasetFormat::parse(&format_raw).unwrap_or(DatasetFormat::Csv),
        columns: serde_json::from_str(&columns_raw).unwrap_or_default(),
        checksum: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn clean_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "dataset".to_string()
    } else {
        cleaned
    }
}

fn check_extension(path: &Path, format: DatasetFormat) -> Result<(), DatasetError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if ext.as_deref() != Some(format.as_str()) {
        return Err(DatasetError::InvalidExtension(format.as_str()));
    }
    Ok(())
}

/// Column names from the CSV header row or the keys of the first JSON record.
pub fn extract_columns(path: &Path, format: DatasetFormat) -> Result<Vec<String>, DatasetError> {
    match format {
        DatasetFormat::Csv => {
            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(path)
                .map_err(|e| DatasetError::Parse(e.to_string()))?;
            let headers = rdr
                .headers()
                .map_err(|e| DatasetError::Parse(e.to_string()))?;
            let cols: Vec<String> = headers
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
                .collect();
            if cols.iter().all(|c| c.is_empty()) {
                return Err(DatasetError::Parse("CSV header row is empty".into()));
            }
            Ok(cols)
        }
        DatasetFormat::Json => {
            let text = std::fs::read_to_string(path)?;
            let v: Value =
                serde_json::from_str(&text).map_err(|e| DatasetError::Parse(e.to_string()))?;
            let first = match &v {
                Value::Array(items) => items.first(),
                Value::Object(_) => Some(&v),
                _ => None,
            };
            match first.and_then(|f| f.as_object()) {
                Some(obj) => Ok(obj.keys().cloned().collect()),
                None => Err(DatasetError::Parse(
                    "JSON dataset must be an object or an array of objects".into(),
                )),
            }
        }
    }
}

fn preview_rows(path: &Path, format: DatasetFormat) -> Result<Vec<Value>, DatasetError> {
    match format {
        DatasetFormat::Csv => {
            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(path)
                .map_err(|e| DatasetError::Parse(e.to_string()))?;
            let mut out = Vec::new();
            for rec in rdr.records().take(PREVIEW_ROWS) {
                let rec = rec.map_err(|e| DatasetError::Parse(e.to_string()))?;
                out.push(json!(rec.iter().collect::<Vec<_>>()));
            }
            Ok(out)
        }
        DatasetFormat::Json => {
            let text = std::fs::read_to_string(path)?;
            let v: Value =
                serde_json::from_str(&text).map_err(|e| DatasetError::Parse(e.to_string()))?;
            Ok(match v {
                Value::Array(items) => items.into_iter().take(PREVIEW_ROWS).collect(),
                other => vec![other],
            })
        }
    }
}

fn write_new(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    file.write_all(bytes)
}

/// Copies the source file into the workspace and registers it.
pub fn upload(
    conn: &Connection,
    workspace: &Path,
    req: &NewDataset<'_>,
) -> Result<DatasetRow, DatasetError> {
    check_extension(req.source_path, req.format)?;
    if !req.source_path.is_file() {
        return Err(DatasetError::MissingFile(
            req.source_path.to_string_lossy().to_string(),
        ));
    }
    let columns = extract_columns(req.source_path, req.format)?;

    let bytes = std::fs::read(req.source_path)?;
    let checksum = format!("{:x}", Sha256::digest(&bytes));

    let original_name = req
        .source_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset");
    let dest_dir: PathBuf = workspace
        .join("datasets")
        .join(format!("course_{}", req.course_id));
    std::fs::create_dir_all(&dest_dir)?;
    let id = Uuid::new_v4().to_string();
    let dest = dest_dir.join(format!(
        "{}_{}_{}_{}",
        req.course_id,
        Utc::now().timestamp(),
        id.split('-').next().unwrap_or(&id),
        clean_file_name(original_name)
    ));
    write_new(&dest, &bytes)?;

    let now = db::now_ts();
    let file_path = dest.to_string_lossy().to_string();
    let columns_json = serde_json::to_string(&columns).unwrap_or_else(|_| "[]".into());
    if let Err(e) = conn.execute(
        "INSERT INTO datasets(id, course_id, name, description, file_path, file_format,
           columns_json, checksum, created_at, updated_at, user_modified)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            req.course_id,
            req.name,
            req.description,
            &file_path,
            req.format.as_str(),
            &columns_json,
            &checksum,
            &now,
            &now,
            req.user_id,
        ),
    ) {
        let _ = std::fs::remove_file(&dest);
        return Err(e.into());
    }
    tracing::info!(dataset_id = %id, course_id = req.course_id, columns = columns.len(), "dataset uploaded");

    Ok(DatasetRow {
        id,
        course_id: req.course_id,
        name: req.name.to_string(),
        description: req.description.map(str::to_string),
        file_path,
        format: req.format,
        columns,
        checksum: Some(checksum),
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get(conn: &Connection, dataset_id: &str) -> Result<Option<DatasetRow>, DatasetError> {
    let sql = format!("SELECT {} FROM datasets WHERE id = ?", DATASET_COLUMNS);
    Ok(conn
        .query_row(&sql, [dataset_id], dataset_from_row)
        .optional()?)
}

/// Looks up a dataset and checks it belongs to `course_id`.
pub fn get_in_course(
    conn: &Connection,
    course_id: i64,
    dataset_id: &str,
) -> Result<DatasetRow, DatasetError> {
    let ds = get(conn, dataset_id)?.ok_or(DatasetError::NotFound)?;
    if ds.course_id != course_id {
        return Err(DatasetError::WrongCourse(course_id));
    }
    Ok(ds)
}

pub fn preview(ds: &DatasetRow) -> Vec<Value> {
    match preview_rows(Path::new(&ds.file_path), ds.format) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(dataset_id = %ds.id, error = %e, "dataset preview unavailable");
            Vec::new()
        }
    }
}

pub fn list(conn: &Connection, course_id: i64) -> Result<Vec<DatasetRow>, DatasetError> {
    let sql = format!(
        "SELECT {} FROM datasets WHERE course_id = ? ORDER BY created_at DESC, rowid DESC",
        DATASET_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([course_id], dataset_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub models: usize,
    pub predictions: usize,
    pub suggestions: usize,
}

/// Removes a dataset with every model trained from it and everything those
/// models produced, then the stored file.
pub fn delete(
    conn: &Connection,
    course_id: i64,
    dataset_id: &str,
) -> Result<DeleteSummary, DatasetError> {
    let ds = get_in_course(conn, course_id, dataset_id)?;

    let tx = conn.unchecked_transaction()?;
    let model_filter = "SELECT id FROM models WHERE dataset_id = ?1";
    let suggestions = tx.execute(
        &format!(
            "DELETE FROM suggestions WHERE prediction_id IN (
               SELECT id FROM predictions WHERE model_id IN ({})
             )",
            model_filter
        ),
        [dataset_id],
    )?;
    let predictions = tx.execute(
        &format!("DELETE FROM predictions WHERE model_id IN ({})", model_filter),
        [dataset_id],
    )?;
    tx.execute(
        &format!("DELETE FROM training_log WHERE model_id IN ({})", model_filter),
        [dataset_id],
    )?;
    let models = tx.execute("DELETE FROM models WHERE dataset_id = ?1", [dataset_id])?;
    tx.execute("DELETE FROM datasets WHERE id = ?1", [dataset_id])?;
    tx.commit()?;

    if let Err(e) = std::fs::remove_file(&ds.file_path) {
        tracing::warn!(path = %ds.file_path, error = %e, "dataset file not removed");
    }
    tracing::info!(dataset_id, models, predictions, "dataset deleted");
    Ok(DeleteSummary {
        models,
        predictions,
        suggestions,
    })
}
