use crate::backend::TrainOutcome;
use crate::db;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::{json, Value};
use uuid::Uuid;

/// Course id used for the site-wide model scope.
pub const GLOBAL_COURSE_ID: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    RandomForest,
    LogisticRegression,
    Svm,
    DecisionTree,
    Knn,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::RandomForest,
        Algorithm::LogisticRegression,
        Algorithm::Svm,
        Algorithm::DecisionTree,
        Algorithm::Knn,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "randomforest" => Some(Self::RandomForest),
            "logisticregression" => Some(Self::LogisticRegression),
            "svm" => Some(Self::Svm),
            "decisiontree" => Some(Self::DecisionTree),
            "knn" => Some(Self::Knn),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RandomForest => "randomforest",
            Self::LogisticRegression => "logisticregression",
            Self::Svm => "svm",
            Self::DecisionTree => "decisiontree",
            Self::Knn => "knn",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::RandomForest => "Random Forest",
            Self::LogisticRegression => "Logistic Regression",
            Self::Svm => "Support Vector Machine",
            Self::DecisionTree => "Decision Tree",
            Self::Knn => "K-Nearest Neighbors",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainStatus {
    Pending,
    Training,
    Complete,
    Failed,
}

impl TrainStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "training" => Some(Self::Training),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Training => "training",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRow {
    pub id: String,
    pub course_id: i64,
    pub dataset_id: Option<String>,
    pub model_name: String,
    pub backend_model_id: Option<String>,
    pub model_path: Option<String>,
    pub algorithm: String,
    pub features: Value,
    pub accuracy: Option<f64>,
    pub metrics: Value,
    pub active: bool,
    pub train_status: TrainStatus,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ModelRow {
    pub fn is_global(&self) -> bool {
        self.course_id == GLOBAL_COURSE_ID
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "courseId": self.course_id,
            "isGlobal": self.is_global(),
            "datasetId": self.dataset_id,
            "modelName": self.model_name,
            "backendModelId": self.backend_model_id,
            "modelPath": self.model_path,
            "algorithm": self.algorithm,
            "features": self.features,
            "accuracy": self.accuracy,
            "metrics": self.metrics,
            "active": self.active,
            "trainStatus": self.train_status.as_str(),
            "errorMessage": self.error_message,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model not found")]
    NotFound,
    #[error("model does not belong to course {0}")]
    WrongCourse(i64),
    #[error("model is not ready for use (status: {0})")]
    NotReady(&'static str),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl ModelError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::WrongCourse(_) => "model_not_in_course",
            Self::NotReady(_) => "model_not_ready",
            Self::Db(_) => "db_tx_failed",
        }
    }
}

const MODEL_COLUMNS: &str = "id, course_id, dataset_id, model_name, backend_model_id, model_path,
    algorithm, features_json, accuracy, metrics_json, active, train_status, error_message,
    created_at, updated_at";

fn parse_json_column(raw: Option<String>, fallback: Value) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(fallback)
}

fn model_from_row(row: &Row) -> rusqlite::Result<ModelRow> {
    let status_raw: String = row.get(11)?;
    Ok(ModelRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        dataset_id: row.get(2)?,
        model_name: row.get(3)?,
        backend_model_id: row.get(4)?,
        model_path: row.get(5)?,
        algorithm: row.get(6)?,
        features: parse_json_column(row.get(7)?, json!([])),
        accuracy: row.get(8)?,
        metrics: parse_json_column(row.get(9)?, json!({})),
        active: row.get::<_, i64>(10)? != 0,
        train_status: TrainStatus::parse(&status_raw).unwrap_or(TrainStatus::Failed),
        error_message: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

pub fn get_model(conn: &Connection, model_id: &str) -> anyhow::Result<Option<ModelRow>> {
    let sql = format!("SELECT {} FROM models WHERE id = ?", MODEL_COLUMNS);
    Ok(conn
        .query_row(&sql, [model_id], model_from_row)
        .optional()?)
}

pub fn list_models(
    conn: &Connection,
    course_id: i64,
    include_global: bool,
) -> anyhow::Result<Vec<ModelRow>> {
    let sql = format!(
        "SELECT {} FROM models
         WHERE course_id = ?1 OR (?2 = 1 AND course_id = 0)
         ORDER BY created_at DESC, rowid DESC",
        MODEL_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((course_id, include_global as i64), model_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn model_display_name(algorithm: Algorithm) -> String {
    format!(
        "{} Model - {}",
        algorithm.display_name(),
        Utc::now().format("%Y-%m-%d %H:%M")
    )
}

pub fn insert_pending_model(
    conn: &Connection,
    course_id: i64,
    dataset_id: &str,
    algorithm: Algorithm,
    user_id: Option<i64>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO models(id, course_id, dataset_id, model_name, algorithm, active,
           train_status, created_at, updated_at, user_modified)
         VALUES(?, ?, ?, ?, ?, 0, 'pending', ?, ?, ?)",
        (
            &id,
            course_id,
            dataset_id,
            model_display_name(algorithm),
            algorithm.as_str(),
            &now,
            &now,
            user_id,
        ),
    )?;
    Ok(id)
}

pub fn log_event(
    conn: &Connection,
    model_id: &str,
    event: &str,
    message: &str,
    level: LogLevel,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO training_log(id, model_id, event, message, level, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            model_id,
            event,
            message,
            level.as_str(),
            db::now_ts(),
        ),
    )?;
    Ok(())
}

pub fn training_log(conn: &Connection, model_id: &str) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(
        "SELECT event, message, level, created_at FROM training_log
         WHERE model_id = ?
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map([model_id], |row| {
            let event: String = row.get(0)?;
            let message: String = row.get(1)?;
            let level: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "event": event,
                "message": message,
                "level": level,
                "createdAt": created_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves a model to `status` and records the transition in the training log.
pub fn update_status(
    conn: &Connection,
    model_id: &str,
    status: TrainStatus,
    error_message: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE models SET train_status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        (status.as_str(), error_message, db::now_ts(), model_id),
    )?;
    let level = if status == TrainStatus::Failed {
        LogLevel::Error
    } else {
        LogLevel::Info
    };
    let message = match error_message {
        Some(m) => format!("status changed to {}: {}", status.as_str(), m),
        None => format!("status changed to {}", status.as_str()),
    };
    log_event(conn, model_id, "status_change", &message, level)?;
    tracing::info!(model_id, status = status.as_str(), "model status changed");
    Ok(())
}

pub fn mark_complete(conn: &Connection, model_id: &str, outcome: &TrainOutcome) -> anyhow::Result<()> {
    let features = serde_json::to_string(&outcome.feature_names)?;
    conn.execute(
        "UPDATE models
         SET backend_model_id = ?, model_path = ?, algorithm = COALESCE(?, algorithm),
             features_json = ?, accuracy = ?, metrics_json = ?, error_message = NULL,
             updated_at = ?
         WHERE id = ?",
        (
            &outcome.backend_model_id,
            &outcome.model_path,
            &outcome.algorithm,
            features,
            outcome.accuracy,
            outcome.metrics.to_string(),
            db::now_ts(),
            model_id,
        ),
    )?;
    update_status(conn, model_id, TrainStatus::Complete, None)?;
    let summary = match outcome.accuracy {
        Some(a) => format!("training complete, accuracy {:.4}", a),
        None => "training complete".to_string(),
    };
    log_event(conn, model_id, "complete", &summary, LogLevel::Info)?;
    Ok(())
}

/// Deactivates every other model in the same scope, then activates this one.
pub fn activate(conn: &Connection, course_id: i64, model_id: &str) -> Result<ModelRow, ModelError> {
    let sql = format!("SELECT {} FROM models WHERE id = ?", MODEL_COLUMNS);
    let model = conn
        .query_row(&sql, [model_id], model_from_row)
        .optional()?
        .ok_or(ModelError::NotFound)?;
    if model.course_id != course_id {
        return Err(ModelError::WrongCourse(course_id));
    }
    if model.train_status != TrainStatus::Complete {
        return Err(ModelError::NotReady(model.train_status.as_str()));
    }

    let now = db::now_ts();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE models SET active = 0, updated_at = ? WHERE course_id = ? AND active = 1",
        (&now, model.course_id),
    )?;
    tx.execute(
        "UPDATE models SET active = 1, updated_at = ? WHERE id = ?",
        (&now, model_id),
    )?;
    tx.commit()?;
    tracing::info!(model_id, course_id, "model activated");

    Ok(ModelRow {
        active: true,
        updated_at: now,
        ..model
    })
}

pub fn deactivate(conn: &Connection, course_id: i64, model_id: &str) -> Result<(), ModelError> {
    let owner: Option<i64> = conn
        .query_row("SELECT course_id FROM models WHERE id = ?", [model_id], |r| {
            r.get(0)
        })
        .optional()?;
    match owner {
        None => return Err(ModelError::NotFound),
        Some(c) if c != course_id => return Err(ModelError::WrongCourse(course_id)),
        Some(_) => {}
    }
    conn.execute(
        "UPDATE models SET active = 0, updated_at = ? WHERE id = ?",
        (db::now_ts(), model_id),
    )?;
    tracing::info!(model_id, course_id, "model deactivated");
    Ok(())
}

fn active_model_in_scope(conn: &Connection, course_id: i64) -> anyhow::Result<Option<ModelRow>> {
    let sql = format!(
        "SELECT {} FROM models
         WHERE course_id = ? AND active = 1 AND train_status = 'complete'
         ORDER BY updated_at DESC, rowid DESC
         LIMIT 1",
        MODEL_COLUMNS
    );
    Ok(conn
        .query_row(&sql, [course_id], model_from_row)
        .optional()?)
}

/// The model that answers predictions for a course: its own active model,
/// else the active global model when global models are enabled.
pub fn resolve_active_model(
    conn: &Connection,
    course_id: i64,
    enable_global: bool,
) -> anyhow::Result<Option<ModelRow>> {
    if let Some(m) = active_model_in_scope(conn, course_id)? {
        return Ok(Some(m));
    }
    if enable_global && course_id != GLOBAL_COURSE_ID {
        return active_model_in_scope(conn, GLOBAL_COURSE_ID);
    }
    Ok(None)
}

/// Marks pending/training models without a live train task as failed.
pub fn cleanup_pending(conn: &Connection, course_id: Option<i64>) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT m.id FROM models m
         WHERE m.train_status IN ('pending', 'training')
           AND (?1 IS NULL OR m.course_id = ?1)
           AND NOT EXISTS (
             SELECT 1 FROM tasks t
             WHERE t.kind = 'train_model'
               AND t.status IN ('queued', 'running')
               AND json_extract(t.payload_json, '$.modelId') = m.id
           )
         ORDER BY m.created_at",
    )?;
    let stale = stmt
        .query_map([course_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for id in &stale {
        update_status(
            conn,
            id,
            TrainStatus::Failed,
            Some("Task missing - state fixed automatically"),
        )?;
    }
    if !stale.is_empty() {
        tracing::warn!(count = stale.len(), "stale training models marked failed");
    }
    Ok(stale)
}
