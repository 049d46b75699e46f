use crate::backend::{PredictionBackend, TrainRequest};
use crate::config;
use crate::datasets;
use crate::db;
use crate::features;
use crate::models::{self, LogLevel, TrainStatus};
use crate::predictor::{self, PredictSettings};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    TrainModel,
    RefreshPredictions,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrainModel => "train_model",
            Self::RefreshPredictions => "refresh_predictions",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "train_model" => Some(Self::TrainModel),
            "refresh_predictions" => Some(Self::RefreshPredictions),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

fn insert_task(conn: &Connection, kind: TaskKind, payload: &Value) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tasks(id, kind, payload_json, status, created_at)
         VALUES(?, ?, ?, 'queued', ?)",
        (&id, kind.as_str(), payload.to_string(), db::now_ts()),
    )?;
    tracing::info!(task_id = %id, kind = kind.as_str(), "task queued");
    Ok(id)
}

pub fn queue_train(conn: &Connection, model_id: &str, user_id: Option<i64>) -> anyhow::Result<String> {
    insert_task(
        conn,
        TaskKind::TrainModel,
        &json!({ "modelId": model_id, "userId": user_id }),
    )
}

/// Queues a refresh for the course unless one is already waiting.
pub fn queue_refresh(conn: &Connection, course_id: i64) -> anyhow::Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM tasks
             WHERE kind = 'refresh_predictions' AND status = 'queued'
               AND json_extract(payload_json, '$.courseId') = ?
             LIMIT 1",
            [course_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    insert_task(conn, TaskKind::RefreshPredictions, &json!({ "courseId": course_id }))
}

pub fn list_tasks(conn: &Connection, status: Option<TaskStatus>) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, payload_json, status, message, created_at, started_at, finished_at
         FROM tasks
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([status.map(|s| s.as_str())], |row| {
            let id: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let payload: String = row.get(2)?;
            let status: String = row.get(3)?;
            let message: Option<String> = row.get(4)?;
            let created_at: String = row.get(5)?;
            let started_at: Option<String> = row.get(6)?;
            let finished_at: Option<String> = row.get(7)?;
            Ok(json!({
                "id": id,
                "kind": kind,
                "payload": serde_json::from_str::<Value>(&payload).unwrap_or(Value::Null),
                "status": status,
                "message": message,
                "createdAt": created_at,
                "startedAt": started_at,
                "finishedAt": finished_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: String,
    pub kind: String,
    pub status: TaskStatus,
    pub message: Option<String>,
    pub result: Value,
}

impl TaskReport {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "kind": self.kind,
            "status": self.status.as_str(),
            "message": self.message,
            "result": self.result,
        })
    }
}

/// Claims and runs the oldest queued task. One task at a time.
pub fn run_next(
    conn: &Connection,
    backend: &dyn PredictionBackend,
) -> anyhow::Result<Option<TaskReport>> {
    let next: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, kind, payload_json FROM tasks
             WHERE status = 'queued'
             ORDER BY created_at, rowid
             LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, kind_raw, payload_raw)) = next else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE tasks SET status = 'running', started_at = ? WHERE id = ?",
        (db::now_ts(), &id),
    )?;

    let span = tracing::info_span!("task", task_id = %id, kind = %kind_raw);
    let _guard = span.enter();

    let payload: Value = serde_json::from_str(&payload_raw).unwrap_or(Value::Null);
    let outcome = match TaskKind::parse(&kind_raw) {
        Some(TaskKind::TrainModel) => run_train(conn, backend, &payload),
        Some(TaskKind::RefreshPredictions) => run_refresh(conn, backend, &payload),
        None => Err(anyhow!("unknown task kind: {}", kind_raw)),
    };

    let (status, message, result) = match outcome {
        Ok((message, result)) => (TaskStatus::Done, message, result),
        Err(e) => {
            tracing::error!(error = %e, "task failed");
            (TaskStatus::Failed, Some(format!("{:#}", e)), Value::Null)
        }
    };
    conn.execute(
        "UPDATE tasks SET status = ?, message = ?, finished_at = ? WHERE id = ?",
        (status.as_str(), &message, db::now_ts(), &id),
    )?;

    Ok(Some(TaskReport {
        id,
        kind: kind_raw,
        status,
        message,
        result,
    }))
}

pub fn run_pending(
    conn: &Connection,
    backend: &dyn PredictionBackend,
    max: usize,
) -> anyhow::Result<Vec<TaskReport>> {
    let mut out = Vec::new();
    while out.len() < max {
        match run_next(conn, backend)? {
            Some(r) => out.push(r),
            None => break,
        }
    }
    Ok(out)
}

type JobOutput = anyhow::Result<(Option<String>, Value)>;

fn run_train(conn: &Connection, backend: &dyn PredictionBackend, payload: &Value) -> JobOutput {
    let model_id = payload
        .get("modelId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("payload missing modelId"))?;
    let user_id = payload.get("userId").and_then(|v| v.as_i64()).unwrap_or(0);
    let model = models::get_model(conn, model_id)?
        .ok_or_else(|| anyhow!("model {} not found", model_id))?;

    let dataset = match model.dataset_id.as_deref() {
        Some(ds) => datasets::get(conn, ds)?,
        None => None,
    };
    let Some(dataset) = dataset else {
        let msg = "dataset not found";
        models::update_status(conn, model_id, TrainStatus::Failed, Some(msg))?;
        return Err(anyhow!(msg));
    };

    models::update_status(conn, model_id, TrainStatus::Training, None)?;
    let req = TrainRequest {
        courseid: model.course_id,
        dataset_filepath: dataset.file_path.clone(),
        algorithm: model.algorithm.clone(),
        userid: user_id,
    };
    match backend.train(&req) {
        Ok(outcome) => {
            models::mark_complete(conn, model_id, &outcome)?;
            let enable_global = config::models_config(conn)?.enable_global_model;
            let mut refresh_task = None;
            if !model.is_global()
                && models::resolve_active_model(conn, model.course_id, enable_global)?.is_some()
            {
                refresh_task = Some(queue_refresh(conn, model.course_id)?);
            }
            Ok((
                Some(format!("model {} trained", model_id)),
                json!({
                    "modelId": model_id,
                    "backendModelId": outcome.backend_model_id,
                    "accuracy": outcome.accuracy,
                    "refreshTaskId": refresh_task,
                }),
            ))
        }
        Err(e) => {
            let msg = e.to_string();
            models::update_status(conn, model_id, TrainStatus::Failed, Some(&msg))?;
            models::log_event(conn, model_id, "error", &msg, LogLevel::Error)?;
            Err(anyhow::Error::new(e).context("training call failed"))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub model_id: Option<String>,
    pub total: usize,
    pub success: usize,
    pub errors: usize,
}

fn last_refresh_key(course_id: i64) -> String {
    format!("lastrefresh.{}", course_id)
}

/// Predicts every learner of the course; one learner failing does not stop the batch.
pub fn refresh_course(
    conn: &Connection,
    backend: &dyn PredictionBackend,
    course_id: i64,
) -> anyhow::Result<RefreshSummary> {
    let settings = PredictSettings::load(conn)?;
    let Some(model) = models::resolve_active_model(conn, course_id, settings.enable_global)? else {
        tracing::info!(course_id, "no active model, refresh skipped");
        return Ok(RefreshSummary::default());
    };

    let learners = features::learner_ids(conn, course_id)?;
    let mut summary = RefreshSummary {
        model_id: Some(model.id.clone()),
        total: learners.len(),
        ..RefreshSummary::default()
    };
    for user_id in learners {
        match predictor::predict_with_model(conn, backend, &settings, &model, course_id, user_id) {
            Ok(_) => summary.success += 1,
            Err(e) => {
                summary.errors += 1;
                tracing::warn!(course_id, user_id, error = %e, "prediction failed, continuing");
            }
        }
    }

    db::settings_set_json(
        conn,
        &last_refresh_key(course_id),
        &json!({
            "at": db::now_ts(),
            "total": summary.total,
            "success": summary.success,
            "errors": summary.errors,
        }),
    )?;
    tracing::info!(
        course_id,
        total = summary.total,
        success = summary.success,
        errors = summary.errors,
        "refresh finished"
    );
    Ok(summary)
}

fn run_refresh(conn: &Connection, backend: &dyn PredictionBackend, payload: &Value) -> JobOutput {
    let course_id = payload
        .get("courseId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("payload missing courseId"))?;
    let s = refresh_course(conn, backend, course_id)?;
    let message = match &s.model_id {
        None => "no active model".to_string(),
        Some(_) => format!("{} of {} predictions updated", s.success, s.total),
    };
    Ok((
        Some(message),
        json!({
            "courseId": course_id,
            "modelId": s.model_id,
            "total": s.total,
            "success": s.success,
            "errors": s.errors,
        }),
    ))
}

pub fn last_refresh(conn: &Connection, course_id: i64) -> anyhow::Result<Option<DateTime<Utc>>> {
    let Some(v) = db::settings_get_json(conn, &last_refresh_key(course_id))? else {
        return Ok(None);
    };
    let Some(at) = v.get("at").and_then(|a| a.as_str()) else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(at)
        .with_context(|| format!("bad lastrefresh timestamp for course {}", course_id))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Queues refreshes for courses whose predictions are older than the
/// configured interval. Returns the courses queued.
pub fn run_scheduled(conn: &Connection, now: DateTime<Utc>) -> anyhow::Result<Vec<i64>> {
    let cfg = config::models_config(conn)?;
    let interval = Duration::hours(cfg.refresh_interval_hours);
    let mut queued = Vec::new();
    for course_id in features::courses_with_learners(conn)? {
        if models::resolve_active_model(conn, course_id, cfg.enable_global_model)?.is_none() {
            continue;
        }
        let due = match last_refresh(conn, course_id) {
            Ok(Some(last)) => now - last >= interval,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(course_id, error = %e, "treating refresh as due");
                true
            }
        };
        if due {
            queue_refresh(conn, course_id)?;
            queued.push(course_id);
        }
    }
    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, PredictOutcome, PredictRequest, TrainOutcome};
    use crate::features::LearnerSnapshot;
    use crate::models::Algorithm;
    use std::cell::Cell;

    struct FakeBackend {
        fail_train: bool,
        fail_user_feature: Option<i64>,
        predictions: Cell<usize>,
    }

    impl FakeBackend {
        fn ok() -> Self {
            Self { fail_train: false, fail_user_feature: None, predictions: Cell::new(0) }
        }
    }

    impl PredictionBackend for FakeBackend {
        fn health(&self) -> Result<Value, BackendError> {
            Ok(json!({ "status": "ok" }))
        }

        fn train(&self, req: &TrainRequest) -> Result<TrainOutcome, BackendError> {
            if self.fail_train {
                return Err(BackendError::Status { status: 500, detail: "boom".into() });
            }
            assert!(req.dataset_filepath.ends_with(".csv"));
            Ok(TrainOutcome {
                backend_model_id: "backend-7".into(),
                model_path: Some("/models/7.joblib".into()),
                algorithm: Some(req.algorithm.clone()),
                accuracy: Some(0.83),
                metrics: json!({ "accuracy": 0.83 }),
                feature_names: vec!["forum_posts".into()],
            })
        }

        fn predict(&self, req: &PredictRequest) -> Result<PredictOutcome, BackendError> {
            self.predictions.set(self.predictions.get() + 1);
            if let Some(marker) = self.fail_user_feature {
                if req.features.get("marker").and_then(|v| v.as_i64()) == Some(marker) {
                    return Err(BackendError::Malformed("missing prediction".into()));
                }
            }
            Ok(PredictOutcome {
                pass_prob: 0.3,
                prediction: json!(0),
                raw: json!({ "prediction": 0, "probability": 0.3 }),
            })
        }
    }

    fn setup() -> (tempfile::TempDir, Connection, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open");
        conn.execute(
            "INSERT INTO datasets(id, course_id, name, file_path, file_format, columns_json, created_at, updated_at)
             VALUES('ds', 4, 'd', '/data/course_4/train.csv', 'csv', '[]', 't', 't')",
            [],
        )
        .expect("dataset");
        let model = models::insert_pending_model(&conn, 4, "ds", Algorithm::DecisionTree, Some(2))
            .expect("model");
        for user_id in [1, 2, 3] {
            let mut features = serde_json::Map::new();
            features.insert("marker".into(), json!(user_id));
            features::upsert_learner(
                &conn,
                &LearnerSnapshot {
                    course_id: 4,
                    user_id,
                    features,
                    activities: vec![],
                    grades: vec![],
                    course_grade_pct: Some(50.0),
                },
            )
            .expect("learner");
        }
        (dir, conn, model)
    }

    #[test]
    fn train_task_completes_model() {
        let (_dir, conn, model_id) = setup();
        queue_train(&conn, &model_id, Some(2)).expect("queue");
        let report = run_next(&conn, &FakeBackend::ok()).expect("run").expect("task");
        assert_eq!(report.status, TaskStatus::Done);

        let m = models::get_model(&conn, &model_id).expect("get").expect("row");
        assert_eq!(m.train_status, TrainStatus::Complete);
        assert_eq!(m.backend_model_id.as_deref(), Some("backend-7"));
        assert_eq!(m.accuracy, Some(0.83));
        let events: Vec<String> = models::training_log(&conn, &model_id)
            .expect("log")
            .iter()
            .filter_map(|e| e["event"].as_str().map(str::to_string))
            .collect();
        assert!(events.contains(&"complete".to_string()));
        assert!(run_next(&conn, &FakeBackend::ok()).expect("run").is_none());
    }

    #[test]
    fn failed_training_marks_model_failed() {
        let (_dir, conn, model_id) = setup();
        queue_train(&conn, &model_id, None).expect("queue");
        let backend = FakeBackend { fail_train: true, ..FakeBackend::ok() };
        let report = run_next(&conn, &backend).expect("run").expect("task");
        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.message.as_deref().unwrap_or_default().contains("boom"));

        let m = models::get_model(&conn, &model_id).expect("get").expect("row");
        assert_eq!(m.train_status, TrainStatus::Failed);
        assert!(m.error_message.unwrap_or_default().contains("HTTP 500"));
    }

    #[test]
    fn refresh_skips_failing_learner_and_records_counts() {
        let (_dir, conn, model_id) = setup();
        queue_train(&conn, &model_id, None).expect("queue");
        run_next(&conn, &FakeBackend::ok()).expect("train");
        models::activate(&conn, 4, &model_id).expect("activate");

        let backend = FakeBackend { fail_user_feature: Some(2), ..FakeBackend::ok() };
        let summary = refresh_course(&conn, &backend, 4).expect("refresh");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(backend.predictions.get(), 3);
        assert!(last_refresh(&conn, 4).expect("last").is_some());
    }

    #[test]
    fn scheduler_queues_due_courses_once() {
        let (_dir, conn, model_id) = setup();
        let now = Utc::now();
        assert!(run_scheduled(&conn, now).expect("sched").is_empty(), "no active model yet");

        queue_train(&conn, &model_id, None).expect("queue");
        run_next(&conn, &FakeBackend::ok()).expect("train");
        models::activate(&conn, 4, &model_id).expect("activate");

        assert_eq!(run_scheduled(&conn, now).expect("sched"), vec![4]);
        assert_eq!(run_scheduled(&conn, now).expect("sched"), vec![4]);
        let queued = list_tasks(&conn, Some(TaskStatus::Queued)).expect("list");
        assert_eq!(queued.len(), 1, "refresh is deduplicated");

        run_pending(&conn, &FakeBackend::ok(), 10).expect("drain");
        assert!(run_scheduled(&conn, now + Duration::hours(1)).expect("sched").is_empty());
        assert_eq!(
            run_scheduled(&conn, now + Duration::hours(25)).expect("sched"),
            vec![4]
        );
    }
}
