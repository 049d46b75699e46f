use crate::backend::{BackendError, PredictRequest, PredictionBackend};
use crate::config;
use crate::db;
use crate::features;
use crate::models::{self, ModelRow};
use crate::risk::{classify, RiskThresholds, RiskTier};
use crate::suggestions;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("no active model for course {0}")]
    NoActiveModel(i64),
    #[error("no learner data for user {user_id} in course {course_id}")]
    NoLearner { course_id: i64, user_id: i64 },
    #[error("model {0} has no backend model id")]
    ModelNotReady(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PredictError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveModel(_) => "no_active_model",
            Self::NoLearner { .. } => "not_found",
            Self::ModelNotReady(_) => "model_not_ready",
            Self::Backend(e) => e.code(),
            Self::Db(_) => "db_insert_failed",
            Self::Other(_) => "prediction_failed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredictSettings {
    pub thresholds: RiskThresholds,
    pub enable_global: bool,
}

impl PredictSettings {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self {
            thresholds: config::risk_thresholds(conn)?,
            enable_global: config::models_config(conn)?.enable_global_model,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub id: String,
    pub model_id: String,
    pub pass_prob: f64,
    pub tier: RiskTier,
    pub suggestion_count: usize,
}

/// Runs one learner through the course's active model and stores the
/// prediction with its suggestions atomically.
pub fn predict_learner(
    conn: &Connection,
    backend: &dyn PredictionBackend,
    settings: &PredictSettings,
    course_id: i64,
    user_id: i64,
) -> Result<PredictionRecord, PredictError> {
    let model = models::resolve_active_model(conn, course_id, settings.enable_global)?
        .ok_or(PredictError::NoActiveModel(course_id))?;
    predict_with_model(conn, backend, settings, &model, course_id, user_id)
}

pub fn predict_with_model(
    conn: &Connection,
    backend: &dyn PredictionBackend,
    settings: &PredictSettings,
    model: &ModelRow,
    course_id: i64,
    user_id: i64,
) -> Result<PredictionRecord, PredictError> {
    let Some(backend_model_id) = model.backend_model_id.clone() else {
        return Err(PredictError::ModelNotReady(model.id.clone()));
    };
    let snapshot = features::get_learner(conn, course_id, user_id)?
        .ok_or(PredictError::NoLearner { course_id, user_id })?;

    let outcome = backend.predict(&PredictRequest {
        model_id: backend_model_id,
        features: features::enrich_features(&snapshot),
    })?;
    let tier = classify(outcome.pass_prob, &settings.thresholds);
    let items = suggestions::generate(
        tier,
        &snapshot.activities,
        &snapshot.grades,
        snapshot.course_grade_pct,
    );

    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO predictions(id, model_id, course_id, user_id, pass_prob, risk_value,
           prediction_json, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &model.id,
            course_id,
            user_id,
            outcome.pass_prob,
            tier.value(),
            outcome.raw.to_string(),
            &now,
            &now,
        ),
    )?;
    suggestions::insert_for_prediction(&tx, &id, course_id, user_id, &items)?;
    tx.commit()?;

    tracing::info!(
        course_id,
        user_id,
        model_id = %model.id,
        pass_prob = outcome.pass_prob,
        prediction = %outcome.prediction,
        risk = tier.value(),
        "prediction stored"
    );
    Ok(PredictionRecord {
        id,
        model_id: model.id.clone(),
        pass_prob: outcome.pass_prob,
        tier,
        suggestion_count: items.len(),
    })
}

struct StoredPrediction {
    id: String,
    user_id: i64,
    pass_prob: f64,
    risk_value: i64,
    created_at: String,
    updated_at: String,
}

impl StoredPrediction {
    fn to_json(&self) -> Value {
        let tier = RiskTier::from_value(self.risk_value).unwrap_or(RiskTier::High);
        json!({
            "id": self.id,
            "userId": self.user_id,
            "passProbability": (self.pass_prob * 100.0).round() as i64,
            "riskLevel": self.risk_value,
            "riskText": tier.label(),
            "riskKey": tier.key(),
            "riskClass": tier.css_class(),
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

fn latest_for_scope(
    conn: &Connection,
    course_id: i64,
    user_id: i64,
    model_scope: i64,
) -> rusqlite::Result<Option<StoredPrediction>> {
    conn.query_row(
        "SELECT p.id, p.user_id, p.pass_prob, p.risk_value, p.created_at, p.updated_at
         FROM predictions p
         JOIN models m ON m.id = p.model_id
         WHERE p.course_id = ? AND p.user_id = ? AND m.course_id = ? AND m.active = 1
         ORDER BY p.created_at DESC, p.rowid DESC
         LIMIT 1",
        (course_id, user_id, model_scope),
        |r| {
            Ok(StoredPrediction {
                id: r.get(0)?,
                user_id: r.get(1)?,
                pass_prob: r.get(2)?,
                risk_value: r.get(3)?,
                created_at: r.get(4)?,
                updated_at: r.get(5)?,
            })
        },
    )
    .optional()
}

/// The learner-facing prediction: course model first, then the global one.
pub fn student_view(
    conn: &Connection,
    course_id: i64,
    user_id: i64,
    enable_global: bool,
) -> anyhow::Result<Value> {
    let mut found = latest_for_scope(conn, course_id, user_id, course_id)?;
    if found.is_none() && enable_global && course_id != models::GLOBAL_COURSE_ID {
        found = latest_for_scope(conn, course_id, user_id, models::GLOBAL_COURSE_ID)?;
    }
    let Some(p) = found else {
        return Ok(json!({
            "hasPrediction": false,
            "message": "No prediction is available for you in this course yet."
        }));
    };
    let items = suggestions::list_for_prediction(conn, &p.id)?;
    Ok(json!({
        "hasPrediction": true,
        "prediction": p.to_json(),
        "suggestions": items,
    }))
}

/// Latest prediction per learner from the model currently answering for the course.
fn latest_per_learner(
    conn: &Connection,
    course_id: i64,
    enable_global: bool,
) -> anyhow::Result<(Option<ModelRow>, Vec<StoredPrediction>)> {
    let Some(model) = models::resolve_active_model(conn, course_id, enable_global)? else {
        return Ok((None, Vec::new()));
    };
    let mut stmt = conn.prepare(
        "SELECT id, user_id, pass_prob, risk_value, created_at, updated_at
         FROM predictions
         WHERE course_id = ? AND model_id = ?
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map((course_id, &model.id), |r| {
            Ok(StoredPrediction {
                id: r.get(0)?,
                user_id: r.get(1)?,
                pass_prob: r.get(2)?,
                risk_value: r.get(3)?,
                created_at: r.get(4)?,
                updated_at: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut seen = HashSet::new();
    let latest = rows
        .into_iter()
        .filter(|p| seen.insert(p.user_id))
        .collect();
    Ok((Some(model), latest))
}

pub fn course_stats(conn: &Connection, course_id: i64, enable_global: bool) -> anyhow::Result<Value> {
    let (model, latest) = latest_per_learner(conn, course_id, enable_global)?;
    let count = |tier: RiskTier| latest.iter().filter(|p| p.risk_value == tier.value()).count();
    Ok(json!({
        "modelId": model.as_ref().map(|m| m.id.clone()),
        "isGlobalModel": model.as_ref().map(|m| m.is_global()).unwrap_or(false),
        "lowRisk": count(RiskTier::Low),
        "mediumRisk": count(RiskTier::Medium),
        "highRisk": count(RiskTier::High),
        "total": latest.len(),
    }))
}

pub fn course_list(conn: &Connection, course_id: i64, enable_global: bool) -> anyhow::Result<Value> {
    let (model, mut latest) = latest_per_learner(conn, course_id, enable_global)?;
    latest.sort_by(|a, b| {
        b.risk_value
            .cmp(&a.risk_value)
            .then(a.user_id.cmp(&b.user_id))
    });
    Ok(json!({
        "modelId": model.map(|m| m.id),
        "predictions": latest.iter().map(StoredPrediction::to_json).collect::<Vec<_>>(),
    }))
}
