use crate::db;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A course activity as the host reports it for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub cm_id: i64,
    pub name: String,
    pub modname: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeItem {
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_module: Option<String>,
    #[serde(default)]
    pub grade: Option<f64>,
    pub grade_max: f64,
}

impl GradeItem {
    pub fn percent(&self) -> Option<f64> {
        match self.grade {
            Some(g) if self.grade_max > 0.0 => Some(100.0 * g / self.grade_max),
            _ => None,
        }
    }
}

/// Host-pushed state of one learner in one course. Stands in for direct
/// reads of the host's logs, completion and gradebook tables.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerSnapshot {
    pub course_id: i64,
    pub user_id: i64,
    pub features: Map<String, Value>,
    pub activities: Vec<Activity>,
    pub grades: Vec<GradeItem>,
    pub course_grade_pct: Option<f64>,
}

fn positive(features: &Map<String, Value>, key: &str) -> Option<f64> {
    features
        .get(key)
        .and_then(|v| v.as_f64())
        .filter(|v| *v > 0.0)
}

/// Average of the engagement factors present, 0.5 when none are.
pub fn engagement_score(features: &Map<String, Value>) -> f64 {
    let scaled = [
        ("current_course_modules_accessed", 10.0),
        ("current_course_forum_posts", 5.0),
        ("current_course_assignment_submissions", 3.0),
        ("current_course_quiz_attempts", 3.0),
    ];
    let mut score = 0.0;
    let mut factors = 0u32;
    for (key, cap) in scaled {
        if let Some(v) = positive(features, key) {
            score += (v / cap).min(1.0);
            factors += 1;
        }
    }
    if let Some(days) = features.get("days_since_last_access").and_then(|v| v.as_f64()) {
        if days < 30.0 {
            score += (1.0 - days / 30.0).max(0.0);
            factors += 1;
        }
    }
    if factors == 0 {
        0.5
    } else {
        score / f64::from(factors)
    }
}

/// Fills derived features the backend expects but the host did not send.
pub fn enrich_features(snapshot: &LearnerSnapshot) -> Map<String, Value> {
    let mut f = snapshot.features.clone();
    if !f.contains_key("engagement_score") {
        f.insert("engagement_score".into(), json!(engagement_score(&snapshot.features)));
    }
    if !f.contains_key("grade_average") {
        let pcts: Vec<f64> = snapshot.grades.iter().filter_map(|g| g.percent()).collect();
        let avg = if pcts.is_empty() {
            0.0
        } else {
            pcts.iter().sum::<f64>() / (100.0 * pcts.len() as f64)
        };
        f.insert("grade_average".into(), json!(avg));
        f.insert("grade_count".into(), json!(pcts.len()));
    }
    if !f.contains_key("current_course_grade_percentage") {
        f.insert(
            "current_course_grade_percentage".into(),
            json!(snapshot.course_grade_pct.unwrap_or(0.0)),
        );
    }
    f
}

pub fn upsert_learner(conn: &Connection, s: &LearnerSnapshot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO learners(course_id, user_id, features_json, activities_json, grades_json,
           course_grade_pct, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(course_id, user_id) DO UPDATE SET
           features_json = excluded.features_json,
           activities_json = excluded.activities_json,
           grades_json = excluded.grades_json,
           course_grade_pct = excluded.course_grade_pct,
           updated_at = excluded.updated_at",
        (
            s.course_id,
            s.user_id,
            Value::Object(s.features.clone()).to_string(),
            serde_json::to_string(&s.activities)?,
            serde_json::to_string(&s.grades)?,
            s.course_grade_pct,
            db::now_ts(),
        ),
    )?;
    Ok(())
}

pub fn get_learner(
    conn: &Connection,
    course_id: i64,
    user_id: i64,
) -> anyhow::Result<Option<LearnerSnapshot>> {
    let row: Option<(String, String, String, Option<f64>)> = conn
        .query_row(
            "SELECT features_json, activities_json, grades_json, course_grade_pct
             FROM learners WHERE course_id = ? AND user_id = ?",
            (course_id, user_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((features, activities, grades, course_grade_pct)) = row else {
        return Ok(None);
    };
    let features = match serde_json::from_str::<Value>(&features)? {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    Ok(Some(LearnerSnapshot {
        course_id,
        user_id,
        features,
        activities: serde_json::from_str(&activities)?,
        grades: serde_json::from_str(&grades)?,
        course_grade_pct,
    }))
}

pub fn learner_ids(conn: &Connection, course_id: i64) -> anyhow::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id FROM learners WHERE course_id = ? ORDER BY user_id")?;
    let ids = stmt
        .query_map([course_id], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn courses_with_learners(conn: &Connection) -> anyhow::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT DISTINCT course_id FROM learners ORDER BY course_id")?;
    let ids = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}
