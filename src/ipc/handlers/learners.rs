use crate::features::{self, Activity, GradeItem, LearnerSnapshot};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_i64;
use crate::ipc::types::{AppState, Request};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

fn optional_list<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Vec<T>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| err(&req.id, "bad_params", format!("invalid {}: {}", key, e), None)),
    }
}

fn handle_learners_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(feature_map) = req.params.get("features").and_then(|v| v.as_object()).cloned() else {
        return err(&req.id, "bad_params", "features must be an object", None);
    };
    let activities: Vec<Activity> = match optional_list(req, "activities") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let grades: Vec<GradeItem> = match optional_list(req, "grades") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_grade_pct = match req.params.get("courseGradePct") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_f64() {
            Some(p) => Some(p),
            None => return err(&req.id, "bad_params", "courseGradePct must be a number", None),
        },
    };

    let snapshot = LearnerSnapshot {
        course_id,
        user_id,
        features: feature_map,
        activities,
        grades,
        course_grade_pct,
    };
    if let Err(e) = features::upsert_learner(conn, &snapshot) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "userId": user_id,
            "engagementScore": features::engagement_score(&snapshot.features)
        }),
    )
}

fn handle_learners_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match features::learner_ids(conn, course_id) {
        Ok(ids) => ok(&req.id, json!({ "userIds": ids })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "learners.upsert" => Some(handle_learners_upsert(state, req)),
        "learners.list" => Some(handle_learners_list(state, req)),
        _ => None,
    }
}
