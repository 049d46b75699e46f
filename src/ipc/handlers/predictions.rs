use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{self, optional_bool, optional_i64, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::jobs;
use crate::predictor::{self, PredictSettings};
use serde_json::json;

fn handle_predictions_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let settings = match PredictSettings::load(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let backend = match helpers::backend(conn, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let record = match predictor::predict_learner(conn, &backend, &settings, course_id, user_id) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(course_id, user_id, error = %e, "on-demand prediction failed");
            return err(&req.id, e.code(), e.to_string(), None);
        }
    };
    match predictor::student_view(conn, course_id, user_id, settings.enable_global) {
        Ok(view) => ok(
            &req.id,
            json!({
                "predictionId": record.id,
                "modelId": record.model_id,
                "passProbability": (record.pass_prob * 100.0).round() as i64,
                "riskValue": record.tier.value(),
                "suggestionCount": record.suggestion_count,
                "view": view
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_predictions_get_student(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let viewer_id = match optional_i64(req, "viewerId") {
        Ok(v) => v.unwrap_or(user_id),
        Err(resp) => return resp,
    };
    let can_view_all = match optional_bool(req, "viewerCanViewAll") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if viewer_id != user_id && !can_view_all {
        return err(
            &req.id,
            "no_permission",
            "viewer may only see their own predictions",
            None,
        );
    }

    let enable_global = match config::models_config(conn) {
        Ok(cfg) => cfg.enable_global_model,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match predictor::student_view(conn, course_id, user_id, enable_global) {
        Ok(view) => ok(&req.id, view),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_predictions_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let requested_by = match optional_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match jobs::queue_refresh(conn, course_id) {
        Ok(task_id) => {
            tracing::info!(course_id, ?requested_by, %task_id, "prediction refresh requested");
            ok(&req.id, json!({ "taskId": task_id }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_predictions_course_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = config::models_config(conn).and_then(|cfg| {
        let mut stats = predictor::course_stats(conn, course_id, cfg.enable_global_model)?;
        stats["lastRefresh"] = json!(jobs::last_refresh(conn, course_id)
            .ok()
            .flatten()
            .map(|t| t.to_rfc3339()));
        Ok(stats)
    });
    match result {
        Ok(stats) => ok(&req.id, stats),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_predictions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = config::models_config(conn)
        .and_then(|cfg| predictor::course_list(conn, course_id, cfg.enable_global_model));
    match result {
        Ok(list) => ok(&req.id, list),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "predictions.generate" => Some(handle_predictions_generate(state, req)),
        "predictions.getStudent" => Some(handle_predictions_get_student(state, req)),
        "predictions.refresh" => Some(handle_predictions_refresh(state, req)),
        "predictions.courseStats" => Some(handle_predictions_course_stats(state, req)),
        "predictions.list" => Some(handle_predictions_list(state, req)),
        _ => None,
    }
}
