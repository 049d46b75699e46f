use crate::config;
use crate::datasets;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_bool, optional_i64, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::jobs;
use crate::models::{self, Algorithm, LogLevel, GLOBAL_COURSE_ID};
use serde_json::json;

fn handle_models_train(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let dataset_id = match required_str(req, "datasetId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match optional_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let algorithm = match optional_str(req, "algorithm") {
        Ok(Some(raw)) => match Algorithm::parse(raw) {
            Some(a) => a,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown algorithm: {}", raw),
                    Some(json!({ "allowed": Algorithm::ALL.map(|a| a.as_str()) })),
                )
            }
        },
        Ok(None) => match config::models_config(conn) {
            Ok(cfg) => cfg.default_algorithm,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(resp) => return resp,
    };

    if course_id == GLOBAL_COURSE_ID {
        match config::models_config(conn) {
            Ok(cfg) if !cfg.enable_global_model => {
                return err(
                    &req.id,
                    "global_model_disabled",
                    "global models are disabled in the models settings",
                    None,
                )
            }
            Ok(_) => {}
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
        // global models may learn from any course's dataset
        match datasets::get(conn, dataset_id) {
            Ok(Some(_)) => {}
            Ok(None) => return err(&req.id, "not_found", "dataset not found", None),
            Err(e) => return err(&req.id, e.code(), e.to_string(), None),
        }
    } else if let Err(e) = datasets::get_in_course(conn, course_id, dataset_id) {
        return err(&req.id, e.code(), e.to_string(), None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let model_id = match models::insert_pending_model(&tx, course_id, dataset_id, algorithm, user_id) {
        Ok(id) => id,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    if let Err(e) = models::log_event(
        &tx,
        &model_id,
        "scheduled",
        &format!("Training scheduled with {}", algorithm.display_name()),
        LogLevel::Info,
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    let task_id = match jobs::queue_train(&tx, &model_id, user_id) {
        Ok(id) => id,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    tracing::info!(%model_id, course_id, algorithm = algorithm.as_str(), "training scheduled");
    ok(&req.id, json!({ "modelId": model_id, "taskId": task_id }))
}

fn handle_models_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let include_global = match optional_bool(req, "includeGlobal") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match models::list_models(conn, course_id, include_global) {
        Ok(rows) => ok(
            &req.id,
            json!({ "models": rows.iter().map(|m| m.to_json()).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_models_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let model_id = match required_str(req, "modelId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match models::get_model(conn, model_id) {
        Ok(Some(m)) => ok(&req.id, json!({ "model": m.to_json() })),
        Ok(None) => err(&req.id, "not_found", "model not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_models_training_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let model_id = match required_str(req, "modelId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match models::get_model(conn, model_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "model not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match models::training_log(conn, model_id) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_models_activate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let model_id = match required_str(req, "modelId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let model = match models::activate(conn, course_id, model_id) {
        Ok(m) => m,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };

    let mut refresh_task = None;
    if course_id != GLOBAL_COURSE_ID {
        match jobs::queue_refresh(conn, course_id) {
            Ok(id) => refresh_task = Some(id),
            Err(e) => tracing::warn!(course_id, error = %e, "refresh not queued after activation"),
        }
    }
    ok(
        &req.id,
        json!({ "model": model.to_json(), "refreshTaskId": refresh_task }),
    )
}

fn handle_models_deactivate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let model_id = match required_str(req, "modelId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match models::deactivate(conn, course_id, model_id) {
        Ok(()) => ok(&req.id, json!({ "modelId": model_id, "active": false })),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_models_cleanup_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match optional_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match models::cleanup_pending(conn, course_id) {
        Ok(fixed) => ok(&req.id, json!({ "fixed": fixed })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "models.train" => Some(handle_models_train(state, req)),
        "models.list" => Some(handle_models_list(state, req)),
        "models.get" => Some(handle_models_get(state, req)),
        "models.trainingLog" => Some(handle_models_training_log(state, req)),
        "models.activate" => Some(handle_models_activate(state, req)),
        "models.deactivate" => Some(handle_models_deactivate(state, req)),
        "models.cleanupPending" => Some(handle_models_cleanup_pending(state, req)),
        _ => None,
    }
}
