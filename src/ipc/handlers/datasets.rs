use crate::datasets::{self, DatasetFormat, NewDataset};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_i64, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::Path;

fn handle_datasets_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(workspace)) = (state.db.as_ref(), state.workspace.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim(),
        Err(resp) => return resp,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let description = match optional_str(req, "description") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let format = match required_str(req, "format") {
        Ok(v) => match DatasetFormat::parse(v) {
            Some(f) => f,
            None => return err(&req.id, "bad_params", "format must be csv or json", None),
        },
        Err(resp) => return resp,
    };
    let source_path = match required_str(req, "sourcePath") {
        Ok(v) => Path::new(v),
        Err(resp) => return resp,
    };
    let user_id = match optional_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let new = NewDataset {
        course_id,
        name,
        description,
        format,
        source_path,
        user_id,
    };
    match datasets::upload(conn, workspace, &new) {
        Ok(ds) => ok(&req.id, json!({ "dataset": ds.to_json() })),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_datasets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match datasets::list(conn, course_id) {
        Ok(rows) => ok(
            &req.id,
            json!({ "datasets": rows.iter().map(|d| d.to_json()).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_datasets_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let dataset_id = match required_str(req, "datasetId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match datasets::get(conn, dataset_id) {
        Ok(Some(ds)) => {
            let preview = datasets::preview(&ds);
            ok(&req.id, json!({ "dataset": ds.to_json(), "preview": preview }))
        }
        Ok(None) => err(&req.id, "not_found", "dataset not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_datasets_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match datasets::delete(conn, course_id, dataset_id) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "deleted": true,
                "models": summary.models,
                "predictions": summary.predictions,
                "suggestions": summary.suggestions
            }),
        ),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "datasets.upload" => Some(handle_datasets_upload(state, req)),
        "datasets.list" => Some(handle_datasets_list(state, req)),
        "datasets.get" => Some(handle_datasets_get(state, req)),
        "datasets.delete" => Some(handle_datasets_delete(state, req)),
        _ => None,
    }
}
