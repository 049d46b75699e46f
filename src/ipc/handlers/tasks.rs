use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{self, optional_i64, optional_str};
use crate::ipc::types::{AppState, Request};
use crate::jobs::{self, TaskStatus};
use chrono::{DateTime, Utc};
use serde_json::json;

const MAX_TASKS_PER_CALL: i64 = 100;

fn handle_tasks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let status = match optional_str(req, "status") {
        Ok(None) => None,
        Ok(Some(raw)) => match TaskStatus::parse(raw) {
            Some(s) => Some(s),
            None => return err(&req.id, "bad_params", format!("unknown status: {}", raw), None),
        },
        Err(resp) => return resp,
    };
    match jobs::list_tasks(conn, status) {
        Ok(tasks) => ok(&req.id, json!({ "tasks": tasks })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_tasks_run_next(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let backend = match helpers::backend(conn, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match jobs::run_next(conn, &backend) {
        Ok(report) => ok(&req.id, json!({ "task": report.map(|r| r.to_json()) })),
        Err(e) => err(&req.id, "db_update_failed", format!("{:#}", e), None),
    }
}

fn handle_tasks_run_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let max = match optional_i64(req, "max") {
        Ok(v) => v.unwrap_or(10),
        Err(resp) => return resp,
    };
    if !(1..=MAX_TASKS_PER_CALL).contains(&max) {
        return err(
            &req.id,
            "bad_params",
            format!("max must be between 1 and {}", MAX_TASKS_PER_CALL),
            None,
        );
    }
    let backend = match helpers::backend(conn, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match jobs::run_pending(conn, &backend, max as usize) {
        Ok(reports) => ok(
            &req.id,
            json!({ "tasks": reports.iter().map(|r| r.to_json()).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_update_failed", format!("{:#}", e), None),
    }
}

fn handle_tasks_run_scheduled(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let now = match optional_str(req, "now") {
        Ok(None) => Utc::now(),
        Ok(Some(raw)) => match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => return err(&req.id, "bad_params", format!("now: {}", e), None),
        },
        Err(resp) => return resp,
    };
    match jobs::run_scheduled(conn, now) {
        Ok(courses) => ok(&req.id, json!({ "queuedCourses": courses })),
        Err(e) => err(&req.id, "db_query_failed", format!("{:#}", e), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tasks.list" => Some(handle_tasks_list(state, req)),
        "tasks.runNext" => Some(handle_tasks_run_next(state, req)),
        "tasks.runPending" => Some(handle_tasks_run_pending(state, req)),
        "tasks.runScheduled" => Some(handle_tasks_run_scheduled(state, req)),
        _ => None,
    }
}
