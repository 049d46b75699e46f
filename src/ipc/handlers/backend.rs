use crate::backend::PredictionBackend;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_backend_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let backend = match helpers::backend(conn, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    // Reachability is the answer here, so a failed probe is still a result.
    match backend.health() {
        Ok(info) => ok(
            &req.id,
            json!({ "reachable": true, "apiUrl": backend.base_url(), "info": info }),
        ),
        Err(e) => {
            tracing::warn!(url = backend.base_url(), error = %e, "backend health check failed");
            ok(
                &req.id,
                json!({
                    "reachable": false,
                    "apiUrl": backend.base_url(),
                    "errorCode": e.code(),
                    "error": e.to_string()
                }),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backend.health" => Some(handle_backend_health(state, req)),
        _ => None,
    }
}
