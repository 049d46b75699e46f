use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::suggestions::{self, MarkOutcome};
use serde_json::json;

fn handle_mark(state: &mut AppState, req: &Request, completed: bool) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let suggestion_id = match required_str(req, "suggestionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match suggestions::mark(conn, suggestion_id, user_id, completed) {
        Ok(MarkOutcome::Updated) => ok(
            &req.id,
            json!({ "suggestionId": suggestion_id, "viewed": true, "completed": completed }),
        ),
        Ok(MarkOutcome::NotFound) => err(&req.id, "not_found", "suggestion not found", None),
        Ok(MarkOutcome::NotOwner) => err(
            &req.id,
            "no_permission",
            "only the learner can update their suggestions",
            None,
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "suggestions.markViewed" => Some(handle_mark(state, req, false)),
        "suggestions.markCompleted" => Some(handle_mark(state, req, true)),
        _ => None,
    }
}
