use crate::chatbot::{self, LearnerContext, ResourceCategory};
use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_i64, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

const APOLOGY: &str = "Hmm, that didn't work. Please refresh the page and try again.";

fn as_messages<S: AsRef<str>>(texts: &[S]) -> Value {
    Value::Array(
        texts
            .iter()
            .map(|t| json!({ "text": t.as_ref() }))
            .collect(),
    )
}

fn handle_chat_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = match optional_str(req, "message") {
        Ok(v) => v.unwrap_or("").trim(),
        Err(resp) => return resp,
    };
    let learner: LearnerContext = match req.params.get("context") {
        None | Some(Value::Null) => LearnerContext::default(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "bad_params", format!("invalid context: {}", e), None),
        },
    };

    let cfg = match config::chatbot_config(conn) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "chatbot settings unavailable");
            return ok(&req.id, json!({ "messages": as_messages(&[APOLOGY]), "topic": null }));
        }
    };

    let session = state.chat_sessions.touch(session_id);
    let mut category = None;
    if !message.is_empty() {
        let c = chatbot::categorize_query(message);
        category = Some(c);
        match chatbot::log_interaction(conn, user_id, message, c) {
            Ok(id) => session.last_interaction_id = Some(id),
            Err(e) => tracing::warn!(error = %e, "chat interaction not logged"),
        }
    }

    let reply = chatbot::respond(session, message, &learner, &cfg);
    tracing::debug!(session_id, route = ?reply.route, "chat reply");
    ok(
        &req.id,
        json!({
            "messages": as_messages(&reply.messages),
            "topic": reply.route.topic().map(|t| t.as_str()),
            "followUp": matches!(reply.route, chatbot::Route::FollowUp(_)),
            "category": category,
            "recentQueries": session.history(),
        }),
    )
}

fn handle_chat_welcome(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let first_name = match optional_str(req, "firstName") {
        Ok(v) => v.unwrap_or(""),
        Err(resp) => return resp,
    };
    match config::chatbot_config(conn) {
        Ok(cfg) => ok(
            &req.id,
            json!({ "messages": as_messages(&chatbot::welcome(first_name, &cfg.bot_name)) }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "chatbot settings unavailable");
            ok(&req.id, json!({ "messages": as_messages(&[APOLOGY]) }))
        }
    }
}

fn handle_chat_feedback(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(helpful) = req.params.get("helpful").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing helpful", None);
    };
    let Some(interaction_id) = state
        .chat_sessions
        .get(session_id)
        .and_then(|s| s.last_interaction_id.clone())
    else {
        return err(&req.id, "not_found", "no interaction found", None);
    };
    match chatbot::record_feedback(conn, &interaction_id, helpful) {
        Ok(true) => ok(&req.id, json!({ "interactionId": interaction_id, "helpful": helpful })),
        Ok(false) => err(&req.id, "not_found", "no interaction found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_chat_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let existed = state.chat_sessions.remove(session_id);
    ok(&req.id, json!({ "reset": existed }))
}

fn handle_chat_analytics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let limit = match optional_i64(req, "limit") {
        Ok(v) => v.unwrap_or(100),
        Err(resp) => return resp,
    };
    if !(1..=1000).contains(&limit) {
        return err(&req.id, "bad_params", "limit must be between 1 and 1000", None);
    }
    let common = match chatbot::common_queries(conn, limit) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match chatbot::top_categories(conn) {
        Ok(categories) => ok(
            &req.id,
            json!({ "commonQueries": common, "topCategories": categories }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_chat_resources(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let category = match optional_str(req, "category") {
        Ok(v) => ResourceCategory::parse(v.unwrap_or("")),
        Err(resp) => return resp,
    };
    match config::chatbot_config(conn) {
        Ok(cfg) => ok(
            &req.id,
            json!({ "messages": as_messages(&[chatbot::resource_card(category, &cfg)]) }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "chat.send" => Some(handle_chat_send(state, req)),
        "chat.welcome" => Some(handle_chat_welcome(state, req)),
        "chat.feedback" => Some(handle_chat_feedback(state, req)),
        "chat.reset" => Some(handle_chat_reset(state, req)),
        "chat.analytics" => Some(handle_chat_analytics(state, req)),
        "chat.resources" => Some(handle_chat_resources(state, req)),
        _ => None,
    }
}
