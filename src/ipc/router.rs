use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::datasets::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::models::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::learners::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::predictions::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::suggestions::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::tasks::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::chat::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backend::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
