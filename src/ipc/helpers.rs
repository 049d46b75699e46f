//! Param readers shared by the handler families. Each returns the ready-made
//! error response on failure so handlers can bail with `return resp`.

use crate::backend::HttpBackend;
use crate::config;
use crate::ipc::error::err;
use crate::ipc::types::Request;
use rusqlite::Connection;
use serde_json::Value;

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Result<Option<&'a str>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(err(&req.id, "bad_params", format!("{} must be a string", key), None)),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an integer", key), None)),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an integer", key), None)),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<bool, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(err(&req.id, "bad_params", format!("{} must be a boolean", key), None)),
    }
}

/// HTTP client for the ML service as currently configured.
pub fn backend(conn: &Connection, req: &Request) -> Result<HttpBackend, Value> {
    let cfg = config::backend_config(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    HttpBackend::new(&cfg).map_err(|e| err(&req.id, e.code(), e.to_string(), None))
}
