use crate::config::BackendConfig;
use crate::risk::clamp_probability;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("backend returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("client configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Wire error code for IPC responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) | Self::Http(_) | Self::Config(_) => "backend_unavailable",
            Self::Status { .. } | Self::Malformed(_) => "backend_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainRequest {
    pub courseid: i64,
    pub dataset_filepath: String,
    pub algorithm: String,
    pub userid: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub backend_model_id: String,
    pub model_path: Option<String>,
    pub algorithm: Option<String>,
    pub accuracy: Option<f64>,
    pub metrics: Value,
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    pub model_id: String,
    pub features: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictOutcome {
    pub pass_prob: f64,
    pub prediction: Value,
    pub raw: Value,
}

/// The external ML service. Training, inference and feature engineering all
/// happen on the other side of this trait.
pub trait PredictionBackend {
    fn health(&self) -> Result<Value, BackendError>;
    fn train(&self, req: &TrainRequest) -> Result<TrainOutcome, BackendError>;
    fn predict(&self, req: &PredictRequest) -> Result<PredictOutcome, BackendError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
    train_timeout: Duration,
    predict_timeout: Duration,
    debug: bool,
}

impl HttpBackend {
    pub fn new(cfg: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(&cfg.api_url),
            api_key: cfg.api_key.clone(),
            train_timeout: cfg.train_timeout,
            predict_timeout: cfg.predict_timeout,
            debug: cfg.debug,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn post_json(&self, endpoint: &str, body: &Value, timeout: Duration) -> Result<Value, BackendError> {
        let url = self.endpoint_url(endpoint);
        if self.debug {
            tracing::info!(%url, payload = %body, "backend request");
        } else {
            tracing::debug!(%url, "backend request");
        }
        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| map_transport_error(e, timeout))?;
        let out = read_json_response(resp, timeout);
        tracing::info!(
            %url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = out.is_ok(),
            "backend response"
        );
        out
    }
}

impl PredictionBackend for HttpBackend {
    fn health(&self) -> Result<Value, BackendError> {
        let url = self.endpoint_url("health");
        let resp = self
            .client
            .get(&url)
            .timeout(self.predict_timeout)
            .header("X-API-Key", &self.api_key)
            .send()
            .map_err(|e| map_transport_error(e, self.predict_timeout))?;
        read_json_response(resp, self.predict_timeout)
    }

    fn train(&self, req: &TrainRequest) -> Result<TrainOutcome, BackendError> {
        let body = serde_json::to_value(req).map_err(|e| BackendError::Config(e.to_string()))?;
        let v = self.post_json("train", &body, self.train_timeout)?;
        parse_train_response(&v)
    }

    fn predict(&self, req: &PredictRequest) -> Result<PredictOutcome, BackendError> {
        let body = serde_json::to_value(req).map_err(|e| BackendError::Config(e.to_string()))?;
        let v = self.post_json("predict", &body, self.predict_timeout)?;
        parse_predict_response(&v)
    }
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout.as_secs())
    } else {
        BackendError::Http(e)
    }
}

fn read_json_response(
    resp: reqwest::blocking::Response,
    timeout: Duration,
) -> Result<Value, BackendError> {
    let status = resp.status();
    let text = resp.text().map_err(|e| map_transport_error(e, timeout))?;
    if status != StatusCode::OK {
        return Err(BackendError::Status {
            status: status.as_u16(),
            detail: error_detail(&text),
        });
    }
    let v: Value = serde_json::from_str(&text)
        .map_err(|e| BackendError::Malformed(format!("invalid JSON: {}", e)))?;
    if !v.is_object() {
        return Err(BackendError::Malformed("expected a JSON object".into()));
    }
    Ok(v)
}

/// FastAPI-style `{"detail": ...}` when present, otherwise the body head.
fn error_detail(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        match v.get("detail") {
            Some(Value::String(s)) => return s.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    body.chars().take(200).collect()
}

pub fn normalize_base_url(raw: &str) -> String {
    let mut url = raw.trim().to_string();
    if url.is_empty() {
        url = crate::config::DEFAULT_API_URL.to_string();
    }
    // Hosted deployments are often pasted without a scheme.
    if url.contains("railway.app") && !url.starts_with("http") {
        url = format!("https://{}", url);
    }
    url.trim_end_matches('/').to_string()
}

pub fn parse_train_response(v: &Value) -> Result<TrainOutcome, BackendError> {
    let backend_model_id = match v.get("model_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(BackendError::Malformed("missing model_id".into())),
    };
    let metrics = match v.get("metrics") {
        Some(m) if m.is_object() => m.clone(),
        _ => json!({}),
    };
    let accuracy = metrics
        .get("accuracy")
        .and_then(|a| a.as_f64())
        .or_else(|| v.get("accuracy").and_then(|a| a.as_f64()));
    let feature_names = v
        .get("feature_names")
        .and_then(|f| f.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|x| x.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Ok(TrainOutcome {
        backend_model_id,
        model_path: v.get("model_path").and_then(|p| p.as_str()).map(str::to_string),
        algorithm: v.get("algorithm").and_then(|p| p.as_str()).map(str::to_string),
        accuracy,
        metrics,
        feature_names,
    })
}

/// Resolves the pass probability from either a flat response or one nested
/// under `results`.
pub fn parse_predict_response(v: &Value) -> Result<PredictOutcome, BackendError> {
    let body = match v.get("results") {
        Some(r) if r.is_object() => r,
        _ => v,
    };
    let field = |k: &str| pick(body, v, k);

    let Some(prediction) = field("prediction").cloned() else {
        return Err(BackendError::Malformed("missing prediction".into()));
    };

    let probabilities: Option<Vec<f64>> = field("probabilities")
        .and_then(|p| p.as_array())
        .map(|arr| arr.iter().filter_map(|x| x.as_f64()).collect());

    let raw_prob = if let Some(p) = field("probability").and_then(|p| p.as_f64()) {
        p
    } else if let Some(probs) = probabilities.filter(|p| !p.is_empty()) {
        if probs.len() >= 2 {
            probs[1]
        } else {
            probs.iter().copied().fold(f64::MIN, f64::max)
        }
    } else if is_positive_class(&prediction) {
        0.75
    } else {
        0.25
    };

    let Some(pass_prob) = clamp_probability(raw_prob) else {
        return Err(BackendError::Malformed("probability is not a number".into()));
    };
    Ok(PredictOutcome {
        pass_prob,
        prediction,
        raw: v.clone(),
    })
}

fn pick<'a>(body: &'a Value, outer: &'a Value, key: &str) -> Option<&'a Value> {
    body.get(key)
        .or_else(|| outer.get(key))
        .filter(|x| !x.is_null())
}

fn is_positive_class(prediction: &Value) -> bool {
    match prediction {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::Bool(b) => *b,
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalization() {
        assert_eq!(normalize_base_url("http://x:5000/"), "http://x:5000");
        assert_eq!(
            normalize_base_url("spp.up.railway.app/"),
            "https://spp.up.railway.app"
        );
        assert_eq!(normalize_base_url("  "), "http://localhost:5000");
    }

    #[test]
    fn predict_probability_resolution_order() {
        let p = parse_predict_response(&json!({ "prediction": 1, "probability": 0.62 })).expect("flat");
        assert_eq!(p.pass_prob, 0.62);

        let p = parse_predict_response(&json!({
            "results": { "prediction": 0, "probabilities": [0.8, 0.2], "confidence": 0.8 }
        }))
        .expect("nested");
        assert_eq!(p.pass_prob, 0.2);
        assert_eq!(p.prediction, json!(0));

        let p = parse_predict_response(&json!({ "prediction": 1, "probabilities": [0.9] })).expect("single");
        assert_eq!(p.pass_prob, 0.9);

        let p = parse_predict_response(&json!({ "prediction": 1 })).expect("class only");
        assert_eq!(p.pass_prob, 0.75);
        let p = parse_predict_response(&json!({ "prediction": 0 })).expect("class only");
        assert_eq!(p.pass_prob, 0.25);

        let p = parse_predict_response(&json!({ "prediction": 1, "probability": 1.7 })).expect("clamped");
        assert_eq!(p.pass_prob, 1.0);
    }

    #[test]
    fn predict_without_prediction_is_malformed() {
        let e = parse_predict_response(&json!({ "probability": 0.5 })).expect_err("malformed");
        assert!(matches!(e, BackendError::Malformed(_)));
        assert_eq!(e.code(), "backend_error");
    }

    #[test]
    fn train_response_requires_model_id() {
        let t = parse_train_response(&json!({
            "model_id": 42,
            "model_path": "/models/42.joblib",
            "algorithm": "svm",
            "metrics": { "accuracy": 0.81, "f1": 0.79 },
            "feature_names": ["forum_posts", "quiz_attempts"]
        }))
        .expect("ok");
        assert_eq!(t.backend_model_id, "42");
        assert_eq!(t.accuracy, Some(0.81));
        assert_eq!(t.feature_names.len(), 2);

        assert!(parse_train_response(&json!({ "metrics": {} })).is_err());
    }

    #[test]
    fn error_detail_prefers_json_detail() {
        assert_eq!(error_detail(r#"{"detail":"Invalid API key"}"#), "Invalid API key");
        assert_eq!(error_detail("plain failure"), "plain failure");
    }
}
