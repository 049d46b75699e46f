use crate::db;
use crate::models::Algorithm;
use crate::risk::{RiskThresholds, DEFAULT_LOW_RISK, DEFAULT_MEDIUM_RISK};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_API_KEY: &str = "changeme";
pub const MASKED_SECRET: &str = "********";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Backend,
    Risk,
    Models,
    Chatbot,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Backend,
        Section::Risk,
        Section::Models,
        Section::Chatbot,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backend" => Some(Self::Backend),
            "risk" => Some(Self::Risk),
            "models" => Some(Self::Models),
            "chatbot" => Some(Self::Chatbot),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Risk => "risk",
            Self::Models => "models",
            Self::Chatbot => "chatbot",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Backend => "setup.backend",
            Self::Risk => "setup.risk",
            Self::Models => "setup.models",
            Self::Chatbot => "setup.chatbot",
        }
    }
}

fn default_section(section: Section) -> Value {
    match section {
        Section::Backend => json!({
            "apiUrl": DEFAULT_API_URL,
            "apiKey": DEFAULT_API_KEY,
            "trainTimeoutSecs": 300,
            "predictTimeoutSecs": 60,
            "debug": false
        }),
        Section::Risk => json!({
            "lowRisk": DEFAULT_LOW_RISK,
            "mediumRisk": DEFAULT_MEDIUM_RISK
        }),
        Section::Models => json!({
            "enableGlobalModel": true,
            "defaultAlgorithm": Algorithm::RandomForest.as_str(),
            "refreshIntervalHours": 24
        }),
        Section::Chatbot => json!({
            "botName": "EIRA",
            "studyResourcesLink": "",
            "careerServicesLink": "",
            "academicSupportLink": ""
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_unit_f64(v: &Value, key: &str) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(0.0..=1.0).contains(&n) {
        return Err(format!("{} must be in 0..=1", key));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

pub fn merge_section_patch(
    section: Section,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            Section::Backend => match k.as_str() {
                "apiUrl" => {
                    let s = parse_string_max(v, k, 500)?;
                    if s.is_empty() {
                        return Err("apiUrl must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "apiKey" => {
                    let s = parse_string_max(v, k, 200)?;
                    // Echoing the masked value back from setup.get keeps the stored key.
                    if s != MASKED_SECRET {
                        obj.insert(k.clone(), Value::String(s));
                    }
                }
                "trainTimeoutSecs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 10, 3600)?));
                }
                "predictTimeoutSecs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 5, 600)?));
                }
                "debug" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown backend field: {}", k)),
            },
            Section::Risk => match k.as_str() {
                "lowRisk" | "mediumRisk" => {
                    obj.insert(k.clone(), Value::from(parse_unit_f64(v, k)?));
                }
                _ => return Err(format!("unknown risk field: {}", k)),
            },
            Section::Models => match k.as_str() {
                "enableGlobalModel" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "defaultAlgorithm" => {
                    let s = parse_string_max(v, k, 32)?.to_ascii_lowercase();
                    let Some(alg) = Algorithm::parse(&s) else {
                        return Err(format!(
                            "defaultAlgorithm must be one of: {}",
                            Algorithm::ALL
                                .iter()
                                .map(|a| a.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ));
                    };
                    obj.insert(k.clone(), Value::String(alg.as_str().to_string()));
                }
                "refreshIntervalHours" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 720)?));
                }
                _ => return Err(format!("unknown models field: {}", k)),
            },
            Section::Chatbot => match k.as_str() {
                "botName" => {
                    let s = parse_string_max(v, k, 40)?;
                    if s.is_empty() {
                        return Err("botName must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "studyResourcesLink" | "careerServicesLink" | "academicSupportLink" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 500)?));
                }
                _ => return Err(format!("unknown chatbot field: {}", k)),
            },
        }
    }

    if section == Section::Risk {
        let low = obj.get("lowRisk").and_then(|v| v.as_f64()).unwrap_or(DEFAULT_LOW_RISK);
        let medium = obj
            .get("mediumRisk")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_MEDIUM_RISK);
        RiskThresholds::new(low, medium)?;
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: Section) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed saved value falls back to defaults.
            let mut candidate = current.clone();
            if merge_section_patch(section, &mut candidate, saved_obj).is_ok() {
                current = candidate;
            }
        }
    }
    Ok(current)
}

/// Applies `patch` on top of the saved section and persists the result.
pub fn update_section(
    conn: &Connection,
    section: Section,
    patch: &Map<String, Value>,
) -> Result<Value, UpdateError> {
    let mut current = load_section(conn, section).map_err(UpdateError::Storage)?;
    merge_section_patch(section, &mut current, patch).map_err(UpdateError::Invalid)?;
    db::settings_set_json(conn, section.key(), &current).map_err(UpdateError::Storage)?;
    Ok(current)
}

#[derive(Debug)]
pub enum UpdateError {
    Invalid(String),
    Storage(anyhow::Error),
}

/// Section as shown to an administrator; secrets are masked.
pub fn redact(section: Section, mut value: Value) -> Value {
    if section == Section::Backend {
        if let Some(obj) = value.as_object_mut() {
            let has_key = obj
                .get("apiKey")
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            obj.insert(
                "apiKey".into(),
                Value::String(if has_key { MASKED_SECRET.into() } else { String::new() }),
            );
            obj.insert("apiKeySet".into(), Value::Bool(has_key));
        }
    }
    value
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_url: String,
    pub api_key: String,
    pub train_timeout: Duration,
    pub predict_timeout: Duration,
    pub debug: bool,
}

pub fn backend_config(conn: &Connection) -> anyhow::Result<BackendConfig> {
    let v = load_section(conn, Section::Backend)?;
    Ok(BackendConfig {
        api_url: str_field(&v, "apiUrl"),
        api_key: str_field(&v, "apiKey"),
        train_timeout: Duration::from_secs(
            v.get("trainTimeoutSecs").and_then(|x| x.as_u64()).unwrap_or(300),
        ),
        predict_timeout: Duration::from_secs(
            v.get("predictTimeoutSecs").and_then(|x| x.as_u64()).unwrap_or(60),
        ),
        debug: v.get("debug").and_then(|x| x.as_bool()).unwrap_or(false),
    })
}

pub fn risk_thresholds(conn: &Connection) -> anyhow::Result<RiskThresholds> {
    let v = load_section(conn, Section::Risk)?;
    Ok(RiskThresholds {
        low: v.get("lowRisk").and_then(|x| x.as_f64()).unwrap_or(DEFAULT_LOW_RISK),
        medium: v
            .get("mediumRisk")
            .and_then(|x| x.as_f64())
            .unwrap_or(DEFAULT_MEDIUM_RISK),
    })
}

#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub enable_global_model: bool,
    pub default_algorithm: Algorithm,
    pub refresh_interval_hours: i64,
}

pub fn models_config(conn: &Connection) -> anyhow::Result<ModelsConfig> {
    let v = load_section(conn, Section::Models)?;
    Ok(ModelsConfig {
        enable_global_model: v
            .get("enableGlobalModel")
            .and_then(|x| x.as_bool())
            .unwrap_or(true),
        default_algorithm: v
            .get("defaultAlgorithm")
            .and_then(|x| x.as_str())
            .and_then(Algorithm::parse)
            .unwrap_or(Algorithm::RandomForest),
        refresh_interval_hours: v
            .get("refreshIntervalHours")
            .and_then(|x| x.as_i64())
            .unwrap_or(24),
    })
}

#[derive(Debug, Clone, Default)]
pub struct ChatbotConfig {
    pub bot_name: String,
    pub study_resources_link: String,
    pub career_services_link: String,
    pub academic_support_link: String,
}

pub fn chatbot_config(conn: &Connection) -> anyhow::Result<ChatbotConfig> {
    let v = load_section(conn, Section::Chatbot)?;
    Ok(ChatbotConfig {
        bot_name: str_field(&v, "botName"),
        study_resources_link: str_field(&v, "studyResourcesLink"),
        career_services_link: str_field(&v, "careerServicesLink"),
        academic_support_link: str_field(&v, "academicSupportLink"),
    })
}
