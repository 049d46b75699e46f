#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_learnpulsed");
        let mut child = Command::new(exe)
            .env("NO_PROXY", "127.0.0.1,localhost")
            .env_remove("HTTP_PROXY")
            .env_remove("http_proxy")
            .env_remove("ALL_PROXY")
            .env_remove("all_proxy")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn learnpulsed");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns the daemon with `workspace` already selected.
    pub fn with_workspace(workspace: &std::path::Path) -> Self {
        let mut s = Self::spawn();
        s.call_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        s
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn call_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Error code of a call that must fail.
    pub fn call_err(&mut self, method: &str, params: Value) -> String {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn write_file(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).expect("write fixture");
    p
}

pub const TRAINING_CSV: &str = "forum_posts,quiz_attempts,final_outcome\n4,2,1\n0,1,0\n7,3,1\n";

/// A request the stub ML service received.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

/// Minimal HTTP/1.1 stand-in for the ML service. `/predict` answers with the
/// `stub_pass_prob` feature when present; `/train` fails for the `knn`
/// algorithm.
pub struct StubMl {
    pub url: String,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubMl {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
        let url = format!("http://{}", listener.local_addr().expect("addr"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let log = Arc::clone(&log);
                thread::spawn(move || serve(stream, &log));
            }
        });
        Self { url, seen }
    }

    pub fn count(&self, path: &str) -> usize {
        self.seen
            .lock()
            .expect("stub log")
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn last(&self, path: &str) -> Option<SeenRequest> {
        self.seen
            .lock()
            .expect("stub log")
            .iter()
            .rev()
            .find(|r| r.path == path)
            .cloned()
    }
}

fn serve(stream: TcpStream, log: &Mutex<Vec<SeenRequest>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    let mut api_key = None;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "x-api-key" => api_key = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if content_length > 0 && reader.read_exact(&mut body).is_err() {
        return;
    }
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    log.lock().expect("stub log").push(SeenRequest {
        method: method.clone(),
        path: path.clone(),
        api_key,
        body: body.clone(),
    });

    let (status, reply) = match (method.as_str(), path.as_str()) {
        ("GET", "/health") => (200, json!({ "status": "ok", "version": "stub-1" })),
        ("POST", "/train") => {
            if body.get("algorithm").and_then(|v| v.as_str()) == Some("knn") {
                (500, json!({ "detail": "not enough rows to train" }))
            } else {
                (
                    200,
                    json!({
                        "model_id": format!("bk-{}", body.get("courseid").and_then(|v| v.as_i64()).unwrap_or(0)),
                        "model_path": "/models/stub.joblib",
                        "algorithm": body.get("algorithm").cloned().unwrap_or(Value::Null),
                        "metrics": { "accuracy": 0.82, "f1": 0.8 },
                        "feature_names": ["forum_posts", "quiz_attempts"]
                    }),
                )
            }
        }
        ("POST", "/predict") => {
            let p = body
                .pointer("/features/stub_pass_prob")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.5);
            (
                200,
                json!({
                    "prediction": if p >= 0.5 { 1 } else { 0 },
                    "probabilities": [1.0 - p, p]
                }),
            )
        }
        _ => (404, json!({ "detail": "no such endpoint" })),
    };

    let text = reply.to_string();
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let mut stream = reader.into_inner();
    let _ = write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        text.len(),
        text
    );
    let _ = stream.flush();
}
