mod common;

use common::Sidecar;
use serde_json::json;

#[test]
fn storage_methods_need_a_workspace() {
    let mut d = Sidecar::spawn();
    let health = d.call_ok("health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));

    for method in [
        "setup.get",
        "datasets.list",
        "models.list",
        "learners.list",
        "predictions.courseStats",
        "tasks.list",
        "chat.send",
        "backend.health",
    ] {
        assert_eq!(d.call_err(method, json!({ "courseId": 2 })), "no_workspace", "{}", method);
    }
}

#[test]
fn bad_json_and_unknown_methods() {
    let mut d = Sidecar::spawn();
    let resp = d.send_raw("{not json");
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    let code = d.call_err("grades.explode", json!({}));
    assert_eq!(code, "not_implemented");

    // The daemon keeps serving after both.
    d.call_ok("health", json!({}));
}

#[test]
fn every_family_is_routed() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut d = Sidecar::with_workspace(workspace.path());
    let health = d.call_ok("health", json!({}));
    assert!(health["workspacePath"].as_str().is_some());
    assert!(workspace.path().join("learnpulse.sqlite3").is_file());

    let calls = [
        ("setup.get", json!({})),
        ("setup.update", json!({})),
        ("datasets.upload", json!({})),
        ("datasets.list", json!({})),
        ("datasets.get", json!({})),
        ("datasets.delete", json!({})),
        ("models.train", json!({})),
        ("models.list", json!({})),
        ("models.get", json!({})),
        ("models.trainingLog", json!({})),
        ("models.activate", json!({})),
        ("models.deactivate", json!({})),
        ("models.cleanupPending", json!({})),
        ("learners.upsert", json!({})),
        ("learners.list", json!({})),
        ("predictions.generate", json!({})),
        ("predictions.getStudent", json!({})),
        ("predictions.refresh", json!({})),
        ("predictions.courseStats", json!({})),
        ("predictions.list", json!({})),
        ("suggestions.markViewed", json!({})),
        ("suggestions.markCompleted", json!({})),
        ("tasks.list", json!({})),
        ("tasks.runScheduled", json!({})),
        ("chat.send", json!({})),
        ("chat.welcome", json!({})),
        ("chat.feedback", json!({})),
        ("chat.reset", json!({})),
        ("chat.analytics", json!({})),
        ("chat.resources", json!({})),
    ];
    for (method, params) in calls {
        let resp = d.call(method, params);
        let code = resp.pointer("/error/code").and_then(|v| v.as_str());
        assert_ne!(code, Some("not_implemented"), "{} not routed", method);
        assert_ne!(code, Some("no_workspace"), "{} lost the workspace", method);
    }
}
