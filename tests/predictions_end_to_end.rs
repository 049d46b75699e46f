mod common;

use common::{write_file, Sidecar, StubMl, TRAINING_CSV};
use serde_json::{json, Value};

const COURSE: i64 = 12;

fn learner(d: &mut Sidecar, user_id: i64, pass_prob: f64) -> Value {
    d.call_ok(
        "learners.upsert",
        json!({
            "courseId": COURSE,
            "userId": user_id,
            "features": {
                "stub_pass_prob": pass_prob,
                "current_course_modules_accessed": 5,
                "days_since_last_access": 3
            },
            "activities": [
                { "cmId": 100, "name": "Essay draft", "modname": "assign" },
                { "cmId": 101, "name": "Quiz 1", "modname": "quiz" },
                { "cmId": 102, "name": "Welcome", "modname": "label" },
                { "cmId": 103, "name": "Hidden", "modname": "quiz", "visible": false }
            ],
            "grades": [
                { "itemModule": "quiz", "grade": 4.0, "gradeMax": 10.0 }
            ],
            "courseGradePct": 48.0
        }),
    )
}

/// Trains and activates a course model against the stub, then registers
/// three learners spanning all risk tiers.
fn prepared() -> (tempfile::TempDir, tempfile::TempDir, StubMl, Sidecar, String) {
    let workspace = tempfile::tempdir().expect("tempdir");
    let sources = tempfile::tempdir().expect("tempdir");
    let csv = write_file(sources.path(), "train.csv", TRAINING_CSV);
    let stub = StubMl::start();
    let mut d = Sidecar::with_workspace(workspace.path());
    d.call_ok(
        "setup.update",
        json!({ "section": "backend", "patch": { "apiUrl": stub.url } }),
    );

    let ds = d.call_ok(
        "datasets.upload",
        json!({ "courseId": COURSE, "name": "cohort", "format": "csv", "sourcePath": csv.to_string_lossy() }),
    )["dataset"]["id"]
        .as_str()
        .expect("dataset id")
        .to_string();
    let model_id = d.call_ok("models.train", json!({ "courseId": COURSE, "datasetId": ds }))["modelId"]
        .as_str()
        .expect("model id")
        .to_string();
    d.call_ok("tasks.runNext", json!({}));

    let upserted = learner(&mut d, 1, 0.9);
    assert!(upserted["engagementScore"].as_f64().is_some());
    learner(&mut d, 2, 0.55);
    learner(&mut d, 3, 0.2);

    let activated = d.call_ok("models.activate", json!({ "courseId": COURSE, "modelId": model_id }));
    assert!(activated["refreshTaskId"].as_str().is_some());
    let refresh = d.call_ok("tasks.runNext", json!({}));
    assert_eq!(refresh["task"]["kind"], json!("refresh_predictions"));
    assert_eq!(refresh["task"]["result"]["success"], json!(3), "{}", refresh);

    (workspace, sources, stub, d, model_id)
}

#[test]
fn refresh_classifies_every_learner() {
    let (_ws, _src, stub, mut d, model_id) = prepared();
    assert_eq!(stub.count("/predict"), 3);
    let sent = stub.last("/predict").expect("predict request");
    assert_eq!(sent.body["model_id"], json!(format!("bk-{}", COURSE)));
    assert!(sent.body["features"]["engagement_score"].as_f64().is_some());
    assert_eq!(sent.body["features"]["current_course_grade_percentage"], json!(48.0));

    let stats = d.call_ok("predictions.courseStats", json!({ "courseId": COURSE }));
    assert_eq!(stats["modelId"], json!(model_id));
    assert_eq!(stats["isGlobalModel"], json!(false));
    assert_eq!(stats["lowRisk"], json!(1));
    assert_eq!(stats["mediumRisk"], json!(1));
    assert_eq!(stats["highRisk"], json!(1));
    assert_eq!(stats["total"], json!(3));
    assert!(stats["lastRefresh"].as_str().is_some());

    let listed = d.call_ok("predictions.list", json!({ "courseId": COURSE }));
    assert_eq!(listed["predictions"].as_array().map(Vec::len), Some(3));

    let learners = d.call_ok("learners.list", json!({ "courseId": COURSE }));
    assert_eq!(learners["userIds"], json!([1, 2, 3]));
}

#[test]
fn learner_view_and_permissions() {
    let (_ws, _src, _stub, mut d, _model) = prepared();

    let view = d.call_ok("predictions.getStudent", json!({ "courseId": COURSE, "userId": 2 }));
    assert_eq!(view["hasPrediction"], json!(true));
    let p = &view["prediction"];
    assert_eq!(p["passProbability"], json!(55));
    assert_eq!(p["riskLevel"], json!(2));
    assert_eq!(p["riskText"], json!("Medium risk"));
    assert_eq!(p["riskKey"], json!("medium"));
    assert_eq!(p["riskClass"], json!("risk-medium"));

    let suggestions = view["suggestions"].as_array().expect("suggestions");
    assert!(!suggestions.is_empty() && suggestions.len() <= 5);
    assert_eq!(suggestions[0]["resourceType"], json!("quiz"));
    assert!(suggestions
        .iter()
        .all(|s| s["cmId"] != json!(102) && s["cmId"] != json!(103)));

    assert_eq!(
        d.call_err(
            "predictions.getStudent",
            json!({ "courseId": COURSE, "userId": 2, "viewerId": 3 })
        ),
        "no_permission"
    );
    let instructor = d.call_ok(
        "predictions.getStudent",
        json!({ "courseId": COURSE, "userId": 2, "viewerId": 50, "viewerCanViewAll": true }),
    );
    assert_eq!(instructor["prediction"]["riskLevel"], json!(2));

    let nobody = d.call_ok("predictions.getStudent", json!({ "courseId": COURSE, "userId": 99 }));
    assert_eq!(nobody["hasPrediction"], json!(false));

    let suggestion_id = suggestions[0]["id"].as_str().expect("suggestion id");
    assert_eq!(
        d.call_err(
            "suggestions.markViewed",
            json!({ "suggestionId": suggestion_id, "userId": 3 })
        ),
        "no_permission"
    );
    let marked = d.call_ok(
        "suggestions.markCompleted",
        json!({ "suggestionId": suggestion_id, "userId": 2 }),
    );
    assert_eq!(marked["completed"], json!(true));
    let after = d.call_ok("predictions.getStudent", json!({ "courseId": COURSE, "userId": 2 }));
    let updated = after["suggestions"]
        .as_array()
        .expect("suggestions")
        .iter()
        .find(|s| s["id"] == json!(suggestion_id))
        .cloned()
        .expect("same suggestion");
    assert_eq!(updated["viewed"], json!(true));
    assert_eq!(updated["completed"], json!(true));
    assert_eq!(
        d.call_err("suggestions.markViewed", json!({ "suggestionId": "gone", "userId": 2 })),
        "not_found"
    );
}

#[test]
fn on_demand_prediction_and_dataset_cascade() {
    let (_ws, _src, stub, mut d, _model) = prepared();

    learner(&mut d, 3, 0.8);
    let generated = d.call_ok("predictions.generate", json!({ "courseId": COURSE, "userId": 3 }));
    assert_eq!(generated["riskValue"], json!(1));
    assert_eq!(generated["view"]["prediction"]["riskText"], json!("Low risk"));
    assert_eq!(stub.count("/predict"), 4);

    let stats = d.call_ok("predictions.courseStats", json!({ "courseId": COURSE }));
    assert_eq!(stats["lowRisk"], json!(2));
    assert_eq!(stats["highRisk"], json!(0));
    assert_eq!(stats["total"], json!(3), "only the latest prediction per learner counts");

    assert_eq!(
        d.call_err("predictions.generate", json!({ "courseId": COURSE, "userId": 77 })),
        "not_found"
    );
    assert_eq!(
        d.call_err("predictions.generate", json!({ "courseId": 404, "userId": 1 })),
        "no_active_model"
    );

    let first = d.call_ok("predictions.refresh", json!({ "courseId": COURSE }));
    let again = d.call_ok("predictions.refresh", json!({ "courseId": COURSE }));
    assert_eq!(first["taskId"], again["taskId"]);

    let datasets = d.call_ok("datasets.list", json!({ "courseId": COURSE }));
    let ds = datasets["datasets"][0]["id"].as_str().expect("dataset id").to_string();
    let deleted = d.call_ok("datasets.delete", json!({ "courseId": COURSE, "datasetId": ds }));
    assert_eq!(deleted["models"], json!(1));
    assert_eq!(deleted["predictions"], json!(4));
    assert!(deleted["suggestions"].as_u64().unwrap_or(0) > 0);

    let view = d.call_ok("predictions.getStudent", json!({ "courseId": COURSE, "userId": 1 }));
    assert_eq!(view["hasPrediction"], json!(false));
    let stats = d.call_ok("predictions.courseStats", json!({ "courseId": COURSE }));
    assert_eq!(stats["modelId"], json!(null));
    assert_eq!(stats["total"], json!(0));
}
