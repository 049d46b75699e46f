mod common;

use common::{write_file, Sidecar, StubMl, TRAINING_CSV};
use serde_json::{json, Value};
use std::path::Path;

fn point_at_stub(d: &mut Sidecar, stub: &StubMl) {
    d.call_ok(
        "setup.update",
        json!({ "section": "backend", "patch": { "apiUrl": stub.url, "apiKey": "secret-key" } }),
    );
}

fn upload(d: &mut Sidecar, course_id: i64, source: &Path) -> String {
    let res = d.call_ok(
        "datasets.upload",
        json!({
            "courseId": course_id,
            "name": format!("course {}", course_id),
            "format": "csv",
            "sourcePath": source.to_string_lossy()
        }),
    );
    res["dataset"]["id"].as_str().expect("dataset id").to_string()
}

fn train(d: &mut Sidecar, course_id: i64, dataset_id: &str, algorithm: &str) -> String {
    let res = d.call_ok(
        "models.train",
        json!({
            "courseId": course_id,
            "datasetId": dataset_id,
            "algorithm": algorithm,
            "userId": 2
        }),
    );
    assert!(res["taskId"].as_str().is_some());
    res["modelId"].as_str().expect("model id").to_string()
}

fn model(d: &mut Sidecar, model_id: &str) -> Value {
    d.call_ok("models.get", json!({ "modelId": model_id }))["model"].clone()
}

#[test]
fn training_runs_through_the_task_queue() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let sources = tempfile::tempdir().expect("tempdir");
    let csv = write_file(sources.path(), "train.csv", TRAINING_CSV);
    let stub = StubMl::start();
    let mut d = Sidecar::with_workspace(workspace.path());
    point_at_stub(&mut d, &stub);

    let ds = upload(&mut d, 5, &csv);
    let model_id = train(&mut d, 5, &ds, "randomforest");

    let pending = model(&mut d, &model_id);
    assert_eq!(pending["trainStatus"], json!("pending"));
    assert_eq!(pending["active"], json!(false));
    assert!(pending["modelName"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Random Forest Model - "));
    assert_eq!(
        d.call_err("models.activate", json!({ "courseId": 5, "modelId": model_id })),
        "model_not_ready"
    );

    let queued = d.call_ok("tasks.list", json!({ "status": "queued" }));
    assert_eq!(queued["tasks"].as_array().map(Vec::len), Some(1));
    assert_eq!(queued["tasks"][0]["kind"], json!("train_model"));

    let ran = d.call_ok("tasks.runNext", json!({}));
    assert_eq!(ran["task"]["status"], json!("done"), "{}", ran);
    assert_eq!(stub.count("/train"), 1);
    let seen = stub.last("/train").expect("train request");
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.api_key.as_deref(), Some("secret-key"));
    assert_eq!(seen.body["courseid"], json!(5));
    assert_eq!(seen.body["userid"], json!(2));
    assert_eq!(seen.body["algorithm"], json!("randomforest"));
    assert!(seen.body["dataset_filepath"]
        .as_str()
        .unwrap_or_default()
        .ends_with("train.csv"));

    let done = model(&mut d, &model_id);
    assert_eq!(done["trainStatus"], json!("complete"));
    assert_eq!(done["backendModelId"], json!("bk-5"));
    assert_eq!(done["accuracy"], json!(0.82));
    assert_eq!(done["features"], json!(["forum_posts", "quiz_attempts"]));

    let log = d.call_ok("models.trainingLog", json!({ "modelId": model_id }));
    let events: Vec<&str> = log["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .filter_map(|e| e["event"].as_str())
        .collect();
    assert_eq!(events.first(), Some(&"scheduled"));
    assert!(events.contains(&"complete"));

    assert_eq!(
        d.call_ok("tasks.runNext", json!({}))["task"],
        json!(null),
        "queue is drained"
    );
}

#[test]
fn one_active_model_per_scope() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let sources = tempfile::tempdir().expect("tempdir");
    let csv = write_file(sources.path(), "train.csv", TRAINING_CSV);
    let stub = StubMl::start();
    let mut d = Sidecar::with_workspace(workspace.path());
    point_at_stub(&mut d, &stub);

    let ds = upload(&mut d, 5, &csv);
    let first = train(&mut d, 5, &ds, "randomforest");
    let second = train(&mut d, 5, &ds, "svm");
    let global_ds = upload(&mut d, 0, &csv);
    let global = train(&mut d, 0, &global_ds, "decisiontree");
    d.call_ok("tasks.runPending", json!({ "max": 10 }));

    let activated = d.call_ok("models.activate", json!({ "courseId": 5, "modelId": first }));
    assert_eq!(activated["model"]["active"], json!(true));
    assert!(activated["refreshTaskId"].as_str().is_some());
    d.call_ok("models.activate", json!({ "courseId": 5, "modelId": second }));

    let global_on = d.call_ok("models.activate", json!({ "courseId": 0, "modelId": global }));
    assert_eq!(global_on["refreshTaskId"], json!(null));
    assert_eq!(global_on["model"]["isGlobal"], json!(true));

    let listed = d.call_ok("models.list", json!({ "courseId": 5, "includeGlobal": true }));
    let models = listed["models"].as_array().expect("models");
    assert_eq!(models.len(), 3);
    let active: Vec<&str> = models
        .iter()
        .filter(|m| m["active"] == json!(true))
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(active.len(), 2);
    assert!(active.contains(&second.as_str()));
    assert!(active.contains(&global.as_str()));
    assert_eq!(model(&mut d, &first)["active"], json!(false));

    let own_only = d.call_ok("models.list", json!({ "courseId": 5 }));
    assert_eq!(own_only["models"].as_array().map(Vec::len), Some(2));

    assert_eq!(
        d.call_err("models.activate", json!({ "courseId": 6, "modelId": second })),
        "model_not_in_course"
    );
    assert_eq!(
        d.call_err("models.deactivate", json!({ "courseId": 6, "modelId": second })),
        "model_not_in_course"
    );
    d.call_ok("models.deactivate", json!({ "courseId": 5, "modelId": second }));
    assert_eq!(model(&mut d, &second)["active"], json!(false));
    assert_eq!(
        d.call_err("models.activate", json!({ "courseId": 5, "modelId": "nope" })),
        "not_found"
    );
}

#[test]
fn global_model_trains_from_any_course_dataset() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let sources = tempfile::tempdir().expect("tempdir");
    let csv = write_file(sources.path(), "train.csv", TRAINING_CSV);
    let stub = StubMl::start();
    let mut d = Sidecar::with_workspace(workspace.path());
    point_at_stub(&mut d, &stub);

    let course_ds = upload(&mut d, 7, &csv);
    let global = train(&mut d, 0, &course_ds, "randomforest");
    let ran = d.call_ok("tasks.runNext", json!({}));
    assert_eq!(ran["task"]["status"], json!("done"), "{}", ran);

    let trained = model(&mut d, &global);
    assert_eq!(trained["isGlobal"], json!(true));
    assert_eq!(trained["trainStatus"], json!("complete"));
    let seen = stub.last("/train").expect("train request");
    assert_eq!(seen.body["courseid"], json!(0));
    assert!(seen.body["dataset_filepath"]
        .as_str()
        .unwrap_or_default()
        .ends_with("train.csv"));

    assert_eq!(
        d.call_err("models.train", json!({ "courseId": 0, "datasetId": "missing" })),
        "not_found"
    );

    d.call_ok(
        "setup.update",
        json!({ "section": "models", "patch": { "enableGlobalModel": false } }),
    );
    assert_eq!(
        d.call_err("models.train", json!({ "courseId": 0, "datasetId": course_ds })),
        "global_model_disabled"
    );
    train(&mut d, 7, &course_ds, "svm");
}

#[test]
fn rejected_training_marks_the_model_failed() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let sources = tempfile::tempdir().expect("tempdir");
    let csv = write_file(sources.path(), "train.csv", TRAINING_CSV);
    let stub = StubMl::start();
    let mut d = Sidecar::with_workspace(workspace.path());
    point_at_stub(&mut d, &stub);

    let ds = upload(&mut d, 3, &csv);
    let resp = d.call(
        "models.train",
        json!({ "courseId": 3, "datasetId": ds, "algorithm": "xgboost" }),
    );
    assert_eq!(resp["error"]["code"], json!("bad_params"));
    assert!(resp["error"]["details"]["allowed"]
        .as_array()
        .expect("allowed list")
        .contains(&json!("knn")));
    assert_eq!(
        d.call_err("models.train", json!({ "courseId": 4, "datasetId": ds })),
        "dataset_not_in_course"
    );

    let model_id = train(&mut d, 3, &ds, "knn");
    let ran = d.call_ok("tasks.runNext", json!({}));
    assert_eq!(ran["task"]["status"], json!("failed"));

    let failed = model(&mut d, &model_id);
    assert_eq!(failed["trainStatus"], json!("failed"));
    assert!(failed["errorMessage"]
        .as_str()
        .unwrap_or_default()
        .contains("not enough rows to train"));

    let log = d.call_ok("models.trainingLog", json!({ "modelId": model_id }));
    assert!(log["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .any(|e| e["event"] == json!("error") && e["level"] == json!("error")));
    assert_eq!(
        d.call_err("models.trainingLog", json!({ "modelId": "missing" })),
        "not_found"
    );
}

#[test]
fn cleanup_fails_models_whose_task_is_gone() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let sources = tempfile::tempdir().expect("tempdir");
    let csv = write_file(sources.path(), "train.csv", TRAINING_CSV);
    let mut d = Sidecar::with_workspace(workspace.path());

    let ds = upload(&mut d, 9, &csv);
    let model_id = train(&mut d, 9, &ds, "svm");

    let untouched = d.call_ok("models.cleanupPending", json!({ "courseId": 9 }));
    assert_eq!(untouched["fixed"], json!([]), "a queued task keeps the model pending");

    let db = rusqlite::Connection::open(workspace.path().join("learnpulse.sqlite3")).expect("open db");
    db.execute("DELETE FROM tasks", []).expect("drop tasks");
    drop(db);

    let fixed = d.call_ok("models.cleanupPending", json!({}));
    assert_eq!(fixed["fixed"], json!([model_id]));
    let m = model(&mut d, &model_id);
    assert_eq!(m["trainStatus"], json!("failed"));
    assert_eq!(
        m["errorMessage"],
        json!("Task missing - state fixed automatically")
    );
}
