//! Integration tests for the HTTP surface: credentials, ingestion lifecycle,
//! dead-letter administration, queue inspection and health.

mod helpers;

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use helpers::{ADMIN_KEY, Credential, SCHEDULER_SECRET, TestApp, test_config};
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_worker::DistributedLock;

fn job_id(submission: &Value) -> String {
    submission["jobId"].as_str().expect("jobId").to_string()
}

fn run_id(submission: &Value) -> String {
    submission["id"].as_str().expect("id").to_string()
}

/// Submit a script and remove its blob, so the run aborts on preprocess.
async fn submit_unreadable(app: &TestApp) -> Value {
    let submission = app.submit_script(json!({})).await;
    let key = submission["blobKey"].as_str().expect("blobKey");
    app.state.blobs.delete(key).await.expect("delete blob");
    submission
}

#[tokio::test]
async fn test_trigger_requires_scheduler_secret() {
    let app = TestApp::new().await;

    let response = app
        .request("POST", "/api/jobs/process", None, Credential::None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "unauthorized");

    let response = app
        .request(
            "POST",
            "/api/jobs/process",
            None,
            Credential::Scheduler("not-the-secret"),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            "POST",
            "/api/jobs/process",
            None,
            Credential::Scheduler(SCHEDULER_SECRET),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["processed"], 0);
    assert_eq!(response.body["skipped"], false);
}

#[tokio::test]
async fn test_credentials_are_not_interchangeable() {
    let app = TestApp::new().await;

    // Admin key on the trigger, in either header.
    let response = app
        .request("POST", "/api/jobs/process", None, Credential::Admin(ADMIN_KEY))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = app
        .request(
            "POST",
            "/api/jobs/process",
            None,
            Credential::Scheduler(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // Scheduler secret on an admin endpoint.
    let response = app
        .request(
            "GET",
            "/api/admin/dead-letter",
            None,
            Credential::Scheduler(SCHEDULER_SECRET),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = app
        .request(
            "GET",
            "/api/queue/status",
            None,
            Credential::Admin(SCHEDULER_SECRET),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unconfigured_credentials_disable_endpoints() {
    let mut config = test_config();
    config.auth.scheduler_secret = String::new();
    config.auth.admin_key = String::new();
    let app = TestApp::with_config(config).await;

    let response = app
        .request("POST", "/api/jobs/process", None, Credential::Scheduler(""))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "Endpoint is disabled");

    let response = app
        .request("GET", "/api/queue/status", None, Credential::Admin(""))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "Endpoint is disabled");
}

#[tokio::test]
async fn test_ingestion_runs_to_completion() {
    let app = TestApp::new().await;

    let submission = app.submit_script(json!({ "priority": "high" })).await;
    assert_eq!(submission["status"], "queued");
    assert_eq!(submission["progress"], 0);
    let id = run_id(&submission);

    let response = app
        .request("GET", &format!("/api/ingestions/{id}"), None, Credential::None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "queued");
    assert_eq!(response.body["projectId"], "proj-1");

    let summary = app.trigger().await;
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["successful"], 1);
    assert_eq!(summary["failed"], 0);

    let response = app
        .request(
            "GET",
            &format!("/api/ingestions/{id}/steps"),
            None,
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "succeeded");
    assert_eq!(response.body["progress"], 100);

    let steps = response.body["steps"].as_array().expect("steps");
    let names: Vec<&str> = steps.iter().filter_map(|s| s["name"].as_str()).collect();
    assert_eq!(
        names,
        vec![
            "preprocess",
            "core-extraction",
            "character-bible",
            "market-adaptation",
            "package-assembly",
            "visuals",
            "final-package",
        ]
    );
    assert!(steps.iter().all(|s| s["status"] == "succeeded"));

    let response = app
        .request(
            "GET",
            &format!("/api/ingestions/{id}/package"),
            None,
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let outputs = response.body["outputs"].as_object().expect("outputs");
    assert!(!outputs.contains_key("preprocess"));
    assert!(outputs.contains_key("final-package"));
    let characters = outputs["character-bible"]["characters"]
        .as_array()
        .expect("characters");
    assert!(!characters.is_empty());
    assert!(response.body["summary"].is_object());

    let stats = app
        .request("GET", "/api/queue/status", None, Credential::Admin(ADMIN_KEY))
        .await;
    assert_eq!(stats.body["stats"]["pendingJobs"], 0);
    assert_eq!(stats.body["stats"]["completedJobs"], 1);
}

#[tokio::test]
async fn test_package_conflicts_until_finished() {
    let app = TestApp::new().await;
    let submission = app.submit_script(json!({})).await;
    let id = run_id(&submission);

    let response = app
        .request(
            "GET",
            &format!("/api/ingestions/{id}/package"),
            None,
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "conflict");
}

#[tokio::test]
async fn test_unknown_ingestion_is_not_found() {
    let app = TestApp::new().await;
    let id = Uuid::new_v4();

    for path in [
        format!("/api/ingestions/{id}"),
        format!("/api/ingestions/{id}/steps"),
        format!("/api/ingestions/{id}/package"),
    ] {
        let response = app.request("GET", &path, None, Credential::None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response.body["error"], "not_found");
    }
}

#[tokio::test]
async fn test_submission_validation() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/api/ingestions",
            Some(json!({ "projectId": "p" })),
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");

    let response = app
        .request(
            "POST",
            "/api/ingestions",
            Some(json!({ "content": "%%% not base64 %%%" })),
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            "/api/ingestions",
            Some(json!({ "blobKey": "uploads/missing/script.txt" })),
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submission_by_blob_key() {
    let app = TestApp::new().await;
    let key = "uploads/earlier/script.txt";
    app.state
        .blobs
        .write(key, Bytes::from_static(helpers::SCRIPT.as_bytes()))
        .await
        .unwrap();

    let response = app
        .request(
            "POST",
            "/api/ingestions",
            Some(json!({ "blobKey": key, "delaySeconds": 3600 })),
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    let id = run_id(&response.body);
    let copy = format!("uploads/{id}/script.txt");
    assert_eq!(response.body["blobKey"], copy.as_str());
    assert_eq!(
        app.state.blobs.read(&copy).await.unwrap(),
        Bytes::from_static(helpers::SCRIPT.as_bytes())
    );

    // Delayed jobs are not eligible yet.
    let summary = app.trigger().await;
    assert_eq!(summary["processed"], 0);
}

#[tokio::test]
async fn test_cleanup_spares_referenced_upload() {
    let app = TestApp::new().await;
    let shared = "uploads/earlier/script.txt";
    app.state
        .blobs
        .write(shared, Bytes::from_static(helpers::SCRIPT.as_bytes()))
        .await
        .unwrap();

    let response = app
        .request(
            "POST",
            "/api/ingestions",
            Some(json!({ "blobKey": shared })),
            Credential::None,
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    let copy = response.body["blobKey"].as_str().unwrap().to_string();
    assert_ne!(copy, shared);
    app.state.blobs.delete(&copy).await.unwrap();

    let summary = app.trigger().await;
    assert_eq!(summary["deadLetter"], 1);

    let cleanup = app
        .request(
            "POST",
            "/api/admin/actions",
            Some(json!({ "action": "cleanup_old_jobs", "olderThanDays": 0 })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(cleanup.status, StatusCode::OK);
    assert_eq!(cleanup.body["result"]["cleanedJobs"], 1);
    assert_eq!(cleanup.body["result"]["cleanedRuns"], 1);
    assert!(app.state.blobs.exists(shared).await.unwrap());
}

#[tokio::test]
async fn test_dead_letter_lifecycle() {
    let app = TestApp::new().await;
    let submission = submit_unreadable(&app).await;
    let id = run_id(&submission);
    let job = job_id(&submission);

    let summary = app.trigger().await;
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["deadLetter"], 1);
    assert_eq!(summary["errors"][0]["code"], "not_found");

    let run = app
        .request("GET", &format!("/api/ingestions/{id}"), None, Credential::None)
        .await;
    assert_eq!(run.body["status"], "failed");
    assert!(run.body["error"].is_string());

    let listing = app
        .request(
            "GET",
            "/api/admin/dead-letter",
            None,
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body["total_items"], 1);
    assert_eq!(listing.body["items"][0]["job"]["id"], job.as_str());

    let filtered = app
        .request(
            "GET",
            "/api/admin/dead-letter?error=unrelated",
            None,
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(filtered.body["total_items"], 0);

    // Retry moves it back to pending.
    let response = app
        .request(
            "POST",
            &format!("/api/admin/dead-letter/{job}/retry"),
            None,
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["jobId"], job.as_str());

    let status = app
        .request("GET", "/api/queue/status", None, Credential::Admin(ADMIN_KEY))
        .await;
    assert_eq!(status.body["stats"]["pendingJobs"], 1);
    assert_eq!(status.body["stats"]["deadLetterJobs"], 0);

    let response = app
        .request(
            "POST",
            &format!("/api/admin/dead-letter/{job}/retry"),
            None,
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // The blob is still gone, so it lands in the dead-letter set again.
    let summary = app.trigger().await;
    assert_eq!(summary["deadLetter"], 1);

    let response = app
        .request(
            "DELETE",
            &format!("/api/admin/dead-letter/{job}"),
            None,
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .request(
            "DELETE",
            &format!("/api/admin/dead-letter/{job}"),
            None,
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_actions() {
    let app = TestApp::new().await;
    submit_unreadable(&app).await;
    app.trigger().await;

    let response = app
        .request(
            "POST",
            "/api/admin/actions",
            Some(json!({ "action": "get_metrics" })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["action"], "get_metrics");
    assert_eq!(response.body["result"]["status"], "degraded");
    assert_eq!(response.body["result"]["metrics"]["jobsDeadLettered"], 1);

    // Entries archived just now are younger than a day.
    let response = app
        .request(
            "POST",
            "/api/admin/actions",
            Some(json!({ "action": "cleanup_old_jobs", "olderThanDays": 1 })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["olderThanDays"], 1);
    assert_eq!(response.body["result"]["skipped"], false);
    assert_eq!(response.body["result"]["cleanedJobs"], 0);

    let response = app
        .request(
            "POST",
            "/api/admin/actions",
            Some(json!({ "action": "cleanup_old_jobs", "olderThanDays": 0 })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.body["result"]["cleanedJobs"], 1);

    let response = app
        .request(
            "POST",
            "/api/admin/actions",
            Some(json!({ "action": "drop_everything" })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_lock_actions_and_held_lock_skip() {
    let app = TestApp::new().await;
    app.submit_script(json!({})).await;

    let other = DistributedLock::new(app.state.store.clone());
    assert!(
        other
            .acquire("process", Duration::from_secs(300))
            .await
            .unwrap()
    );

    let response = app
        .request(
            "POST",
            "/api/queue/actions",
            Some(json!({ "action": "check_lock" })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["lock"], "process");
    assert_eq!(response.body["locked"], true);
    assert_eq!(response.body["entry"]["holder"], other.holder());

    let summary = app.trigger().await;
    assert_eq!(summary["skipped"], true);
    assert_eq!(summary["processed"], 0);

    let response = app
        .request(
            "POST",
            "/api/queue/actions",
            Some(json!({ "action": "force_unlock" })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["locked"], false);
    assert_eq!(response.body["released"]["holder"], other.holder());

    let summary = app.trigger().await;
    assert_eq!(summary["skipped"], false);
    assert_eq!(summary["processed"], 1);

    let response = app
        .request(
            "POST",
            "/api/queue/actions",
            Some(json!({ "action": "check_lock", "lock": "bad:name" })),
            Credential::Admin(ADMIN_KEY),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queue_status_reports_process() {
    let app = TestApp::new().await;
    app.submit_script(json!({})).await;

    let response = app
        .request("GET", "/api/queue/status", None, Credential::Admin(ADMIN_KEY))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["stats"]["pendingJobs"], 1);
    assert!(response.body["stats"]["oldestJobCreated"].is_string());
    assert_eq!(
        response.body["process"]["pid"].as_u64(),
        Some(u64::from(std::process::id()))
    );
}

#[tokio::test]
async fn test_health_reports_store_and_offload() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/api/health", None, Credential::None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["storeHealthy"], true);
    assert_eq!(response.body["offload"]["runtime"], "restricted");
    assert!(response.body["queue"].is_object());

    submit_unreadable(&app).await;
    app.trigger().await;

    let response = app
        .request("GET", "/api/health", None, Credential::None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "degraded");
}
