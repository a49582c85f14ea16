//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use pitchforge_api::{AppState, build_app};
use pitchforge_core::config::AppConfig;
use pitchforge_core::config::offload::RuntimeKind;
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_store::memory::MemoryQueueStore;
use pitchforge_store::{LocalBlobStore, StoreManager};
use pitchforge_worker::OffloadManager;

/// Scheduler secret configured for tests.
pub const SCHEDULER_SECRET: &str = "sched-secret";

/// Admin key configured for tests.
pub const ADMIN_KEY: &str = "admin-key";

/// A short screenplay exercising scene and character detection.
pub const SCRIPT: &str = "INT. FAMILY HAVELI - NIGHT\n\nMEERA\nThe ledger closes tonight.\n\nEXT. MUMBAI DOCKS - DAWN\n\nARJUN\nNot without the family's blessing.\n";

/// Credential attached to a test request.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    /// No credential header.
    None,
    /// `x-scheduler-secret`
    Scheduler(&'a str),
    /// `x-admin-key`
    Admin(&'a str),
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state, for direct access to the queue and stores
    pub state: AppState,
    /// Application config
    pub config: AppConfig,
    _blob_dir: TempDir,
}

impl TestApp {
    /// Create a test application backed by the in-memory store.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a test application with explicit configuration.
    pub async fn with_config(config: AppConfig) -> Self {
        let blob_dir = tempfile::tempdir().expect("Failed to create blob dir");
        let blobs: Arc<dyn BlobStore> = Arc::new(
            LocalBlobStore::new(blob_dir.path())
                .await
                .expect("Failed to init blob store"),
        );
        let store = Arc::new(StoreManager::from_store(Arc::new(MemoryQueueStore::new())));
        let offload = Arc::new(OffloadManager::new(&config.offload));

        let state = AppState::new(config.clone(), store, blobs, offload);
        let router = build_app(state.clone());

        Self {
            router,
            state,
            config,
            _blob_dir: blob_dir,
        }
    }

    /// Submit [`SCRIPT`] inline and return the response body.
    pub async fn submit_script(&self, extra: Value) -> Value {
        let mut body = json!({
            "projectId": "proj-1",
            "content": STANDARD.encode(SCRIPT),
            "fileName": "ledger.txt",
            "mimeType": "text/plain",
        });
        if let (Some(target), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }

        let response = self
            .request("POST", "/api/ingestions", Some(body), Credential::None)
            .await;
        assert_eq!(
            response.status,
            StatusCode::ACCEPTED,
            "Submission failed: {:?}",
            response.body
        );
        response.body
    }

    /// Call the batch trigger with the scheduler secret.
    pub async fn trigger(&self) -> Value {
        let response = self
            .request(
                "POST",
                "/api/jobs/process",
                None,
                Credential::Scheduler(SCHEDULER_SECRET),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::OK,
            "Trigger failed: {:?}",
            response.body
        );
        response.body
    }

    /// Make an HTTP request to the test app
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        credential: Credential<'_>,
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");

        req = match credential {
            Credential::None => req,
            Credential::Scheduler(secret) => req.header("x-scheduler-secret", secret),
            Credential::Admin(key) => req.header("x-admin-key", key),
        };

        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}

/// Configuration with both credentials set and offloading disabled.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.scheduler_secret = SCHEDULER_SECRET.to_string();
    config.auth.admin_key = ADMIN_KEY.to_string();
    config.offload.runtime = RuntimeKind::Restricted;
    config.scheduler.enabled = false;
    config
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}
