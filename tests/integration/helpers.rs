//! Shared test helpers for integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, StatusCode, header};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tower::ServiceExt;

use papermill_core::config::AppConfig;
use papermill_core::config::storage::StorageConfig;
use papermill_core::events::ProgressEvent;
use papermill_jobs::{
    HandlerContext, HandlerError, HandlerOutcome, JobDispatcher, JobTracker, OperationHandler,
    OperationKind, ProgressBus, RegistryBuilder,
};
use papermill_store::ArtifactStore;

/// Handler that writes one small output without shelling out, so the HTTP
/// surface can be exercised without any external tools installed.
#[derive(Debug)]
pub struct StubHandler {
    pub kind: OperationKind,
    pub label: &'static str,
    pub message: &'static str,
}

#[async_trait]
impl OperationHandler for StubHandler {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        ctx.progress.update("Working...", 50);
        let mut combined = Vec::new();
        for input in &ctx.inputs {
            combined.extend_from_slice(&ctx.store.read_bytes(input).await?);
        }
        let slot = ctx
            .store
            .allocate_output(&ctx.job_id, &ctx.base_name(), ctx.kind.tag(), "pdf");
        let artifact = ctx.store.write_output(slot, Bytes::from(combined)).await?;
        Ok(HandlerOutcome {
            message: self.message.to_string(),
            downloads: vec![artifact.to_descriptor(self.label)],
            log_entry: format!("Wrote {}", artifact.name),
        })
    }
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Store backing the router, for direct filesystem assertions
    pub store: Arc<ArtifactStore>,
    /// Progress bus, for following jobs to their terminal event
    pub bus: Arc<ProgressBus>,
    /// Global subscription opened before any request, so events published
    /// while a response is in flight stay buffered for `wait_terminal`.
    events: Mutex<broadcast::Receiver<ProgressEvent>>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Create a test application over a temporary storage root.
    pub async fn new(builder: RegistryBuilder) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = AppConfig {
            storage: StorageConfig {
                data_dir: dir.path().to_string_lossy().to_string(),
            },
            ..AppConfig::default()
        };

        let store = Arc::new(
            ArtifactStore::new(&config.storage)
                .await
                .expect("Failed to init store"),
        );
        let bus = Arc::new(ProgressBus::default());
        let dispatcher = Arc::new(JobDispatcher::new(
            Arc::new(builder.build()),
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::new(JobTracker::new()),
            config.worker.max_concurrent_jobs,
        ));

        let state = papermill_api::AppState::new(
            Arc::new(config),
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&bus),
        );
        let router = papermill_api::build_router(state);
        let events = Mutex::new(bus.subscribe());

        Self {
            router,
            store,
            bus,
            events,
            _dir: dir,
        }
    }

    /// Submit a job as a multipart form with the given files and fields.
    pub async fn submit(
        &self,
        operation: &str,
        files: &[(&str, &[u8])],
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let boundary = "papermill-test-boundary";
        let body = multipart_body(boundary, files, fields);

        let req = Request::builder()
            .method("POST")
            .uri(format!("/api/jobs/{operation}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(req).await
    }

    /// Make a plain GET request.
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(req).await
    }

    async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
            .await
            .expect("Failed to read body");
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            body,
            bytes,
            content_type,
            disposition,
        }
    }

    /// Follow a job on the bus until its terminal event.
    pub async fn wait_terminal(&self, job_id: &str) -> ProgressEvent {
        let mut rx = self.events.lock().await;
        loop {
            match rx.recv().await {
                Ok(event) if event.job_id.as_str() == job_id && event.is_terminal() => {
                    return event;
                }
                Ok(_) => {}
                Err(e) => panic!("event stream ended before terminal event: {e}"),
            }
        }
    }
}

/// Assemble a multipart/form-data body by hand.
pub fn multipart_body(boundary: &str, files: &[(&str, &[u8])], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, data) in files {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body, `Null` when not JSON
    pub body: Value,
    /// Raw body bytes
    pub bytes: Bytes,
    /// Content-Type header, if present
    pub content_type: Option<String>,
    /// Content-Disposition header, if present
    pub disposition: Option<String>,
}

/// Tiny stand-in PDF payload.
pub fn pdf_bytes() -> &'static [u8] {
    b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n"
}

