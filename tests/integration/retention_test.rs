//! Retention behavior across the full stack: artifacts produced by a job
//! are served until the sweeper reclaims them.

mod helpers;

use std::sync::Arc;

use http::StatusCode;

use papermill_core::config::retention::RetentionConfig;
use papermill_jobs::{OperationKind, OperationRegistry, RetentionSweeper};

use helpers::{StubHandler, TestApp, pdf_bytes};

fn registry() -> papermill_jobs::RegistryBuilder {
    OperationRegistry::builder().register(Arc::new(StubHandler {
        kind: OperationKind::Compress,
        label: "Compressed PDF",
        message: "PDF compressed successfully!",
    }))
}

fn sweeper(app: &TestApp, max_age_secs: u64) -> RetentionSweeper {
    RetentionSweeper::new(
        Arc::clone(&app.store),
        RetentionConfig {
            sweep_interval_secs: 300,
            max_age_secs,
            delete_retries: 3,
            delete_retry_delay_secs: 0,
        },
    )
}

/// Run one job to completion and return the download URL of its output.
async fn produce_artifact(app: &TestApp) -> String {
    let response = app
        .submit("compress", &[("report.pdf", pdf_bytes())], &[])
        .await;
    assert_eq!(response.body["status"], "processing");
    let job_id = response.body["job_id"].as_str().unwrap().to_string();

    let terminal = app.wait_terminal(&job_id).await;
    terminal.downloads.expect("success carries downloads")[0]
        .url
        .clone()
}

#[tokio::test]
async fn test_fresh_artifact_survives_a_sweep() {
    let app = TestApp::new(registry()).await;
    let url = produce_artifact(&app).await;

    let stats = sweeper(&app, 900).sweep_once().await;
    assert_eq!(stats.removed, 0);

    let response = app.get(&url).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_artifact_no_longer_served() {
    let app = TestApp::new(registry()).await;
    let url = produce_artifact(&app).await;
    assert_eq!(app.get(&url).await.status, StatusCode::OK);

    // Age 0: everything produced so far is already past the threshold.
    let stats = sweeper(&app, 0).sweep_once().await;
    assert!(stats.removed >= 1);
    assert_eq!(stats.failed, 0);

    let response = app.get(&url).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sweep_clears_staged_inputs_too() {
    let app = TestApp::new(registry()).await;
    produce_artifact(&app).await;

    sweeper(&app, 0).sweep_once().await;

    for area in papermill_store::StorageArea::ALL {
        let mut entries = tokio::fs::read_dir(app.store.area_root(area)).await.unwrap();
        assert!(
            entries.next_entry().await.unwrap().is_none(),
            "area {area} should be empty after the sweep"
        );
    }
}
