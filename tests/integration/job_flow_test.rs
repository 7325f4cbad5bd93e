//! End-to-end tests for the job submission flow over HTTP.

mod helpers;

use std::sync::Arc;

use http::StatusCode;

use papermill_core::events::JobStatus;
use papermill_jobs::{OperationKind, OperationRegistry};

use helpers::{StubHandler, TestApp, pdf_bytes};

fn merge_registry() -> papermill_jobs::RegistryBuilder {
    OperationRegistry::builder().register(Arc::new(StubHandler {
        kind: OperationKind::Merge,
        label: "Merged PDF",
        message: "PDFs merged successfully!",
    }))
}

#[tokio::test]
async fn test_merge_submission_accepted_and_downloadable() {
    let app = TestApp::new(merge_registry()).await;

    let response = app
        .submit(
            "merge",
            &[("a.pdf", pdf_bytes()), ("b.pdf", pdf_bytes())],
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "processing");
    assert_eq!(response.body["message"], "Merging PDFs...");
    let job_id = response.body["job_id"]
        .as_str()
        .expect("acceptance carries a job id")
        .to_string();

    let terminal = app.wait_terminal(&job_id).await;
    assert_eq!(terminal.status, JobStatus::Success);
    assert_eq!(
        terminal.message.as_deref(),
        Some("✅ PDFs merged successfully!")
    );
    let downloads = terminal.downloads.expect("success carries downloads");
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].type_label, "Merged PDF");
    assert!(downloads[0].name.contains(&job_id));

    let file = app.get(&downloads[0].url).await;
    assert_eq!(file.status, StatusCode::OK);
    assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(
        file.disposition.as_deref(),
        Some(format!("attachment; filename=\"{}\"", downloads[0].name).as_str())
    );
    // The stub writes the concatenation of both staged inputs.
    assert_eq!(file.bytes.len(), pdf_bytes().len() * 2);
}

#[tokio::test]
async fn test_merge_with_one_file_rejected_in_ack() {
    let app = TestApp::new(merge_registry()).await;

    let response = app.submit("merge", &[("only.pdf", pdf_bytes())], &[]).await;
    // Validation failures come back as an error ack, not an HTTP error.
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "error");
    assert_eq!(
        response.body["message"],
        "At least 2 PDF files are required for merging."
    );
    assert!(response.body["job_id"].is_string());
}

#[tokio::test]
async fn test_empty_file_parts_ignored() {
    let app = TestApp::new(merge_registry()).await;

    // Browsers submit empty parts for unused file inputs; they must not
    // count toward the input arity.
    let response = app
        .submit("merge", &[("a.pdf", pdf_bytes()), ("", b"")], &[])
        .await;
    assert_eq!(response.body["status"], "error");
    assert_eq!(
        response.body["message"],
        "At least 2 PDF files are required for merging."
    );
}

#[tokio::test]
async fn test_protect_password_mismatch_rejected() {
    let app = TestApp::new(OperationRegistry::builder().register(Arc::new(StubHandler {
        kind: OperationKind::Protect,
        label: "Protected PDF",
        message: "PDF protected successfully!",
    })))
    .await;

    let response = app
        .submit(
            "protect",
            &[("doc.pdf", pdf_bytes())],
            &[("password", "secret"), ("confirm_password", "secrets")],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "error");
    assert_eq!(response.body["message"], "Passwords do not match.");
}

#[tokio::test]
async fn test_unknown_operation_is_http_404() {
    let app = TestApp::new(merge_registry()).await;

    let response = app
        .submit("shred", &[("doc.pdf", pdf_bytes())], &[])
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
    assert_eq!(response.body["message"], "Unknown operation: shred");
}

#[tokio::test]
async fn test_download_of_missing_artifact_is_404() {
    let app = TestApp::new(merge_registry()).await;

    let response = app.get("/download/nope_merged_deadbeef.pdf").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_download_never_leaves_output_area() {
    let app = TestApp::new(merge_registry()).await;

    // A real file outside Output must not be reachable through the
    // download route, whatever the path shape.
    let intake = app
        .store
        .area_root(papermill_store::StorageArea::Intake)
        .join("secret.pdf");
    tokio::fs::write(&intake, b"secret").await.unwrap();

    for path in [
        "/download/..%2Fintake%2Fsecret.pdf",
        "/download/..%2Fintake/secret.pdf",
    ] {
        let response = app.get(path).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "path {path}");
    }
}

#[tokio::test]
async fn test_health_reports_service() {
    let app = TestApp::new(merge_registry()).await;

    let response = app.get("/api/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["service"], "papermill");
    assert_eq!(response.body["active_jobs"], 0);
}
