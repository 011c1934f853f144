//! HTTP-level tests for the `/api/v1/imports` resource over in-memory stores.

mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use kbase_core::import_job::ImportJobStatus;
use kbase_core::stores::JobStore;

use common::{build_test_app, expect_json, get, multipart_upload, post_empty, send};

const IMPORTS: &str = "/api/v1/imports";

fn created_at(job: &serde_json::Value) -> DateTime<Utc> {
    job["created_at"].as_str().unwrap().parse().unwrap()
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_accepts_txt_and_reports_pdf() {
    let (app, stores) = build_test_app();

    let response = send(
        &app,
        multipart_upload(IMPORTS, &[("notes.txt", "alpha"), ("scan.pdf", "%PDF-1.7")]),
    )
    .await;
    let json = expect_json(response, StatusCode::CREATED).await;

    let outcomes = json["data"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["filename"], "notes.txt");
    assert_eq!(outcomes[0]["status"], "pending");
    assert!(outcomes[0]["job_id"].is_i64());
    assert_eq!(outcomes[1]["filename"], "scan.pdf");
    assert_eq!(outcomes[1]["status"], "error");
    assert!(outcomes[1]["detail"].is_string());
    assert_eq!(stores.jobs.len(), 1);
}

#[tokio::test]
async fn submit_with_only_rejected_files_is_400() {
    let (app, stores) = build_test_app();

    let response = send(&app, multipart_upload(IMPORTS, &[("a.pdf", "x")])).await;
    let json = expect_json(response, StatusCode::BAD_REQUEST).await;

    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(stores.jobs.is_empty());
}

#[tokio::test]
async fn submit_with_no_files_is_400() {
    let (app, _) = build_test_app();

    let response = send(&app, multipart_upload(IMPORTS, &[])).await;
    expect_json(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn submit_where_every_upload_fails_is_200_with_errors() {
    let (app, stores) = build_test_app();
    stores.objects.set_fail_puts(true);

    let response = send(&app, multipart_upload(IMPORTS, &[("a.txt", "x")])).await;
    let json = expect_json(response, StatusCode::OK).await;

    assert_eq!(json["data"][0]["status"], "error");
    let detail = json["data"][0]["detail"].as_str().unwrap();
    assert!(!detail.contains("upload rejected"));
    assert!(stores.jobs.is_empty());
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_uploads_list_as_pending_in_creation_order() {
    let (app, _) = build_test_app();
    send(
        &app,
        multipart_upload(IMPORTS, &[("1.txt", "a"), ("2.txt", "b"), ("3.txt", "c")]),
    )
    .await;

    let json = expect_json(get(&app, IMPORTS).await, StatusCode::OK).await;
    let jobs = json["data"].as_array().unwrap();

    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j["status"] == "pending"));
    let names: Vec<_> = jobs.iter().map(|j| j["filename"].as_str().unwrap()).collect();
    assert_eq!(names, ["1.txt", "2.txt", "3.txt"]);
    assert!(created_at(&jobs[0]) < created_at(&jobs[1]));
    assert!(created_at(&jobs[1]) < created_at(&jobs[2]));
    assert!(jobs.iter().all(|j| !j["file_ref"].as_str().unwrap().contains("://")));
}

#[tokio::test]
async fn get_unknown_job_is_404() {
    let (app, _) = build_test_app();

    let json = expect_json(get(&app, "/api/v1/imports/999").await, StatusCode::NOT_FOUND).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn get_with_non_numeric_id_is_400() {
    let (app, _) = build_test_app();

    let response = get(&app, "/api/v1/imports/abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_deletes_entries_after_watermark_and_reports_count() {
    let (app, stores) = build_test_app();
    send(&app, multipart_upload(IMPORTS, &[("a.txt", "x")])).await;
    let job = stores.jobs.list_all().await.unwrap().remove(0);

    for i in 1..=5 {
        stores
            .entries
            .insert_at(job.created_at - chrono::Duration::seconds(i), None);
    }
    for i in 0..12 {
        stores
            .entries
            .insert_at(job.created_at + chrono::Duration::seconds(i), None);
    }

    let uri = format!("{IMPORTS}/{}/cancel", job.id);
    let json = expect_json(post_empty(&app, &uri).await, StatusCode::OK).await;

    assert_eq!(json["data"]["deleted_count"], 12);
    assert_eq!(json["data"]["job_id"], job.id);
    assert_eq!(json["data"]["filename"], "a.txt");
    assert_eq!(stores.entries.len(), 5);

    let detail = expect_json(get(&app, &format!("{IMPORTS}/{}", job.id)).await, StatusCode::OK).await;
    assert_eq!(detail["data"]["status"], "cancelled");
    assert_eq!(detail["data"]["error_message"], "Cancelled by user. Deleted 12 records.");

    // Second cancel is safe and deletes nothing.
    let again = expect_json(post_empty(&app, &uri).await, StatusCode::OK).await;
    assert_eq!(again["data"]["deleted_count"], 0);
}

#[tokio::test]
async fn cancel_unknown_job_is_404() {
    let (app, _) = build_test_app();

    let response = post_empty(&app, "/api/v1/imports/77/cancel").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_completed_job_is_409() {
    let (app, stores) = build_test_app();
    send(&app, multipart_upload(IMPORTS, &[("a.txt", "x")])).await;
    let job = stores.jobs.list_all().await.unwrap().remove(0);
    stores
        .jobs
        .transition(job.id, &[ImportJobStatus::Pending], ImportJobStatus::Processing, None)
        .await
        .unwrap();
    stores
        .jobs
        .transition(job.id, &[ImportJobStatus::Processing], ImportJobStatus::Completed, None)
        .await
        .unwrap();

    let response = post_empty(&app, &format!("{IMPORTS}/{}/cancel", job.id)).await;
    let json = expect_json(response, StatusCode::CONFLICT).await;
    assert_eq!(json["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Clear
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_with_empty_queue_returns_zeros() {
    let (app, _) = build_test_app();

    let json = expect_json(post_empty(&app, "/api/v1/imports/clear").await, StatusCode::OK).await;

    assert_eq!(json["data"]["deleted_jobs"], 0);
    assert_eq!(json["data"]["deleted_files"], 0);
    assert_eq!(json["data"]["failed_files"], 0);
}

#[tokio::test]
async fn clear_removes_queued_jobs_and_files() {
    let (app, stores) = build_test_app();
    send(&app, multipart_upload(IMPORTS, &[("a.txt", "x"), ("b.txt", "y")])).await;
    assert_eq!(stores.objects.len(), 2);

    let json = expect_json(post_empty(&app, "/api/v1/imports/clear").await, StatusCode::OK).await;

    assert_eq!(json["data"]["deleted_jobs"], 2);
    assert_eq!(json["data"]["deleted_files"], 2);
    assert!(stores.jobs.is_empty());
    assert!(stores.objects.is_empty());
}

#[tokio::test]
async fn clear_queue_only_keeps_files() {
    let (app, stores) = build_test_app();
    send(&app, multipart_upload(IMPORTS, &[("a.txt", "x"), ("b.txt", "y")])).await;

    let json = expect_json(
        post_empty(&app, "/api/v1/imports/clear-queue").await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(json["data"]["deleted_jobs"], 2);
    assert!(stores.jobs.is_empty());
    assert_eq!(stores.objects.len(), 2);
}
