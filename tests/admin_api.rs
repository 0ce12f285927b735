//! Admin router exercised in-process.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::Fleet;
use serpwatch::coordination::CoordinationStore;
use serpwatch::server::create_router;

async fn call(fleet: &Fleet, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let router = create_router(fleet.server(0, 1));
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let fleet = Fleet::new().await;
    let (status, _) = call(&fleet, "GET", "/hc", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upload_replaces_and_dedupes() {
    let fleet = Fleet::new().await;
    fleet.seed(5, &[]).await;

    let keywords = json!([
        { "product_name": "비타민", "keyword": "비타민d", "priority": "A" },
        { "product_name": "비타민", "keyword": "비타민d", "priority": "A" },
        { "product_name": "", "keyword": "", "priority": "" },
        { "product_name": "유산균", "keyword": "유산균 추천" }
    ]);
    let (status, body) = call(&fleet, "POST", "/api/upload/keywords", Some(keywords)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 2);
    assert_eq!(fleet.db.keywords().count().await.unwrap(), 2);

    let urls = json!([
        { "url": "https://cafe.naver.com/health/123", "keyword": "유산균 추천" }
    ]);
    let (status, body) = call(&fleet, "POST", "/api/upload/urls", Some(urls)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 1);
    assert_eq!(fleet.db.urls().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_status_without_job_is_not_found() {
    let fleet = Fleet::new().await;
    let (status, body) = call(&fleet, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("no job"));
}

#[tokio::test]
async fn test_dispatch_rejects_non_positive_limit() {
    let fleet = Fleet::new().await;
    let (status, _) = call(&fleet, "POST", "/api/dispatch?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dispatch_without_keywords() {
    let fleet = Fleet::new().await;
    let (status, body) = call(&fleet, "POST", "/api/dispatch", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "NO_KEYWORDS");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_runs_to_report() {
    let fleet = Fleet::new().await;
    fleet.seed(6, &[]).await;

    let (status, body) = call(&fleet, "POST", "/api/dispatch?limit=4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "DISPATCHED");
    assert_eq!(body["my_keywords"], 4);
    assert_eq!(body["total_keywords"], 4);

    let mut complete = Value::Null;
    for _ in 0..100 {
        let (_, body) = call(&fleet, "GET", "/api/status", None).await;
        if body["complete"] == true && body["job"]["report_sent"] == true {
            complete = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(complete["persisted"], 4);
    assert_eq!(fleet.sender.delivered(), vec![(4, 0)]);

    let (status, body) = call(&fleet, "POST", "/api/report/check", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "REPORT_ALREADY_SENT");
}

#[tokio::test]
async fn test_identity_probe() {
    let fleet = Fleet::new().await;
    let (status, body) = call(&fleet, "GET", "/api/diag/identities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_ips"], 3);
    assert_eq!(body["tested"], 3);
    assert_eq!(body["ok"], 3);
}

#[tokio::test]
async fn test_match_trace_finds_registered_url() {
    let fleet = Fleet::new().await;
    fleet.seed(1, &[]).await;

    let (status, body) = call(&fleet, "GET", "/api/diag/match?keyword=kw-0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["block_present"], true);
    assert_eq!(body["matched"], 1);
}

#[tokio::test]
async fn test_crawl_test_requires_keywords() {
    let fleet = Fleet::new().await;
    let (status, _) = call(&fleet, "GET", "/api/diag/crawl?keywords=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_href_dump_is_a_single_request() {
    let fleet = Fleet::new().await;

    let (status, _) = call(&fleet, "GET", "/api/diag/hrefs?keyword=broken-9", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(fleet.site.requests.load(Ordering::SeqCst), 1);
    assert!(fleet.store.bad_identities().await.unwrap().is_empty());

    let (status, body) = call(&fleet, "GET", "/api/diag/hrefs?keyword=kw-0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fleet.site.requests.load(Ordering::SeqCst), 2);
    assert!(body["hrefs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_match_trace_reports_upstream_failure() {
    let fleet = Fleet::new().await;

    let (status, _) = call(&fleet, "GET", "/api/diag/match?keyword=broken-3", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(fleet.site.requests.load(Ordering::SeqCst), 1);
    assert!(fleet.store.bad_identities().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_test_mails_workbook_without_a_job() {
    let fleet = Fleet::new().await;
    fleet.seed(1, &[]).await;

    let (status, body) = call(
        &fleet,
        "POST",
        "/api/diag/run-test?keywords=kw-0,broken-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keyword_count"], 2);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["filename"], "테스트_통검결과.xlsx");
    assert_eq!(fleet.sender.delivered(), vec![(1, 1)]);

    let (status, _) = call(&fleet, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_test_surfaces_delivery_failure() {
    let fleet = Fleet::new().await;
    fleet.sender.fail.store(true, Ordering::SeqCst);

    let (status, _) = call(&fleet, "POST", "/api/diag/run-test?keywords=kw-0", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(fleet.sender.attempts.load(Ordering::SeqCst), 1);

    let (status, _) = call(&fleet, "POST", "/api/diag/run-test?keywords=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
