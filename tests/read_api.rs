//! Read API tests against a real server: bind an ephemeral port, serve the
//! axum router, and exercise it with reqwest the way a browser would.

use std::sync::Arc;

use meritdrop_api::{router, ApiState};
use meritdrop_directory::{DirectoryService, InMemorySource, MemoryCache};
use meritdrop_tests::record;
use serde_json::Value;

// =============================================================================
// HELPERS
// =============================================================================

async fn spawn_api(records: Vec<meritdrop_core::UserRecord>) -> String {
    let directory = DirectoryService::new(
        Arc::new(MemoryCache::new()),
        Arc::new(InMemorySource::new(records)),
    );
    let state = Arc::new(ApiState { directory });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn dataset(n: u64) -> Vec<meritdrop_core::UserRecord> {
    (1..=n).map(|id| record(id, (id % 100) as u32, 50, 50)).collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn page_two_returns_slice_and_pagination() {
    let base = spawn_api(dataset(120)).await;

    let body: Value = reqwest::get(format!("{base}/data?page=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 50);
    assert_eq!(records[0]["id"], 51);
    assert_eq!(records[49]["id"], 100);
    assert_eq!(body["pagination"]["current_page"], 2);
    assert_eq!(body["pagination"]["total"], 120);
    assert_eq!(body["pagination"]["last_page"], 3);
}

#[tokio::test]
async fn missing_page_defaults_to_one() {
    let base = spawn_api(dataset(5)).await;

    let body: Value = reqwest::get(format!("{base}/data"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["pagination"]["current_page"], 1);
    assert_eq!(body["records"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn unknown_sort_field_falls_back_to_identity_order() {
    let base = spawn_api(dataset(10)).await;

    let body: Value = reqwest::get(format!("{base}/data?sortField=volume&sortOrder=sideways"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<u64> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn sort_by_score_descending() {
    let base = spawn_api(vec![
        record(1, 30, 0, 0),
        record(2, 90, 0, 0),
        record(3, 60, 0, 0),
    ])
    .await;

    let body: Value = reqwest::get(format!(
        "{base}/data?sortField=skills_score&sortOrder=desc"
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    let ids: Vec<u64> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3, 1]);
}

#[tokio::test]
async fn search_narrows_records_and_total() {
    let base = spawn_api(dataset(30)).await;

    let body: Value = reqwest::get(format!("{base}/data?search=user-7"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["profile"]["display_name"], "user-7");
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn page_zero_is_a_client_error() {
    let base = spawn_api(dataset(5)).await;

    let response = reqwest::get(format!("{base}/data?page=0")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn healthz_answers_ok() {
    let base = spawn_api(Vec::new()).await;

    let response = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}
