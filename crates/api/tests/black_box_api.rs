use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use einvoice_api::app::{build_app, AppServices};
use einvoice_issuance::testing::{self, connection_refused, Harness};

struct TestServer {
    base_url: String,
    harness: Harness,
    handle: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(dir.path().join("rides"));
        let services = Arc::new(AppServices::new(harness.service()));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            harness,
            handle,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_open() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn invoice_lifecycle_issue_query_list_ride() {
    let srv = TestServer::spawn().await;
    let buyer = testing::sample_buyer(Some("maria@example.com"));
    let tx = srv.harness.seed_income(Some(&buyer));
    let client = reqwest::Client::new();

    // Issue
    let res = client
        .post(srv.url("/invoices"))
        .json(&json!({
            "transaction_id": tx.id.to_string(),
            "signature_password": "clave-firma",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let issued: serde_json::Value = res.json().await.unwrap();
    assert_eq!(issued["status"], "AUTORIZADO");
    let key = issued["access_key"].as_str().unwrap().to_string();
    assert_eq!(key.len(), 49);

    // Query
    let res = client
        .get(srv.url(&format!("/receipts/{key}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["document_number"], "001-001-000000001");
    assert_eq!(receipt["document_type"], "01");
    assert!(receipt.get("xml_content").is_none());

    // Audit list
    let res = client
        .get(srv.url(&format!("/transactions/{}/receipts", tx.id)))
        .send()
        .await
        .unwrap();
    let list: Vec<serde_json::Value> = res.json().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["access_key"], key.as_str());

    // RIDE
    let res = client
        .post(srv.url(&format!("/transactions/{}/ride", tx.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ride: serde_json::Value = res.json().await.unwrap();
    assert!(ride["path"].as_str().unwrap().ends_with(&format!("ride-{key}.txt")));

    // Second issuance of the same transaction is refused
    let res = client
        .post(srv.url("/invoices"))
        .json(&json!({
            "transaction_id": tx.id.to_string(),
            "signature_password": "clave-firma",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_authorized");
    assert_eq!(body["access_key"], key.as_str());
}

#[tokio::test]
async fn offline_authority_is_bad_gateway_and_sync_recovers() {
    let srv = TestServer::spawn().await;
    srv.harness.authority.push_reception(Err(connection_refused()));
    let tx = srv.harness.seed_income(None);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/invoices"))
        .json(&json!({
            "transaction_id": tx.id.to_string(),
            "signature_password": "clave-firma",
            "timeout_secs": 5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = res.json().await.unwrap();
    let key = body["access_key"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/receipts/{key}/sync")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let synced: serde_json::Value = res.json().await.unwrap();
    assert_eq!(synced["status"], "AUTORIZADO");
}

#[tokio::test]
async fn sweep_endpoint_reports_authorized_count() {
    let srv = TestServer::spawn().await;
    srv.harness.authority.push_reception(Err(connection_refused()));
    let tx = srv.harness.seed_income(None);
    let client = reqwest::Client::new();

    client
        .post(srv.url("/invoices"))
        .json(&json!({
            "transaction_id": tx.id.to_string(),
            "signature_password": "clave-firma",
        }))
        .send()
        .await
        .unwrap();

    let res = client.post(srv.url("/sync")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["authorized"], 1);
}

#[tokio::test]
async fn credit_note_requires_an_authorized_original() {
    let srv = TestServer::spawn().await;
    let original = srv.harness.seed_income(None);
    let void = srv.harness.seed_void(&original);

    let res = reqwest::Client::new()
        .post(srv.url("/credit-notes"))
        .json(&json!({
            "void_transaction_id": void.id.to_string(),
            "original_transaction_id": original.id.to_string(),
            "reason": "Devolución",
            "signature_password": "clave-firma",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "original_not_authorized");
}

#[tokio::test]
async fn malformed_identifiers_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/invoices"))
        .json(&json!({ "transaction_id": "nope", "signature_password": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/receipts/123"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_access_key");

    let res = client
        .get(srv.url("/receipts/1001202601179001234500110010010000000011234567817"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn emission_points_list_the_active_issuer_counters() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/emission-points")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let points: Vec<serde_json::Value> = res.json().await.unwrap();
    assert!(points.is_empty());

    let tx = srv.harness.seed_income(None);
    client
        .post(srv.url("/invoices"))
        .json(&json!({
            "transaction_id": tx.id.to_string(),
            "signature_password": "clave-firma",
        }))
        .send()
        .await
        .unwrap();

    let points: Vec<serde_json::Value> = client
        .get(srv.url("/emission-points"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["establishment_code"], "001");
    assert_eq!(points[0]["emission_point_code"], "001");
    assert_eq!(points[0]["document_type"], "01");
    assert_eq!(points[0]["current_sequence"], 1);
}
