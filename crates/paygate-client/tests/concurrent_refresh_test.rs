//! Refresh coalescing under concurrency.
//!
//! Requests that fail with the same expired token must share one refresh
//! call and replay with its single result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use paygate_client::{
    AccessToken, ApiClient, ApiClientConfig, ApiError, CredentialRecord, CredentialStore,
    InMemoryCredentialStore, RefreshToken,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(
    mock_server: &MockServer,
) -> (ApiClient, Arc<InMemoryCredentialStore>, Arc<AtomicUsize>) {
    let store = Arc::new(InMemoryCredentialStore::with_record(CredentialRecord::new(
        AccessToken::new("A1"),
        RefreshToken::new("R1"),
        None,
    )));
    let redirects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&redirects);
    let client = ApiClient::new(
        ApiClientConfig::new(mock_server.uri().parse().unwrap()),
        store.clone(),
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    (client, store, redirects)
}

async fn mount_resources(mock_server: &MockServer, expected_per_token: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/(transactions|payments|settlements)$"))
        .and(header("Authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(expected_per_token)
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(transactions|payments|settlements)$"))
        .and(header("Authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(expected_per_token)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let mock_server = MockServer::start().await;
    mount_resources(&mock_server, 2).await;

    Mock::given(method("POST"))
        .and(path("/public/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "A2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, store, _) = test_client(&mock_server);
    let (first, second) = tokio::join!(client.get("/transactions"), client.get("/payments"));

    assert_eq!(first.unwrap().body["ok"], true);
    assert_eq!(second.unwrap().body["ok"], true);
    assert_eq!(store.access_token().unwrap().as_str(), "A2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coalescing_holds_on_a_multi_threaded_runtime() {
    let mock_server = MockServer::start().await;
    mount_resources(&mock_server, 3).await;

    Mock::given(method("POST"))
        .and(path("/public/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "A2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _, _) = test_client(&mock_server);

    let handles: Vec<_> = ["/transactions", "/payments", "/settlements"]
        .into_iter()
        .map(|resource| {
            let client = client.clone();
            tokio::spawn(async move { client.get(resource).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().body["ok"], true);
    }
}

#[tokio::test]
async fn concurrent_waiters_all_fail_when_the_shared_refresh_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/(transactions|payments)$"))
        .and(header("Authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/public/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(403).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, store, redirects) = test_client(&mock_server);
    let (first, second) = tokio::join!(client.get("/transactions"), client.get("/payments"));

    assert!(first.unwrap_err().is_unauthorized());
    assert!(matches!(second, Err(ApiError::Unauthorized { .. })));
    assert!(store.load().is_none());
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoned_caller_does_not_strand_the_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/transactions"))
        .and(header("Authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/transactions"))
        .and(header("Authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/public/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "A2"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, store, _) = test_client(&mock_server);

    // Give up while the refresh is still in flight.
    let abandoned = tokio::time::timeout(Duration::from_millis(100), client.get("/transactions")).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.access_token().unwrap().as_str(), "A2");

    // The settled refresh left nothing pending: the next call goes straight
    // through with the new token.
    let resp = client.get("/transactions").await.unwrap();
    assert_eq!(resp.body["ok"], true);
}
