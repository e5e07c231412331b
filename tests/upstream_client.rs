mod support;

use std::time::Duration;

use staleguard::cache::FetchError;
use staleguard::infra::upstream::UpstreamClient;

fn client() -> UpstreamClient {
    UpstreamClient::new(Duration::from_secs(5)).expect("client builds")
}

#[tokio::test]
async fn fetch_rows_returns_array_and_sends_query() {
    let upstream = support::spawn_upstream().await;

    let rows = client()
        .fetch_rows(&upstream.sql_url(), "SELECT id FROM \"t\";", "tiles")
        .await
        .expect("rows");

    assert_eq!(rows.len(), support::ROW_COUNT);
    assert_eq!(upstream.hits.queries(), vec!["SELECT id FROM \"t\";"]);
}

#[tokio::test]
async fn non_success_status_names_context_and_status() {
    let upstream = support::spawn_upstream().await;

    let err = client()
        .fetch_rows(&upstream.failing_url(), "SELECT 1", "story events")
        .await
        .expect_err("503 fails");

    assert!(matches!(err, FetchError::Upstream { .. }));
    assert_eq!(err.to_string(), "story events: 503 Service Unavailable");
}

#[tokio::test]
async fn non_array_body_is_malformed() {
    let upstream = support::spawn_upstream().await;

    let err = client()
        .fetch_rows(&upstream.object_url(), "SELECT 1", "hyperstructures")
        .await
        .expect_err("object body fails");

    assert_eq!(
        err,
        FetchError::malformed("hyperstructures", "expected array response")
    );
    assert_eq!(
        err.to_string(),
        "hyperstructures: expected array response"
    );
}

#[tokio::test]
async fn unreachable_upstream_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = client()
        .fetch_rows(&format!("http://{addr}/sql"), "SELECT 1", "tiles")
        .await
        .expect_err("nothing listening");

    assert_eq!(err.kind(), "transport");
    assert!(err.to_string().starts_with("tiles: "));
}
