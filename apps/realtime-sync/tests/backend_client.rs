//! Backend Client Integration Tests
//!
//! Exercises the HTTP data source against a wiremock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde_json::json;
use test_case::test_case;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use qx_realtime_sync::{BackendClient, FetchError, SyncDataSource, TradeSide};

fn client_for(server: &MockServer) -> BackendClient {
    BackendClient::new(
        &format!("{}/v1/qx", server.uri()),
        &format!("{}/api", server.uri()),
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn fetches_and_decodes_trades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/qx/getTrades"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "t1",
                "issuer": "CFBMEMZOIDEXQAUXYYSZIURADQLAPWPMNJXQSNVQZAHYVOPYUKKJBJUCTVJL",
                "assetName": "QX",
                "bid": false,
                "price": 250,
                "numberOfShares": 4,
                "tickTime": "2024-05-01T12:00:00Z"
            },
            { "id": "t2" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let trades = client_for(&server).fetch_trades().await.unwrap();

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].asset_name.as_deref(), Some("QX"));
    assert_eq!(trades[0].side(), Some(TradeSide::Sell));
    assert_eq!(trades[0].total(), Some(1_000));
    assert_eq!(trades[0].extra.get("id"), Some(&json!("t1")));
    assert_eq!(trades[1].price, None);
}

#[tokio::test]
async fn empty_trade_list_is_valid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/qx/getTrades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let trades = client_for(&server).fetch_trades().await.unwrap();
    assert!(trades.is_empty());
}

#[tokio::test]
async fn fetches_overview_verbatim() {
    let server = MockServer::start().await;
    let body = json!({ "totalPool": "100", "epoch": 150, "stats": { "burned": 7 } });
    Mock::given(method("GET"))
        .and(path("/api/qtreatz/overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let overview = client_for(&server)
        .fetch_qtreatz_overview()
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&overview).unwrap(), body);
    assert_eq!(overview.get("totalPool"), Some(&json!("100")));
}

#[test_case(404 ; "not found")]
#[test_case(500 ; "server error")]
#[test_case(503 ; "unavailable")]
#[tokio::test]
async fn non_success_status_is_reported(status: u16) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/qx/getTrades"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_trades().await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Status {
            status,
            url: client.trades_url().to_string(),
        }
    );
}

#[tokio::test]
async fn malformed_trades_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/qx/getTrades"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_trades().await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn array_overview_is_kept_verbatim() {
    let server = MockServer::start().await;
    let body = json!([{ "totalPool": 1 }]);
    Mock::given(method("GET"))
        .and(path("/api/qtreatz/overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let overview = client_for(&server)
        .fetch_qtreatz_overview()
        .await
        .unwrap();
    assert_eq!(overview.len(), 1);
    assert_eq!(serde_json::to_value(&overview).unwrap(), body);
}

#[test_case(json!(42) ; "number")]
#[test_case(json!("text") ; "string")]
#[test_case(json!(null) ; "null")]
#[tokio::test]
async fn scalar_overview_is_a_decode_error(body: serde_json::Value) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/qtreatz/overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_qtreatz_overview()
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let client = BackendClient::new(
        "http://127.0.0.1:9/v1/qx",
        "http://127.0.0.1:9/api",
        Duration::from_secs(1),
    )
    .unwrap();

    let err = client.fetch_qtreatz_overview().await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/qtreatz/overview"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = BackendClient::new(
        &format!("{}/v1/qx", server.uri()),
        &format!("{}/api", server.uri()),
        Duration::from_millis(50),
    )
    .unwrap();

    let err = client.fetch_qtreatz_overview().await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}
