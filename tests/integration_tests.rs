//! Integration tests against a real HTTP server

mod common;

use common::{init_tracing, DEV_ADDRESS, DEV_KEY};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;
use x402_agent::{AgentConfig, AgentError, AttemptFailure, PaymentClient, RetryPolicy};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(10)).unwrap()
}

fn test_mode_client(url: String) -> PaymentClient {
    init_tracing();
    let config = AgentConfig::builder()
        .api_url(url)
        .test_mode(true)
        .build()
        .unwrap();
    PaymentClient::new(config).unwrap()
}

#[tokio::test]
async fn test_free_resource() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/crypto/trends")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": {"timestamp": "2024-01-01T00:00:00Z"}}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = test_mode_client(server.url());
    let data = client
        .request_data("/api/v1/crypto/trends", &fast_policy(3))
        .await
        .unwrap();

    assert_eq!(data["data"]["timestamp"], "2024-01-01T00:00:00Z");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_test_mode_payment_flow() {
    let mut server = Server::new_async().await;
    let challenge = server
        .mock("GET", "/premium")
        .match_header("x-payment", Matcher::Missing)
        .with_status(402)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "error": "Payment required",
                "paymentRequired": {
                    "network": "eip155:80002",
                    "recipient": "0xABC",
                    "amount": "1000",
                    "asset": "0xUSDC"
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let paid = server
        .mock("GET", "/premium")
        .match_header(
            "x-payment",
            Matcher::Regex(r#""testMode":true"#.to_string()),
        )
        .with_status(200)
        .with_body(json!({"data": "This is protected content"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = test_mode_client(server.url());
    let data = client.request_data("/premium", &fast_policy(3)).await.unwrap();

    assert_eq!(data["data"], "This is protected content");
    challenge.assert_async().await;
    paid.assert_async().await;
}

#[tokio::test]
async fn test_wallet_payment_flow_with_header_challenge() {
    let mut server = Server::new_async().await;
    let requirement = json!({
        "recipient": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        "amount": 1000,
        "asset": "0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582",
        "expires": 1893456000
    });
    let challenge = server
        .mock("GET", "/premium")
        .match_header("x-payment", Matcher::Missing)
        .with_status(402)
        .with_header("X-Payment-Required", &requirement.to_string())
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let paid = server
        .mock("GET", "/premium")
        .match_header(
            "x-payment",
            Matcher::AllOf(vec![
                Matcher::Regex(format!(r#""payer":"{}""#, DEV_ADDRESS)),
                Matcher::Regex(r#""network":"eip155:80002""#.to_string()),
                Matcher::Regex(r#""expiry":1893456000"#.to_string()),
                Matcher::Regex(r#""signature":"0x[0-9a-f]{130}""#.to_string()),
            ]),
        )
        .with_status(200)
        .with_body(json!({"data": "paid"}).to_string())
        .expect(1)
        .create_async()
        .await;

    init_tracing();
    let config = AgentConfig::builder()
        .api_url(server.url())
        .private_key(DEV_KEY)
        .build()
        .unwrap();
    let client = PaymentClient::new(config).unwrap();
    assert_eq!(client.signer().address(), Some(DEV_ADDRESS));

    let data = client.request_data("/premium", &fast_policy(1)).await.unwrap();

    assert_eq!(data["data"], "paid");
    challenge.assert_async().await;
    paid.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/flaky")
        .with_status(500)
        .with_body("internal error")
        .expect(3)
        .create_async()
        .await;

    let client = test_mode_client(server.url());
    let result = client.request_data("/flaky", &fast_policy(3)).await;

    match result {
        Err(AgentError::RetriesExhausted {
            attempts,
            last: AttemptFailure::UnexpectedStatus { status, body },
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("Expected RetriesExhausted, got: {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_requirement_stops_immediately() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/premium")
        .with_status(402)
        .with_body(json!({"error": "pay up"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = test_mode_client(server.url());
    let result = client.request_data("/premium", &fast_policy(3)).await;

    assert!(matches!(result, Err(AgentError::PaymentRequirementMissing)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_no_wallet_without_test_mode() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/premium")
        .with_status(402)
        .with_body(
            json!({"paymentRequired": {"recipient": "0xABC", "amount": 1, "asset": "0xUSDC"}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    init_tracing();
    let config = AgentConfig::builder().api_url(server.url()).build().unwrap();
    let client = PaymentClient::new(config).unwrap();
    let result = client.request_data("/premium", &fast_policy(3)).await;

    assert!(matches!(result, Err(AgentError::SignerUnavailable)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_network_failure() {
    // nothing listens on port 1
    let client = test_mode_client("http://127.0.0.1:1".to_string());
    let result = client.request_data("/data", &fast_policy(2)).await;

    match result {
        Err(AgentError::RetriesExhausted {
            attempts,
            last: AttemptFailure::Network(_),
        }) => assert_eq!(attempts, 2),
        other => panic!("Expected network failure, got: {:?}", other),
    }
}
