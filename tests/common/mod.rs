#![allow(dead_code)]

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use x402_agent::{
    AgentConfig, PaymentClient, RetryPolicy, Signer, Transport, TransportError, TransportResponse,
};

/// Hardhat development account #0
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

pub const BASE_URL: &str = "http://agent.test";

/// A request seen by the scripted transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub enum Step {
    Respond(TransportResponse),
    Fail(&'static str),
}

/// Transport that replays a fixed script and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        init_tracing();
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Time between consecutive requests
    pub fn gaps(&self) -> Vec<Duration> {
        self.requests()
            .windows(2)
            .map(|w| w[1].at.duration_since(w[0].at))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            at: Instant::now(),
        });

        match self.script.lock().unwrap().pop_front() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(message)) => Err(TransportError::new(message)),
            None => Err(TransportError::new("script exhausted")),
        }
    }
}

pub fn ok(body: Value) -> Step {
    Step::Respond(TransportResponse::new(
        StatusCode::OK,
        HeaderMap::new(),
        body.to_string(),
    ))
}

pub fn status(code: u16) -> Step {
    Step::Respond(TransportResponse::new(
        StatusCode::from_u16(code).unwrap(),
        HeaderMap::new(),
        format!("status {code}"),
    ))
}

pub fn rate_limited(retry_after: Option<&'static str>) -> Step {
    let mut headers = HeaderMap::new();
    if let Some(secs) = retry_after {
        headers.insert("retry-after", HeaderValue::from_static(secs));
    }
    Step::Respond(TransportResponse::new(
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        "slow down",
    ))
}

pub fn requirement_json() -> Value {
    json!({
        "network": "eip155:80002",
        "recipient": "0xABC",
        "amount": 1000,
        "asset": "0xUSDC"
    })
}

/// 402 with the requirement in the body
pub fn payment_required() -> Step {
    payment_required_with(requirement_json())
}

/// 402 carrying `requirement` as the body's `paymentRequired`
pub fn payment_required_with(requirement: Value) -> Step {
    Step::Respond(TransportResponse::new(
        StatusCode::PAYMENT_REQUIRED,
        HeaderMap::new(),
        json!({ "error": "Payment required", "paymentRequired": requirement }).to_string(),
    ))
}

/// 402 with the requirement only in the `X-Payment-Required` header
pub fn payment_required_header() -> Step {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-payment-required",
        HeaderValue::from_str(&requirement_json().to_string()).unwrap(),
    );
    Step::Respond(TransportResponse::new(
        StatusCode::PAYMENT_REQUIRED,
        headers,
        json!({ "error": "Payment required" }).to_string(),
    ))
}

pub fn policy(max_attempts: u32, base_secs: u64) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_secs(base_secs)).unwrap()
}

pub fn client(transport: Arc<ScriptedTransport>, signer: Signer) -> PaymentClient {
    PaymentClient::from_parts(AgentConfig::new(BASE_URL), transport, signer).unwrap()
}

/// Route library events to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn wallet_signer() -> Signer {
    Signer::from_private_key(Some(DEV_KEY), false)
}

/// Assert two durations agree to within the timer's millisecond granularity
pub fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(5),
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}
