//! HTTP client with automatic x402 payment handling
//!
//! [`PaymentClient::request_data`] drives one logical request through the
//! protocol:
//!
//! - `200` returns the JSON body.
//! - `402` parses the challenge, builds an assertion and reissues the same
//!   request once with an `X-Payment` header. The reissue does not use a
//!   slot of the retry budget; a non-200 answer to it fails the attempt.
//! - `429` waits `Retry-After` seconds (or the base delay) and repeats the
//!   same attempt.
//! - anything else, and network errors, fail the attempt.
//!
//! Failed attempts are followed by `base_delay * 2^attempt` of backoff until
//! the budget is spent.

use crate::challenge::parse_challenge;
use crate::config::AgentConfig;
use crate::error::AttemptFailure;
use crate::payment::PaymentBuilder;
use crate::transport::{ReqwestTransport, Transport, TransportResponse};
use crate::types::{headers, AttemptOutcome, PaymentRequirement, RetryPolicy};
use crate::wallet::Signer;
use crate::{AgentError, Result};
use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Client that pays for resources behind HTTP 402 challenges
#[derive(Clone)]
pub struct PaymentClient {
    config: Arc<AgentConfig>,
    transport: Arc<dyn Transport>,
    payments: Arc<PaymentBuilder>,
}

impl std::fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClient")
            .field("config", &self.config)
            .field("transport", &"<transport>")
            .field("signer", self.payments.signer())
            .finish()
    }
}

impl PaymentClient {
    /// Create a client that talks HTTP through `reqwest`
    pub fn new(config: AgentConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout)
            .map_err(|e| AgentError::config(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a custom transport
    pub fn with_transport(config: AgentConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let signer = Signer::from_private_key(config.private_key.as_deref(), config.test_mode);
        Self::from_parts(config, transport, signer)
    }

    /// Create a client with an explicit signer, ignoring the config's key
    /// and test-mode settings. The config is still validated.
    pub fn from_parts(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        signer: Signer,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
            payments: Arc::new(PaymentBuilder::new(Arc::new(signer))),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn signer(&self) -> &Signer {
        self.payments.signer()
    }

    /// Request `endpoint` with the configured retry policy
    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        let policy = self.config.retry_policy;
        self.request_data(endpoint, &policy).await
    }

    /// Request `endpoint`, paying if challenged, retrying per `policy`
    pub async fn request_data(&self, endpoint: &str, policy: &RetryPolicy) -> Result<Value> {
        self.request_data_with_cancel(endpoint, policy, &CancellationToken::new())
            .await
    }

    /// Like [`Self::request_data`], stopping with [`AgentError::Cancelled`]
    /// once `cancel` fires. Cancellation is observed before each request and
    /// during waits, never in the middle of a request.
    pub async fn request_data_with_cancel(
        &self,
        endpoint: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let url = self.config.endpoint_url(endpoint);
        info!(endpoint, "Requesting");

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let outcome = match self.transport.get(&url, &[]).await {
                Ok(response) => classify(&response, policy)?,
                Err(e) => AttemptOutcome::Failure(AttemptFailure::network(e.to_string())),
            };

            let failure = match outcome {
                AttemptOutcome::Success(data) => {
                    info!(endpoint, "Data received");
                    return Ok(data);
                }
                AttemptOutcome::RateLimited(wait) => {
                    warn!(endpoint, wait_secs = wait.as_secs_f64(), "Rate limited, waiting");
                    pause(wait, cancel).await?;
                    continue;
                }
                AttemptOutcome::PaymentChallenge(requirement) => {
                    info!(endpoint, "Payment required, processing");
                    match self.pay_and_reissue(&url, &requirement).await? {
                        Ok(data) => {
                            info!(endpoint, "Payment successful, data received");
                            return Ok(data);
                        }
                        Err(failure) => failure,
                    }
                }
                AttemptOutcome::Failure(failure) => failure,
            };

            warn!(
                endpoint,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts(),
                error = %failure,
                "Attempt failed"
            );

            if !policy.has_next(attempt) {
                error!(endpoint, attempts = policy.max_attempts(), "All attempts failed");
                return Err(AgentError::RetriesExhausted {
                    attempts: policy.max_attempts(),
                    last: failure,
                });
            }

            let backoff = policy.delay_for(attempt);
            debug!(endpoint, backoff_secs = backoff.as_secs_f64(), "Retrying after backoff");
            pause(backoff, cancel).await?;
            attempt += 1;
        }
    }

    /// Pay for `requirement` and reissue the request once with the assertion.
    ///
    /// The inner error is a failed attempt; the outer one is fatal.
    async fn pay_and_reissue(
        &self,
        url: &str,
        requirement: &PaymentRequirement,
    ) -> Result<std::result::Result<Value, AttemptFailure>> {
        let assertion = self.payments.build(requirement)?;
        let header = assertion.to_header_value()?;

        info!(payer = assertion.payer(), "Retrying with payment");
        let response = match self.transport.get(url, &[(headers::X_PAYMENT, header)]).await {
            Ok(response) => response,
            Err(e) => return Ok(Err(AttemptFailure::network(e.to_string()))),
        };

        if response.status != StatusCode::OK {
            let body = response.text();
            warn!(status = %response.status, body = %body, "Payment rejected");
            return Ok(Err(AttemptFailure::PaymentRejected {
                status: response.status,
                body,
            }));
        }

        Ok(decode_body(&response))
    }
}

/// Classify a response to the plain (unpaid) request.
///
/// Only a 402 without a usable requirement is an error; every other status
/// maps to an outcome.
pub fn classify(response: &TransportResponse, policy: &RetryPolicy) -> Result<AttemptOutcome> {
    match response.status {
        StatusCode::OK => Ok(match decode_body(response) {
            Ok(data) => AttemptOutcome::Success(data),
            Err(failure) => AttemptOutcome::Failure(failure),
        }),
        StatusCode::PAYMENT_REQUIRED => parse_challenge(response).map(AttemptOutcome::PaymentChallenge),
        StatusCode::TOO_MANY_REQUESTS => Ok(AttemptOutcome::RateLimited(
            retry_after(response).unwrap_or_else(|| policy.base_delay()),
        )),
        status => Ok(AttemptOutcome::Failure(AttemptFailure::UnexpectedStatus {
            status,
            body: response.text(),
        })),
    }
}

fn decode_body(response: &TransportResponse) -> std::result::Result<Value, AttemptFailure> {
    serde_json::from_slice(&response.body).map_err(|e| AttemptFailure::InvalidBody(e.to_string()))
}

/// `Retry-After` in whole seconds
fn retry_after(response: &TransportResponse) -> Option<Duration> {
    response
        .header(headers::RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
