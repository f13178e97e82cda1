//! Batch runner over several paid endpoints

use crate::client::PaymentClient;
use crate::{AgentError, Result};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome of a single endpoint request within a run
#[derive(Debug)]
pub struct RequestRecord {
    pub endpoint: String,
    pub result: Result<Value>,
}

/// Totals of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Whether the run stopped early because it was cancelled
    pub cancelled: bool,
    pub records: Vec<RequestRecord>,
}

impl RunSummary {
    fn record(&mut self, endpoint: &str, result: Result<Value>) {
        self.total += 1;
        if result.is_ok() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.records.push(RequestRecord {
            endpoint: endpoint.to_string(),
            result,
        });
    }
}

/// Requests a list of endpoints in a loop, paying where challenged
#[derive(Debug, Clone)]
pub struct Agent {
    client: PaymentClient,
}

impl Agent {
    pub fn new(client: PaymentClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PaymentClient {
        &self.client
    }

    /// Request every endpoint in order, `loops` times.
    ///
    /// A failed request is recorded and the run continues. After each
    /// successful request the agent waits `delay`. Cancellation ends the run
    /// at the next request boundary or wait.
    pub async fn run(
        &self,
        endpoints: &[&str],
        loops: usize,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        let policy = self.client.config().retry_policy;

        info!(
            api_url = %self.client.config().api_url,
            test_mode = self.client.signer().is_test(),
            endpoints = endpoints.len(),
            loops,
            "Starting agent run"
        );

        'outer: for iteration in 0..loops {
            if iteration > 0 {
                info!(iteration = iteration + 1, loops, "Starting next loop");
            }

            for endpoint in endpoints {
                let result = self
                    .client
                    .request_data_with_cancel(endpoint, &policy, cancel)
                    .await;

                match &result {
                    Err(AgentError::Cancelled) => {
                        summary.cancelled = true;
                        break 'outer;
                    }
                    Err(e) => error!(endpoint, error = %e, "Request failed"),
                    Ok(data) => {
                        if let Some(timestamp) = data.pointer("/data/timestamp") {
                            info!(endpoint, %timestamp, "Received data");
                        }
                    }
                }

                let succeeded = result.is_ok();
                summary.record(endpoint, result);

                if succeeded {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            summary.cancelled = true;
                            break 'outer;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Agent run complete"
        );
        summary
    }
}
