//! # x402-agent - pay-per-request HTTP client
//!
//! A client for resources protected by HTTP 402 payment challenges. A plain
//! GET that is answered with `402 Payment Required` is paid for with a
//! signed assertion and reissued; rate limits and transient failures are
//! retried with exponential backoff.
//!
//! ```no_run
//! use x402_agent::{AgentConfig, PaymentClient, RetryPolicy};
//!
//! # async fn demo() -> x402_agent::Result<()> {
//! let config = AgentConfig::builder()
//!     .api_url("http://localhost:4021")
//!     .test_mode(true)
//!     .build()?;
//! let client = PaymentClient::new(config)?;
//! let data = client
//!     .request_data("/api/v1/crypto/trends", &RetryPolicy::default())
//!     .await?;
//! println!("{data}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod challenge;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod payment;
pub mod transport;
pub mod types;
pub mod wallet;

// Re-exports for convenience
pub use agent::{Agent, RunSummary};
pub use client::PaymentClient;
pub use config::AgentConfig;
pub use error::{AgentError, AttemptFailure, Result};
pub use payment::PaymentBuilder;
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};
pub use types::*;
pub use wallet::{Credential, CredentialCheck, Signer};

/// Re-exported so callers can cancel requests without depending on tokio-util
pub use tokio_util::sync::CancellationToken;

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
