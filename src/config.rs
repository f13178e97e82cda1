//! Agent configuration
//!
//! Values arrive already loaded (from the environment, a CLI, a file); this
//! module only holds and validates them. Validation runs once, when a
//! [`crate::PaymentClient`] is constructed.

use crate::types::RetryPolicy;
use crate::{AgentError, Result};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:4021";

/// Default chain RPC endpoint (Polygon Amoy)
pub const DEFAULT_RPC_URL: &str = "https://rpc-amoy.polygon.technology/";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Marketplace endpoints served behind payment
pub mod endpoints {
    pub const STABLECOINS_ARC: &str = "/api/v1/stablecoins/arc";
    pub const MARKETS_LATAM: &str = "/api/v1/markets/latam";
    pub const CRYPTO_TRENDS: &str = "/api/v1/crypto/trends";

    /// Every known endpoint, in request order
    pub fn all() -> Vec<&'static str> {
        vec![STABLECOINS_ARC, MARKETS_LATAM, CRYPTO_TRENDS]
    }

    /// Look up an endpoint by its short name (`arc`, `latam`, `trends`)
    pub fn by_name(name: &str) -> Option<&'static str> {
        match name {
            "arc" => Some(STABLECOINS_ARC),
            "latam" => Some(MARKETS_LATAM),
            "trends" => Some(CRYPTO_TRENDS),
            _ => None,
        }
    }
}

/// Configuration of a payment agent
#[derive(Clone)]
pub struct AgentConfig {
    /// Base URL every endpoint is appended to
    pub api_url: String,
    /// `0x`-prefixed private key used to sign payments
    pub private_key: Option<String>,
    /// Chain RPC endpoint, carried for collaborators that submit transactions
    pub rpc_url: Option<String>,
    /// Answer challenges with sentinel assertions instead of real signatures
    pub test_mode: bool,
    /// Retry policy used when a call does not supply its own
    pub retry_policy: RetryPolicy,
    /// Per-request timeout
    pub timeout: Duration,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_url", &self.api_url)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_url", &self.rpc_url)
            .field("test_mode", &self.test_mode)
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AgentConfig {
    /// Create a new config for the given API base URL
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            private_key: None,
            rpc_url: Some(DEFAULT_RPC_URL.to_string()),
            test_mode: false,
            retry_policy: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(AgentError::config("API URL cannot be empty"));
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(AgentError::config(
                "API URL must start with http:// or https://",
            ));
        }

        Url::parse(&self.api_url)
            .map_err(|e| AgentError::config(format!("Invalid API URL: {}", e)))?;

        if let Some(rpc_url) = &self.rpc_url {
            Url::parse(rpc_url)
                .map_err(|e| AgentError::config(format!("Invalid RPC URL: {}", e)))?;
        }

        if self.timeout.is_zero() {
            return Err(AgentError::config("Timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Full URL of an endpoint
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), endpoint)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// Builder for [`AgentConfig`]
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API base URL
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Set the signing key
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.config.private_key = Some(key.into());
        self
    }

    /// Set the chain RPC endpoint
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = Some(url.into());
        self
    }

    /// Enable or disable test mode
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.config.test_mode = enabled;
        self
    }

    /// Set the default retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AgentConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
