//! Core types for the pay-per-request protocol

use crate::error::AttemptFailure;
use crate::{AgentError, Result};
use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sentinel payer reported by test-mode assertions
pub const TEST_PAYER: &str = "test-agent-address";

/// Sentinel signature reported by test-mode assertions
pub const TEST_SIGNATURE: &str = "test-signature";

/// Chain identifiers
pub mod networks {
    /// Polygon Amoy testnet (CAIP-2)
    pub const POLYGON_AMOY: &str = "eip155:80002";
    /// Polygon mainnet (CAIP-2)
    pub const POLYGON_MAINNET: &str = "eip155:137";

    /// Network used when a payment requirement does not name one
    pub const DEFAULT: &str = POLYGON_AMOY;

    /// EVM chain id of a CAIP-2 `eip155:<id>` identifier
    pub fn chain_id(network: &str) -> Option<u64> {
        network.strip_prefix("eip155:")?.parse().ok()
    }
}

/// Header names used by the protocol
pub mod headers {
    /// Carries the signed assertion on the reissued request
    pub const X_PAYMENT: &str = "X-Payment";
    /// Fallback location of the requirement on a 402 response
    pub const X_PAYMENT_REQUIRED: &str = "X-Payment-Required";
    /// Seconds to wait on a 429 response
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Token amount in the asset's smallest unit.
///
/// Servers send amounts either as JSON integers or as decimal strings. The
/// form the server chose is kept and written back unchanged, since the
/// signed payload must match what a verifier rebuilds from the requirement.
///
/// JSON integers must fit in a `u64`; larger amounts have to be sent as
/// decimal strings, which are accepted at any length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenAmount {
    /// Sent as a JSON integer
    Units(u64),
    /// Sent as a decimal string, kept verbatim
    Decimal(String),
}

impl TokenAmount {
    /// Numeric value, if it fits in a `u128`
    pub fn value(&self) -> Option<u128> {
        match self {
            Self::Units(n) => Some(u128::from(*n)),
            Self::Decimal(s) => s.parse().ok(),
        }
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self::Units(value)
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        u64::try_from(value)
            .map(Self::Units)
            .unwrap_or_else(|_| Self::Decimal(value.to_string()))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Units(n) => write!(f, "{}", n),
            Self::Decimal(s) => f.write_str(s),
        }
    }
}

/// Error for a string that is not a plain decimal integer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAmount(String);

impl fmt::Display for InvalidAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid token amount: {:?}", self.0)
    }
}

impl std::error::Error for InvalidAmount {}

impl FromStr for TokenAmount {
    type Err = InvalidAmount;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidAmount(s.to_string()));
        }
        Ok(Self::Decimal(s.to_string()))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Units(n) => serializer.serialize_u64(*n),
            Self::Decimal(s) => serializer.serialize_str(s),
        }
    }
}

struct TokenAmountVisitor;

impl<'de> Visitor<'de> for TokenAmountVisitor {
    type Value = TokenAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<TokenAmount, E> {
        Ok(TokenAmount::Units(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<TokenAmount, E> {
        u64::try_from(value)
            .map(TokenAmount::Units)
            .map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<TokenAmount, E> {
        value
            .parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TokenAmountVisitor)
    }
}

/// Timestamp that may arrive as a JSON integer or a numeric string
#[derive(Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Integer(i64),
    Text(String),
}

fn deserialize_expires<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Timestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Timestamp::Integer(n)) => Ok(Some(n)),
        Some(Timestamp::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid expires: {s:?}"))),
    }
}

/// Payment requirement issued by a server in a 402 challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequirement {
    /// Chain identifier (CAIP-2); the default network applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Address that receives the payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Amount in the asset's smallest unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<TokenAmount>,
    /// Token contract address or identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Unix timestamp after which the requirement lapses
    #[serde(
        default,
        deserialize_with = "deserialize_expires",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Facilitator the server settles through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
}

impl PaymentRequirement {
    /// Create a new payment requirement
    pub fn new(
        network: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<TokenAmount>,
        asset: impl Into<String>,
    ) -> Self {
        Self {
            network: Some(network.into()),
            recipient: Some(recipient.into()),
            amount: Some(amount.into()),
            asset: Some(asset.into()),
            expires: None,
            version: None,
            description: None,
            facilitator: None,
        }
    }

    /// Set the expiry timestamp
    pub fn with_expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Network to pay on, falling back to [`networks::DEFAULT`]
    pub fn network_or_default(&self) -> &str {
        self.network
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(networks::DEFAULT)
    }
}

/// Canonical payment fields covered by the signature.
///
/// Fields the requirement left out are carried as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub network: String,
    pub recipient: Option<String>,
    pub amount: Option<TokenAmount>,
    pub asset: Option<String>,
    /// Per-build unique value, milliseconds since the Unix epoch
    pub nonce: u64,
    /// Carried through from the requirement's `expires`
    pub expiry: Option<i64>,
}

/// Signed payment attached to a reissued request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentAssertion {
    /// Assertion signed by a wallet credential
    Signed {
        payer: String,
        #[serde(rename = "paymentData")]
        payment_data: PaymentPayload,
        signature: String,
    },
    /// Sentinel assertion used in test mode; no cryptography involved
    Test {
        payer: String,
        signature: String,
        #[serde(rename = "testMode")]
        test_mode: bool,
    },
}

impl PaymentAssertion {
    /// The fixed test-mode assertion
    pub fn test_mode() -> Self {
        Self::Test {
            payer: TEST_PAYER.to_string(),
            signature: TEST_SIGNATURE.to_string(),
            test_mode: true,
        }
    }

    /// Whether this is the test-mode sentinel
    pub fn is_test_mode(&self) -> bool {
        matches!(self, Self::Test { .. })
    }

    pub fn payer(&self) -> &str {
        match self {
            Self::Signed { payer, .. } | Self::Test { payer, .. } => payer,
        }
    }

    pub fn signature(&self) -> &str {
        match self {
            Self::Signed { signature, .. } | Self::Test { signature, .. } => signature,
        }
    }

    pub fn payment_data(&self) -> Option<&PaymentPayload> {
        match self {
            Self::Signed { payment_data, .. } => Some(payment_data),
            Self::Test { .. } => None,
        }
    }

    /// JSON encoding carried in the `X-Payment` header
    pub fn to_header_value(&self) -> Result<String> {
        serde_json::to_string(self).map_err(AgentError::from)
    }

    /// Decode an `X-Payment` header value
    pub fn from_header_value(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(AgentError::from)
    }
}

/// Retry budget for one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy; `max_attempts` must be at least 1
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AgentError::config("max_attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Backoff after failed attempt `attempt` (0-indexed): `base_delay * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Whether another attempt follows attempt `attempt`
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Classification of a single response
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Resource served; the decoded JSON body
    Success(Value),
    /// The server demands payment
    PaymentChallenge(PaymentRequirement),
    /// The server asks the client to wait before trying again
    RateLimited(Duration),
    /// The attempt failed and counts against the retry budget
    Failure(AttemptFailure),
}
