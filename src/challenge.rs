//! Payment requirement extraction from 402 responses

use crate::transport::TransportResponse;
use crate::types::{headers, PaymentRequirement};
use crate::{AgentError, Result};
use serde_json::Value;
use tracing::debug;

/// Body field holding the requirement
pub const PAYMENT_REQUIRED_FIELD: &str = "paymentRequired";

/// Extract the payment requirement from a 402 response.
///
/// The JSON body field `paymentRequired` wins; the `X-Payment-Required`
/// header is the fallback. Every requirement field is optional, but a source
/// that is absent, not a JSON object, or an empty object does not count.
/// Neither source being usable is fatal for the request.
pub fn parse_challenge(response: &TransportResponse) -> Result<PaymentRequirement> {
    if let Some(requirement) = from_body(&response.body) {
        return Ok(requirement);
    }
    if let Some(requirement) = response
        .header(headers::X_PAYMENT_REQUIRED)
        .and_then(from_header)
    {
        return Ok(requirement);
    }
    Err(AgentError::PaymentRequirementMissing)
}

fn from_body(body: &[u8]) -> Option<PaymentRequirement> {
    let mut value: Value = serde_json::from_slice(body).ok()?;
    let field = value.get_mut(PAYMENT_REQUIRED_FIELD)?.take();
    decode(field, "paymentRequired body field")
}

fn from_header(raw: &str) -> Option<PaymentRequirement> {
    let value = serde_json::from_str(raw)
        .map_err(|e| debug!(error = %e, "Unparseable X-Payment-Required header"))
        .ok()?;
    decode(value, "X-Payment-Required header")
}

fn decode(value: Value, source: &str) -> Option<PaymentRequirement> {
    if value.as_object().map_or(true, |o| o.is_empty()) {
        return None;
    }
    serde_json::from_value(value)
        .map_err(|e| debug!(source, error = %e, "Unusable payment requirement"))
        .ok()
}
