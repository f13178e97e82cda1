//! Payment assertion construction
//!
//! A [`PaymentRequirement`] becomes a [`PaymentPayload`], the payload is
//! encoded canonically (compact JSON, object keys sorted lexicographically)
//! and the canonical bytes are what the signer signs. A verifier must rebuild
//! exactly these bytes from `paymentData` to check the signature.

use crate::types::{PaymentAssertion, PaymentPayload, PaymentRequirement};
use crate::wallet::Signer;
use crate::{AgentError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Serialize a JSON value with object keys in sorted order and no whitespace
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Canonical bytes of a payload: the exact message that gets signed
pub fn canonical_bytes(payload: &PaymentPayload) -> Result<Vec<u8>> {
    let value = serde_json::to_value(payload)?;
    Ok(canonical_json(&value).into_bytes())
}

/// Millisecond nonces that never repeat within one source.
///
/// Each value is the current Unix time in milliseconds, bumped past the
/// previous value when the clock has not advanced.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Builds payment assertions for 402 challenges
#[derive(Debug)]
pub struct PaymentBuilder {
    signer: Arc<Signer>,
    nonces: NonceSource,
}

impl PaymentBuilder {
    pub fn new(signer: Arc<Signer>) -> Self {
        Self {
            signer,
            nonces: NonceSource::new(),
        }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Payload for `requirement` with a fresh nonce
    pub fn payload_for(&self, requirement: &PaymentRequirement) -> PaymentPayload {
        PaymentPayload {
            network: requirement.network_or_default().to_string(),
            recipient: requirement.recipient.clone(),
            amount: requirement.amount.clone(),
            asset: requirement.asset.clone(),
            nonce: self.nonces.next(),
            expiry: requirement.expires,
        }
    }

    /// Build the assertion answering `requirement`
    pub fn build(&self, requirement: &PaymentRequirement) -> Result<PaymentAssertion> {
        let wallet = match self.signer.as_ref() {
            Signer::Test => {
                info!("Test mode: creating mock payment");
                return Ok(PaymentAssertion::test_mode());
            }
            Signer::Unconfigured => return Err(AgentError::SignerUnavailable),
            Signer::Wallet(wallet) => wallet,
        };

        let payment_data = self.payload_for(requirement);
        let message = canonical_bytes(&payment_data)?;
        debug!(
            network = %payment_data.network,
            amount = ?payment_data.amount,
            nonce = payment_data.nonce,
            "Signing payment payload"
        );

        let signed = wallet.sign(&message)?;
        info!(payer = %signed.payer, "Payment signed");

        Ok(PaymentAssertion::Signed {
            payer: signed.payer,
            payment_data,
            signature: signed.signature,
        })
    }
}
