//! Wallet credentials and payment signers
//!
//! A raw private key string is checked exactly once, producing a
//! [`CredentialCheck`]. [`Signer::select`] turns that check plus the test-mode
//! flag into the signer used for every request of an agent.

use crate::crypto::{address_from_secret, format_address, sign_personal_message};
use crate::Result;
use secp256k1::SecretKey;
use std::fmt;
use tracing::{info, warn};

/// Why a supplied private key was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialIssue {
    /// The key does not start with `0x`
    MissingPrefix,
    /// The key is not 32 bytes of hex (66 characters with prefix)
    WrongLength,
    /// The key is a template value such as `0xYOUR_PRIVATE_KEY...`
    Placeholder,
    /// The key contains non-hex characters
    NotHex,
    /// The key is hex but not a valid secp256k1 scalar
    OutOfRange,
}

impl fmt::Display for CredentialIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::MissingPrefix => "private key must start with 0x",
            Self::WrongLength => "private key must be 64 hex characters after 0x",
            Self::Placeholder => "private key is a placeholder value",
            Self::NotHex => "private key contains non-hex characters",
            Self::OutOfRange => "private key is not a valid secp256k1 key",
        };
        f.write_str(reason)
    }
}

/// Outcome of validating a raw credential
#[derive(Debug)]
pub enum CredentialCheck {
    Valid(Credential),
    Invalid(CredentialIssue),
    Absent,
}

/// A validated secp256k1 private key.
///
/// Never printed: `Debug` shows only the derived address.
#[derive(Clone)]
pub struct Credential {
    secret_key: SecretKey,
}

impl Credential {
    /// Validate a raw `0x`-prefixed private key
    pub fn check(raw: Option<&str>) -> CredentialCheck {
        let raw = match raw.map(str::trim) {
            None | Some("") => return CredentialCheck::Absent,
            Some(raw) => raw,
        };

        if raw.to_ascii_uppercase().contains("YOUR") {
            return CredentialCheck::Invalid(CredentialIssue::Placeholder);
        }
        let Some(hex_part) = raw.strip_prefix("0x") else {
            return CredentialCheck::Invalid(CredentialIssue::MissingPrefix);
        };
        if hex_part.len() != 64 {
            return CredentialCheck::Invalid(CredentialIssue::WrongLength);
        }
        let Ok(bytes) = hex::decode(hex_part) else {
            return CredentialCheck::Invalid(CredentialIssue::NotHex);
        };
        if bytes.iter().all(|b| *b == 0) {
            return CredentialCheck::Invalid(CredentialIssue::Placeholder);
        }
        match SecretKey::from_slice(&bytes) {
            Ok(secret_key) => CredentialCheck::Valid(Credential { secret_key }),
            Err(_) => CredentialCheck::Invalid(CredentialIssue::OutOfRange),
        }
    }

    /// Address controlled by this credential
    pub fn address(&self) -> Result<String> {
        address_from_secret(&self.secret_key).map(|a| format_address(&a))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Signature over a message together with the signing address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub payer: String,
    pub signature: String,
}

/// Signs canonical payloads with a wallet credential
#[derive(Debug, Clone)]
pub struct WalletSigner {
    credential: Credential,
    address: String,
}

impl WalletSigner {
    pub fn new(credential: Credential) -> Result<Self> {
        let address = credential.address()?;
        Ok(Self {
            credential,
            address,
        })
    }

    /// Address reported as the payer
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign `message` as an EIP-191 personal message
    pub fn sign(&self, message: &[u8]) -> Result<SignedMessage> {
        let signature = sign_personal_message(message, &self.credential.secret_key)?;
        Ok(SignedMessage {
            payer: self.address.clone(),
            signature,
        })
    }
}

/// Signer shared by every request an agent issues
#[derive(Debug, Clone)]
pub enum Signer {
    /// Real signing with a wallet credential
    Wallet(WalletSigner),
    /// Sentinel assertions, no cryptography
    Test,
    /// No usable credential; payments fail with `SignerUnavailable`
    Unconfigured,
}

impl Signer {
    /// Pick the signer variant for a credential check and test-mode flag
    pub fn select(check: CredentialCheck, test_mode: bool) -> Self {
        if test_mode {
            info!("Test mode enabled: payments will not be signed");
            return Self::Test;
        }

        match check {
            CredentialCheck::Valid(credential) => match WalletSigner::new(credential) {
                Ok(signer) => {
                    info!(address = %signer.address(), "Agent wallet configured");
                    Self::Wallet(signer)
                }
                Err(e) => {
                    warn!(error = %e, "Could not initialize wallet");
                    Self::Unconfigured
                }
            },
            CredentialCheck::Invalid(issue) => {
                warn!(%issue, "Ignoring agent private key");
                Self::Unconfigured
            }
            CredentialCheck::Absent => Self::Unconfigured,
        }
    }

    /// Validate `raw` and select a signer in one step
    pub fn from_private_key(raw: Option<&str>, test_mode: bool) -> Self {
        Self::select(Credential::check(raw), test_mode)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }

    /// Payer address when a wallet is configured
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Wallet(signer) => Some(signer.address()),
            Self::Test | Self::Unconfigured => None,
        }
    }
}
