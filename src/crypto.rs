//! Cryptographic utilities for payment assertions
//!
//! Assertions are signed as EIP-191 personal messages: the canonical payload
//! bytes are prefixed with `"\x19Ethereum Signed Message:\n" + len`, hashed
//! with keccak-256 and signed with a recoverable secp256k1 signature.

use crate::{AgentError, Result};
use ethereum_types::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// Prefix of an EIP-191 version 0x45 (personal) message
const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Keccak-256 hash function
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    Keccak256::digest(data).into()
}

/// EIP-191 hash of a personal message
pub fn hash_personal_message(message: &[u8]) -> H256 {
    let mut data = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 20 + message.len());
    data.extend_from_slice(PERSONAL_MESSAGE_PREFIX.as_bytes());
    data.extend_from_slice(message.len().to_string().as_bytes());
    data.extend_from_slice(message);
    H256::from(keccak256(&data))
}

/// Ethereum address of an uncompressed SEC1 public key (`0x04 || x || y`)
fn address_from_uncompressed(pubkey: &[u8]) -> Result<Address> {
    if pubkey.len() != 65 {
        return Err(AgentError::signing("Invalid public key length"));
    }
    // drop the 0x04 tag, keep the last 20 bytes of the hash
    let hash = keccak256(&pubkey[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Ethereum address controlled by a secret key
pub fn address_from_secret(secret_key: &SecretKey) -> Result<Address> {
    let secp = Secp256k1::signing_only();
    let public_key = PublicKey::from_secret_key(&secp, secret_key);
    address_from_uncompressed(&public_key.serialize_uncompressed())
}

/// Parse a `0x`-prefixed hex address, accepting any letter case
pub fn parse_address(address: &str) -> Result<Address> {
    let bytes = hex::decode(address.trim_start_matches("0x"))
        .map_err(|_| AgentError::signing("Invalid address"))?;
    if bytes.len() != 20 {
        return Err(AgentError::signing("Address must be 20 bytes"));
    }
    Ok(Address::from_slice(&bytes))
}

/// Lowercase `0x`-prefixed hex form of an address
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Sign a message hash, returning `0x || r || s || v` with `v` in {27, 28}
pub fn sign_hash(message_hash: H256, secret_key: &SecretKey) -> Result<String> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest_slice(message_hash.as_bytes())
        .map_err(|_| AgentError::signing("Invalid message hash"))?;

    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);
    let (recovery_id, compact) = signature.serialize_compact();
    let v = u8::try_from(recovery_id.to_i32())
        .map_err(|_| AgentError::signing("Invalid recovery ID"))?;

    let mut sig_bytes = [0u8; 65];
    sig_bytes[..64].copy_from_slice(&compact);
    sig_bytes[64] = 27 + v;

    Ok(format!("0x{}", hex::encode(sig_bytes)))
}

/// Sign `message` as an EIP-191 personal message
pub fn sign_personal_message(message: &[u8], secret_key: &SecretKey) -> Result<String> {
    sign_hash(hash_personal_message(message), secret_key)
}

/// Recover the address that produced `signature` over a personal message
pub fn recover_signer(message: &[u8], signature: &str) -> Result<Address> {
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| AgentError::signing("Invalid hex signature"))?;

    if sig_bytes.len() != 65 {
        return Err(AgentError::signing("Signature must be 65 bytes"));
    }

    let v = match sig_bytes[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => return Err(AgentError::signing("Invalid recovery ID")),
    };
    let recovery_id =
        RecoveryId::try_from(v).map_err(|_| AgentError::signing("Invalid recovery ID"))?;

    let k256_sig = K256Signature::try_from(&sig_bytes[..64])
        .map_err(|_| AgentError::signing("Invalid signature format"))?;

    let message_hash = hash_personal_message(message);
    let verifying_key =
        VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &k256_sig, recovery_id)
            .map_err(|_| AgentError::signing("Failed to recover public key"))?;

    address_from_uncompressed(verifying_key.to_encoded_point(false).as_bytes())
}

/// Check that `signature` over `message` was produced by `expected_address`
pub fn verify_personal_message(
    message: &[u8],
    signature: &str,
    expected_address: &str,
) -> Result<bool> {
    Ok(recover_signer(message, signature)? == parse_address(expected_address)?)
}
