//! Cryptographic primitives for Starchain
//!
//! Addresses are the hex SHA-256 of a compressed secp256k1 public key. Identity
//! challenges are signed with recoverable ECDSA so the verifier only needs the
//! address: the public key is recovered from the signature and re-hashed.

use crate::error::ChainError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Recovery id byte followed by the 64-byte compact signature.
pub const RECOVERABLE_SIGNATURE_SIZE: usize = COMPACT_SIGNATURE_SIZE + 1;

/// Derive the address (hex SHA-256 of the compressed key) for a public key.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let pubkey_bytes: [u8; PUBLIC_KEY_SIZE] = public_key.serialize();
    hex::encode(Sha256::digest(pubkey_bytes))
}

fn message_digest(message: &[u8]) -> Result<Message, ChainError> {
    let digest = Sha256::digest(message);
    Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Creates a KeyPair from a hex-encoded secret key.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| ChainError::Crypto(format!("Invalid hex secret key: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key)
    }

    /// Signs a message (hashed with SHA-256) and returns the base64 recoverable signature.
    pub fn sign_message(&self, message: &str) -> Result<String, ChainError> {
        let digest = message_digest(message.as_bytes())?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&digest, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = [0u8; RECOVERABLE_SIGNATURE_SIZE];
        bytes[0] = recovery_id.to_i32() as u8;
        bytes[1..].copy_from_slice(&compact);
        Ok(BASE64.encode(bytes))
    }
}

/// Verifies that `signature` (base64, recoverable) over `message` was produced by the
/// key behind `address`.
pub fn verify_message(message: &str, address: &str, signature: &str) -> Result<(), ChainError> {
    let bytes = BASE64
        .decode(signature.trim())
        .map_err(|e| ChainError::Crypto(format!("Signature is not valid base64: {}", e)))?;

    if bytes.len() != RECOVERABLE_SIGNATURE_SIZE {
        return Err(ChainError::Crypto(format!(
            "Signature must be exactly {} bytes, got {}",
            RECOVERABLE_SIGNATURE_SIZE,
            bytes.len()
        )));
    }

    let recovery_id = RecoveryId::from_i32(bytes[0] as i32)
        .map_err(|e| ChainError::Crypto(format!("Invalid recovery id: {}", e)))?;
    let signature = RecoverableSignature::from_compact(&bytes[1..], recovery_id)
        .map_err(|e| ChainError::Crypto(format!("Invalid signature: {}", e)))?;

    let digest = message_digest(message.as_bytes())?;
    let public_key = SECP256K1_CONTEXT
        .recover_ecdsa(&digest, &signature)
        .map_err(|_| ChainError::Crypto("Signature verification failed".to_string()))?;

    // Exact match: challenges and star records are keyed by the address as given.
    if address_from_public_key(&public_key) != address {
        return Err(ChainError::Crypto("Signature verification failed".to_string()));
    }

    Ok(())
}
