//! Cryptographic primitives for SmellyCoin.
//!
//! SHA-256 content hashing plus secp256k1 keypair derivation, DER signing,
//! and verification. Addresses are the raw hex encoding of an uncompressed
//! public key, not a hash of it: the UTXO model stores the address directly
//! as the verification key.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length in bytes of an uncompressed secp256k1 public key (`0x04` prefix + 2 * 32 coordinate bytes).
pub const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// Length in hex characters of an address string.
pub const ADDRESS_HEX_LEN: usize = UNCOMPRESSED_PUBKEY_LEN * 2;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// SHA-256 of `bytes`, rendered as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Validate an address string: lowercase/uppercase hex, length 130, `04` prefix.
///
/// Mirrors `IsValidAddress` in the naivecoin reference: `^04[0-9a-fA-F]{128}$`.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LEN
        && address.starts_with("04")
        && address.chars().all(|c| c.is_ascii_hexdigit())
}

/// Derive the uncompressed public key hex (the address) from a private key hex.
pub fn public_key_from_private(private_key_hex: &str) -> Result<String, CryptoError> {
    let secret = secret_key_from_hex(private_key_hex)?;
    let secp = Secp256k1::new();
    let public = PublicKey::from_secret_key(&secp, &secret);
    Ok(hex::encode(public.serialize_uncompressed()))
}

/// Sign `msg_bytes` with `private_key_hex`, returning a DER-encoded signature as lowercase hex.
///
/// Per the wire contract, `msg_bytes` are the raw ASCII bytes of the
/// transaction's hexadecimal id string, not its byte decoding.
pub fn sign(private_key_hex: &str, msg_bytes: &[u8]) -> Result<String, CryptoError> {
    let secret = secret_key_from_hex(private_key_hex)?;
    let secp = Secp256k1::new();
    let digest = Sha256::digest(msg_bytes);
    let message =
        Message::from_slice(&digest).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let sig = secp.sign_ecdsa(&message, &secret);
    Ok(hex::encode(sig.serialize_der()))
}

/// Verify a DER-encoded hex signature over `msg_bytes` under `address` (an uncompressed pubkey hex).
pub fn verify(address: &str, msg_bytes: &[u8], signature_hex: &str) -> Result<bool, CryptoError> {
    if !is_valid_address(address) {
        return Err(CryptoError::InvalidAddress(address.to_string()));
    }
    let pubkey_bytes = hex::decode(address)?;
    let public = PublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let sig_bytes = hex::decode(signature_hex)?;
    let sig = Signature::from_der(&sig_bytes)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let digest = Sha256::digest(msg_bytes);
    let message =
        Message::from_slice(&digest).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let secp = Secp256k1::new();
    Ok(secp.verify_ecdsa(&message, &sig, &public).is_ok())
}

/// Generate a new random private key, returned as lowercase hex.
pub fn generate_private_key() -> String {
    let secp = Secp256k1::new();
    let mut rng = rand::thread_rng();
    let (secret, _public) = secp.generate_keypair(&mut rng);
    hex::encode(secret.secret_bytes())
}

fn secret_key_from_hex(private_key_hex: &str) -> Result<SecretKey, CryptoError> {
    let bytes = hex::decode(private_key_hex)?;
    SecretKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn address_validation_rejects_wrong_length_and_prefix() {
        let good = format!("04{}", "a".repeat(128));
        assert!(is_valid_address(&good));
        assert!(!is_valid_address(&good[..129]));
        let bad_prefix = format!("05{}", "a".repeat(128));
        assert!(!is_valid_address(&bad_prefix));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let privkey = generate_private_key();
        let address = public_key_from_private(&privkey).unwrap();
        assert!(is_valid_address(&address));

        let msg = b"abcdef0123456789";
        let sig = sign(&privkey, msg).unwrap();
        assert!(verify(&address, msg, &sig).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let privkey = generate_private_key();
        let address = public_key_from_private(&privkey).unwrap();
        let sig = sign(&privkey, b"original").unwrap();
        assert!(!verify(&address, b"tampered", &sig).unwrap());
    }
}
