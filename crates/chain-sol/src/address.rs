//! Solana addresses and public keys.
//!
//! A Solana address is the Base58 encoding of a raw 32-byte Ed25519 public
//! key. External wallets do not always hand addresses back in that form (some
//! return the raw key bytes Base64-encoded), so [`decode_account_address`]
//! accepts both and always yields the canonical key.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::SolError;

/// A 32-byte Ed25519 public key in canonical form.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// The Base58 address string for this key.
    pub fn to_address(&self) -> String {
        bytes_to_address(&self.0)
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Pubkey> for [u8; 32] {
    fn from(key: Pubkey) -> Self {
        key.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_address())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.to_address())
    }
}

impl FromStr for Pubkey {
    type Err = SolError;

    /// Strict parse: Base58 only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        address_to_bytes(s).map(Self)
    }
}

/// Validate a Solana address string.
///
/// A valid Solana address is a Base58-encoded string that decodes to exactly
/// 32 bytes.
pub fn validate_address(address: &str) -> Result<bool, SolError> {
    address_to_bytes(address).map(|_| true)
}

/// Decode a Base58 Solana address to its 32-byte representation.
pub fn address_to_bytes(address: &str) -> Result<[u8; 32], SolError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })
}

/// Encode 32 bytes as a Solana address (Base58 string).
pub fn bytes_to_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode an account address returned by an external wallet.
///
/// Tries the canonical Base58 form first. If that fails, the string is
/// treated as Base64 of the raw key bytes. The error carries the original
/// string when neither interpretation yields 32 bytes.
pub fn decode_account_address(encoded: &str) -> Result<Pubkey, SolError> {
    if let Ok(bytes) = address_to_bytes(encoded) {
        return Ok(Pubkey(bytes));
    }

    let raw = BASE64.decode(encoded).map_err(|_| {
        SolError::InvalidAddress(format!("not base58 or base64: {encoded}"))
    })?;

    let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!(
            "base64 account {encoded} decodes to {} bytes, expected 32",
            v.len()
        ))
    })?;

    Ok(Pubkey(bytes))
}
