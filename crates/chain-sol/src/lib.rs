//! Solana chain support for the wallet bridge.
//!
//! This crate handles the Solana transaction wire format in both envelopes
//! (legacy and v0), account address decoding, and Ed25519 signing of
//! pre-built transactions. It does not pull in `solana-sdk`; the compact
//! binary layout is implemented by hand with `ed25519-dalek` for signing and
//! `bs58`/`base64` for text encodings.

pub mod address;
pub mod error;
pub mod transaction;
pub mod versioned;

// Re-export key public types for ergonomic imports.
pub use address::{
    address_to_bytes, bytes_to_address, decode_account_address, validate_address, Pubkey,
};
pub use error::SolError;
pub use transaction::{
    build_sol_transfer, build_system_transfer_instruction, compile_message, decode_compact_u16,
    encode_compact_u16, CompiledInstruction, LegacyMessage, LegacyTransaction, MessageHeader,
    SolAccountMeta, SolInstruction, EMPTY_SIGNATURE, SYSTEM_PROGRAM_ID,
};
pub use versioned::{
    decode_transaction, sign_raw_transaction, EnvelopeVersion, MessageAddressTableLookup,
    SolTransaction, V0Message, VersionedTransaction,
};
