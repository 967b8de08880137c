//! Versioned (v0) messages and envelope detection.
//!
//! A versioned message is prefixed with one byte whose high bit is set; the
//! low seven bits carry the version. Only version 0 exists. After the common
//! body, v0 appends address table lookups:
//!
//! ```text
//! num_lookups               compact-u16
//! lookup[]:
//!   account_key             32 bytes
//!   num_writable            compact-u16
//!   writable_indexes        u8 * num_writable
//!   num_readonly            compact-u16
//!   readonly_indexes        u8 * num_readonly
//! ```

use ed25519_dalek::Signer;
use zeroize::Zeroize;

use crate::error::SolError;
use crate::transaction::{
    encode_len, read_account_keys, read_instructions, signer_slice, validate_indices,
    write_body, CompiledInstruction, LegacyTransaction, MessageHeader, WireReader,
};

/// High bit of the first message byte marks a versioned message.
pub const VERSION_PREFIX_MASK: u8 = 0x80;

/// Which framing a transaction's message uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeVersion {
    Legacy,
    V0,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAddressTableLookup {
    pub account_key: [u8; 32],
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V0Message {
    pub header: MessageHeader,
    pub account_keys: Vec<[u8; 32]>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<MessageAddressTableLookup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedTransaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: V0Message,
}

/// A decoded transaction in either envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolTransaction {
    Legacy(LegacyTransaction),
    Versioned(VersionedTransaction),
}

impl V0Message {
    /// Check a hand-built message the way decoding would.
    pub fn validate(&self) -> Result<(), SolError> {
        self.header.validate(self.account_keys.len())?;
        let loaded: usize = self
            .address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
            .sum();
        validate_indices(&self.instructions, self.account_keys.len() + loaded)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(256);
        buf.push(VERSION_PREFIX_MASK);
        self.header.write(&mut buf);
        write_body(&mut buf, &self.account_keys, &self.recent_blockhash, &self.instructions)?;

        buf.extend_from_slice(&encode_len(self.address_table_lookups.len(), "lookups")?);
        for lookup in &self.address_table_lookups {
            buf.extend_from_slice(&lookup.account_key);
            buf.extend_from_slice(&encode_len(lookup.writable_indexes.len(), "lookup indexes")?);
            buf.extend_from_slice(&lookup.writable_indexes);
            buf.extend_from_slice(&encode_len(lookup.readonly_indexes.len(), "lookup indexes")?);
            buf.extend_from_slice(&lookup.readonly_indexes);
        }

        Ok(buf)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        let prefix = reader.read_u8("message")?;
        if prefix & VERSION_PREFIX_MASK == 0 {
            return Err(SolError::DeserializationError(
                "message has no version prefix".into(),
            ));
        }
        let version = prefix & !VERSION_PREFIX_MASK;
        if version != 0 {
            return Err(SolError::UnsupportedVersion(version));
        }

        let header = MessageHeader::read(reader)?;
        let account_keys = read_account_keys(reader)?;
        header.validate(account_keys.len())?;
        let recent_blockhash = reader.read_key("recent blockhash")?;
        let instructions = read_instructions(reader)?;

        let num_lookups = reader.read_compact_u16()? as usize;
        let mut address_table_lookups = Vec::with_capacity(num_lookups.min(16));
        for _ in 0..num_lookups {
            let account_key = reader.read_key("lookup table key")?;
            let writable = reader.read_compact_u16()? as usize;
            let writable_indexes = reader.read_bytes(writable, "lookup indexes")?.to_vec();
            let readonly = reader.read_compact_u16()? as usize;
            let readonly_indexes = reader.read_bytes(readonly, "lookup indexes")?.to_vec();
            address_table_lookups.push(MessageAddressTableLookup {
                account_key,
                writable_indexes,
                readonly_indexes,
            });
        }

        // Instructions may index loaded addresses after the static keys.
        let loaded: usize = address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
            .sum();
        validate_indices(&instructions, account_keys.len() + loaded)?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
            address_table_lookups,
        })
    }
}

impl VersionedTransaction {
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let message = self.message.serialize()?;
        let mut wire = Vec::with_capacity(3 + self.signatures.len() * 64 + message.len());
        wire.extend_from_slice(&encode_len(self.signatures.len(), "signatures")?);
        for sig in &self.signatures {
            wire.extend_from_slice(sig);
        }
        wire.extend_from_slice(&message);
        Ok(wire)
    }

    /// Parse versioned wire bytes. Legacy messages are rejected.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = WireReader::new(bytes);
        let signatures = reader.read_signatures()?;
        let message = V0Message::read(&mut reader)?;
        reader.finish()?;

        if signatures.len() != message.header.num_required_signatures as usize {
            return Err(SolError::DeserializationError(format!(
                "{} signatures for {} required signers",
                signatures.len(),
                message.header.num_required_signatures
            )));
        }

        Ok(Self {
            signatures,
            message,
        })
    }
}

/// Decode transaction bytes, trying the versioned envelope before legacy.
///
/// When both fail the error reports both reasons.
pub fn decode_transaction(bytes: &[u8]) -> Result<SolTransaction, SolError> {
    let versioned_err = match VersionedTransaction::deserialize(bytes) {
        Ok(tx) => return Ok(SolTransaction::Versioned(tx)),
        Err(e) => e,
    };

    LegacyTransaction::deserialize(bytes)
        .map(SolTransaction::Legacy)
        .map_err(|legacy_err| {
            SolError::DeserializationError(format!(
                "not a versioned transaction ({versioned_err}); not a legacy transaction ({legacy_err})"
            ))
        })
}

impl SolTransaction {
    pub fn envelope(&self) -> EnvelopeVersion {
        match self {
            SolTransaction::Legacy(_) => EnvelopeVersion::Legacy,
            SolTransaction::Versioned(_) => EnvelopeVersion::V0,
        }
    }

    pub fn signatures(&self) -> &[[u8; 64]] {
        match self {
            SolTransaction::Legacy(tx) => &tx.signatures,
            SolTransaction::Versioned(tx) => &tx.signatures,
        }
    }

    fn signatures_mut(&mut self) -> &mut Vec<[u8; 64]> {
        match self {
            SolTransaction::Legacy(tx) => &mut tx.signatures,
            SolTransaction::Versioned(tx) => &mut tx.signatures,
        }
    }

    /// The fee payer's signature, which doubles as the transaction id.
    pub fn first_signature(&self) -> Option<&[u8; 64]> {
        self.signatures().first()
    }

    /// Base58 transaction id, if the fee payer has signed.
    pub fn signature_string(&self) -> Option<String> {
        self.first_signature()
            .filter(|sig| **sig != crate::transaction::EMPTY_SIGNATURE)
            .map(|sig| bs58::encode(sig).into_string())
    }

    /// The static account keys that must sign, in signature-slot order.
    pub fn signer_keys(&self) -> Result<&[[u8; 32]], SolError> {
        match self {
            SolTransaction::Legacy(tx) => tx.message.signer_keys(),
            SolTransaction::Versioned(tx) => {
                signer_slice(&tx.message.header, &tx.message.account_keys)
            }
        }
    }

    pub fn validate(&self) -> Result<(), SolError> {
        match self {
            SolTransaction::Legacy(tx) => tx.message.validate(),
            SolTransaction::Versioned(tx) => tx.message.validate(),
        }
    }

    /// The bytes that signers sign.
    pub fn message_bytes(&self) -> Result<Vec<u8>, SolError> {
        match self {
            SolTransaction::Legacy(tx) => tx.message.serialize(),
            SolTransaction::Versioned(tx) => tx.message.serialize(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        match self {
            SolTransaction::Legacy(tx) => tx.serialize(),
            SolTransaction::Versioned(tx) => tx.serialize(),
        }
    }

    /// Sign with an Ed25519 seed, writing into the matching signer slot.
    ///
    /// Supports multi-signer transactions; fails if the key is not one of the
    /// required signers.
    pub fn sign_with(&mut self, private_key: &[u8; 32]) -> Result<[u8; 64], SolError> {
        let mut seed = *private_key;
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
        seed.zeroize();
        let our_pubkey = signing_key.verifying_key().to_bytes();

        let signers = self.signer_keys()?;
        let required = signers.len();
        let slot = signers
            .iter()
            .position(|k| *k == our_pubkey)
            .ok_or_else(|| {
                SolError::SigningError("wallet pubkey not found in transaction signers".into())
            })?;

        let message = self.message_bytes()?;
        let signature = signing_key.sign(&message).to_bytes();

        let signatures = self.signatures_mut();
        if signatures.len() < required {
            signatures.resize(required, crate::transaction::EMPTY_SIGNATURE);
        }
        signatures[slot] = signature;

        Ok(signature)
    }
}

/// Sign pre-built transaction bytes (either envelope) and return the wire
/// bytes with our signature slot filled.
pub fn sign_raw_transaction(private_key: &[u8; 32], raw_tx: &[u8]) -> Result<Vec<u8>, SolError> {
    let mut tx = decode_transaction(raw_tx)?;
    tx.sign_with(private_key)?;
    tx.serialize()
}
