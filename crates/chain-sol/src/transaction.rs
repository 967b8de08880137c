//! Legacy Solana transaction wire format.
//!
//! Transactions are encoded and decoded by hand. The legacy envelope is:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8   (high bit clear, otherwise it is a versioned message)
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```
//!
//! A message built without a fee payer or blockhash is a draft: it has zero
//! required signatures and/or an all-zero blockhash. The wallet side fills
//! those in with [`LegacyTransaction::ensure_fee_payer`] and
//! [`LegacyTransaction::ensure_recent_blockhash`] before asking for a
//! signature.

use crate::error::SolError;

// ---------------------------------------------------------------------------
// Solana System Program
// ---------------------------------------------------------------------------

/// The Solana System Program public key: 32 zero bytes.
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// System Program `Transfer` instruction index (little-endian u32).
const SYSTEM_TRANSFER_IX_INDEX: u32 = 2;

/// Placeholder for a signature slot that has not been filled yet.
pub const EMPTY_SIGNATURE: [u8; 64] = [0u8; 64];

/// Upper bound on account keys addressable by a `u8` index.
const MAX_ACCOUNT_KEYS: usize = 256;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from a byte slice.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::DeserializationError(
                "unexpected end of data while decoding compact-u16".into(),
            )
        })?;
        consumed += 1;

        value |= ((byte & 0x7f) as u32) << shift;
        shift += 7;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::DeserializationError(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

/// Encode a collection length, rejecting anything compact-u16 cannot carry.
pub(crate) fn encode_len(len: usize, what: &str) -> Result<Vec<u8>, SolError> {
    let len = u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(len))
}

// ---------------------------------------------------------------------------
// Wire reader
// ---------------------------------------------------------------------------

/// Cursor over transaction bytes with descriptive truncation errors.
pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub(crate) fn read_u8(&mut self, what: &str) -> Result<u8, SolError> {
        let byte = self.peek_u8().ok_or_else(|| {
            SolError::DeserializationError(format!("truncated before {what}"))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_compact_u16(&mut self) -> Result<u16, SolError> {
        let (value, consumed) = decode_compact_u16(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    pub(crate) fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], SolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SolError::DeserializationError(format!("truncated {what}")))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_key(&mut self, what: &str) -> Result<[u8; 32], SolError> {
        let mut key = [0u8; 32];
        key.copy_from_slice(self.read_bytes(32, what)?);
        Ok(key)
    }

    pub(crate) fn read_signatures(&mut self) -> Result<Vec<[u8; 64]>, SolError> {
        let count = self.read_compact_u16()? as usize;
        let mut signatures = Vec::with_capacity(count);
        for _ in 0..count {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(self.read_bytes(64, "signature")?);
            signatures.push(sig);
        }
        Ok(signatures)
    }

    /// Require that every byte was consumed.
    pub(crate) fn finish(&self) -> Result<(), SolError> {
        let remaining = self.data.len() - self.pos;
        if remaining > 0 {
            return Err(SolError::DeserializationError(format!(
                "{remaining} trailing bytes after message"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone)]
pub struct SolAccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

/// A Solana instruction (before it is compiled into a message).
#[derive(Debug, Clone)]
pub struct SolInstruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the message's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// The three-byte header shared by legacy and v0 messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Number of required signatures (first N account keys are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,
}

impl MessageHeader {
    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        Ok(Self {
            num_required_signatures: reader.read_u8("message header")?,
            num_readonly_signed: reader.read_u8("message header")?,
            num_readonly_unsigned: reader.read_u8("message header")?,
        })
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);
    }

    /// Check the header against the number of static account keys.
    pub(crate) fn validate(&self, num_keys: usize) -> Result<(), SolError> {
        let required = self.num_required_signatures as usize;
        if required > num_keys {
            return Err(SolError::DeserializationError(format!(
                "{required} required signatures but only {num_keys} account keys"
            )));
        }
        if self.num_readonly_signed as usize > required {
            return Err(SolError::DeserializationError(
                "more read-only signers than signers".into(),
            ));
        }
        if self.num_readonly_unsigned as usize > num_keys - required {
            return Err(SolError::DeserializationError(
                "more read-only non-signers than non-signers".into(),
            ));
        }
        Ok(())
    }
}

/// A compiled legacy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMessage {
    pub header: MessageHeader,
    /// All account keys, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<[u8; 32]>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

/// A legacy transaction: signature slots plus the message they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: LegacyMessage,
}

// ---------------------------------------------------------------------------
// Shared body encoding (keys, blockhash, instructions)
// ---------------------------------------------------------------------------

pub(crate) fn write_body(
    buf: &mut Vec<u8>,
    account_keys: &[[u8; 32]],
    recent_blockhash: &[u8; 32],
    instructions: &[CompiledInstruction],
) -> Result<(), SolError> {
    buf.extend_from_slice(&encode_len(account_keys.len(), "account keys")?);
    for key in account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(recent_blockhash);

    buf.extend_from_slice(&encode_len(instructions.len(), "instructions")?);
    for ix in instructions {
        buf.push(ix.program_id_index);
        buf.extend_from_slice(&encode_len(ix.account_indices.len(), "instruction accounts")?);
        buf.extend_from_slice(&ix.account_indices);
        buf.extend_from_slice(&encode_len(ix.data.len(), "instruction data bytes")?);
        buf.extend_from_slice(&ix.data);
    }

    Ok(())
}

pub(crate) fn read_account_keys(reader: &mut WireReader<'_>) -> Result<Vec<[u8; 32]>, SolError> {
    let count = reader.read_compact_u16()? as usize;
    (0..count).map(|_| reader.read_key("account key")).collect()
}

pub(crate) fn read_instructions(
    reader: &mut WireReader<'_>,
) -> Result<Vec<CompiledInstruction>, SolError> {
    let count = reader.read_compact_u16()? as usize;
    let mut instructions = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let program_id_index = reader.read_u8("program id index")?;
        let num_accounts = reader.read_compact_u16()? as usize;
        let account_indices = reader.read_bytes(num_accounts, "instruction accounts")?.to_vec();
        let data_len = reader.read_compact_u16()? as usize;
        let data = reader.read_bytes(data_len, "instruction data")?.to_vec();
        instructions.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data,
        });
    }
    Ok(instructions)
}

pub(crate) fn signer_slice<'a>(
    header: &MessageHeader,
    account_keys: &'a [[u8; 32]],
) -> Result<&'a [[u8; 32]], SolError> {
    let required = header.num_required_signatures as usize;
    account_keys.get(..required).ok_or_else(|| {
        SolError::TransactionBuildError(format!(
            "{required} required signatures but only {} account keys",
            account_keys.len()
        ))
    })
}

/// Every index an instruction uses must resolve to a key.
pub(crate) fn validate_indices(
    instructions: &[CompiledInstruction],
    num_keys: usize,
) -> Result<(), SolError> {
    for ix in instructions {
        let out_of_range = std::iter::once(&ix.program_id_index)
            .chain(ix.account_indices.iter())
            .find(|idx| **idx as usize >= num_keys);
        if let Some(idx) = out_of_range {
            return Err(SolError::DeserializationError(format!(
                "instruction references account {idx} of {num_keys}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Message building
// ---------------------------------------------------------------------------

/// Build a native SOL transfer message.
///
/// Creates a System Program `Transfer` instruction that moves `lamports`
/// from `from_pubkey` to `to_pubkey`.
pub fn build_sol_transfer(
    from_pubkey: &[u8; 32],
    to_pubkey: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Result<LegacyMessage, SolError> {
    if lamports == 0 {
        return Err(SolError::TransactionBuildError(
            "lamports must be > 0".into(),
        ));
    }

    let instruction = build_system_transfer_instruction(from_pubkey, to_pubkey, lamports);
    compile_message(&[instruction], Some(from_pubkey), recent_blockhash)
}

/// Compile instructions into a legacy message.
///
/// The fee payer, when given, is always signer + writable at index 0. A
/// message compiled without one is a draft for a wallet to complete.
pub fn compile_message(
    instructions: &[SolInstruction],
    fee_payer: Option<&[u8; 32]>,
    recent_blockhash: &[u8; 32],
) -> Result<LegacyMessage, SolError> {
    struct AccountEntry {
        pubkey: [u8; 32],
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: [u8; 32], signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    if let Some(payer) = fee_payer {
        upsert(*payer, true, true);
    }

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        // Program IDs are non-signer, read-only accounts.
        upsert(ix.program_id, false, false);
    }

    // Stable sort keeps insertion order inside each category.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    if let Some(payer) = fee_payer {
        if let Some(pos) = entries.iter().position(|e| e.pubkey == *payer) {
            entries.swap(0, pos);
        }
    }

    if entries.len() > MAX_ACCOUNT_KEYS {
        return Err(SolError::TransactionBuildError(format!(
            "{} accounts exceed the {MAX_ACCOUNT_KEYS} addressable by a message",
            entries.len()
        )));
    }

    let count = |f: fn(&AccountEntry) -> bool| entries.iter().filter(|e| f(e)).count() as u8;
    let header = MessageHeader {
        num_required_signatures: count(|e| e.is_signer),
        num_readonly_signed: count(|e| e.is_signer && !e.is_writable),
        num_readonly_unsigned: count(|e| !e.is_signer && !e.is_writable),
    };

    let account_keys: Vec<[u8; 32]> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &[u8; 32], what: &str| {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|idx| idx as u8)
            .ok_or_else(|| SolError::TransactionBuildError(format!("{what} not in account keys")))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id, "program_id")?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey, "account"))
            .collect::<Result<Vec<u8>, SolError>>()?;

        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(LegacyMessage {
        header,
        account_keys,
        recent_blockhash: *recent_blockhash,
        instructions: compiled,
    })
}

impl LegacyMessage {
    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(256);
        self.header.write(&mut buf);
        write_body(&mut buf, &self.account_keys, &self.recent_blockhash, &self.instructions)?;
        Ok(buf)
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        if reader.peek_u8().is_some_and(|b| b & crate::versioned::VERSION_PREFIX_MASK != 0) {
            return Err(SolError::DeserializationError(
                "message carries a version prefix".into(),
            ));
        }

        let header = MessageHeader::read(reader)?;
        let account_keys = read_account_keys(reader)?;
        header.validate(account_keys.len())?;
        let recent_blockhash = reader.read_key("recent blockhash")?;
        let instructions = read_instructions(reader)?;
        validate_indices(&instructions, account_keys.len())?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// The fee payer, if the message has any signer at all.
    pub fn fee_payer(&self) -> Option<&[u8; 32]> {
        if self.header.num_required_signatures == 0 {
            return None;
        }
        self.account_keys.first()
    }

    pub fn has_recent_blockhash(&self) -> bool {
        self.recent_blockhash != [0u8; 32]
    }

    /// The account keys that must sign.
    pub fn signer_keys(&self) -> Result<&[[u8; 32]], SolError> {
        signer_slice(&self.header, &self.account_keys)
    }

    /// Check a hand-built message the way decoding would.
    pub fn validate(&self) -> Result<(), SolError> {
        self.header.validate(self.account_keys.len())?;
        validate_indices(&self.instructions, self.account_keys.len())
    }

    /// Install `payer` as fee payer on a message that has none.
    ///
    /// The payer moves (or is inserted) to index 0 as a writable signer and
    /// every instruction index is remapped. Messages that already have a fee
    /// payer are left untouched.
    fn install_fee_payer(&mut self, payer: &[u8; 32]) -> Result<bool, SolError> {
        if self.fee_payer().is_some() {
            return Ok(false);
        }

        let existing = self.account_keys.iter().position(|k| k == payer);
        let new_len = self.account_keys.len() + usize::from(existing.is_none());
        if new_len > MAX_ACCOUNT_KEYS {
            return Err(SolError::TransactionBuildError(
                "no room for a fee payer account".into(),
            ));
        }

        match existing {
            Some(pos) => {
                let readonly_start = self.account_keys.len()
                    - self.header.num_readonly_unsigned as usize;
                if pos >= readonly_start {
                    self.header.num_readonly_unsigned -= 1;
                }
                self.account_keys.remove(pos);
                self.account_keys.insert(0, *payer);
                let pos = pos as u8;
                self.remap_indices(|idx| match idx {
                    i if i == pos => 0,
                    i if i < pos => i + 1,
                    i => i,
                });
            }
            None => {
                self.account_keys.insert(0, *payer);
                self.remap_indices(|idx| idx + 1);
            }
        }

        self.header.num_required_signatures = 1;
        Ok(true)
    }

    fn remap_indices(&mut self, f: impl Fn(u8) -> u8) {
        for ix in &mut self.instructions {
            ix.program_id_index = f(ix.program_id_index);
            for idx in &mut ix.account_indices {
                *idx = f(*idx);
            }
        }
    }
}

impl LegacyTransaction {
    /// Wrap a message with one empty signature slot per required signer.
    pub fn new_unsigned(message: LegacyMessage) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            signatures: vec![EMPTY_SIGNATURE; slots],
            message,
        }
    }

    /// Serialize into the legacy wire format.
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

    /// Parse legacy wire bytes. Versioned messages are rejected.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = WireReader::new(bytes);
        let signatures = reader.read_signatures()?;
        let message = LegacyMessage::read(&mut reader)?;
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

    /// Set the fee payer if the message has none. Returns whether it changed.
    pub fn ensure_fee_payer(&mut self, payer: &[u8; 32]) -> Result<bool, SolError> {
        let changed = self.message.install_fee_payer(payer)?;
        if changed {
            self.reset_signatures();
        }
        Ok(changed)
    }

    /// Set the blockhash if it is still the all-zero placeholder.
    pub fn ensure_recent_blockhash(&mut self, blockhash: &[u8; 32]) -> bool {
        if self.message.has_recent_blockhash() {
            return false;
        }
        self.message.recent_blockhash = *blockhash;
        self.reset_signatures();
        true
    }

    // A changed message invalidates every existing signature.
    fn reset_signatures(&mut self) {
        let slots = self.message.header.num_required_signatures as usize;
        self.signatures = vec![EMPTY_SIGNATURE; slots];
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Build a System Program `Transfer` instruction.
pub fn build_system_transfer_instruction(
    from: &[u8; 32],
    to: &[u8; 32],
    lamports: u64,
) -> SolInstruction {
    // u32 LE instruction index (2 = Transfer) + u64 LE lamports.
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    SolInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta {
                pubkey: *from,
                is_signer: true,
                is_writable: true,
            },
            SolAccountMeta {
                pubkey: *to,
                is_signer: false,
                is_writable: true,
            },
        ],
        data,
    }
}
