//! Byte-level encoders for the ledger's transaction wire format.
//!
//! All multi-byte integers are little-endian. Hashes serialize in
//! reversed byte order relative to their canonical hex display.

use crate::error::CoreError;
use crate::types::{Fixed8, ScriptHash, TxHash, Utxo};

/// Largest sequence length that fits the single-byte count prefix.
pub const MAX_COUNT: usize = 0xfc;

/// Append a hash in wire (reversed) order.
pub fn put_hash_reversed(buf: &mut Vec<u8>, hash: &TxHash) {
    buf.extend_from_slice(&hash.reversed());
}

pub fn put_u16_le(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a fixed-point amount as raw units, little-endian u64.
pub fn put_amount_le(buf: &mut Vec<u8>, amount: Fixed8) {
    buf.extend_from_slice(&amount.raw().to_le_bytes());
}

/// Append a single-byte sequence count.
///
/// Transactions built here never approach the multi-byte varint range,
/// so longer sequences are rejected outright.
pub fn put_count(buf: &mut Vec<u8>, count: usize) -> Result<(), CoreError> {
    if count > MAX_COUNT {
        return Err(CoreError::SequenceTooLong(count));
    }
    buf.push(count as u8);
    Ok(())
}

/// Append a transaction input reference: reversed txid plus output index.
/// 34 bytes.
pub fn put_input(buf: &mut Vec<u8>, utxo: &Utxo) {
    put_hash_reversed(buf, &utxo.txid);
    put_u16_le(buf, utxo.index);
}

/// Append a transaction output: reversed asset id, amount, recipient
/// script hash. 60 bytes.
pub fn put_output(buf: &mut Vec<u8>, asset_id: &TxHash, amount: Fixed8, to: &ScriptHash) {
    put_hash_reversed(buf, asset_id);
    put_amount_le(buf, amount);
    buf.extend_from_slice(to.as_bytes());
}
