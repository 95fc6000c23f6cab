//! Transaction assembly.
//!
//! Builds the unsigned byte payloads for asset transfers, reward claims,
//! and token contract invocations, and attaches the witness script that
//! turns a signed payload into a broadcastable transaction.

use quill_core::constants::{TX_TYPE_CLAIM, TX_TYPE_CONTRACT, TX_TYPE_INVOCATION};
use quill_core::wire;
use quill_core::{Asset, Fixed8, ScriptHash, Utxo};

use crate::coin_selection::select_utxos;
use crate::error::WalletError;
use crate::keyvault::{verification_script, Account};

// Script opcodes used by the invocation builders.
const OP_PUSH0: u8 = 0x00;
const OP_PUSH1: u8 = 0x51;
const OP_PUSH3: u8 = 0x53;
const OP_PACK: u8 = 0xc1;
const OP_APPCALL: u8 = 0x67;

/// An unsigned transaction payload plus the inputs it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// The signable bytes.
    pub payload: Vec<u8>,
    /// Inputs consumed, empty for claim and invocation transactions.
    pub spent: Vec<Utxo>,
}

/// Build an unsigned native-asset transfer.
///
/// Selects inputs from `utxos`, pays `amount` of `asset` to `to`, and
/// returns any overshoot to the sender as a change output.
pub fn transfer_transaction(
    utxos: &[Utxo],
    asset: Asset,
    sender: &ScriptHash,
    to: &ScriptHash,
    amount: Fixed8,
) -> Result<UnsignedTransaction, WalletError> {
    if asset == Asset::Neo && amount.raw() % quill_core::constants::COIN != 0 {
        return Err(WalletError::IndivisibleAmount);
    }
    let selection = select_utxos(utxos, amount)?;
    let asset_id = asset.id();

    let mut payload = Vec::new();
    payload.push(TX_TYPE_CONTRACT);
    payload.push(0x00); // version
    payload.push(0x00); // attribute count

    wire::put_count(&mut payload, selection.selected.len())?;
    for utxo in &selection.selected {
        wire::put_input(&mut payload, utxo);
    }

    let output_count = if selection.change.is_zero() { 1 } else { 2 };
    wire::put_count(&mut payload, output_count)?;
    wire::put_output(&mut payload, &asset_id, amount, to);
    if !selection.change.is_zero() {
        wire::put_output(&mut payload, &asset_id, selection.change, sender);
    }

    Ok(UnsignedTransaction {
        payload,
        spent: selection.selected,
    })
}

/// Build an unsigned claim transaction.
///
/// References the spent outputs whose accrued reward is being claimed and
/// pays the whole claim total to the claimer. Claim transactions consume
/// no inputs.
pub fn claim_transaction(
    claims: &[Utxo],
    total: Fixed8,
    claimer: &ScriptHash,
) -> Result<UnsignedTransaction, WalletError> {
    if claims.is_empty() {
        return Err(WalletError::NoUtxos);
    }

    let mut payload = Vec::new();
    payload.push(TX_TYPE_CLAIM);
    payload.push(0x00); // version

    wire::put_count(&mut payload, claims.len())?;
    for claim in claims {
        wire::put_input(&mut payload, claim);
    }

    payload.push(0x00); // attribute count
    payload.push(0x00); // input count
    payload.push(0x01); // output count
    wire::put_output(&mut payload, &Asset::Gas.id(), total, claimer);

    Ok(UnsignedTransaction {
        payload,
        spent: Vec::new(),
    })
}

/// Build an unsigned token-contract transfer invocation.
///
/// The script calls the token contract's `transfer(from, to, amount)`
/// entry point. Invocations carry no native inputs or outputs.
pub fn invocation_transaction(
    token: &ScriptHash,
    from: &ScriptHash,
    to: &ScriptHash,
    amount: Fixed8,
) -> Result<UnsignedTransaction, WalletError> {
    if amount.is_zero() {
        return Err(WalletError::ZeroAmount);
    }

    let mut script = Vec::new();
    push_int(&mut script, amount.raw());
    push_data(&mut script, to.as_bytes());
    push_data(&mut script, from.as_bytes());
    script.push(OP_PUSH3);
    script.push(OP_PACK);
    push_data(&mut script, b"transfer");
    script.push(OP_APPCALL);
    script.extend_from_slice(&token.reversed());

    let mut payload = Vec::new();
    payload.push(TX_TYPE_INVOCATION);
    payload.push(0x00); // version
    wire::put_count(&mut payload, script.len())?;
    payload.extend_from_slice(&script);
    payload.push(0x00); // attribute count
    payload.push(0x00); // input count
    payload.push(0x00); // output count

    Ok(UnsignedTransaction {
        payload,
        spent: Vec::new(),
    })
}

/// Assemble the `balanceOf` query script for a token contract.
///
/// The result goes to the node's script-evaluation RPC, not on chain.
pub fn token_balance_script(token: &ScriptHash, holder: &ScriptHash) -> Vec<u8> {
    let mut script = Vec::with_capacity(54);
    push_data(&mut script, holder.as_bytes());
    script.push(OP_PUSH1);
    script.push(OP_PACK);
    push_data(&mut script, b"balanceOf");
    script.push(OP_APPCALL);
    script.extend_from_slice(&token.reversed());
    script
}

/// Attach the witness: invocation script (the signature push) plus the
/// account's verification script.
pub fn signed_payload(tx: &[u8], signature: &[u8; 64], account: &Account) -> Vec<u8> {
    let mut out = Vec::with_capacity(tx.len() + 103);
    out.extend_from_slice(tx);
    out.push(0x01); // witness count
    out.push(0x41); // invocation script length
    out.push(0x40); // push 64 bytes
    out.extend_from_slice(signature);
    out.push(0x23); // verification script length
    out.extend_from_slice(&verification_script(account.public_key()));
    out
}

/// Push a literal byte string onto the evaluation stack.
///
/// Everything pushed here is well under the 75-byte direct-push limit.
fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() <= 75);
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

/// Push an unsigned integer with the VM's minimal encoding: dedicated
/// opcodes for 0..=16, otherwise minimal little-endian bytes with a
/// leading-sign guard.
fn push_int(script: &mut Vec<u8>, value: u64) {
    match value {
        0 => script.push(OP_PUSH0),
        1..=16 => script.push(OP_PUSH1 + (value as u8 - 1)),
        _ => {
            let mut bytes: Vec<u8> = value.to_le_bytes().to_vec();
            while bytes.len() > 1 && bytes[bytes.len() - 1] == 0 {
                bytes.pop();
            }
            // keep the number positive under two's complement
            if bytes[bytes.len() - 1] & 0x80 != 0 {
                bytes.push(0x00);
            }
            push_data(script, &bytes);
        }
    }
}
