//! Greedy largest-first coin selection.
//!
//! Sorts the available outputs by value descending and takes the shortest
//! prefix that covers the target. Large outputs first keeps input counts
//! small, which keeps transactions small.

use quill_core::{Fixed8, Utxo};

use crate::error::WalletError;

/// Result of coin selection: which outputs to spend and the change due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// Selected outputs, in spend order.
    pub selected: Vec<Utxo>,
    /// Total value of the selected outputs.
    pub total: Fixed8,
    /// Overshoot to return to the sender. Zero for an exact match.
    pub change: Fixed8,
}

/// Select outputs to cover `target`.
pub fn select_utxos(utxos: &[Utxo], target: Fixed8) -> Result<CoinSelection, WalletError> {
    if target.is_zero() {
        return Err(WalletError::ZeroAmount);
    }
    if utxos.is_empty() {
        return Err(WalletError::NoUtxos);
    }

    let mut sorted: Vec<Utxo> = utxos.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let mut selected = Vec::new();
    let mut total = Fixed8::ZERO;
    for utxo in sorted {
        total = total.checked_add(utxo.value)?;
        selected.push(utxo);
        if total >= target {
            return Ok(CoinSelection {
                selected,
                total,
                change: total.checked_sub(target)?,
            });
        }
    }

    Err(WalletError::InsufficientFunds {
        have: total,
        need: target,
    })
}
