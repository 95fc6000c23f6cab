//! Wallet error types.

use thiserror::Error;

use quill_core::CoreError;

/// Errors from key handling, encryption, and transaction building.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Raw private key material was not exactly 32 bytes.
    #[error("private key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A WIF string failed checksum or structural validation.
    #[error("invalid WIF key")]
    InvalidKeyFormat,

    /// An encrypted key record failed checksum or structural validation.
    #[error("invalid encrypted key record")]
    InvalidRecordFormat,

    /// Decryption completed but the result does not match the record,
    /// meaning the passphrase was wrong.
    #[error("wrong passphrase")]
    WrongPassphrase,

    /// An address string failed version or checksum validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Available outputs do not cover the requested amount.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        have: quill_core::Fixed8,
        need: quill_core::Fixed8,
    },

    /// Nothing to spend from.
    #[error("no unspent outputs available")]
    NoUtxos,

    /// A send of zero is rejected before selection.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// NEO amounts must be whole coins.
    #[error("asset is indivisible, amount must be a whole number of coins")]
    IndivisibleAmount,

    /// The key derivation function rejected its parameters or input.
    #[error("key derivation failed")]
    KdfFailure,

    #[error(transparent)]
    Core(#[from] CoreError),
}
