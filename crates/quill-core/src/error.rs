//! Core error types.

use thiserror::Error;

/// Errors from core type parsing and wire encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A hash string did not parse (wrong length or non-hex characters).
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// A decimal amount string did not parse.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// An amount computation overflowed the fixed-point range.
    #[error("amount overflow")]
    AmountOverflow,

    /// An amount subtraction went below zero.
    #[error("amount would go below zero")]
    AmountUnderflow,

    /// A length-prefixed sequence exceeded the single-byte count limit.
    #[error("sequence too long for wire format: {0} items")]
    SequenceTooLong(usize),

    /// A network name did not match any known chain.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
