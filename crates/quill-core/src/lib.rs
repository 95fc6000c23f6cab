//! # quill-core — shared primitives for the Quill wallet engine.
//!
//! Provides the hash and amount types used throughout the wallet,
//! the network/asset identifiers of the target ledger, and the
//! byte-level helpers that encode the ledger's exact wire format.
//!
//! # Modules
//!
//! - [`error`] — `CoreError` enum
//! - [`types`] — TxHash, ScriptHash, Fixed8, Asset, Network, Utxo
//! - [`wire`] — transaction wire-format byte helpers
//! - [`constants`] — protocol constants (asset ids, KDF parameters)

pub mod constants;
pub mod error;
pub mod types;
pub mod wire;

pub use error::CoreError;
pub use types::{Asset, Fixed8, Network, ScriptHash, TxHash, Utxo};
