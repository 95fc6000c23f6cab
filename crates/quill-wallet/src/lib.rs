//! # quill-wallet — keys, encryption, and transaction building.
//!
//! Everything that happens before a transaction reaches the network:
//! key generation and WIF handling, passphrase encryption of keys,
//! address derivation and validation, coin selection, transaction
//! assembly, and signing.
//!
//! # Modules
//!
//! - [`keyvault`] — private keys, accounts, addresses
//! - [`nep2`] — passphrase-encrypted key records
//! - [`coin_selection`] — greedy largest-first input selection
//! - [`builder`] — transfer / claim / invocation payloads
//! - [`signer`] — deterministic ECDSA signing
//! - [`error`] — `WalletError` enum

pub mod builder;
pub mod coin_selection;
pub mod error;
pub mod keyvault;
pub mod nep2;
pub mod signer;

pub use error::WalletError;
pub use keyvault::{Account, PrivateKey};
