//! # quill-session — the live wallet session.
//!
//! Owns authentication, the background chain-sync loop, sending assets,
//! and the reward-claim protocol. Chain access is abstracted behind
//! [`client::LedgerClient`]; state is shared read-only through
//! [`state::SessionHandle`] and changes are announced on a broadcast
//! event stream.
//!
//! # Modules
//!
//! - [`client`] — ledger access trait + HTTP implementation
//! - [`state`] — shared session state, claim progress, events
//! - [`controller`] — login / sync / send / claim / logout
//! - [`error`] — `SessionError` enum

pub mod client;
pub mod controller;
pub mod error;
pub mod state;

pub use client::{HttpLedgerClient, LedgerClient};
pub use controller::{Credentials, SessionConfig, SessionController};
pub use error::SessionError;
pub use state::{SessionEvent, SessionHandle, SessionState};
