//! Session error types.

use thiserror::Error;

use quill_wallet::WalletError;

/// Errors from the session layer: network fetches, authentication, and
/// the send and claim flows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A response decoded as JSON but was missing required fields or
    /// carried non-numeric values where numbers were expected.
    #[error("return data malformed")]
    MalformedResponse,

    /// The request never produced a usable response.
    #[error("request to {host} failed")]
    RequestFailed { host: String },

    /// The node rejected a submitted transaction.
    #[error("transaction rejected by node")]
    SubmitRejected,

    /// The claim transaction was not accepted. The session stays usable;
    /// the claim can be retried.
    #[error("claim failed")]
    ClaimFailed,

    /// No claimable amount is currently available.
    #[error("nothing to claim")]
    NothingToClaim,

    /// A login attempt while another is in flight or a session is live.
    #[error("an authentication is already in progress")]
    AlreadyAuthenticating,

    /// A logout landed while the login was still authenticating.
    #[error("login cancelled")]
    LoginCancelled,

    /// Operation requires an authenticated session.
    #[error("not logged in")]
    NotLoggedIn,

    /// The send destination failed address validation.
    #[error("invalid destination address: {0}")]
    InvalidDestinationAddress(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}
