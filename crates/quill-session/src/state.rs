//! Shared session state and the session event stream.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use quill_core::{Asset, Fixed8, Network};

use crate::client::TxRecord;

/// Milestones of an in-flight claim, in order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimProgress {
    /// A blocked claim amount needs the self-transfer step.
    pub unspent_to_clear: bool,
    /// The self-transfer has confirmed and the blocked amount moved.
    pub self_transfer_confirmed: bool,
    /// The claim transaction was accepted by a node.
    pub claim_submitted: bool,
    /// The claimed amount arrived in the balance.
    pub claim_confirmed: bool,
}

/// Everything the session knows about the logged-in account.
///
/// Mutation goes through the controller; consumers read snapshots
/// through [`SessionHandle`].
#[derive(Debug, Clone)]
pub struct SessionState {
    pub logged_in: bool,
    pub address: Option<String>,
    pub network: Network,
    pub neo_balance: Fixed8,
    pub gas_balance: Fixed8,
    pub price_usd: f64,
    pub transaction_history: Vec<TxRecord>,
    pub claim_available: Fixed8,
    pub claim_unspendable: Fixed8,
    /// A send went out and its effect has not shown up in a balance
    /// fetch yet.
    pub pending_confirmation: bool,
    /// The sent asset and its fetched balance at send time; a fetch
    /// that differs clears the pending flag.
    pub pending_baseline: Option<(Asset, Fixed8)>,
    /// Last height a full sync cycle ran at, per network.
    pub last_block_height: HashMap<Network, u64>,
    /// Present only while a claim is in flight.
    pub claim_progress: Option<ClaimProgress>,
}

impl SessionState {
    pub fn new(network: Network) -> Self {
        Self {
            logged_in: false,
            address: None,
            network,
            neo_balance: Fixed8::ZERO,
            gas_balance: Fixed8::ZERO,
            price_usd: 0.0,
            transaction_history: Vec::new(),
            claim_available: Fixed8::ZERO,
            claim_unspendable: Fixed8::ZERO,
            pending_confirmation: false,
            pending_baseline: None,
            last_block_height: HashMap::new(),
            claim_progress: None,
        }
    }

    /// Back to logged-out defaults, keeping the network choice.
    pub fn reset(&mut self) {
        *self = SessionState::new(self.network);
    }
}

/// Shared read handle to the session state.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn new(network: Network) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::new(network))),
        }
    }

    /// Clone out the current state.
    pub fn snapshot(&self) -> SessionState {
        self.inner.read().clone()
    }

    /// Read a projection of the state without cloning the whole struct.
    pub fn with<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&self.inner.read())
    }

    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        f(&mut self.inner.write())
    }
}

/// Which background fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Height,
    Balance,
    History,
    Price,
    Claims,
}

/// Notifications broadcast to session observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoginSucceeded(String),
    LoginFailed,
    /// The background sync loop has fully stopped, on logout or after a
    /// failed fetch. Emitted exactly once per session.
    SyncStopped,
    BalanceUpdated,
    HistoryUpdated,
    PriceUpdated,
    ClaimAmountsUpdated,
    FetchFailed(FetchKind),
    NetworkChanged(Network),
    AssetSent { to_self: bool },
    UnspentClaimToClear,
    SelfTransferCleared,
    ClaimSubmitted,
    ClaimFailed,
    ClaimConfirmed,
}
