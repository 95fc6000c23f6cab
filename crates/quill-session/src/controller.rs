//! The session controller: login, background sync, send, and claim.
//!
//! One controller owns one (potential) authenticated session. All state
//! mutation funnels through it; observers watch the event stream and
//! read snapshots through the [`SessionHandle`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quill_core::{Asset, Fixed8, Network};
use quill_wallet::builder;
use quill_wallet::keyvault::{address_to_script_hash, is_valid_address};
use quill_wallet::nep2::{self, KdfParams};
use quill_wallet::signer;
use quill_wallet::{Account, WalletError};

use crate::client::LedgerClient;
use crate::error::SessionError;
use crate::state::{ClaimProgress, FetchKind, SessionEvent, SessionHandle, SessionState};

/// Tuning knobs for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Pause between sync cycles (and between claim-progress polls).
    pub sync_interval: Duration,
    /// KDF cost for encrypted-key logins.
    pub kdf_params: KdfParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5),
            kdf_params: KdfParams::default(),
        }
    }
}

/// How the user proves key ownership at login.
pub enum Credentials {
    /// A plaintext WIF key.
    Wif(String),
    /// An encrypted key record plus its passphrase.
    Encrypted { record: String, passphrase: String },
}

struct Auth {
    account: Account,
    cancel: CancellationToken,
    sync_task: JoinHandle<()>,
}

struct Inner {
    /// Present while a login is authenticating; logout cancels it.
    login_cancel: Option<CancellationToken>,
    auth: Option<Auth>,
}

/// Drives one wallet session against a [`LedgerClient`].
pub struct SessionController<C> {
    client: Arc<C>,
    config: SessionConfig,
    handle: SessionHandle,
    events: broadcast::Sender<SessionEvent>,
    network_tx: watch::Sender<Network>,
    inner: Mutex<Inner>,
}

impl<C: LedgerClient + 'static> SessionController<C> {
    pub fn new(client: C, network: Network, config: SessionConfig) -> Self {
        let (network_tx, _) = watch::channel(network);
        let (events, _) = broadcast::channel(256);
        Self {
            client: Arc::new(client),
            config,
            handle: SessionHandle::new(network),
            events,
            network_tx,
            inner: Mutex::new(Inner {
                login_cancel: None,
                auth: None,
            }),
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Shared read handle to the session state.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn network(&self) -> Network {
        *self.network_tx.borrow()
    }

    /// Switch networks. A running sync loop resyncs immediately.
    pub fn set_network(&self, network: Network) {
        if *self.network_tx.borrow() == network {
            return;
        }
        self.network_tx.send_replace(network);
        self.handle.update(|s| s.network = network);
        info!(%network, "network switched");
        self.emit(SessionEvent::NetworkChanged(network));
    }

    /// Authenticate and start background sync.
    ///
    /// At most one login may be in flight, and a live session must be
    /// logged out before another login. A logout that lands while the
    /// login is still authenticating cancels it.
    pub async fn login(&self, credentials: Credentials) -> Result<(), SessionError> {
        let login_cancel = CancellationToken::new();
        {
            let mut inner = self.inner.lock();
            if inner.login_cancel.is_some() || inner.auth.is_some() {
                return Err(SessionError::AlreadyAuthenticating);
            }
            inner.login_cancel = Some(login_cancel.clone());
        }

        match self.authenticate(credentials).await {
            Ok(account) => {
                let address = account.address().to_string();
                let cancel = CancellationToken::new();
                {
                    let mut inner = self.inner.lock();
                    inner.login_cancel = None;
                    // a logout landed mid-authentication; do not install
                    // the session it asked to end
                    if login_cancel.is_cancelled() {
                        drop(inner);
                        warn!("login cancelled by logout");
                        self.emit(SessionEvent::LoginFailed);
                        return Err(SessionError::LoginCancelled);
                    }
                    let sync_task = tokio::spawn(sync_loop(
                        Arc::clone(&self.client),
                        self.handle.clone(),
                        self.events.clone(),
                        self.network_tx.subscribe(),
                        cancel.clone(),
                        self.config.sync_interval,
                        address.clone(),
                    ));
                    inner.auth = Some(Auth {
                        account,
                        cancel,
                        sync_task,
                    });
                }
                self.handle.update(|s| {
                    s.logged_in = true;
                    s.address = Some(address.clone());
                });
                info!(%address, "login succeeded");
                self.emit(SessionEvent::LoginSucceeded(address));
                Ok(())
            }
            Err(e) => {
                self.inner.lock().login_cancel = None;
                warn!("login failed: {e}");
                self.emit(SessionEvent::LoginFailed);
                Err(e)
            }
        }
    }

    async fn authenticate(&self, credentials: Credentials) -> Result<Account, SessionError> {
        match credentials {
            Credentials::Wif(wif) => Ok(Account::from_wif(&wif)?),
            Credentials::Encrypted { record, passphrase } => {
                let params = self.config.kdf_params;
                // scrypt is CPU-bound; keep it off the async workers
                let account =
                    tokio::task::spawn_blocking(move || nep2::decrypt_key(&record, &passphrase, params))
                        .await
                        .map_err(|_| SessionError::Wallet(WalletError::KdfFailure))??;
                Ok(account)
            }
        }
    }

    /// Stop the session. Cancels an in-flight login, tears down a live
    /// sync loop; a no-op when already logged out.
    pub async fn logout(&self) {
        let (login_cancel, auth) = {
            let mut inner = self.inner.lock();
            (inner.login_cancel.take(), inner.auth.take())
        };
        if let Some(token) = login_cancel {
            token.cancel();
        }
        if let Some(auth) = auth {
            auth.cancel.cancel();
            if let Err(e) = auth.sync_task.await {
                debug!("sync task join error: {e}");
            }
        }
        self.handle.update(|s| s.reset());
        info!("logged out");
    }

    /// Send `amount` of `asset` to `to_address`.
    ///
    /// On acceptance the local balance is decremented optimistically and
    /// the pending flag raised, unless the destination is the session's
    /// own address (a self-transfer leaves the balance unchanged).
    pub async fn send_asset(
        &self,
        to_address: &str,
        asset: Asset,
        amount: Fixed8,
    ) -> Result<(), SessionError> {
        let (account, _) = self.authed()?;
        if !is_valid_address(to_address) {
            return Err(SessionError::InvalidDestinationAddress(
                to_address.to_string(),
            ));
        }
        let to_hash = address_to_script_hash(to_address)
            .map_err(|_| SessionError::InvalidDestinationAddress(to_address.to_string()))?;
        let network = self.network();

        let balance = self.client.balance(network, account.address()).await?;
        let utxos = match asset {
            Asset::Neo => &balance.neo.unspent,
            Asset::Gas => &balance.gas.unspent,
        };
        let tx = builder::transfer_transaction(utxos, asset, account.script_hash(), &to_hash, amount)?;
        let signature = signer::sign(&tx.payload, account.private_key())?;
        let raw = builder::signed_payload(&tx.payload, &signature, &account);

        let accepted = self
            .client
            .submit_transaction(network, &hex::encode(raw))
            .await?;
        if !accepted {
            return Err(SessionError::SubmitRejected);
        }

        let to_self = to_address == account.address();
        if !to_self {
            let fetched = match asset {
                Asset::Neo => balance.neo.balance,
                Asset::Gas => balance.gas.balance,
            };
            self.handle.update(|s| {
                s.pending_baseline = Some((asset, fetched));
                s.pending_confirmation = true;
                match asset {
                    Asset::Neo => s.neo_balance = fetched.saturating_sub(amount),
                    Asset::Gas => s.gas_balance = fetched.saturating_sub(amount),
                }
            });
        }
        info!(%to_address, %asset, %amount, to_self, "asset sent");
        self.emit(SessionEvent::AssetSent { to_self });
        Ok(())
    }

    /// Run the full claim protocol.
    ///
    /// When a NEO balance blocks part of the claim, the balance is first
    /// self-transferred to unlock it; the claim transaction follows once
    /// the blocked amount drops. A rejected claim aborts this attempt
    /// only; the session stays usable.
    pub async fn claim_gas(&self) -> Result<(), SessionError> {
        let (account, cancel) = self.authed()?;
        let network = self.network();
        let snap = self.handle.snapshot();

        let start_unspendable = snap.claim_unspendable;
        let gas_before = snap.gas_balance;
        if snap.claim_available.is_zero() && start_unspendable.is_zero() {
            return Err(SessionError::NothingToClaim);
        }

        self.handle
            .update(|s| s.claim_progress = Some(ClaimProgress::default()));
        let result = self
            .run_claim(&account, network, &cancel, start_unspendable, gas_before, snap.neo_balance)
            .await;
        if result.is_err() {
            self.handle.update(|s| s.claim_progress = None);
        }
        result
    }

    async fn run_claim(
        &self,
        account: &Account,
        network: Network,
        cancel: &CancellationToken,
        start_unspendable: Fixed8,
        gas_before: Fixed8,
        neo_balance: Fixed8,
    ) -> Result<(), SessionError> {
        if !neo_balance.is_zero() {
            self.handle.update(|s| {
                if let Some(p) = &mut s.claim_progress {
                    p.unspent_to_clear = true;
                }
            });
            self.emit(SessionEvent::UnspentClaimToClear);

            // moving the whole balance converts the blocked claim amount
            self.send_asset(account.address(), Asset::Neo, neo_balance)
                .await?;
            self.wait_until(cancel, |s| s.claim_unspendable < start_unspendable)
                .await?;
            self.handle.update(|s| {
                if let Some(p) = &mut s.claim_progress {
                    p.self_transfer_confirmed = true;
                }
            });
            self.emit(SessionEvent::SelfTransferCleared);
        }

        let bundle = self.client.claims(network, account.address()).await?;
        if bundle.claims.is_empty() || bundle.available.is_zero() {
            return Err(SessionError::NothingToClaim);
        }
        let tx = builder::claim_transaction(&bundle.claims, bundle.available, account.script_hash())?;
        let signature = signer::sign(&tx.payload, account.private_key())?;
        let raw = builder::signed_payload(&tx.payload, &signature, account);

        let accepted = self
            .client
            .submit_transaction(network, &hex::encode(raw))
            .await?;
        if !accepted {
            warn!("claim transaction rejected");
            self.emit(SessionEvent::ClaimFailed);
            return Err(SessionError::ClaimFailed);
        }
        self.handle.update(|s| {
            if let Some(p) = &mut s.claim_progress {
                p.claim_submitted = true;
            }
        });
        info!(amount = %bundle.available, "claim submitted");
        self.emit(SessionEvent::ClaimSubmitted);

        self.wait_until(cancel, |s| s.gas_balance > gas_before).await?;
        self.handle.update(|s| {
            if let Some(p) = &mut s.claim_progress {
                p.claim_confirmed = true;
            }
        });
        self.emit(SessionEvent::ClaimConfirmed);
        self.handle.update(|s| s.claim_progress = None);
        Ok(())
    }

    /// Transfer `amount` of a contract-managed token to `to_address`.
    ///
    /// Tokens live behind contract invocations rather than native
    /// outputs, so there is no optimistic balance update to make.
    pub async fn send_token(
        &self,
        token: &quill_core::ScriptHash,
        to_address: &str,
        amount: Fixed8,
    ) -> Result<(), SessionError> {
        let (account, _) = self.authed()?;
        if !is_valid_address(to_address) {
            return Err(SessionError::InvalidDestinationAddress(
                to_address.to_string(),
            ));
        }
        let to_hash = address_to_script_hash(to_address)
            .map_err(|_| SessionError::InvalidDestinationAddress(to_address.to_string()))?;

        let tx = builder::invocation_transaction(token, account.script_hash(), &to_hash, amount)?;
        let signature = signer::sign(&tx.payload, account.private_key())?;
        let raw = builder::signed_payload(&tx.payload, &signature, &account);

        let accepted = self
            .client
            .submit_transaction(self.network(), &hex::encode(raw))
            .await?;
        if !accepted {
            return Err(SessionError::SubmitRejected);
        }
        info!(%to_address, token = %token, %amount, "token sent");
        self.emit(SessionEvent::AssetSent { to_self: false });
        Ok(())
    }

    /// Query the session account's balance of a contract-managed token.
    pub async fn token_balance(
        &self,
        token: &quill_core::ScriptHash,
    ) -> Result<Fixed8, SessionError> {
        let (account, _) = self.authed()?;
        let script = builder::token_balance_script(token, account.script_hash());
        let result = self
            .client
            .invoke_script(self.network(), &hex::encode(script))
            .await?;
        parse_token_balance(&result)
    }

    /// Poll the state until `pred` holds or the session is cancelled.
    async fn wait_until(
        &self,
        cancel: &CancellationToken,
        pred: impl Fn(&SessionState) -> bool,
    ) -> Result<(), SessionError> {
        loop {
            if self.handle.with(|s| pred(s)) {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(SessionError::NotLoggedIn),
                _ = tokio::time::sleep(self.config.sync_interval) => {}
            }
        }
    }

    fn authed(&self) -> Result<(Account, CancellationToken), SessionError> {
        let inner = self.inner.lock();
        let auth = inner.auth.as_ref().ok_or(SessionError::NotLoggedIn)?;
        Ok((auth.account.clone(), auth.cancel.clone()))
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Decode a token balance from a script evaluation result.
///
/// The VM returns the top-of-stack integer as little-endian hex; an
/// empty string is zero.
fn parse_token_balance(result: &serde_json::Value) -> Result<Fixed8, SessionError> {
    let value = result
        .pointer("/stack/0/value")
        .and_then(serde_json::Value::as_str)
        .ok_or(SessionError::MalformedResponse)?;
    if value.is_empty() {
        return Ok(Fixed8::ZERO);
    }
    let mut bytes = hex::decode(value).map_err(|_| SessionError::MalformedResponse)?;
    if bytes.len() > 8 {
        return Err(SessionError::MalformedResponse);
    }
    bytes.resize(8, 0);
    let raw = u64::from_le_bytes(
        bytes
            .try_into()
            .map_err(|_| SessionError::MalformedResponse)?,
    );
    Ok(Fixed8::from_raw(raw))
}

/// The background sync loop.
///
/// Each turn runs one sync cycle for the current network, then waits for
/// the sync interval, a network switch (which pre-empts the wait), or
/// cancellation. A failed fetch tears the loop down the same way
/// cancellation does. The trailing stop event fires exactly once,
/// including when cancellation lands mid-fetch.
async fn sync_loop<C: LedgerClient>(
    client: Arc<C>,
    handle: SessionHandle,
    events: broadcast::Sender<SessionEvent>,
    mut network_rx: watch::Receiver<Network>,
    cancel: CancellationToken,
    interval: Duration,
    address: String,
) {
    loop {
        let network = *network_rx.borrow_and_update();
        tokio::select! {
            _ = cancel.cancelled() => break,
            healthy = sync_cycle(client.as_ref(), &handle, &events, network, &address) => {
                if !healthy {
                    warn!("sync fetch failed, stopping sync");
                    break;
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
            changed = network_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("network switched, resyncing now");
            }
        }
    }
    let _ = events.send(SessionEvent::SyncStopped);
}

/// One sync cycle: height check, then the four data fetches concurrently.
///
/// The cycle is skipped while the height sits where the last full cycle
/// left it. Fetch failures are reported individually and make the cycle
/// unhealthy, which stops the loop; returns whether the cycle stayed
/// healthy.
async fn sync_cycle<C: LedgerClient>(
    client: &C,
    handle: &SessionHandle,
    events: &broadcast::Sender<SessionEvent>,
    network: Network,
    address: &str,
) -> bool {
    let emit = |event| {
        let _ = events.send(event);
    };

    let height = match client.block_height(network).await {
        Ok(h) => h,
        Err(e) => {
            warn!("height fetch failed: {e}");
            emit(SessionEvent::FetchFailed(FetchKind::Height));
            return false;
        }
    };
    let last = handle.with(|s| s.last_block_height.get(&network).copied());
    if last == Some(height) {
        return true;
    }
    debug!(%network, height, "chain advanced, syncing");

    let (balance, history, price, claims) = tokio::join!(
        client.balance(network, address),
        client.transaction_history(network, address),
        client.market_price(network),
        client.claims(network, address),
    );

    let mut all_ok = true;
    match balance {
        Ok(b) => {
            handle.update(|s| {
                if let Some((asset, baseline)) = s.pending_baseline {
                    let current = match asset {
                        Asset::Neo => b.neo.balance,
                        Asset::Gas => b.gas.balance,
                    };
                    if current != baseline {
                        s.pending_confirmation = false;
                        s.pending_baseline = None;
                    }
                }
                s.neo_balance = b.neo.balance;
                s.gas_balance = b.gas.balance;
            });
            emit(SessionEvent::BalanceUpdated);
        }
        Err(e) => {
            warn!("balance fetch failed: {e}");
            emit(SessionEvent::FetchFailed(FetchKind::Balance));
            all_ok = false;
        }
    }
    match history {
        Ok(records) => {
            handle.update(|s| s.transaction_history = records);
            emit(SessionEvent::HistoryUpdated);
        }
        Err(e) => {
            warn!("history fetch failed: {e}");
            emit(SessionEvent::FetchFailed(FetchKind::History));
            all_ok = false;
        }
    }
    match price {
        Ok(price) => {
            handle.update(|s| s.price_usd = price);
            emit(SessionEvent::PriceUpdated);
        }
        Err(e) => {
            warn!("price fetch failed: {e}");
            emit(SessionEvent::FetchFailed(FetchKind::Price));
            all_ok = false;
        }
    }
    match claims {
        Ok(bundle) => {
            handle.update(|s| {
                s.claim_available = bundle.available;
                s.claim_unspendable = bundle.unavailable;
            });
            emit(SessionEvent::ClaimAmountsUpdated);
        }
        Err(e) => {
            warn!("claims fetch failed: {e}");
            emit(SessionEvent::FetchFailed(FetchKind::Claims));
            all_ok = false;
        }
    }

    if all_ok {
        handle.update(|s| {
            s.last_block_height.insert(network, height);
        });
    }
    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AddressBalance, AssetBalance, ClaimBundle};
    use async_trait::async_trait;
    use quill_core::{TxHash, Utxo};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    const VECTOR_WIF: &str = "L44B5gGEpqEDRS9vVPz7QT35jcBG2r3CZwSwQ4fCewXAhAhqGVpP";

    fn coins(n: u64) -> Fixed8 {
        Fixed8::from_coins(n).unwrap()
    }

    fn utxo(tag: u8, value: Fixed8) -> Utxo {
        Utxo {
            txid: TxHash([tag; 32]),
            index: 0,
            value,
        }
    }

    fn balance_with(neo: u64, gas_raw: u64) -> AddressBalance {
        AddressBalance {
            neo: AssetBalance {
                balance: coins(neo),
                unspent: if neo > 0 {
                    vec![utxo(1, coins(neo))]
                } else {
                    Vec::new()
                },
            },
            gas: AssetBalance {
                balance: Fixed8::from_raw(gas_raw),
                unspent: if gas_raw > 0 {
                    vec![utxo(2, Fixed8::from_raw(gas_raw))]
                } else {
                    Vec::new()
                },
            },
        }
    }

    struct MockLedger {
        height: AtomicU64,
        balance: parking_lot::Mutex<AddressBalance>,
        claims: parking_lot::Mutex<ClaimBundle>,
        price: parking_lot::Mutex<f64>,
        accept_submit: AtomicBool,
        fail_balance: AtomicBool,
        balance_calls: AtomicUsize,
        last_network: parking_lot::Mutex<Option<Network>>,
        submitted: parking_lot::Mutex<Vec<String>>,
        invoke_result: parking_lot::Mutex<Value>,
    }

    impl MockLedger {
        fn new() -> Self {
            Self {
                height: AtomicU64::new(1),
                balance: parking_lot::Mutex::new(balance_with(5, 150_000_000)),
                claims: parking_lot::Mutex::new(ClaimBundle::default()),
                price: parking_lot::Mutex::new(25.0),
                accept_submit: AtomicBool::new(true),
                fail_balance: AtomicBool::new(false),
                balance_calls: AtomicUsize::new(0),
                last_network: parking_lot::Mutex::new(None),
                submitted: parking_lot::Mutex::new(Vec::new()),
                invoke_result: parking_lot::Mutex::new(Value::Null),
            }
        }

        fn advance_height(&self) {
            self.height.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LedgerClient for Arc<MockLedger> {
        async fn block_height(&self, _network: Network) -> Result<u64, SessionError> {
            Ok(self.height.load(Ordering::SeqCst))
        }

        async fn balance(
            &self,
            network: Network,
            _address: &str,
        ) -> Result<AddressBalance, SessionError> {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_network.lock() = Some(network);
            if self.fail_balance.load(Ordering::SeqCst) {
                return Err(SessionError::RequestFailed {
                    host: "mock".into(),
                });
            }
            Ok(self.balance.lock().clone())
        }

        async fn transaction_history(
            &self,
            _network: Network,
            _address: &str,
        ) -> Result<Vec<crate::client::TxRecord>, SessionError> {
            Ok(Vec::new())
        }

        async fn claims(
            &self,
            _network: Network,
            _address: &str,
        ) -> Result<ClaimBundle, SessionError> {
            Ok(self.claims.lock().clone())
        }

        async fn market_price(&self, _network: Network) -> Result<f64, SessionError> {
            Ok(*self.price.lock())
        }

        async fn submit_transaction(
            &self,
            _network: Network,
            hex: &str,
        ) -> Result<bool, SessionError> {
            self.submitted.lock().push(hex.to_string());
            Ok(self.accept_submit.load(Ordering::SeqCst))
        }

        async fn invoke_script(
            &self,
            _network: Network,
            _hex: &str,
        ) -> Result<Value, SessionError> {
            Ok(self.invoke_result.lock().clone())
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            sync_interval: Duration::from_millis(50),
            kdf_params: KdfParams {
                log_n: 4,
                r: 2,
                p: 1,
            },
        }
    }

    fn controller(mock: &Arc<MockLedger>) -> Arc<SessionController<Arc<MockLedger>>> {
        Arc::new(SessionController::new(
            Arc::clone(mock),
            Network::TestNet,
            test_config(),
        ))
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    fn test_address() -> String {
        Account::from_wif(VECTOR_WIF).unwrap().address().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn login_starts_sync_and_populates_state() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();

        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let snap = ctl.handle().snapshot();
        assert!(snap.logged_in);
        assert_eq!(snap.address, Some(test_address()));
        assert_eq!(snap.neo_balance, coins(5));
        assert_eq!(snap.gas_balance, Fixed8::from_raw(150_000_000));
        assert_eq!(snap.price_usd, 25.0);
        assert_eq!(snap.last_block_height.get(&Network::TestNet), Some(&1));

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::LoginSucceeded(test_address())));
        assert!(events.contains(&SessionEvent::BalanceUpdated));
        assert!(events.contains(&SessionEvent::PriceUpdated));
    }

    #[tokio::test(start_paused = true)]
    async fn second_login_rejected_while_session_live() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();

        let err = ctl
            .login(Credentials::Wif(VECTOR_WIF.into()))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyAuthenticating);
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn encrypted_login_and_wrong_passphrase() {
        let params = test_config().kdf_params;
        let account = Account::from_wif(VECTOR_WIF).unwrap();
        let record = nep2::encrypt_key(account.private_key(), "sekrit", params).unwrap();

        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();

        let err = ctl
            .login(Credentials::Encrypted {
                record: record.clone(),
                passphrase: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Wallet(WalletError::WrongPassphrase));
        assert!(drain(&mut rx).contains(&SessionEvent::LoginFailed));
        assert!(!ctl.handle().snapshot().logged_in);

        // a failed attempt must not block the next one
        ctl.login(Credentials::Encrypted {
            record,
            passphrase: "sekrit".into(),
        })
        .await
        .unwrap();
        assert!(ctl.handle().snapshot().logged_in);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_sync_exactly_once() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();

        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;
        ctl.logout().await;

        let calls_after_logout = mock.balance_calls.load(Ordering::SeqCst);
        mock.advance_height();
        settle().await;
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), calls_after_logout);

        let snap = ctl.handle().snapshot();
        assert!(!snap.logged_in);
        assert!(snap.address.is_none());

        let stops = drain(&mut rx)
            .into_iter()
            .filter(|e| *e == SessionEvent::SyncStopped)
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_during_login_leaves_no_zombie_session() {
        let params = test_config().kdf_params;
        let account = Account::from_wif(VECTOR_WIF).unwrap();
        let record = nep2::encrypt_key(account.private_key(), "sekrit", params).unwrap();

        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);

        let login_ctl = Arc::clone(&ctl);
        let login_task = tokio::spawn(async move {
            login_ctl
                .login(Credentials::Encrypted {
                    record,
                    passphrase: "sekrit".into(),
                })
                .await
        });
        // let the login register itself and enter key derivation
        tokio::task::yield_now().await;
        ctl.logout().await;

        // whichever side won the race, no session survives it
        if let Err(err) = login_task.await.unwrap() {
            assert_eq!(err, SessionError::LoginCancelled);
        }
        let snap = ctl.handle().snapshot();
        assert!(!snap.logged_in);
        assert!(snap.address.is_none());

        // and the next login is not blocked by a stale in-flight marker
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        assert!(ctl.handle().snapshot().logged_in);
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sync_skips_while_height_unchanged() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 1);

        settle().await;
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 1);

        mock.advance_height();
        settle().await;
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 2);
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_stops_sync() {
        let mock = Arc::new(MockLedger::new());
        mock.fail_balance.store(true, Ordering::SeqCst);
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();

        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        // one failed cycle tears the whole loop down; no retries
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 1);
        mock.advance_height();
        settle().await;
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 1);

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::FetchFailed(FetchKind::Balance)));
        let stops = events
            .iter()
            .filter(|e| **e == SessionEvent::SyncStopped)
            .count();
        assert_eq!(stops, 1);
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_login() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        let err = ctl
            .send_asset(&test_address(), Asset::Neo, coins(1))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotLoggedIn);
    }

    #[tokio::test(start_paused = true)]
    async fn send_decrements_balance_and_marks_pending() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let other = Account::generate().address().to_string();
        ctl.send_asset(&other, Asset::Neo, coins(2)).await.unwrap();

        let snap = ctl.handle().snapshot();
        assert_eq!(snap.neo_balance, coins(3));
        assert!(snap.pending_confirmation);
        assert_eq!(mock.submitted.lock().len(), 1);
        assert!(mock.submitted.lock()[0].starts_with("8000"));
        assert!(drain(&mut rx).contains(&SessionEvent::AssetSent { to_self: false }));
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_self_skips_optimistic_update() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        ctl.send_asset(&test_address(), Asset::Neo, coins(5))
            .await
            .unwrap();

        let snap = ctl.handle().snapshot();
        assert_eq!(snap.neo_balance, coins(5));
        assert!(!snap.pending_confirmation);
        assert!(drain(&mut rx).contains(&SessionEvent::AssetSent { to_self: true }));
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn send_rejects_invalid_destination() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();

        let err = ctl
            .send_asset("definitely-not-an-address", Asset::Neo, coins(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidDestinationAddress(_)));
        assert!(mock.submitted.lock().is_empty());
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn send_rejected_by_node_leaves_state_untouched() {
        let mock = Arc::new(MockLedger::new());
        mock.accept_submit.store(false, Ordering::SeqCst);
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let other = Account::generate().address().to_string();
        let err = ctl.send_asset(&other, Asset::Neo, coins(2)).await.unwrap_err();
        assert_eq!(err, SessionError::SubmitRejected);

        let snap = ctl.handle().snapshot();
        assert_eq!(snap.neo_balance, coins(5));
        assert!(!snap.pending_confirmation);
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_clears_when_balance_moves() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let other = Account::generate().address().to_string();
        ctl.send_asset(&other, Asset::Neo, coins(2)).await.unwrap();
        assert!(ctl.handle().snapshot().pending_confirmation);

        // chain catches up: balance now reflects the send
        *mock.balance.lock() = balance_with(3, 150_000_000);
        mock.advance_height();
        settle().await;

        let snap = ctl.handle().snapshot();
        assert!(!snap.pending_confirmation);
        assert_eq!(snap.neo_balance, coins(3));
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn claim_with_neo_balance_self_transfers_first() {
        let mock = Arc::new(MockLedger::new());
        *mock.claims.lock() = ClaimBundle {
            available: Fixed8::from_raw(100),
            unavailable: Fixed8::from_raw(50),
            claims: vec![utxo(9, Fixed8::ZERO)],
        };
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let claimer = Arc::clone(&ctl);
        let task = tokio::spawn(async move { claimer.claim_gas().await });
        settle().await;

        // self-transfer went out first
        assert_eq!(mock.submitted.lock().len(), 1);
        assert!(mock.submitted.lock()[0].starts_with("8000"));
        assert_eq!(
            ctl.handle().snapshot().claim_progress,
            Some(ClaimProgress {
                unspent_to_clear: true,
                ..ClaimProgress::default()
            })
        );

        // the blocked amount drops once the self-transfer lands
        mock.claims.lock().unavailable = Fixed8::from_raw(10);
        mock.advance_height();
        settle().await;

        // claim transaction follows
        assert_eq!(mock.submitted.lock().len(), 2);
        assert!(mock.submitted.lock()[1].starts_with("0200"));

        // gas arrives, claim confirms
        mock.balance.lock().gas.balance = Fixed8::from_raw(150_000_100);
        mock.advance_height();
        settle().await;

        task.await.unwrap().unwrap();
        let events = drain(&mut rx);
        let pos = |needle: &SessionEvent| events.iter().position(|e| e == needle).unwrap();
        assert!(pos(&SessionEvent::UnspentClaimToClear) < pos(&SessionEvent::SelfTransferCleared));
        assert!(pos(&SessionEvent::SelfTransferCleared) < pos(&SessionEvent::ClaimSubmitted));
        assert!(pos(&SessionEvent::ClaimSubmitted) < pos(&SessionEvent::ClaimConfirmed));
        assert!(ctl.handle().snapshot().claim_progress.is_none());
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn claim_without_neo_skips_self_transfer() {
        let mock = Arc::new(MockLedger::new());
        *mock.balance.lock() = balance_with(0, 150_000_000);
        *mock.claims.lock() = ClaimBundle {
            available: Fixed8::from_raw(100),
            unavailable: Fixed8::ZERO,
            claims: vec![utxo(9, Fixed8::ZERO)],
        };
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let claimer = Arc::clone(&ctl);
        let task = tokio::spawn(async move { claimer.claim_gas().await });
        settle().await;

        // straight to the claim transaction, no self-transfer
        assert_eq!(mock.submitted.lock().len(), 1);
        assert!(mock.submitted.lock()[0].starts_with("0200"));

        mock.balance.lock().gas.balance = Fixed8::from_raw(150_000_100);
        mock.advance_height();
        settle().await;

        task.await.unwrap().unwrap();
        let events = drain(&mut rx);
        assert!(!events.contains(&SessionEvent::UnspentClaimToClear));
        assert!(events.contains(&SessionEvent::ClaimConfirmed));
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_claim_keeps_session_usable() {
        let mock = Arc::new(MockLedger::new());
        *mock.balance.lock() = balance_with(0, 150_000_000);
        *mock.claims.lock() = ClaimBundle {
            available: Fixed8::from_raw(100),
            unavailable: Fixed8::ZERO,
            claims: vec![utxo(9, Fixed8::ZERO)],
        };
        mock.accept_submit.store(false, Ordering::SeqCst);
        let ctl = controller(&mock);
        let mut rx = ctl.subscribe();
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let err = ctl.claim_gas().await.unwrap_err();
        assert_eq!(err, SessionError::ClaimFailed);
        assert!(drain(&mut rx).contains(&SessionEvent::ClaimFailed));

        let snap = ctl.handle().snapshot();
        assert!(snap.logged_in);
        assert!(snap.claim_progress.is_none());
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn claim_with_nothing_to_claim_is_an_error() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        settle().await;

        let err = ctl.claim_gas().await.unwrap_err();
        assert_eq!(err, SessionError::NothingToClaim);
        assert!(ctl.handle().snapshot().claim_progress.is_none());
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn token_transfer_submits_invocation() {
        let mock = Arc::new(MockLedger::new());
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();

        let token = quill_core::ScriptHash([0x42; 20]);
        let other = Account::generate().address().to_string();
        ctl.send_token(&token, &other, Fixed8::from_raw(500))
            .await
            .unwrap();

        assert_eq!(mock.submitted.lock().len(), 1);
        assert!(mock.submitted.lock()[0].starts_with("d100"));
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn token_balance_decodes_stack_value() {
        let mock = Arc::new(MockLedger::new());
        // 500 raw units, little-endian hex
        *mock.invoke_result.lock() =
            serde_json::json!({"stack": [{"type": "ByteArray", "value": "f401"}]});
        let ctl = controller(&mock);
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();

        let token = quill_core::ScriptHash([0x42; 20]);
        let balance = ctl.token_balance(&token).await.unwrap();
        assert_eq!(balance, Fixed8::from_raw(500));

        *mock.invoke_result.lock() =
            serde_json::json!({"stack": [{"type": "ByteArray", "value": ""}]});
        assert_eq!(ctl.token_balance(&token).await.unwrap(), Fixed8::ZERO);

        *mock.invoke_result.lock() = serde_json::json!({"stack": []});
        assert_eq!(
            ctl.token_balance(&token).await.unwrap_err(),
            SessionError::MalformedResponse
        );
        ctl.logout().await;
    }

    #[tokio::test(start_paused = true)]
    async fn network_switch_preempts_sync_delay() {
        let mock = Arc::new(MockLedger::new());
        let ctl = Arc::new(SessionController::new(
            Arc::clone(&mock),
            Network::TestNet,
            SessionConfig {
                sync_interval: Duration::from_secs(3600),
                kdf_params: test_config().kdf_params,
            },
        ));
        let mut rx = ctl.subscribe();
        ctl.login(Credentials::Wif(VECTOR_WIF.into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*mock.last_network.lock(), Some(Network::TestNet));

        ctl.set_network(Network::MainNet);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // resynced immediately on the new network, hours before the timer
        assert_eq!(mock.balance_calls.load(Ordering::SeqCst), 2);
        assert_eq!(*mock.last_network.lock(), Some(Network::MainNet));
        assert!(drain(&mut rx).contains(&SessionEvent::NetworkChanged(Network::MainNet)));
        assert_eq!(ctl.handle().snapshot().network, Network::MainNet);
        ctl.logout().await;
    }
}
