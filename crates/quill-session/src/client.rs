//! Ledger access: the query/submit contract and its HTTP implementation.
//!
//! Reads go through a per-network REST query service; writes and script
//! evaluation go through JSON-RPC against the best node that service
//! advertises. Everything the session layer needs from the outside world
//! is behind [`LedgerClient`] so tests can substitute their own ledger.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use quill_core::{Fixed8, Network, TxHash, Utxo};

use crate::error::SessionError;

/// Price ticker endpoint (USD market for the governance token).
const TICKER_URL: &str = "https://bittrex.com/api/v1.1/public/getticker?market=USDT-NEO";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Balance and spendable outputs for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBalance {
    pub balance: Fixed8,
    pub unspent: Vec<Utxo>,
}

/// Both native asset balances for an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBalance {
    pub neo: AssetBalance,
    pub gas: AssetBalance,
}

/// One confirmed transaction touching the address.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRecord {
    pub txid: TxHash,
    pub neo: Fixed8,
    pub gas: Fixed8,
    pub block_index: u64,
}

/// Claimable reward amounts plus the spent outputs backing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimBundle {
    /// Ready to claim now.
    pub available: Fixed8,
    /// Accrued but blocked behind still-unspent outputs.
    pub unavailable: Fixed8,
    /// References for the claim transaction.
    pub claims: Vec<Utxo>,
}

/// Everything the session needs from the chain.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current chain height.
    async fn block_height(&self, network: Network) -> Result<u64, SessionError>;

    /// Balances and unspent outputs for an address.
    async fn balance(&self, network: Network, address: &str)
        -> Result<AddressBalance, SessionError>;

    /// Confirmed transaction history for an address.
    async fn transaction_history(
        &self,
        network: Network,
        address: &str,
    ) -> Result<Vec<TxRecord>, SessionError>;

    /// Claimable reward amounts for an address.
    async fn claims(&self, network: Network, address: &str) -> Result<ClaimBundle, SessionError>;

    /// Latest USD market price of the governance token.
    async fn market_price(&self, network: Network) -> Result<f64, SessionError>;

    /// Broadcast a signed transaction. `Ok(false)` means the node parsed
    /// the request but rejected the transaction.
    async fn submit_transaction(&self, network: Network, hex: &str)
        -> Result<bool, SessionError>;

    /// Evaluate a script without committing it to the chain.
    async fn invoke_script(&self, network: Network, hex: &str) -> Result<Value, SessionError>;
}

/// [`LedgerClient`] over the public REST query service plus node JSON-RPC.
pub struct HttpLedgerClient {
    client: Client,
}

impl HttpLedgerClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn get_json(&self, url: &str, host: &str) -> Result<Value, SessionError> {
        let failed = || SessionError::RequestFailed {
            host: host.to_string(),
        };
        self.client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|_| failed())?
            .json()
            .await
            .map_err(|_| failed())
    }

    /// Node advertised as healthiest by the query service.
    async fn best_node(&self, network: Network) -> Result<String, SessionError> {
        let base = network.rest_base_url();
        let body = self.get_json(&format!("{base}/v2/network/best_node"), base).await?;
        Ok(body
            .get("node")
            .and_then(Value::as_str)
            .ok_or(SessionError::MalformedResponse)?
            .to_string())
    }

    async fn rpc_call(
        &self,
        network: Network,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        let node = self.best_node(network).await?;
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 4
        });
        let failed = || SessionError::RequestFailed { host: node.clone() };
        let resp: Value = self
            .client
            .post(&node)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|_| failed())?
            .json()
            .await
            .map_err(|_| failed())?;
        resp.get("result")
            .cloned()
            .ok_or(SessionError::MalformedResponse)
    }
}

impl Default for HttpLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn block_height(&self, network: Network) -> Result<u64, SessionError> {
        let base = network.rest_base_url();
        let body = self.get_json(&format!("{base}/v2/block/height"), base).await?;
        parse_block_height(&body)
    }

    async fn balance(
        &self,
        network: Network,
        address: &str,
    ) -> Result<AddressBalance, SessionError> {
        let base = network.rest_base_url();
        let body = self
            .get_json(&format!("{base}/v2/address/balance/{address}"), base)
            .await?;
        parse_balance(&body)
    }

    async fn transaction_history(
        &self,
        network: Network,
        address: &str,
    ) -> Result<Vec<TxRecord>, SessionError> {
        let base = network.rest_base_url();
        let body = self
            .get_json(&format!("{base}/v2/address/history/{address}"), base)
            .await?;
        parse_history(&body)
    }

    async fn claims(&self, network: Network, address: &str) -> Result<ClaimBundle, SessionError> {
        let base = network.rest_base_url();
        let body = self
            .get_json(&format!("{base}/v2/address/claims/{address}"), base)
            .await?;
        parse_claims(&body)
    }

    async fn market_price(&self, _network: Network) -> Result<f64, SessionError> {
        let body = self.get_json(TICKER_URL, "bittrex.com").await?;
        body.pointer("/result/Last")
            .and_then(Value::as_f64)
            .ok_or(SessionError::MalformedResponse)
    }

    async fn submit_transaction(
        &self,
        network: Network,
        hex: &str,
    ) -> Result<bool, SessionError> {
        let result = self
            .rpc_call(network, "sendrawtransaction", json!([hex]))
            .await?;
        result.as_bool().ok_or(SessionError::MalformedResponse)
    }

    async fn invoke_script(&self, network: Network, hex: &str) -> Result<Value, SessionError> {
        self.rpc_call(network, "invokescript", json!([hex])).await
    }
}

fn parse_block_height(body: &Value) -> Result<u64, SessionError> {
    body.get("block_height")
        .and_then(Value::as_u64)
        .ok_or(SessionError::MalformedResponse)
}

fn parse_asset_balance(entry: &Value) -> Result<AssetBalance, SessionError> {
    let balance = entry
        .get("balance")
        .and_then(Value::as_f64)
        .ok_or(SessionError::MalformedResponse)?;
    let unspent_entries = entry
        .get("unspent")
        .and_then(Value::as_array)
        .ok_or(SessionError::MalformedResponse)?;
    let mut unspent = Vec::with_capacity(unspent_entries.len());
    for u in unspent_entries {
        unspent.push(parse_utxo(u)?);
    }
    Ok(AssetBalance {
        balance: Fixed8::from_f64(balance).map_err(|_| SessionError::MalformedResponse)?,
        unspent,
    })
}

fn parse_utxo(entry: &Value) -> Result<Utxo, SessionError> {
    let txid = entry
        .get("txid")
        .and_then(Value::as_str)
        .and_then(|s| TxHash::from_hex(s).ok())
        .ok_or(SessionError::MalformedResponse)?;
    let index = entry
        .get("index")
        .and_then(Value::as_u64)
        .filter(|i| *i <= u16::MAX as u64)
        .ok_or(SessionError::MalformedResponse)? as u16;
    // the claims feed omits output values; references only need txid + index
    let value = match entry.get("value").and_then(Value::as_f64) {
        Some(v) => Fixed8::from_f64(v).map_err(|_| SessionError::MalformedResponse)?,
        None => Fixed8::ZERO,
    };
    Ok(Utxo { txid, index, value })
}

fn parse_balance(body: &Value) -> Result<AddressBalance, SessionError> {
    let neo = body.get("NEO").ok_or(SessionError::MalformedResponse)?;
    let gas = body.get("GAS").ok_or(SessionError::MalformedResponse)?;
    Ok(AddressBalance {
        neo: parse_asset_balance(neo)?,
        gas: parse_asset_balance(gas)?,
    })
}

fn parse_history(body: &Value) -> Result<Vec<TxRecord>, SessionError> {
    let entries = body
        .get("history")
        .and_then(Value::as_array)
        .ok_or(SessionError::MalformedResponse)?;
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let txid = entry
            .get("txid")
            .and_then(Value::as_str)
            .and_then(|s| TxHash::from_hex(s).ok())
            .ok_or(SessionError::MalformedResponse)?;
        let neo = entry
            .get("NEO")
            .and_then(Value::as_f64)
            .ok_or(SessionError::MalformedResponse)?;
        let gas = entry
            .get("GAS")
            .and_then(Value::as_f64)
            .ok_or(SessionError::MalformedResponse)?;
        let block_index = entry
            .get("block_index")
            .and_then(Value::as_u64)
            .ok_or(SessionError::MalformedResponse)?;
        records.push(TxRecord {
            txid,
            neo: Fixed8::from_f64(neo).map_err(|_| SessionError::MalformedResponse)?,
            gas: Fixed8::from_f64(gas).map_err(|_| SessionError::MalformedResponse)?,
            block_index,
        });
    }
    Ok(records)
}

fn parse_claims(body: &Value) -> Result<ClaimBundle, SessionError> {
    let available = body
        .get("total_claim")
        .and_then(Value::as_u64)
        .ok_or(SessionError::MalformedResponse)?;
    let unavailable = body
        .get("total_unspent_claim")
        .and_then(Value::as_u64)
        .ok_or(SessionError::MalformedResponse)?;
    let entries = body
        .get("claims")
        .and_then(Value::as_array)
        .ok_or(SessionError::MalformedResponse)?;
    let mut claims = Vec::with_capacity(entries.len());
    for entry in entries {
        claims.push(parse_utxo(entry)?);
    }
    Ok(ClaimBundle {
        available: Fixed8::from_raw(available),
        unavailable: Fixed8::from_raw(unavailable),
        claims,
    })
}
