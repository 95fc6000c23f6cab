//! Hash, amount, asset, and network types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{COIN, GAS_ASSET_ID, NEO_ASSET_ID};
use crate::error::CoreError;

/// A 256-bit transaction or asset hash.
///
/// Stored in canonical (display) byte order. The ledger's wire format
/// serializes hashes reversed; [`TxHash::reversed`] produces that order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Parse from 64 hex characters in canonical order.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let raw = hex::decode(s).map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        Ok(TxHash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Bytes in wire order (canonical order reversed).
    pub fn reversed(&self) -> [u8; 32] {
        let mut out = self.0;
        out.reverse();
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for TxHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TxHash::from_hex(s)
    }
}

impl TryFrom<String> for TxHash {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        TxHash::from_hex(&s)
    }
}

impl From<TxHash> for String {
    fn from(h: TxHash) -> String {
        h.to_hex()
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

/// A 160-bit script hash, the on-chain identity behind an address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptHash(pub [u8; 20]);

impl ScriptHash {
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let raw = hex::decode(s).map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        let bytes: [u8; 20] = raw
            .try_into()
            .map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        Ok(ScriptHash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Bytes in wire order (reversed), used when a script embeds a contract hash.
    pub fn reversed(&self) -> [u8; 20] {
        let mut out = self.0;
        out.reverse();
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptHash({})", self.to_hex())
    }
}

/// A fixed-point amount with 8 decimal places, stored as raw integer units.
///
/// All arithmetic is checked; overflow and underflow surface as
/// [`CoreError::AmountOverflow`] and [`CoreError::AmountUnderflow`]
/// instead of wrapping.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fixed8(u64);

impl Fixed8 {
    pub const ZERO: Fixed8 = Fixed8(0);

    pub fn from_raw(raw: u64) -> Self {
        Fixed8(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Whole coins, no fractional part.
    pub fn from_coins(coins: u64) -> Result<Self, CoreError> {
        coins
            .checked_mul(COIN)
            .map(Fixed8)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Parse a decimal string such as `"1.5"` or `"0.00000001"`.
    ///
    /// More than 8 fractional digits is an error rather than a silent
    /// truncation.
    pub fn from_decimal_str(s: &str) -> Result<Self, CoreError> {
        let bad = || CoreError::InvalidAmount(s.to_string());
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        if frac_part.len() > 8 {
            return Err(bad());
        }
        let int: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };
        let frac: u64 = if frac_part.is_empty() {
            0
        } else {
            let scaled = format!("{frac_part:0<8}");
            scaled.parse().map_err(|_| bad())?
        };
        int.checked_mul(COIN)
            .and_then(|v| v.checked_add(frac))
            .map(Fixed8)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Convert a float amount, rounding to the nearest raw unit.
    ///
    /// Balance feeds report amounts as JSON numbers, so lossless string
    /// parsing is not always available.
    pub fn from_f64(value: f64) -> Result<Self, CoreError> {
        if !value.is_finite() || value < 0.0 {
            return Err(CoreError::InvalidAmount(value.to_string()));
        }
        let raw = (value * COIN as f64).round();
        if raw > u64::MAX as f64 {
            return Err(CoreError::AmountOverflow);
        }
        Ok(Fixed8(raw as u64))
    }

    pub fn checked_add(self, rhs: Fixed8) -> Result<Fixed8, CoreError> {
        self.0
            .checked_add(rhs.0)
            .map(Fixed8)
            .ok_or(CoreError::AmountOverflow)
    }

    pub fn checked_sub(self, rhs: Fixed8) -> Result<Fixed8, CoreError> {
        self.0
            .checked_sub(rhs.0)
            .map(Fixed8)
            .ok_or(CoreError::AmountUnderflow)
    }

    /// Saturating subtraction, for optimistic balance updates where
    /// clamping at zero is the right behavior.
    pub fn saturating_sub(self, rhs: Fixed8) -> Fixed8 {
        Fixed8(self.0.saturating_sub(rhs.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / COIN;
        let frac = self.0 % COIN;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let s = format!("{frac:08}");
            write!(f, "{whole}.{}", s.trim_end_matches('0'))
        }
    }
}

impl fmt::Debug for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed8({self})")
    }
}

impl std::iter::Sum<Fixed8> for Result<Fixed8, CoreError> {
    fn sum<I: Iterator<Item = Fixed8>>(iter: I) -> Self {
        let mut acc = Fixed8::ZERO;
        for v in iter {
            acc = acc.checked_add(v)?;
        }
        Ok(acc)
    }
}

/// The two native assets of the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Asset {
    Neo,
    Gas,
}

impl Asset {
    /// Canonical asset id hash.
    pub fn id(&self) -> TxHash {
        // Both constants are valid 64-char hex, checked in tests.
        let hex = match self {
            Asset::Neo => NEO_ASSET_ID,
            Asset::Gas => GAS_ASSET_ID,
        };
        let mut bytes = [0u8; 32];
        // hex::decode_to_slice cannot fail on these fixed inputs.
        let _ = hex::decode_to_slice(hex, &mut bytes);
        TxHash(bytes)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Neo => "NEO",
            Asset::Gas => "GAS",
        }
    }

    /// NEO is indivisible on chain: amounts must be whole coins.
    pub fn is_divisible(&self) -> bool {
        matches!(self, Asset::Gas)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Which chain a session talks to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Network {
    MainNet,
    TestNet,
}

impl Network {
    /// Base URL of the REST balance/history/claims service for this network.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Network::MainNet => "http://api.wallet.cityofzion.io",
            Network::TestNet => "http://testnet-api.wallet.cityofzion.io",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::MainNet => f.write_str("mainnet"),
            Network::TestNet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::MainNet),
            "testnet" | "test" => Ok(Network::TestNet),
            other => Err(CoreError::UnknownNetwork(other.to_string())),
        }
    }
}

/// An unspent transaction output available for spending.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: TxHash,
    pub index: u16,
    pub value: Fixed8,
}
