//! Private keys, WIF encoding, and address derivation.
//!
//! Keys are secp256r1 scalars. An address is the Base58Check encoding of
//! a version byte plus the RIPEMD160-of-SHA256 hash of the single-signature
//! verification script for the compressed public key.

use std::fmt;

use p256::ecdsa::SigningKey;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use quill_core::constants::{ADDRESS_VERSION, WIF_COMPRESSED_FLAG, WIF_VERSION};
use quill_core::ScriptHash;

use crate::error::WalletError;

/// Opcode: push the next 33 bytes (the public key).
const OP_PUSHBYTES_33: u8 = 0x21;
/// Opcode: check the signature against the pushed public key.
const OP_CHECKSIG: u8 = 0xac;

/// A raw 32-byte secp256r1 private key.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    bytes: [u8; 32],
}

impl PrivateKey {
    /// Generate a random key from the OS cryptographic RNG.
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut rand::rngs::OsRng);
        Self {
            bytes: signing.to_bytes().into(),
        }
    }

    /// Create a key from raw bytes, validating that it is a usable scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, WalletError> {
        SigningKey::from_bytes(&bytes.into()).map_err(|_| WalletError::InvalidKeyFormat)?;
        Ok(Self { bytes })
    }

    /// Create a key from a slice, rejecting wrong lengths before scalar checks.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WalletError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WalletError::InvalidKeyLength(bytes.len()))?;
        Self::from_bytes(arr)
    }

    /// Parse a WIF string (version byte, key, compressed flag, Base58Check).
    pub fn from_wif(wif: &str) -> Result<Self, WalletError> {
        let payload = bs58::decode(wif)
            .with_check(None)
            .into_vec()
            .map_err(|_| WalletError::InvalidKeyFormat)?;
        if payload.len() != 34
            || payload[0] != WIF_VERSION
            || payload[33] != WIF_COMPRESSED_FLAG
        {
            return Err(WalletError::InvalidKeyFormat);
        }
        Self::from_slice(&payload[1..33])
    }

    /// Encode as WIF.
    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(WIF_VERSION);
        payload.extend_from_slice(&self.bytes);
        payload.push(WIF_COMPRESSED_FLAG);
        bs58::encode(payload).with_check().into_string()
    }

    /// Get the raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A private key together with everything derived from it.
#[derive(Clone)]
pub struct Account {
    private_key: PrivateKey,
    public_key: [u8; 33],
    script_hash: ScriptHash,
    address: String,
}

impl Account {
    /// Derive the full account from a private key.
    pub fn from_private_key(private_key: PrivateKey) -> Result<Self, WalletError> {
        let signing = SigningKey::from_bytes(private_key.as_bytes().into())
            .map_err(|_| WalletError::InvalidKeyFormat)?;
        let point = signing.verifying_key().to_encoded_point(true);
        let public_key: [u8; 33] = point
            .as_bytes()
            .try_into()
            .map_err(|_| WalletError::InvalidKeyFormat)?;
        let script_hash = ScriptHash(hash160(&verification_script(&public_key)));
        let address = script_hash_to_address(&script_hash);
        Ok(Self {
            private_key,
            public_key,
            script_hash,
            address,
        })
    }

    /// Generate a fresh random account.
    pub fn generate() -> Self {
        // A freshly generated key is always a valid scalar.
        loop {
            if let Ok(account) = Self::from_private_key(PrivateKey::generate()) {
                return account;
            }
        }
    }

    /// Parse an account from a WIF string.
    pub fn from_wif(wif: &str) -> Result<Self, WalletError> {
        Self::from_private_key(PrivateKey::from_wif(wif)?)
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Compressed SEC1 public key.
    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn script_hash(&self) -> &ScriptHash {
        &self.script_hash
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn wif(&self) -> String {
        self.private_key.to_wif()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("script_hash", &self.script_hash)
            .finish()
    }
}

/// The single-signature verification script for a compressed public key.
pub fn verification_script(public_key: &[u8; 33]) -> Vec<u8> {
    let mut script = Vec::with_capacity(35);
    script.push(OP_PUSHBYTES_33);
    script.extend_from_slice(public_key);
    script.push(OP_CHECKSIG);
    script
}

/// RIPEMD160 of SHA256.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Encode a script hash as an address string.
pub fn script_hash_to_address(hash: &ScriptHash) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(hash.as_bytes());
    bs58::encode(payload).with_check().into_string()
}

/// Decode and validate an address, returning the script hash it wraps.
pub fn address_to_script_hash(address: &str) -> Result<ScriptHash, WalletError> {
    let payload = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| WalletError::InvalidAddress(address.to_string()))?;
    if payload.len() != 21 || payload[0] != ADDRESS_VERSION {
        return Err(WalletError::InvalidAddress(address.to_string()));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok(ScriptHash(hash))
}

/// Whether a string is a well-formed address on this chain.
pub fn is_valid_address(address: &str) -> bool {
    address_to_script_hash(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VECTOR_WIF: &str = "L44B5gGEpqEDRS9vVPz7QT35jcBG2r3CZwSwQ4fCewXAhAhqGVpP";

    #[test]
    fn private_key_debug_hides_bytes() {
        let key = PrivateKey::from_bytes([0xAB; 32]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn private_key_rejects_zero_scalar() {
        assert!(PrivateKey::from_bytes([0u8; 32]).is_err());
    }

    #[test]
    fn private_key_rejects_wrong_length() {
        let err = PrivateKey::from_slice(&[1u8; 31]).unwrap_err();
        assert_eq!(err, WalletError::InvalidKeyLength(31));
    }

    #[test]
    fn wif_round_trip() {
        let key = PrivateKey::from_wif(VECTOR_WIF).unwrap();
        assert_eq!(key.to_wif(), VECTOR_WIF);
    }

    #[test]
    fn wif_rejects_corruption() {
        // flip one character; the checksum must catch it
        let mut s = VECTOR_WIF.to_string();
        s.replace_range(10..11, if &s[10..11] == "a" { "b" } else { "a" });
        assert!(PrivateKey::from_wif(&s).is_err());
        assert!(PrivateKey::from_wif("not a wif").is_err());
        assert!(PrivateKey::from_wif("").is_err());
    }

    #[test]
    fn account_derivation_is_deterministic() {
        let a1 = Account::from_wif(VECTOR_WIF).unwrap();
        let a2 = Account::from_wif(VECTOR_WIF).unwrap();
        assert_eq!(a1.address(), a2.address());
        assert_eq!(a1.public_key(), a2.public_key());
    }

    #[test]
    fn account_address_shape() {
        let account = Account::from_wif(VECTOR_WIF).unwrap();
        assert_eq!(account.address().len(), 34);
        assert!(account.address().starts_with('A'));
        assert_eq!(account.public_key().len(), 33);
        assert!(matches!(account.public_key()[0], 0x02 | 0x03));
    }

    #[test]
    fn verification_script_shape() {
        let account = Account::from_wif(VECTOR_WIF).unwrap();
        let script = verification_script(account.public_key());
        assert_eq!(script.len(), 35);
        assert_eq!(script[0], 0x21);
        assert_eq!(script[34], 0xac);
    }

    #[test]
    fn address_round_trip() {
        let account = Account::from_wif(VECTOR_WIF).unwrap();
        let hash = address_to_script_hash(account.address()).unwrap();
        assert_eq!(&hash, account.script_hash());
        assert_eq!(script_hash_to_address(&hash), account.address());
    }

    #[test]
    fn address_validation_rejects_garbage() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("AStZHy8E6StCqYQbzMqi4poH7YNDHQKxv")); // truncated
        assert!(!is_valid_address("not an address at all"));
        // bitcoin-style version byte fails the version check
        let wrong_version = bs58::encode({
            let mut p = vec![0x00];
            p.extend_from_slice(&[0u8; 20]);
            p
        })
        .with_check()
        .into_string();
        assert!(!is_valid_address(&wrong_version));
    }

    #[test]
    fn generate_produces_distinct_accounts() {
        let a = Account::generate();
        let b = Account::generate();
        assert_ne!(a.address(), b.address());
        assert!(is_valid_address(a.address()));
    }

    proptest! {
        #[test]
        fn script_hash_address_round_trip(bytes in prop::array::uniform20(any::<u8>())) {
            let hash = ScriptHash(bytes);
            let addr = script_hash_to_address(&hash);
            prop_assert_eq!(address_to_script_hash(&addr).unwrap(), hash);
        }
    }
}
