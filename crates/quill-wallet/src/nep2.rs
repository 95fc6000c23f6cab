//! Passphrase encryption of private keys (NEP-2 records).
//!
//! A record packs a two-byte header, a flag byte, a four-byte address
//! checksum salt, and 32 bytes of AES-256-ECB ciphertext, all wrapped in
//! Base58Check. The AES key and XOR pad come from scrypt over the
//! NFC-normalized passphrase and the salt.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use scrypt::Params;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroize;

use quill_core::constants::{
    NEP2_FLAG, NEP2_HEADER, SCRYPT_DKLEN, SCRYPT_LOG_N, SCRYPT_P, SCRYPT_R,
};

use crate::error::WalletError;
use crate::keyvault::{Account, PrivateKey};

/// scrypt cost parameters for record encryption.
///
/// Defaults to the protocol parameters; tests that exercise the record
/// format rather than the KDF cost can lower them.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: SCRYPT_LOG_N,
            r: SCRYPT_R,
            p: SCRYPT_P,
        }
    }
}

/// Encrypt a private key under a passphrase, producing a Base58Check record.
pub fn encrypt_key(
    key: &PrivateKey,
    passphrase: &str,
    params: KdfParams,
) -> Result<String, WalletError> {
    let account = Account::from_private_key(key.clone())?;
    let salt = address_salt(account.address());
    let mut derived = derive_key(passphrase, &salt, params)?;
    let (pad, aes_key) = derived.split_at(32);

    let mut xored = [0u8; 32];
    for (i, byte) in key.as_bytes().iter().enumerate() {
        xored[i] = byte ^ pad[i];
    }

    let cipher = Aes256::new(GenericArray::from_slice(aes_key));
    let mut ciphertext = [0u8; 32];
    for chunk in 0..2 {
        let mut block = GenericArray::clone_from_slice(&xored[chunk * 16..(chunk + 1) * 16]);
        cipher.encrypt_block(&mut block);
        ciphertext[chunk * 16..(chunk + 1) * 16].copy_from_slice(&block);
    }
    xored.zeroize();
    derived.zeroize();

    let mut payload = Vec::with_capacity(39);
    payload.extend_from_slice(&NEP2_HEADER);
    payload.push(NEP2_FLAG);
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&ciphertext);
    Ok(bs58::encode(payload).with_check().into_string())
}

/// Decrypt a Base58Check record back into an account.
///
/// Structural problems with the record surface as
/// [`WalletError::InvalidRecordFormat`]; a record that decodes but whose
/// decrypted key does not reproduce the embedded address salt means the
/// passphrase was wrong.
pub fn decrypt_key(
    record: &str,
    passphrase: &str,
    params: KdfParams,
) -> Result<Account, WalletError> {
    let payload = bs58::decode(record)
        .with_check(None)
        .into_vec()
        .map_err(|_| WalletError::InvalidRecordFormat)?;
    if payload.len() != 39 || payload[..2] != NEP2_HEADER || payload[2] != NEP2_FLAG {
        return Err(WalletError::InvalidRecordFormat);
    }
    let salt: [u8; 4] = payload[3..7]
        .try_into()
        .map_err(|_| WalletError::InvalidRecordFormat)?;
    let ciphertext = &payload[7..39];

    let mut derived = derive_key(passphrase, &salt, params)?;
    let (pad, aes_key) = derived.split_at(32);

    let cipher = Aes256::new(GenericArray::from_slice(aes_key));
    let mut xored = [0u8; 32];
    for chunk in 0..2 {
        let mut block = GenericArray::clone_from_slice(&ciphertext[chunk * 16..(chunk + 1) * 16]);
        cipher.decrypt_block(&mut block);
        xored[chunk * 16..(chunk + 1) * 16].copy_from_slice(&block);
    }

    let mut key_bytes = [0u8; 32];
    for i in 0..32 {
        key_bytes[i] = xored[i] ^ pad[i];
    }
    xored.zeroize();
    derived.zeroize();

    // A wrong passphrase decrypts to garbage; it either fails the scalar
    // check or derives an address whose salt does not match the record.
    let key = PrivateKey::from_bytes(key_bytes).map_err(|_| WalletError::WrongPassphrase)?;
    key_bytes.zeroize();
    let account = Account::from_private_key(key)?;
    if address_salt(account.address()) != salt {
        return Err(WalletError::WrongPassphrase);
    }
    Ok(account)
}

/// Generate a fresh account already encrypted under `passphrase`.
///
/// Returns the account alongside its encrypted record, the usual
/// starting point for a new wallet.
pub fn generate_encrypted(
    passphrase: &str,
    params: KdfParams,
) -> Result<(Account, String), WalletError> {
    let account = Account::generate();
    let record = encrypt_key(account.private_key(), passphrase, params)?;
    Ok((account, record))
}

/// First four bytes of the double SHA256 of the address ASCII bytes.
fn address_salt(address: &str) -> [u8; 4] {
    let first = Sha256::digest(address.as_bytes());
    let second = Sha256::digest(first);
    let mut salt = [0u8; 4];
    salt.copy_from_slice(&second[..4]);
    salt
}

/// scrypt over the NFC-normalized passphrase.
fn derive_key(
    passphrase: &str,
    salt: &[u8; 4],
    params: KdfParams,
) -> Result<[u8; SCRYPT_DKLEN], WalletError> {
    let normalized: String = passphrase.nfc().collect();
    let scrypt_params = Params::new(params.log_n, params.r, params.p, SCRYPT_DKLEN)
        .map_err(|_| WalletError::KdfFailure)?;
    let mut out = [0u8; SCRYPT_DKLEN];
    scrypt::scrypt(normalized.as_bytes(), salt, &scrypt_params, &mut out)
        .map_err(|_| WalletError::KdfFailure)?;
    Ok(out)
}
