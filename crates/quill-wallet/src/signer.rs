//! Transaction signing.

use p256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use sha2::{Digest, Sha256};

use crate::error::WalletError;
use crate::keyvault::PrivateKey;

/// Sign a transaction payload.
///
/// Signs SHA-256 of the payload with ECDSA over secp256r1, using the
/// RFC 6979 deterministic nonce. The signature is low-S normalised and
/// returned as fixed-width big-endian `r ‖ s`.
pub fn sign(payload: &[u8], key: &PrivateKey) -> Result<[u8; 64], WalletError> {
    let signing = SigningKey::from_bytes(key.as_bytes().into())
        .map_err(|_| WalletError::InvalidKeyFormat)?;
    let digest = Sha256::digest(payload);
    let signature: Signature = signing
        .sign_prehash(&digest)
        .map_err(|_| WalletError::InvalidKeyFormat)?;
    let signature = signature.normalize_s().unwrap_or(signature);
    let mut out = [0u8; 64];
    out.copy_from_slice(&signature.to_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};

    const VECTOR_WIF: &str = "L44B5gGEpqEDRS9vVPz7QT35jcBG2r3CZwSwQ4fCewXAhAhqGVpP";

    #[test]
    fn signing_is_deterministic() {
        let key = PrivateKey::from_wif(VECTOR_WIF).unwrap();
        let s1 = sign(b"payload", &key).unwrap();
        let s2 = sign(b"payload", &key).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn different_payloads_differ() {
        let key = PrivateKey::from_wif(VECTOR_WIF).unwrap();
        assert_ne!(sign(b"a", &key).unwrap(), sign(b"b", &key).unwrap());
    }

    #[test]
    fn signature_verifies_against_pubkey() {
        let key = PrivateKey::from_wif(VECTOR_WIF).unwrap();
        let payload = b"some transaction bytes";
        let sig_bytes = sign(payload, &key).unwrap();

        let signing = SigningKey::from_bytes(key.as_bytes().into()).unwrap();
        let verifying = VerifyingKey::from(&signing);
        let sig = Signature::from_slice(&sig_bytes).unwrap();
        let digest = Sha256::digest(payload);
        verifying.verify_prehash(&digest, &sig).unwrap();
    }

    #[test]
    fn signature_is_low_s() {
        let key = PrivateKey::from_wif(VECTOR_WIF).unwrap();
        for payload in [b"x".as_slice(), b"y", b"z", b"many payloads"] {
            let sig_bytes = sign(payload, &key).unwrap();
            let sig = Signature::from_slice(&sig_bytes).unwrap();
            assert!(sig.normalize_s().is_none(), "s component not normalised");
        }
    }
}
