//! Low-level primitives consumed by the crypto service.
//!
//! Everything above this module talks to [`CryptoFunctions`] only, so the
//! primitive set can be swapped (or faked in tests) without touching key
//! handling or record decryption.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const MAC_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

pub trait CryptoFunctions: Send + Sync {
    fn aead_encrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    fn aead_decrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; MAC_LEN], CryptoError>;

    /// Constant-time tag comparison.
    fn verify_hmac_sha256(&self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<(), CryptoError>;

    fn sha256(&self, data: &[u8]) -> [u8; 32];

    fn hkdf_expand(
        &self,
        ikm: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        output: &mut [u8],
    ) -> Result<(), CryptoError>;

    fn x25519_agree(
        &self,
        secret: &[u8; KEY_LEN],
        public: &[u8; KEY_LEN],
    ) -> Zeroizing<[u8; KEY_LEN]>;

    fn x25519_public(&self, secret: &[u8; KEY_LEN]) -> [u8; KEY_LEN];

    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// Fixed-size random buffer; a provider returning the wrong length is an error.
pub fn random_array<const N: usize>(
    functions: &dyn CryptoFunctions,
) -> Result<Zeroizing<[u8; N]>, CryptoError> {
    let bytes = Zeroizing::new(functions.random_bytes(N));
    if bytes.len() != N {
        return Err(CryptoError::Randomness {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut out = Zeroizing::new([0u8; N]);
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// XChaCha20-Poly1305 / HMAC-SHA256 / HKDF-SHA256 / X25519.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoFunctions;

impl RustCryptoFunctions {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoFunctions for RustCryptoFunctions {
    fn aead_encrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
        cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::AeadEncrypt)
    }

    fn aead_decrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let cipher =
            XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AeadDecrypt)?;
        Ok(Zeroizing::new(plaintext))
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; MAC_LEN], CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(format!("mac init: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    fn verify_hmac_sha256(&self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<(), CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(format!("mac init: {e}")))?;
        mac.update(data);
        mac.verify_slice(tag).map_err(|_| CryptoError::MacMismatch)
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn hkdf_expand(
        &self,
        ikm: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        output: &mut [u8],
    ) -> Result<(), CryptoError> {
        let hk = Hkdf::<Sha256>::new(salt, ikm);
        hk.expand(info, output)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
    }

    fn x25519_agree(
        &self,
        secret: &[u8; KEY_LEN],
        public: &[u8; KEY_LEN],
    ) -> Zeroizing<[u8; KEY_LEN]> {
        let secret = StaticSecret::from(*secret);
        let shared = secret.diffie_hellman(&PublicKey::from(*public));
        Zeroizing::new(shared.to_bytes())
    }

    fn x25519_public(&self, secret: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
        let secret = StaticSecret::from(*secret);
        PublicKey::from(&secret).to_bytes()
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        OsRng.fill_bytes(&mut out);
        out
    }
}
