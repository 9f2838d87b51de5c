use base64::{engine::general_purpose, Engine as _};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{random_array, CryptoFunctions, KEY_LEN};
use crate::error::CryptoError;

pub const SYMMETRIC_KEY_LEN: usize = KEY_LEN * 2;

/// Encryption key followed by MAC key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    enc_key: [u8; KEY_LEN],
    mac_key: [u8; KEY_LEN],
}

impl SymmetricKey {
    pub fn new(enc_key: [u8; KEY_LEN], mac_key: [u8; KEY_LEN]) -> Self {
        Self { enc_key, mac_key }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SYMMETRIC_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "symmetric key must be {SYMMETRIC_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut enc_key = [0u8; KEY_LEN];
        let mut mac_key = [0u8; KEY_LEN];
        enc_key.copy_from_slice(&bytes[..KEY_LEN]);
        mac_key.copy_from_slice(&bytes[KEY_LEN..]);
        Ok(Self { enc_key, mac_key })
    }

    pub fn from_b64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = general_purpose::STANDARD.decode(encoded)?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    pub fn generate(functions: &dyn CryptoFunctions) -> Result<Self, CryptoError> {
        let bytes = random_array::<SYMMETRIC_KEY_LEN>(functions)?;
        Self::from_bytes(&bytes[..])
    }

    pub fn enc_key(&self) -> &[u8; KEY_LEN] {
        &self.enc_key
    }

    pub fn mac_key(&self) -> &[u8; KEY_LEN] {
        &self.mac_key
    }

    pub fn to_bytes(&self) -> zeroize::Zeroizing<Vec<u8>> {
        let mut out = zeroize::Zeroizing::new(Vec::with_capacity(SYMMETRIC_KEY_LEN));
        out.extend_from_slice(&self.enc_key);
        out.extend_from_slice(&self.mac_key);
        out
    }

    pub fn to_b64(&self) -> String {
        general_purpose::STANDARD.encode(self.to_bytes().as_slice())
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// X25519 key pair used to open organization keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    secret: [u8; KEY_LEN],
    #[zeroize(skip)]
    public: [u8; KEY_LEN],
}

impl KeyPair {
    pub fn from_secret(functions: &dyn CryptoFunctions, secret: &[u8]) -> Result<Self, CryptoError> {
        let secret: [u8; KEY_LEN] = secret.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "private key must be {KEY_LEN} bytes, got {}",
                secret.len()
            ))
        })?;
        let public = functions.x25519_public(&secret);
        Ok(Self { secret, public })
    }

    pub fn generate(functions: &dyn CryptoFunctions) -> Result<Self, CryptoError> {
        let secret = random_array::<KEY_LEN>(functions)?;
        Self::from_secret(functions, &secret[..])
    }

    pub fn secret(&self) -> &[u8; KEY_LEN] {
        &self.secret
    }

    pub fn public(&self) -> &[u8; KEY_LEN] {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &general_purpose::STANDARD.encode(self.public))
            .finish_non_exhaustive()
    }
}
