//! Session key material derived from the two key/value stores.
//!
//! Lookups populate the in-memory cache lazily; the `clear_*` family drops it
//! again (and the backing store entries unless `memory_only`).

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::CryptoFunctions;
use crate::enc_string::EncString;
use crate::error::CryptoError;
use crate::keys::{KeyPair, SymmetricKey};
use crate::storage::{load_as, StorageService};

/// Secure store: base64 user key.
pub const KEY: &str = "key";
/// General store: user-key-encrypted enc key.
pub const ENC_KEY: &str = "encKey";
/// General store: enc-key-encrypted X25519 secret.
pub const ENC_PRIVATE_KEY: &str = "encPrivateKey";
/// General store: object of organization id to sealed org key.
pub const ENC_ORG_KEYS: &str = "encOrgKeys";

#[derive(Default)]
struct SessionKeys {
    key: Option<SymmetricKey>,
    enc_key: Option<SymmetricKey>,
    key_pair: Option<KeyPair>,
    org_keys: Option<HashMap<String, SymmetricKey>>,
}

pub struct CryptoService {
    storage: Arc<dyn StorageService>,
    secure_storage: Arc<dyn StorageService>,
    functions: Arc<dyn CryptoFunctions>,
    session: RwLock<SessionKeys>,
}

impl CryptoService {
    pub fn new(
        storage: Arc<dyn StorageService>,
        secure_storage: Arc<dyn StorageService>,
        functions: Arc<dyn CryptoFunctions>,
    ) -> Self {
        Self {
            storage,
            secure_storage,
            functions,
            session: RwLock::new(SessionKeys::default()),
        }
    }

    pub fn functions(&self) -> &dyn CryptoFunctions {
        self.functions.as_ref()
    }

    // ── setters ─────────────────────────────────────────────────────────

    pub async fn set_key(&self, key: SymmetricKey) -> Result<(), CryptoError> {
        self.secure_storage.save(KEY, Value::String(key.to_b64()))?;
        self.session.write().key = Some(key);
        Ok(())
    }

    pub async fn set_enc_key(&self, enc_key: &EncString) -> Result<(), CryptoError> {
        self.storage.save(ENC_KEY, Value::String(enc_key.to_string()))?;
        self.session.write().enc_key = None;
        Ok(())
    }

    pub async fn set_enc_private_key(&self, enc_private_key: &EncString) -> Result<(), CryptoError> {
        self.storage
            .save(ENC_PRIVATE_KEY, Value::String(enc_private_key.to_string()))?;
        self.session.write().key_pair = None;
        Ok(())
    }

    pub async fn set_org_keys(&self, org_keys: &HashMap<String, EncString>) -> Result<(), CryptoError> {
        self.storage.save(ENC_ORG_KEYS, serde_json::to_value(org_keys)?)?;
        self.session.write().org_keys = None;
        Ok(())
    }

    // ── getters ─────────────────────────────────────────────────────────

    pub async fn get_key(&self) -> Result<Option<SymmetricKey>, CryptoError> {
        let cached = self.session.read().key.clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let stored: Option<Zeroizing<String>> =
            load_as::<String>(self.secure_storage.as_ref(), KEY)?.map(Zeroizing::new);
        let Some(encoded) = stored else {
            return Ok(None);
        };
        let key = SymmetricKey::from_b64(&encoded)?;
        self.session.write().key = Some(key.clone());
        Ok(Some(key))
    }

    pub async fn has_key(&self) -> Result<bool, CryptoError> {
        Ok(self.get_key().await?.is_some())
    }

    /// Accounts without a stored enc key use the user key directly.
    pub async fn get_enc_key(&self) -> Result<Option<SymmetricKey>, CryptoError> {
        let cached = self.session.read().enc_key.clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let Some(key) = self.get_key().await? else {
            return Ok(None);
        };
        let enc_key = match load_as::<EncString>(self.storage.as_ref(), ENC_KEY)? {
            Some(wrapped) => SymmetricKey::from_bytes(&wrapped.decrypt(self.functions(), &key)?)?,
            None => {
                debug!("no stored enc key, falling back to user key");
                key
            }
        };
        self.session.write().enc_key = Some(enc_key.clone());
        Ok(Some(enc_key))
    }

    pub async fn get_key_pair(&self) -> Result<Option<KeyPair>, CryptoError> {
        let cached = self.session.read().key_pair.clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let Some(wrapped) = load_as::<EncString>(self.storage.as_ref(), ENC_PRIVATE_KEY)? else {
            return Ok(None);
        };
        let enc_key = self
            .get_enc_key()
            .await?
            .ok_or_else(|| CryptoError::MissingKey("encryption key".into()))?;
        let secret = wrapped.decrypt(self.functions(), &enc_key)?;
        let pair = KeyPair::from_secret(self.functions(), &secret)?;
        self.session.write().key_pair = Some(pair.clone());
        Ok(Some(pair))
    }

    pub async fn get_org_keys(&self) -> Result<Option<HashMap<String, SymmetricKey>>, CryptoError> {
        let cached = self.session.read().org_keys.clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let Some(sealed) =
            load_as::<HashMap<String, EncString>>(self.storage.as_ref(), ENC_ORG_KEYS)?
        else {
            return Ok(None);
        };
        let pair = self
            .get_key_pair()
            .await?
            .ok_or_else(|| CryptoError::MissingKey("private key".into()))?;
        let mut org_keys = HashMap::with_capacity(sealed.len());
        for (org_id, enc) in sealed {
            let bytes = enc.open(self.functions(), &pair)?;
            org_keys.insert(org_id, SymmetricKey::from_bytes(&bytes)?);
        }
        debug!(count = org_keys.len(), "organization keys loaded");
        self.session.write().org_keys = Some(org_keys.clone());
        Ok(Some(org_keys))
    }

    pub async fn get_org_key(&self, org_id: &str) -> Result<Option<SymmetricKey>, CryptoError> {
        Ok(self
            .get_org_keys()
            .await?
            .and_then(|mut keys| keys.remove(org_id)))
    }

    /// Organization key for organization-owned records, the enc key otherwise.
    pub async fn get_key_for_record(&self, org_id: Option<&str>) -> Result<SymmetricKey, CryptoError> {
        match org_id {
            Some(id) => self
                .get_org_key(id)
                .await?
                .ok_or_else(|| CryptoError::MissingKey(format!("organization key {id}"))),
            None => self
                .get_enc_key()
                .await?
                .ok_or_else(|| CryptoError::MissingKey("encryption key".into())),
        }
    }

    // ── encrypt / decrypt ───────────────────────────────────────────────

    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        key: Option<&SymmetricKey>,
    ) -> Result<EncString, CryptoError> {
        match key {
            Some(key) => EncString::encrypt(self.functions(), plaintext, key),
            None => {
                let enc_key = self
                    .get_enc_key()
                    .await?
                    .ok_or_else(|| CryptoError::MissingKey("encryption key".into()))?;
                EncString::encrypt(self.functions(), plaintext, &enc_key)
            }
        }
    }

    /// Seals `plaintext` to an X25519 public key (organization key sharing).
    pub async fn seal_for(
        &self,
        plaintext: &[u8],
        public: &[u8; crate::crypto::KEY_LEN],
    ) -> Result<EncString, CryptoError> {
        EncString::seal(self.functions(), plaintext, public)
    }

    pub async fn decrypt_to_bytes(
        &self,
        enc: &EncString,
        key: &SymmetricKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        enc.decrypt(self.functions(), key)
    }

    pub async fn decrypt_to_utf8(&self, enc: &EncString, key: &SymmetricKey) -> Result<String, CryptoError> {
        let bytes = self.decrypt_to_bytes(enc, key).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CryptoError::Utf8)
    }

    // ── invalidation ────────────────────────────────────────────────────

    pub async fn clear_key(&self) -> Result<(), CryptoError> {
        self.session.write().key = None;
        self.secure_storage.remove(KEY)
    }

    pub async fn clear_enc_key(&self, memory_only: bool) -> Result<(), CryptoError> {
        self.session.write().enc_key = None;
        if memory_only {
            return Ok(());
        }
        self.storage.remove(ENC_KEY)
    }

    pub async fn clear_key_pair(&self, memory_only: bool) -> Result<(), CryptoError> {
        self.session.write().key_pair = None;
        if memory_only {
            return Ok(());
        }
        self.storage.remove(ENC_PRIVATE_KEY)
    }

    pub async fn clear_org_keys(&self, memory_only: bool) -> Result<(), CryptoError> {
        self.session.write().org_keys = None;
        if memory_only {
            return Ok(());
        }
        self.storage.remove(ENC_ORG_KEYS)
    }

    /// Runs all four purges together; the first failure fails the whole clear.
    pub async fn clear_cache(&self) -> Result<(), CryptoError> {
        tokio::try_join!(
            self.clear_key(),
            self.clear_org_keys(false),
            self.clear_key_pair(false),
            self.clear_enc_key(false),
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService").finish_non_exhaustive()
    }
}
