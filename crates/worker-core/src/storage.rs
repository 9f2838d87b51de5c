use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::CryptoError;

/// Key/value state the crypto service reads its material from.
pub trait StorageService: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn save(&self, key: &str, value: Value) -> Result<(), CryptoError>;
    fn remove(&self, key: &str) -> Result<(), CryptoError>;

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-process store. Nothing is written anywhere; dropping it drops the state.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageService for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn save(&self, key: &str, value: Value) -> Result<(), CryptoError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CryptoError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Copies every member of a snapshot object into `store`. Returns how many
/// entries were copied.
pub fn seed(store: &dyn StorageService, snapshot: &Map<String, Value>) -> Result<usize, CryptoError> {
    for (key, value) in snapshot {
        store.save(key, value.clone())?;
    }
    Ok(snapshot.len())
}

/// Reads `key` and deserializes it; `Ok(None)` when absent or `null`.
pub fn load_as<T: DeserializeOwned>(
    storage: &dyn StorageService,
    key: &str,
) -> Result<Option<T>, CryptoError> {
    match storage.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CryptoError::StorageShape {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
