use std::sync::Arc;

use crate::crypto::{CryptoFunctions, RustCryptoFunctions};
use crate::crypto_service::CryptoService;
use crate::storage::{MemoryStorage, StorageService};

/// The worker's services, built once at startup and handed to whatever needs
/// them.
#[derive(Clone)]
pub struct ServiceContainer {
    storage: Arc<dyn StorageService>,
    secure_storage: Arc<dyn StorageService>,
    crypto: Arc<CryptoService>,
}

impl ServiceContainer {
    /// Two fresh in-memory stores and the default primitives.
    pub fn new() -> Self {
        Self::from_parts(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            Arc::new(RustCryptoFunctions::new()),
        )
    }

    pub fn from_parts(
        storage: Arc<dyn StorageService>,
        secure_storage: Arc<dyn StorageService>,
        functions: Arc<dyn CryptoFunctions>,
    ) -> Self {
        let crypto = Arc::new(CryptoService::new(
            Arc::clone(&storage),
            Arc::clone(&secure_storage),
            functions,
        ));
        Self {
            storage,
            secure_storage,
            crypto,
        }
    }

    pub fn storage(&self) -> &dyn StorageService {
        self.storage.as_ref()
    }

    pub fn secure_storage(&self) -> &dyn StorageService {
        self.secure_storage.as_ref()
    }

    pub fn crypto(&self) -> Arc<CryptoService> {
        Arc::clone(&self.crypto)
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer").finish_non_exhaustive()
    }
}
