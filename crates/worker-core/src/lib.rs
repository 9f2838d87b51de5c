pub mod client;
pub mod config;
pub mod crypto;
pub mod crypto_service;
pub mod enc_string;
pub mod error;
pub mod keys;
pub mod models;
pub mod protocol;
pub mod services;
pub mod storage;
pub mod transport;
pub mod worker;

pub use client::WorkerHandle;
pub use config::WorkerConfig;
pub use crypto::{CryptoFunctions, RustCryptoFunctions};
pub use crypto_service::CryptoService;
pub use enc_string::EncString;
pub use error::{CryptoError, WorkerError};
pub use keys::{KeyPair, SymmetricKey};
pub use models::{Cipher, CipherView, EncryptedRecord};
pub use protocol::{InitPayload, MalformedRequest, WorkerRequest, WorkerResponse};
pub use services::ServiceContainer;
pub use storage::{MemoryStorage, StorageService};
pub use transport::{ChannelPort, MessagePort, StreamPort};
pub use worker::{CryptoWorker, WorkerState};
