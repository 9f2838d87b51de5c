use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    AeadDecrypt,

    #[error("MAC verification failed")]
    MacMismatch,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid encrypted string: {0}")]
    InvalidEncString(String),

    #[error("Random source returned {got} bytes, expected {expected}")]
    Randomness { expected: usize, got: usize },

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Decrypted value is not valid UTF-8")]
    Utf8,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage value for {key} has the wrong shape: {reason}")]
    StorageShape { key: String, reason: String },

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker construction failed: {0}")]
    Construction(String),

    #[error("decryption of cipher {id} failed: {source}")]
    Decryption {
        id: String,
        #[source]
        source: CryptoError,
    },

    #[error("decrypt task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("cache clear failed: {0}")]
    CacheClear(#[source] CryptoError),

    #[error("worker channel closed")]
    ChannelClosed,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("worker reported an error: {0}")]
    Remote(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;
