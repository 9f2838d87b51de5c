#![allow(dead_code)]

use cipher_worker_core::crypto_service::{ENC_KEY, ENC_ORG_KEYS, ENC_PRIVATE_KEY, KEY};
use cipher_worker_core::models::{CipherType, Login, LoginUri, SecureNote};
use cipher_worker_core::{
    ChannelPort, Cipher, CryptoWorker, EncString, InitPayload, KeyPair, RustCryptoFunctions,
    SymmetricKey, WorkerError, WorkerResponse,
};
use serde_json::{json, Map, Value};

pub const ORG_ID: &str = "org-1";

/// A user with an enc key, a key pair and one organization.
pub struct Account {
    pub functions: RustCryptoFunctions,
    pub user_key: SymmetricKey,
    pub enc_key: SymmetricKey,
    pub key_pair: KeyPair,
    pub org_key: SymmetricKey,
}

impl Account {
    pub fn new() -> Self {
        let functions = RustCryptoFunctions::new();
        Self {
            user_key: SymmetricKey::generate(&functions).unwrap(),
            enc_key: SymmetricKey::generate(&functions).unwrap(),
            key_pair: KeyPair::generate(&functions).unwrap(),
            org_key: SymmetricKey::generate(&functions).unwrap(),
            functions,
        }
    }

    pub fn enc(&self, text: &str) -> EncString {
        EncString::encrypt(&self.functions, text.as_bytes(), &self.enc_key).unwrap()
    }

    pub fn enc_org(&self, text: &str) -> EncString {
        EncString::encrypt(&self.functions, text.as_bytes(), &self.org_key).unwrap()
    }

    pub fn storage(&self) -> Map<String, Value> {
        let enc_key = EncString::encrypt(&self.functions, &self.enc_key.to_bytes(), &self.user_key)
            .unwrap();
        let private_key =
            EncString::encrypt(&self.functions, self.key_pair.secret(), &self.enc_key).unwrap();
        let org_key =
            EncString::seal(&self.functions, &self.org_key.to_bytes(), self.key_pair.public())
                .unwrap();
        let value = json!({
            ENC_KEY: enc_key.to_string(),
            ENC_PRIVATE_KEY: private_key.to_string(),
            ENC_ORG_KEYS: { ORG_ID: org_key.to_string() },
            "lastSync": "2024-01-01T00:00:00Z",
        });
        value.as_object().cloned().unwrap()
    }

    pub fn secure_storage(&self) -> Map<String, Value> {
        json!({ KEY: self.user_key.to_b64() })
            .as_object()
            .cloned()
            .unwrap()
    }

    pub fn login(&self, id: &str, name: &str, username: &str, password: &str) -> Cipher {
        Cipher {
            login: Some(Login {
                username: Some(self.enc(username)),
                password: Some(self.enc(password)),
                totp: None,
                uris: vec![LoginUri {
                    uri: Some(self.enc("https://example.com")),
                }],
            }),
            ..bare(id, CipherType::Login, self.enc(name))
        }
    }

    pub fn org_note(&self, id: &str, name: &str, notes: &str) -> Cipher {
        Cipher {
            organization_id: Some(ORG_ID.into()),
            notes: Some(self.enc_org(notes)),
            secure_note: Some(SecureNote::default()),
            ..bare(id, CipherType::SecureNote, self.enc_org(name))
        }
    }

    /// A record whose name was encrypted under a key the worker never sees.
    pub fn foreign(&self, id: &str) -> Cipher {
        let stranger = SymmetricKey::generate(&self.functions).unwrap();
        let name = EncString::encrypt(&self.functions, b"nope", &stranger).unwrap();
        bare(id, CipherType::SecureNote, name)
    }

    pub fn logins(&self, count: usize) -> Vec<Cipher> {
        (0..count)
            .map(|i| self.login(&format!("c{i}"), &format!("Site {i}"), "alice", "hunter2"))
            .collect()
    }

    pub fn payload(&self, ciphers: &[Cipher]) -> InitPayload {
        InitPayload::new(ciphers, Some(&self.storage()), Some(&self.secure_storage())).unwrap()
    }
}

pub fn bare(id: &str, cipher_type: CipherType, name: EncString) -> Cipher {
    Cipher {
        id: id.into(),
        organization_id: None,
        folder_id: None,
        cipher_type,
        name,
        notes: None,
        favorite: false,
        revision_date: None,
        login: None,
        secure_note: None,
        card: None,
        fields: Vec::new(),
    }
}

pub fn message(value: Value) -> String {
    value.to_string()
}

/// Feeds `messages` to the worker, closes the channel and collects every
/// response it posted before stopping.
pub async fn exchange(
    worker: CryptoWorker,
    messages: Vec<String>,
) -> (Result<(), WorkerError>, Vec<WorkerResponse>) {
    let (mut port, requests, mut responses) = ChannelPort::pair(messages.len().max(1) + 8);
    for raw in messages {
        requests.send(raw).await.unwrap();
    }
    drop(requests);
    let result = worker.run(&mut port).await;
    drop(port);
    let mut posted = Vec::new();
    while let Some(response) = responses.recv().await {
        posted.push(response);
    }
    (result, posted)
}
