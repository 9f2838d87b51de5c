mod common;

use cipher_worker_core::crypto_service::KEY;
use cipher_worker_core::models::CipherView;
use cipher_worker_core::{
    CryptoError, CryptoWorker, InitPayload, MemoryStorage, RustCryptoFunctions,
    ServiceContainer, StorageService, StreamPort, WorkerConfig, WorkerError, WorkerRequest,
    WorkerResponse, WorkerState,
};
use common::{exchange, message, Account, ORG_ID};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

fn decrypt_all_with(payload: InitPayload) -> String {
    serde_json::to_string(&WorkerRequest::decrypt_all(Some(payload))).unwrap()
}

fn views_of(response: &WorkerResponse) -> Vec<CipherView> {
    match response {
        WorkerResponse::DecryptAllResponse { ciphers } => ciphers
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect(),
        other => panic!("expected decryptAllResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn every_record_yields_exactly_one_view() {
    let account = Account::new();
    let ciphers = account.logins(25);
    let worker = CryptoWorker::with_payload(WorkerConfig::default(), &account.payload(&ciphers))
        .unwrap();

    let views = worker.decrypt_all().await.unwrap();
    assert_eq!(views.len(), 25);

    let ids: HashSet<String> = views
        .iter()
        .map(|raw| serde_json::from_str::<CipherView>(raw).unwrap().id)
        .collect();
    let expected: HashSet<String> = ciphers.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn views_carry_plaintext() {
    let account = Account::new();
    let ciphers = vec![
        account.login("login-1", "Bank", "alice", "s3cret"),
        account.org_note("note-1", "Shared wifi", "password is on the fridge"),
    ];
    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![decrypt_all_with(account.payload(&ciphers))],
    )
    .await;
    result.unwrap();
    assert_eq!(posted.len(), 1);

    let mut views = views_of(&posted[0]);
    views.sort_by(|a, b| a.id.cmp(&b.id));

    let login = &views[0];
    assert_eq!(login.name, "Bank");
    let login_view = login.login.as_ref().unwrap();
    assert_eq!(login_view.username.as_deref(), Some("alice"));
    assert_eq!(login_view.password.as_deref(), Some("s3cret"));
    assert_eq!(login_view.uris[0].uri.as_deref(), Some("https://example.com"));

    let note = &views[1];
    assert_eq!(note.organization_id.as_deref(), Some(ORG_ID));
    assert_eq!(note.name, "Shared wifi");
    assert_eq!(note.notes.as_deref(), Some("password is on the fridge"));
}

#[tokio::test]
async fn empty_batch_posts_empty_response() {
    let account = Account::new();
    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![decrypt_all_with(account.payload(&[]))],
    )
    .await;
    result.unwrap();
    assert_eq!(
        posted,
        vec![WorkerResponse::DecryptAllResponse { ciphers: vec![] }]
    );
}

#[tokio::test]
async fn one_bad_record_fails_the_whole_batch() {
    let account = Account::new();
    let mut ciphers = account.logins(5);
    ciphers.push(account.foreign("broken"));
    let worker = CryptoWorker::with_payload(WorkerConfig::default(), &account.payload(&ciphers))
        .unwrap();

    match worker.decrypt_all().await {
        Err(WorkerError::Decryption { id, source }) => {
            assert_eq!(id, "broken");
            assert!(matches!(source, CryptoError::MacMismatch));
        }
        other => panic!("expected decryption failure, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_batch_posts_nothing_and_loop_keeps_going() {
    let account = Account::new();
    let mut ciphers = account.logins(3);
    ciphers.insert(1, account.foreign("broken"));
    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![
            decrypt_all_with(account.payload(&ciphers)),
            message(json!({"type": "clearCacheRequest"})),
        ],
    )
    .await;
    result.unwrap();
    assert_eq!(posted, vec![WorkerResponse::ClearCacheResponse]);
}

#[tokio::test]
async fn failures_are_reported_when_enabled() {
    let account = Account::new();
    let config = WorkerConfig {
        report_errors: true,
        ..WorkerConfig::default()
    };
    let (result, posted) = exchange(
        CryptoWorker::new(config),
        vec![decrypt_all_with(account.payload(&[account.foreign("broken")]))],
    )
    .await;
    result.unwrap();
    match posted.as_slice() {
        [WorkerResponse::ErrorResponse { request, message }] => {
            assert_eq!(request, "decryptAllRequest");
            assert!(message.contains("broken"));
        }
        other => panic!("expected one errorResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_messages_are_ignored() {
    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![
            message(json!({"type": "pingRequest"})),
            message(json!({"ciphers": "[]"})),
            message(json!("decryptAllRequest")),
            "{{{".to_string(),
            message(json!({"type": "clearCacheRequest"})),
        ],
    )
    .await;
    result.unwrap();
    assert_eq!(posted, vec![WorkerResponse::ClearCacheResponse]);
}

#[tokio::test]
async fn clear_cache_before_decrypt_all() {
    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![message(json!({"type": "clearCacheRequest"}))],
    )
    .await;
    result.unwrap();
    assert_eq!(posted, vec![WorkerResponse::ClearCacheResponse]);
}

#[tokio::test]
async fn clear_cache_drops_key_material() {
    let account = Account::new();
    let mut worker = CryptoWorker::with_payload(
        WorkerConfig::default(),
        &account.payload(&account.logins(2)),
    )
    .unwrap();
    let crypto = worker.services().crypto();
    assert!(crypto.has_key().await.unwrap());

    let response = worker
        .handle_message(r#"{"type":"clearCacheRequest"}"#)
        .await
        .unwrap();
    assert_eq!(response, Some(WorkerResponse::ClearCacheResponse));
    assert!(worker.services().secure_storage().get(KEY).is_none());
    assert!(!crypto.has_key().await.unwrap());

    // the batch can no longer be opened
    assert!(matches!(
        worker.decrypt_all().await,
        Err(WorkerError::Decryption { .. })
    ));
}

/// General store that refuses deletes.
struct ReadOnlyStore(MemoryStorage);

impl StorageService for ReadOnlyStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }

    fn save(&self, key: &str, value: Value) -> Result<(), CryptoError> {
        self.0.save(key, value)
    }

    fn remove(&self, _key: &str) -> Result<(), CryptoError> {
        Err(CryptoError::Storage("store is read-only".into()))
    }
}

#[tokio::test]
async fn failed_cache_clear_posts_nothing() {
    let services = ServiceContainer::from_parts(
        Arc::new(ReadOnlyStore(MemoryStorage::new())),
        Arc::new(MemoryStorage::new()),
        Arc::new(RustCryptoFunctions::new()),
    );
    let worker = CryptoWorker::with_services(WorkerConfig::default(), services);
    assert!(matches!(
        worker.clear_cache().await,
        Err(WorkerError::CacheClear(CryptoError::Storage(_)))
    ));

    let (result, posted) = exchange(
        worker,
        vec![message(json!({"type": "clearCacheRequest"}))],
    )
    .await;
    result.unwrap();
    assert!(posted.is_empty());
}

#[tokio::test]
async fn malformed_payload_stops_the_worker() {
    let config = WorkerConfig {
        report_errors: true,
        ..WorkerConfig::default()
    };
    let (result, posted) = exchange(
        CryptoWorker::new(config),
        vec![
            message(json!({"type": "decryptAllRequest", "ciphers": "[{\"id\":", "storage": "null"})),
            message(json!({"type": "clearCacheRequest"})),
        ],
    )
    .await;
    assert!(matches!(result, Err(WorkerError::Construction(_))));
    // the clear request is never reached
    assert!(matches!(
        posted.as_slice(),
        [WorkerResponse::ErrorResponse { .. }]
    ));
}

#[tokio::test]
async fn snapshot_of_wrong_shape_is_a_construction_error() {
    let payload = InitPayload {
        ciphers: "[]".into(),
        storage: Some("\"just a string\"".into()),
        secure_storage: None,
    };
    let err = CryptoWorker::with_payload(WorkerConfig::default(), &payload).unwrap_err();
    assert!(matches!(err, WorkerError::Construction(_)));
}

#[tokio::test]
async fn stores_are_seeded_independently() {
    let payload = InitPayload {
        ciphers: "[]".into(),
        storage: Some(r#"{"a":1,"b":2}"#.into()),
        secure_storage: Some(r#"{"k":"secret"}"#.into()),
    };
    let worker = CryptoWorker::with_payload(WorkerConfig::default(), &payload).unwrap();
    let services = worker.services();
    assert_eq!(services.storage().get("a"), Some(json!(1)));
    assert_eq!(services.storage().get("b"), Some(json!(2)));
    assert!(services.storage().get("k").is_none());
    assert!(services.secure_storage().get("a").is_none());

    services.secure_storage().save("only-secure", json!(true)).unwrap();
    assert!(services.storage().get("only-secure").is_none());
}

#[tokio::test]
async fn second_batch_request_is_ignored() {
    let account = Account::new();
    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![
            decrypt_all_with(account.payload(&account.logins(2))),
            decrypt_all_with(account.payload(&account.logins(4))),
        ],
    )
    .await;
    result.unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(views_of(&posted[0]).len(), 2);
}

#[tokio::test]
async fn payload_can_be_seeded_before_the_request() {
    let account = Account::new();
    let mut worker = CryptoWorker::with_payload(
        WorkerConfig::default(),
        &account.payload(&account.logins(3)),
    )
    .unwrap();
    assert_eq!(worker.state(), WorkerState::Ready);
    assert_eq!(worker.pending().len(), 3);

    let response = worker
        .handle_message(r#"{"type":"decryptAllRequest"}"#)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(views_of(&response).len(), 3);
    assert_eq!(worker.state(), WorkerState::Served);
}

#[tokio::test]
async fn view_survives_the_wire_without_key_material() {
    let account = Account::new();
    let ciphers = vec![account.login("c1", "Mail", "bob", "pa55")];
    let worker = CryptoWorker::with_payload(WorkerConfig::default(), &account.payload(&ciphers))
        .unwrap();
    let views = worker.decrypt_all().await.unwrap();
    let raw = &views[0];

    let view: CipherView = serde_json::from_str(raw).unwrap();
    let again: CipherView = serde_json::from_str(&serde_json::to_string(&view).unwrap()).unwrap();
    assert_eq!(view, again);

    for secret in [
        account.user_key.to_b64(),
        account.enc_key.to_b64(),
        account.org_key.to_b64(),
    ] {
        assert!(!raw.contains(&secret));
    }
}

#[tokio::test]
async fn stream_port_serves_line_delimited_json() {
    let account = Account::new();
    let mut input = decrypt_all_with(account.payload(&account.logins(2)));
    input.push('\n');
    input.push_str("{\"type\":\"pingRequest\"}\n");
    input.push_str("{\"type\":\"clearCacheRequest\"}\n");

    let mut port = StreamPort::new(input.as_bytes(), Vec::new());
    CryptoWorker::new(WorkerConfig::default())
        .run(&mut port)
        .await
        .unwrap();

    let output = String::from_utf8(port.into_writer()).unwrap();
    let lines: Vec<WorkerResponse> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(views_of(&lines[0]).len(), 2);
    assert_eq!(lines[1], WorkerResponse::ClearCacheResponse);
}

#[tokio::test]
async fn non_utf8_line_does_not_stop_the_stream() {
    let mut input = b"\xff\xfe garbage\n".to_vec();
    input.extend_from_slice(b"{\"type\":\"clearCacheRequest\"}\n");

    let mut port = StreamPort::new(input.as_slice(), Vec::new());
    CryptoWorker::new(WorkerConfig::default())
        .run(&mut port)
        .await
        .unwrap();

    let output = String::from_utf8(port.into_writer()).unwrap();
    let lines: Vec<WorkerResponse> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines, vec![WorkerResponse::ClearCacheResponse]);
}

#[tokio::test]
async fn record_with_unparseable_field_fails_only_the_batch() {
    let payload = InitPayload {
        ciphers: json!([{"id": "c1", "type": 2, "name": "2.not-base64|x|y"}]).to_string(),
        storage: None,
        secure_storage: None,
    };
    let worker = CryptoWorker::with_payload(WorkerConfig::default(), &payload).unwrap();
    match worker.decrypt_all().await {
        Err(WorkerError::Decryption { id, source }) => {
            assert_eq!(id, "c1");
            assert!(matches!(source, CryptoError::Serialisation(_)));
        }
        other => panic!("expected decryption failure, got {other:?}"),
    }

    let (result, posted) = exchange(
        CryptoWorker::new(WorkerConfig::default()),
        vec![
            decrypt_all_with(payload),
            message(json!({"type": "clearCacheRequest"})),
        ],
    )
    .await;
    result.unwrap();
    assert_eq!(posted, vec![WorkerResponse::ClearCacheResponse]);
}

#[tokio::test]
async fn record_without_id_is_named_by_position() {
    let account = Account::new();
    let mut ciphers = serde_json::to_value(account.logins(2)).unwrap();
    ciphers.as_array_mut().unwrap().push(json!({"type": 1}));
    let payload = InitPayload {
        ciphers: ciphers.to_string(),
        storage: Some(serde_json::to_string(&account.storage()).unwrap()),
        secure_storage: Some(serde_json::to_string(&account.secure_storage()).unwrap()),
    };
    let worker = CryptoWorker::with_payload(WorkerConfig::default(), &payload).unwrap();
    assert!(matches!(
        worker.decrypt_all().await,
        Err(WorkerError::Decryption { id, .. }) if id == "#2"
    ));
}

#[tokio::test]
async fn malformed_construction_message_is_reported() {
    let config = WorkerConfig {
        report_errors: true,
        ..WorkerConfig::default()
    };
    let (result, posted) = exchange(
        CryptoWorker::new(config),
        vec![
            message(json!({"type": "decryptAllRequest", "ciphers": "[]", "storage": {"a": 1}})),
            message(json!({"type": "clearCacheRequest"})),
        ],
    )
    .await;
    assert!(matches!(result, Err(WorkerError::Construction(_))));
    match posted.as_slice() {
        [WorkerResponse::ErrorResponse { request, message }] => {
            assert_eq!(request, "decryptAllRequest");
            assert!(message.contains("malformed decryptAllRequest"));
        }
        other => panic!("expected one errorResponse, got {other:?}"),
    }
}
