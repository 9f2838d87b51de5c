//! Messages exchanged between the host and the worker.
//!
//! Every message is a JSON object discriminated by its `type` member. Messages
//! without a known `type` are dropped by [`parse_request`]; a known `type`
//! with a body of the wrong shape is a [`MalformedRequest`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{Result, WorkerError};
use crate::models::{Cipher, EncryptedRecord};

pub const DECRYPT_ALL_REQUEST: &str = "decryptAllRequest";
pub const CLEAR_CACHE_REQUEST: &str = "clearCacheRequest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Carries the initialization payload when it is the construction message.
    DecryptAllRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ciphers: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage: Option<String>,
        #[serde(
            default,
            rename = "secureStorage",
            skip_serializing_if = "Option::is_none"
        )]
        secure_storage: Option<String>,
    },
    ClearCacheRequest,
    #[serde(other)]
    Unknown,
}

impl WorkerRequest {
    pub fn decrypt_all(payload: Option<InitPayload>) -> Self {
        match payload {
            Some(InitPayload {
                ciphers,
                storage,
                secure_storage,
            }) => Self::DecryptAllRequest {
                ciphers: Some(ciphers),
                storage,
                secure_storage,
            },
            None => Self::DecryptAllRequest {
                ciphers: None,
                storage: None,
                secure_storage: None,
            },
        }
    }

    /// Wire name of the request, used when reporting failures.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DecryptAllRequest { .. } => DECRYPT_ALL_REQUEST,
            Self::ClearCacheRequest => CLEAR_CACHE_REQUEST,
            Self::Unknown => "unknown",
        }
    }

    /// The initialization payload riding on a `decryptAllRequest`, if any.
    pub fn init_payload(&self) -> Option<InitPayload> {
        match self {
            Self::DecryptAllRequest {
                ciphers: Some(ciphers),
                storage,
                secure_storage,
            } => Some(InitPayload {
                ciphers: ciphers.clone(),
                storage: storage.clone(),
                secure_storage: secure_storage.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    DecryptAllResponse { ciphers: Vec<String> },
    ClearCacheResponse,
    /// Only posted when error reporting is enabled.
    ErrorResponse { request: String, message: String },
}

/// Serialized records plus the two store snapshots. Each member is itself a
/// JSON document; an absent snapshot is the same as `"null"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub ciphers: String,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub secure_storage: Option<String>,
}

impl InitPayload {
    pub fn new(
        ciphers: &[Cipher],
        storage: Option<&Map<String, Value>>,
        secure_storage: Option<&Map<String, Value>>,
    ) -> Result<Self> {
        Ok(Self {
            ciphers: serde_json::to_string(ciphers)?,
            storage: storage.map(serde_json::to_string).transpose()?,
            secure_storage: secure_storage.map(serde_json::to_string).transpose()?,
        })
    }

    pub fn parse(&self) -> Result<ParsedPayload> {
        let ciphers = serde_json::from_str::<Vec<EncryptedRecord>>(&self.ciphers)
            .map_err(|e| WorkerError::Construction(format!("ciphers: {e}")))?;
        Ok(ParsedPayload {
            ciphers,
            storage: parse_snapshot("storage", self.storage.as_deref())?,
            secure_storage: parse_snapshot("secureStorage", self.secure_storage.as_deref())?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParsedPayload {
    /// Records are only checked for shape when they are decrypted.
    pub ciphers: Vec<EncryptedRecord>,
    pub storage: Option<Map<String, Value>>,
    pub secure_storage: Option<Map<String, Value>>,
}

fn parse_snapshot(label: &str, raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| WorkerError::Construction(format!("{label}: {e}")))?;
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(WorkerError::Construction(format!(
            "{label}: expected an object or null, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A message whose `type` names a request but whose body does not fit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {request}: {reason}")]
pub struct MalformedRequest {
    pub request: &'static str,
    pub reason: String,
}

/// Decodes one inbound message. Unknown types, non-objects and unparseable
/// text come back as `Ok(None)`.
pub fn parse_request(raw: &str) -> Result<Option<WorkerRequest>, MalformedRequest> {
    let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
        return Ok(None);
    };
    let request = match value.get("type").and_then(Value::as_str) {
        Some(DECRYPT_ALL_REQUEST) => DECRYPT_ALL_REQUEST,
        Some(CLEAR_CACHE_REQUEST) => CLEAR_CACHE_REQUEST,
        _ => return Ok(None),
    };
    WorkerRequest::deserialize(value)
        .map(Some)
        .map_err(|e| MalformedRequest {
            request,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_requests_decode() {
        assert_eq!(
            parse_request(r#"{"type":"clearCacheRequest"}"#),
            Ok(Some(WorkerRequest::ClearCacheRequest))
        );
        assert_eq!(
            parse_request(r#"{"type":"decryptAllRequest"}"#),
            Ok(Some(WorkerRequest::decrypt_all(None)))
        );
    }

    #[test]
    fn payload_rides_on_decrypt_all() {
        let raw = json!({
            "type": "decryptAllRequest",
            "ciphers": "[]",
            "storage": "{\"a\":1}",
            "secureStorage": "null"
        })
        .to_string();
        let request = parse_request(&raw).unwrap().unwrap();
        let payload = request.init_payload().unwrap();
        assert_eq!(payload.ciphers, "[]");
        assert_eq!(payload.storage.as_deref(), Some("{\"a\":1}"));
        assert_eq!(payload.secure_storage.as_deref(), Some("null"));
    }

    #[test]
    fn unrecognized_input_is_dropped() {
        for raw in [
            r#"{"type":"pingRequest"}"#,
            r#"{"type":7}"#,
            r#"{"noType":true}"#,
            "[1,2,3]",
            "not json",
            "",
        ] {
            assert_eq!(parse_request(raw), Ok(None), "{raw}");
        }
    }

    #[test]
    fn known_type_with_wrong_body_is_malformed() {
        let err = parse_request(r#"{"type":"decryptAllRequest","ciphers":"[]","storage":{"a":1}}"#)
            .unwrap_err();
        assert_eq!(err.request, DECRYPT_ALL_REQUEST);
        assert!(err.to_string().starts_with("malformed decryptAllRequest: "));

        let err = parse_request(r#"{"type":"decryptAllRequest","ciphers":[]}"#).unwrap_err();
        assert_eq!(err.request, DECRYPT_ALL_REQUEST);
    }

    #[test]
    fn responses_use_type_tag() {
        let value = serde_json::to_value(WorkerResponse::DecryptAllResponse {
            ciphers: vec!["{}".into()],
        })
        .unwrap();
        assert_eq!(value, json!({"type": "decryptAllResponse", "ciphers": ["{}"]}));
        let value = serde_json::to_value(WorkerResponse::ClearCacheResponse).unwrap();
        assert_eq!(value, json!({"type": "clearCacheResponse"}));
    }

    #[test]
    fn request_without_payload_omits_members() {
        let value = serde_json::to_value(WorkerRequest::decrypt_all(None)).unwrap();
        assert_eq!(value, json!({"type": "decryptAllRequest"}));
    }

    #[test]
    fn snapshots_must_be_objects_or_null() {
        let payload = InitPayload {
            ciphers: "[]".into(),
            storage: Some("null".into()),
            secure_storage: None,
        };
        let parsed = payload.parse().unwrap();
        assert!(parsed.storage.is_none());
        assert!(parsed.ciphers.is_empty());

        let bad = InitPayload {
            storage: Some("[1]".into()),
            ..payload.clone()
        };
        assert!(matches!(bad.parse(), Err(WorkerError::Construction(_))));

        let garbled = InitPayload {
            ciphers: "[{".into(),
            ..payload
        };
        assert!(matches!(garbled.parse(), Err(WorkerError::Construction(_))));
    }
}
