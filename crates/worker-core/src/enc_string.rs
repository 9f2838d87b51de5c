//! Versioned ciphertext container.
//!
//! Wire format is `<type>.<part>|<part>|<part>` with standard base64 parts:
//!   type 2: `2.<nonce>|<ciphertext>|<mac>`: XChaCha20-Poly1305 under the
//!            key's encryption half, HMAC-SHA256(mac half, nonce || ciphertext)
//!   type 4: `4.<ephemeral public>|<nonce>|<ciphertext>`: sealed to an X25519
//!            public key, AEAD key from HKDF-SHA256 over the shared secret

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::crypto::{random_array, CryptoFunctions, KEY_LEN, MAC_LEN, NONCE_LEN};
use crate::error::CryptoError;
use crate::keys::{KeyPair, SymmetricKey};

const SEALED_INFO: &[u8] = b"cipher-worker-sealed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionType {
    XChaCha20Poly1305HmacSha256B64 = 2,
    X25519XChaCha20Poly1305B64 = 4,
}

impl TryFrom<u8> for EncryptionType {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::XChaCha20Poly1305HmacSha256B64),
            4 => Ok(Self::X25519XChaCha20Poly1305B64),
            other => Err(CryptoError::InvalidEncString(format!(
                "unsupported encryption type {other}"
            ))),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum EncString {
    Symmetric {
        nonce: [u8; NONCE_LEN],
        data: Vec<u8>,
        mac: [u8; MAC_LEN],
    },
    Sealed {
        ephemeral: [u8; KEY_LEN],
        nonce: [u8; NONCE_LEN],
        data: Vec<u8>,
    },
}

impl EncString {
    pub fn encryption_type(&self) -> EncryptionType {
        match self {
            Self::Symmetric { .. } => EncryptionType::XChaCha20Poly1305HmacSha256B64,
            Self::Sealed { .. } => EncryptionType::X25519XChaCha20Poly1305B64,
        }
    }

    pub fn encrypt(
        functions: &dyn CryptoFunctions,
        plaintext: &[u8],
        key: &SymmetricKey,
    ) -> Result<Self, CryptoError> {
        let nonce = random_nonce(functions)?;
        let data = functions.aead_encrypt(key.enc_key(), &nonce, plaintext)?;
        let mac = functions.hmac_sha256(key.mac_key(), &mac_input(&nonce, &data))?;
        Ok(Self::Symmetric { nonce, data, mac })
    }

    pub fn decrypt(
        &self,
        functions: &dyn CryptoFunctions,
        key: &SymmetricKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self {
            Self::Symmetric { nonce, data, mac } => {
                functions.verify_hmac_sha256(key.mac_key(), &mac_input(nonce, data), mac)?;
                functions.aead_decrypt(key.enc_key(), nonce, data)
            }
            Self::Sealed { .. } => Err(CryptoError::InvalidEncString(
                "sealed value needs a private key".into(),
            )),
        }
    }

    pub fn seal(
        functions: &dyn CryptoFunctions,
        plaintext: &[u8],
        recipient: &[u8; KEY_LEN],
    ) -> Result<Self, CryptoError> {
        let ephemeral_pair = KeyPair::generate(functions)?;
        let ephemeral = *ephemeral_pair.public();
        let shared = functions.x25519_agree(ephemeral_pair.secret(), recipient);
        let key = sealed_key(functions, &shared, &ephemeral, recipient)?;
        let nonce = random_nonce(functions)?;
        let data = functions.aead_encrypt(&key, &nonce, plaintext)?;
        Ok(Self::Sealed {
            ephemeral,
            nonce,
            data,
        })
    }

    pub fn open(
        &self,
        functions: &dyn CryptoFunctions,
        key_pair: &KeyPair,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self {
            Self::Sealed {
                ephemeral,
                nonce,
                data,
            } => {
                let shared = functions.x25519_agree(key_pair.secret(), ephemeral);
                let key = sealed_key(functions, &shared, ephemeral, key_pair.public())?;
                functions.aead_decrypt(&key, nonce, data)
            }
            Self::Symmetric { .. } => Err(CryptoError::InvalidEncString(
                "symmetric value opened with a key pair".into(),
            )),
        }
    }
}

fn random_nonce(functions: &dyn CryptoFunctions) -> Result<[u8; NONCE_LEN], CryptoError> {
    Ok(*random_array::<NONCE_LEN>(functions)?)
}

fn mac_input(nonce: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nonce.len() + data.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(data);
    out
}

fn sealed_key(
    functions: &dyn CryptoFunctions,
    shared: &[u8; KEY_LEN],
    ephemeral: &[u8; KEY_LEN],
    recipient: &[u8; KEY_LEN],
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut info = Vec::with_capacity(SEALED_INFO.len() + 2 * KEY_LEN);
    info.extend_from_slice(SEALED_INFO);
    info.extend_from_slice(ephemeral);
    info.extend_from_slice(recipient);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    functions.hkdf_expand(shared, None, &info, &mut key[..])?;
    Ok(key)
}

fn decode_fixed<const N: usize>(part: &str, what: &str) -> Result<[u8; N], CryptoError> {
    let bytes = general_purpose::STANDARD.decode(part)?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        CryptoError::InvalidEncString(format!("{what} must be {N} bytes, got {}", v.len()))
    })
}

impl FromStr for EncString {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, body) = s
            .split_once('.')
            .ok_or_else(|| CryptoError::InvalidEncString("missing type prefix".into()))?;
        let tag: u8 = tag
            .parse()
            .map_err(|_| CryptoError::InvalidEncString(format!("bad type prefix {tag:?}")))?;
        let parts: Vec<&str> = body.split('|').collect();
        if parts.len() != 3 {
            return Err(CryptoError::InvalidEncString(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }
        match EncryptionType::try_from(tag)? {
            EncryptionType::XChaCha20Poly1305HmacSha256B64 => Ok(Self::Symmetric {
                nonce: decode_fixed(parts[0], "nonce")?,
                data: general_purpose::STANDARD.decode(parts[1])?,
                mac: decode_fixed(parts[2], "mac")?,
            }),
            EncryptionType::X25519XChaCha20Poly1305B64 => Ok(Self::Sealed {
                ephemeral: decode_fixed(parts[0], "ephemeral key")?,
                nonce: decode_fixed(parts[1], "nonce")?,
                data: general_purpose::STANDARD.decode(parts[2])?,
            }),
        }
    }
}

impl fmt::Display for EncString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn b64(bytes: &[u8]) -> String {
            general_purpose::STANDARD.encode(bytes)
        }
        let tag = self.encryption_type() as u8;
        match self {
            Self::Symmetric { nonce, data, mac } => {
                write!(f, "{tag}.{}|{}|{}", b64(nonce), b64(data), b64(mac))
            }
            Self::Sealed {
                ephemeral,
                nonce,
                data,
            } => write!(f, "{tag}.{}|{}|{}", b64(ephemeral), b64(nonce), b64(data)),
        }
    }
}

impl fmt::Debug for EncString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncString({self})")
    }
}

impl Serialize for EncString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EncString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
