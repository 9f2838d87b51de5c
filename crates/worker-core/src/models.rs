//! Encrypted records and their decrypted views.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto_service::CryptoService;
use crate::enc_string::EncString;
use crate::error::CryptoError;
use crate::keys::SymmetricKey;

/// Fieldless enums carried on the wire as their integer discriminant.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "u8", into = "u8")]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = String;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} {other}", stringify!($name))),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

wire_enum!(CipherType {
    Login = 1,
    SecureNote = 2,
    Card = 3,
});

wire_enum!(FieldType {
    Text = 0,
    Hidden = 1,
    Boolean = 2,
});

wire_enum!(SecureNoteType { Generic = 0 });

impl Default for FieldType {
    fn default() -> Self {
        Self::Text
    }
}

impl Default for SecureNoteType {
    fn default() -> Self {
        Self::Generic
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUri {
    pub uri: Option<EncString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    pub username: Option<EncString>,
    pub password: Option<EncString>,
    pub totp: Option<EncString>,
    #[serde(default)]
    pub uris: Vec<LoginUri>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureNote {
    #[serde(rename = "type", default)]
    pub note_type: SecureNoteType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub cardholder_name: Option<EncString>,
    pub brand: Option<EncString>,
    pub number: Option<EncString>,
    pub exp_month: Option<EncString>,
    pub exp_year: Option<EncString>,
    pub code: Option<EncString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: Option<EncString>,
    pub value: Option<EncString>,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

/// An encrypted record as the host stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cipher {
    pub id: String,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub name: EncString,
    pub notes: Option<EncString>,
    #[serde(default)]
    pub favorite: bool,
    pub revision_date: Option<String>,
    pub login: Option<Login>,
    pub secure_note: Option<SecureNote>,
    pub card: Option<Card>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUriView {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginView {
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
    pub uris: Vec<LoginUriView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub cardholder_name: Option<String>,
    pub brand: Option<String>,
    pub number: Option<String>,
    pub exp_month: Option<String>,
    pub exp_year: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub name: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Plaintext projection of a [`Cipher`]. Holds no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherView {
    pub id: String,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub name: String,
    pub notes: Option<String>,
    pub favorite: bool,
    pub revision_date: Option<String>,
    pub login: Option<LoginView>,
    pub secure_note: Option<SecureNote>,
    pub card: Option<CardView>,
    pub fields: Vec<FieldView>,
}

impl Cipher {
    /// Decrypts with the organization key when the record belongs to one.
    pub async fn decrypt(&self, crypto: &CryptoService) -> Result<CipherView, CryptoError> {
        let key = crypto
            .get_key_for_record(self.organization_id.as_deref())
            .await?;
        let open = FieldOpener { crypto, key: &key };

        let login = match &self.login {
            Some(login) => Some(LoginView {
                username: open.opt(&login.username).await?,
                password: open.opt(&login.password).await?,
                totp: open.opt(&login.totp).await?,
                uris: {
                    let mut uris = Vec::with_capacity(login.uris.len());
                    for u in &login.uris {
                        uris.push(LoginUriView {
                            uri: open.opt(&u.uri).await?,
                        });
                    }
                    uris
                },
            }),
            None => None,
        };

        let card = match &self.card {
            Some(card) => Some(CardView {
                cardholder_name: open.opt(&card.cardholder_name).await?,
                brand: open.opt(&card.brand).await?,
                number: open.opt(&card.number).await?,
                exp_month: open.opt(&card.exp_month).await?,
                exp_year: open.opt(&card.exp_year).await?,
                code: open.opt(&card.code).await?,
            }),
            None => None,
        };

        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(FieldView {
                name: open.opt(&field.name).await?,
                value: open.opt(&field.value).await?,
                field_type: field.field_type,
            });
        }

        Ok(CipherView {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            folder_id: self.folder_id.clone(),
            cipher_type: self.cipher_type,
            name: open.one(&self.name).await?,
            notes: open.opt(&self.notes).await?,
            favorite: self.favorite,
            revision_date: self.revision_date.clone(),
            login,
            secure_note: self.secure_note.clone(),
            card,
            fields,
        })
    }
}

/// One element of the host's record array, kept as raw JSON until it is
/// decrypted so a record with bad fields fails on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedRecord(Value);

impl EncryptedRecord {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn cipher(&self) -> Result<Cipher, CryptoError> {
        Ok(Cipher::deserialize(&self.0)?)
    }

    pub async fn decrypt(&self, crypto: &CryptoService) -> Result<CipherView, CryptoError> {
        self.cipher()?.decrypt(crypto).await
    }
}

struct FieldOpener<'a> {
    crypto: &'a CryptoService,
    key: &'a SymmetricKey,
}

impl FieldOpener<'_> {
    async fn one(&self, enc: &EncString) -> Result<String, CryptoError> {
        self.crypto.decrypt_to_utf8(enc, self.key).await
    }

    async fn opt(&self, enc: &Option<EncString>) -> Result<Option<String>, CryptoError> {
        match enc {
            Some(enc) => self.one(enc).await.map(Some),
            None => Ok(None),
        }
    }
}
