use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use sqlx::{
    Database, Sqlite, Type,
    encode::{Encode, IsNull},
    error::BoxDynError,
};
use thiserror::Error;

/// An opaque identifier that crosses the protocol boundary as raw bytes and
/// is carried internally as a base64 string so it can be used as a stable
/// map/store key (account/contact/group/member/device public keys).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Base64Id(#[serde(with = "serde_bytes")] Vec<u8>);

impl Base64Id {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, IdentifierError> {
        BASE64
            .decode(s)
            .map(Self)
            .map_err(|_| IdentifierError::InvalidBase64)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Base64Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Base64Id").field(&self.as_base64()).finish()
    }
}

impl fmt::Display for Base64Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_base64())
    }
}

impl From<&[u8]> for Base64Id {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Content-id of an event in the underlying log. Canonical string form is
/// base64 of its byte representation (see spec glossary: CID).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid(#[serde(with = "serde_bytes")] Vec<u8>);

impl Cid {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, IdentifierError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(IdentifierError::InvalidCid);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, IdentifierError> {
        let bytes = BASE64.decode(s).map_err(|_| IdentifierError::InvalidCid)?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cid").field(&hex::encode(&self.0)).finish()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_base64())
    }
}

#[derive(Debug, Error, Display)]
pub enum IdentifierError {
    /// value is not valid base64
    InvalidBase64,
    /// CID bytes were empty or otherwise not castable to a content id
    InvalidCid,
}

macro_rules! impl_sqlite_text_newtype {
    ($ty:ty, $to_string:ident, $from_str:ident) => {
        impl Type<Sqlite> for $ty {
            fn type_info() -> <Sqlite as Database>::TypeInfo {
                <String as Type<Sqlite>>::type_info()
            }
        }

        impl<'q> Encode<'q, Sqlite> for &'q $ty {
            fn encode_by_ref(
                &self,
                buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
            ) -> Result<IsNull, BoxDynError> {
                Encode::<Sqlite>::encode(self.$to_string(), buf)
            }
        }

        impl sqlx::Decode<'_, Sqlite> for $ty {
            fn decode(value: <Sqlite as Database>::ValueRef<'_>) -> Result<Self, BoxDynError> {
                let s: &str = sqlx::Decode::<Sqlite>::decode(value)?;
                Ok(Self::$from_str(s)?)
            }
        }
    };
}

impl_sqlite_text_newtype!(Base64Id, as_base64, from_base64);
impl_sqlite_text_newtype!(Cid, as_base64, from_base64);
