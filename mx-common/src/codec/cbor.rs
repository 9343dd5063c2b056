use serde::{Serialize, de::DeserializeOwned};

pub(super) struct Cbor;

impl Cbor {
    pub(super) fn to_writer<T: Serialize>(
        value: &T,
        writer: &mut impl std::io::Write,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        ciborium::into_writer(value, writer).map_err(|e| Box::new(e) as _)
    }

    pub(super) fn from_slice<T: DeserializeOwned>(
        bytes: &[u8],
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync + 'static>> {
        ciborium::from_reader(bytes).map_err(|e| Box::new(e) as _)
    }
}
