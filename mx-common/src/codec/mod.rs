use cbor::Cbor;
use error::CodecError;
use serde::{Serialize, de::DeserializeOwned};

mod cbor;
mod error;

pub use error::Error;

/// Versioned codec for opaque event payloads. The first byte of every
/// encoded value is the codec version; decoding reads that byte before
/// dispatching to the matching body format. Adding a wire-format change is
/// a new variant here, not a new call site everywhere a payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
#[non_exhaustive]
pub enum MxCodec {
    #[default]
    V1 = 1,
}

impl TryFrom<u8> for MxCodec {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MxCodec::V1),
            _ => Err(Error::UnknownCodecVersion),
        }
    }
}

impl MxCodec {
    fn serialize_to_writer<T: Serialize>(
        &self,
        value: &T,
        writer: &mut impl std::io::Write,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        // The first byte is always the codec version.
        writer.write_all(&[*self as u8])?;
        match self {
            MxCodec::V1 => Cbor::to_writer(value, writer)?,
        }
        Ok(())
    }

    fn serialize<T: Sized + Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let mut buf = Vec::new();
        self.serialize_to_writer(value, &mut buf)?;
        Ok(buf)
    }

    fn deserialize<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let res = match self {
            MxCodec::V1 => Cbor::from_slice(bytes)?,
        };
        Ok(res)
    }

    pub fn to_vec<T>(value: &T) -> Result<Vec<u8>, Error>
    where
        T: Sized + Serialize,
    {
        let codec_version = MxCodec::default();
        let res = codec_version.serialize(value).map_err(|error| CodecError {
            codec_version,
            error,
        })?;
        Ok(res)
    }

    pub fn from_slice<T>(bytes: &[u8]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let codec_version_byte = bytes.first().ok_or(Error::EmptyInputSlice)?;
        let codec_version = MxCodec::try_from(*codec_version_byte)?;
        codec_version.deserialize(&bytes[1..]).map_err(|error| {
            CodecError {
                codec_version,
                error,
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::MxCodec;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trips_through_the_versioned_envelope() {
        let sample = Sample {
            a: 7,
            b: "hello".to_string(),
        };
        let bytes = MxCodec::to_vec(&sample).unwrap();
        assert_eq!(bytes[0], MxCodec::V1 as u8);
        let decoded: Sample = MxCodec::from_slice(&bytes).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn rejects_unknown_version_byte() {
        let err = MxCodec::from_slice::<Sample>(&[0xff]).unwrap_err();
        assert!(matches!(err, super::Error::UnknownCodecVersion));
    }

    #[test]
    fn rejects_empty_input() {
        let err = MxCodec::from_slice::<Sample>(&[]).unwrap_err();
        assert!(matches!(err, super::Error::EmptyInputSlice));
    }
}
