use displaydoc::Display;
use thiserror::Error;

use super::MxCodec;

#[derive(Debug, Error, Display)]
pub enum Error {
    /// empty input slice
    EmptyInputSlice,
    /// unknown codec version
    UnknownCodecVersion,
    /// codec error: {0}
    CodecError(#[from] CodecError),
}

#[derive(Debug, Error)]
pub struct CodecError {
    pub(super) codec_version: MxCodec,
    pub(super) error: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.codec_version, self.error)
    }
}
