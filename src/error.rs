//! Crate-level error type.
//!
//! Low-level failures come from [`CursorError`] and [`CodecError`]; the bundle
//! engine wraps them with the pipeline stage that was running, so the rendered
//! message reads as a cause chain:
//!
//! ```text
//! failed to read bundle with header: failed to read blocks and directory info: data size mismatch, ...
//! ```
//!
//! Boundary code should match on [`BundleError::kind`] instead of the nested
//! variants.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::cursor::CursorError;
use crate::header::SIGNATURE;

pub type Result<T> = std::result::Result<T, BundleError>;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("invalid signature, expected {} but got {found:?}", SIGNATURE)]
    InvalidSignature { found: String },
    #[error("bundle is encrypted but no valid key was provided")]
    EncryptionKeyRequired,
    #[error("data size mismatch, blocks hold {blocks} byte(s) while directory entries hold {directories}")]
    DataSizeMismatch { blocks: u64, directories: u64 },
    #[error("{what} of {size} bytes does not fit the bundle format")]
    TooLarge { what: &'static str, size: u64 },
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to {stage}: {source}")]
    Context {
        stage: &'static str,
        #[source]
        source: Box<BundleError>,
    },
}

/// Flat error taxonomy exposed at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSignature,
    UnexpectedEndOfData,
    BufferOverflow,
    SizeMismatch,
    UnsupportedCodec,
    EncryptionKeyRequired,
    DecodeError,
    EncodeError,
    Io,
}

impl BundleError {
    /// Classify this error, looking through any stage context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BundleError::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            BundleError::EncryptionKeyRequired => ErrorKind::EncryptionKeyRequired,
            BundleError::DataSizeMismatch { .. } | BundleError::TooLarge { .. } => {
                ErrorKind::SizeMismatch
            }
            BundleError::Cursor(CursorError::UnexpectedEndOfData { .. }) => ErrorKind::UnexpectedEndOfData,
            BundleError::Cursor(CursorError::InvalidString { .. }) => ErrorKind::DecodeError,
            BundleError::Cursor(CursorError::BufferOverflow { .. }) => ErrorKind::BufferOverflow,
            BundleError::Codec(CodecError::UnsupportedCodec(_)) => ErrorKind::UnsupportedCodec,
            BundleError::Codec(CodecError::SizeMismatch { .. }) => ErrorKind::SizeMismatch,
            BundleError::Codec(CodecError::Decode(_)) => ErrorKind::DecodeError,
            BundleError::Codec(CodecError::Encode(_)) => ErrorKind::EncodeError,
            BundleError::Io(_) => ErrorKind::Io,
            BundleError::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap this error with the stage that was being attempted.
    pub fn context(self, stage: &'static str) -> Self {
        BundleError::Context { stage, source: Box::new(self) }
    }

    /// The innermost error, past every stage context.
    pub fn root_cause(&self) -> &BundleError {
        match self {
            BundleError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// `anyhow`-style stage annotation for any result whose error converts into
/// [`BundleError`].
pub trait Context<T> {
    fn context(self, stage: &'static str) -> Result<T>;
}

impl<T, E: Into<BundleError>> Context<T> for std::result::Result<T, E> {
    fn context(self, stage: &'static str) -> Result<T> {
        self.map_err(|e| Into::<BundleError>::into(e).context(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_context() {
        let err = BundleError::DataSizeMismatch { blocks: 10, directories: 12 }
            .context("read blocks and directory info")
            .context("read bundle with header");
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
        assert!(matches!(err.root_cause(), BundleError::DataSizeMismatch { blocks: 10, .. }));
    }

    #[test]
    fn invalid_string_is_a_decode_error() {
        let err = BundleError::from(CursorError::InvalidString { position: 12 }).context("read header");
        assert_eq!(err.kind(), ErrorKind::DecodeError);
    }

    #[test]
    fn context_message_is_a_chain() {
        let err: Result<()> = Err(CodecError::UnsupportedCodec(9)).context("decompress blocks");
        let msg = err.unwrap_err().to_string();
        assert!(msg.starts_with("failed to decompress blocks: "), "{msg}");
        assert!(msg.contains("unsupported compression type 9"), "{msg}");
    }
}
