//! Codec registry: the four block compression schemes a UnityFS bundle can use.
//!
//! # Identity rules
//! A codec is identified on disk by a small integer tag stored in the low six
//! bits of a flags word (archive flags in the header, storage-block flags in
//! the metadata section).  [`CompressionType::from_flags`] is the only place
//! that tag is extracted; any value outside `0..=3` is rejected with
//! [`CodecError::UnsupportedCodec`].
//!
//! # Size discipline
//! Decompression always targets a caller-supplied buffer whose length is the
//! size recorded in the bundle.  A codec producing any other length fails;
//! nothing is padded or truncated silently.

use serde::Serialize;
use thiserror::Error;

pub mod lzma;

pub use lzma::LzmaCodec;

/// Low bits of a flags word that carry the codec tag.
pub const COMPRESSION_TYPE_MASK: u32 = 0x3f;

/// Effort level used for LZ4HC.
pub const LZ4HC_LEVEL: i32 = 12;

/// Largest output an LZ4 block can produce per input byte.
pub const LZ4_MAX_EXPANSION: u64 = 255;

// ── CompressionType ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum CompressionType {
    None  = 0,
    Lzma  = 1,
    Lz4   = 2,
    Lz4Hc = 3,
}

impl CompressionType {
    pub const ALL: [CompressionType; 4] = [
        CompressionType::None,
        CompressionType::Lzma,
        CompressionType::Lz4,
        CompressionType::Lz4Hc,
    ];

    #[inline]
    pub fn tag(self) -> u8 { self as u8 }

    pub fn from_tag(tag: u32) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lzma),
            2 => Ok(CompressionType::Lz4),
            3 => Ok(CompressionType::Lz4Hc),
            other => Err(CodecError::UnsupportedCodec(other)),
        }
    }

    /// Extract the codec from the low bits of a header or block flags word.
    #[inline]
    pub fn from_flags(flags: u32) -> Result<Self, CodecError> {
        Self::from_tag(flags & COMPRESSION_TYPE_MASK)
    }

    /// Most bytes `compressed` bytes of this codec can decode to, or `None`
    /// when the format has no practical bound and output must be streamed.
    pub fn max_expansion(self, compressed: u64) -> Option<u64> {
        match self {
            CompressionType::None => Some(compressed),
            CompressionType::Lz4 | CompressionType::Lz4Hc => {
                Some(compressed.saturating_mul(LZ4_MAX_EXPANSION))
            }
            CompressionType::Lzma => None,
        }
    }

    /// Reject a declared decompressed size that `compressed` bytes cannot reach.
    pub fn check_declared_size(self, compressed: u64, declared: u64) -> Result<(), CodecError> {
        match self.max_expansion(compressed) {
            Some(limit) if declared > limit => Err(CodecError::SizeMismatch {
                expected: declared,
                actual:   limit,
            }),
            _ => Ok(()),
        }
    }

    /// Human-readable name (diagnostics and CLI).
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None  => "none",
            CompressionType::Lzma  => "lzma",
            CompressionType::Lz4   => "lz4",
            CompressionType::Lz4Hc => "lz4hc",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"  => Some(CompressionType::None),
            "lzma"  => Some(CompressionType::Lzma),
            "lz4"   => Some(CompressionType::Lz4),
            "lz4hc" => Some(CompressionType::Lz4Hc),
            _       => None,
        }
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = CodecError;
    fn try_from(tag: u8) -> Result<Self, CodecError> { Self::from_tag(tag as u32) }
}

impl TryFrom<u32> for CompressionType {
    type Error = CodecError;
    fn try_from(tag: u32) -> Result<Self, CodecError> { Self::from_tag(tag) }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported compression type {0}")]
    UnsupportedCodec(u32),
    #[error("size mismatch, expected {expected} byte(s) but got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("decompression failed: {0}")]
    Decode(String),
    #[error("compression failed: {0}")]
    Encode(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn compression_type(&self) -> CompressionType;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    /// Decompress `data` into `out`. `out.len()` is the expected size; the
    /// return value is the number of bytes produced, which equals it on success.
    fn decompress(&self, data: &[u8], out: &mut [u8]) -> Result<usize, CodecError>;

    /// Decompress `data`, declared to hold `expected` bytes, onto the end of
    /// `out`. The declared size is checked against the codec's bound before
    /// anything is allocated.
    fn decompress_append(&self, data: &[u8], expected: usize, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.compression_type().check_declared_size(data.len() as u64, expected as u64)?;
        let start = out.len();
        reserve(out, expected)?;
        out.resize(start + expected, 0);
        self.decompress(data, &mut out[start..])?;
        Ok(())
    }
}

/// Grow `out` by `additional` bytes of capacity, failing instead of aborting.
pub fn reserve(out: &mut Vec<u8>, additional: usize) -> Result<(), CodecError> {
    out.try_reserve(additional)
        .map_err(|e| CodecError::Decode(format!("cannot allocate {} byte(s): {}", additional, e)))
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn compression_type(&self) -> CompressionType { CompressionType::None }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        if data.len() != out.len() {
            return Err(CodecError::SizeMismatch {
                expected: out.len() as u64,
                actual:   data.len() as u64,
            });
        }
        out.copy_from_slice(data);
        Ok(data.len())
    }
}

/// LZ4 block format, default speed.
pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn compression_type(&self) -> CompressionType { CompressionType::Lz4 }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = vec![0u8; lz4_flex::block::get_maximum_output_size(data.len())];
        let written = lz4_flex::block::compress_into(data, &mut out)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        out.truncate(written);
        Ok(out)
    }
    fn decompress(&self, data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        lz4_block_decompress(data, out)
    }
}

/// LZ4 block format, high-compression encoder. Decodes exactly like [`Lz4Codec`].
pub struct Lz4HcCodec;
impl Codec for Lz4HcCodec {
    fn compression_type(&self) -> CompressionType { CompressionType::Lz4Hc }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(LZ4HC_LEVEL)),
            false,
        )
        .map_err(|e| CodecError::Encode(e.to_string()))
    }
    fn decompress(&self, data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        lz4_block_decompress(data, out)
    }
}

fn lz4_block_decompress(data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let written = lz4_flex::block::decompress_into(data, out)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    if written != out.len() {
        return Err(CodecError::SizeMismatch {
            expected: out.len() as u64,
            actual:   written as u64,
        });
    }
    Ok(written)
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CompressionType to a built-in codec.
pub fn get_codec(compression: CompressionType) -> Box<dyn Codec> {
    match compression {
        CompressionType::None  => Box::new(NoneCodec),
        CompressionType::Lzma  => Box::new(LzmaCodec),
        CompressionType::Lz4   => Box::new(Lz4Codec),
        CompressionType::Lz4Hc => Box::new(Lz4HcCodec),
    }
}

/// Resolve a raw on-disk tag to a built-in codec.
///
/// Returns `Err(CodecError::UnsupportedCodec)` if the tag is not recognised.
pub fn get_codec_by_tag(tag: u32) -> Result<Box<dyn Codec>, CodecError> {
    CompressionType::from_tag(tag).map(get_codec)
}

pub fn compress(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    get_codec(compression).compress(data)
}

pub fn decompress(
    compression: CompressionType,
    data:        &[u8],
    out:         &mut [u8],
) -> Result<usize, CodecError> {
    get_codec(compression).decompress(data, out)
}

pub fn decompress_append(
    compression: CompressionType,
    data:        &[u8],
    expected:    usize,
    out:         &mut Vec<u8>,
) -> Result<(), CodecError> {
    get_codec(compression).decompress_append(data, expected, out)
}
