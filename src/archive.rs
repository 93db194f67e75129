//! High-level API, the primary embedding surface.
//!
//! ```no_run
//! use unityfs::archive::{self, OpenOptions, RecompressOptions};
//! use unityfs::CompressionType;
//!
//! // In memory
//! let bytes = std::fs::read("scene.bundle")?;
//! let bundle = archive::open(&bytes, &OpenOptions::default())?;
//! println!("blocks were {}", bundle.current_compression_type());
//! let lz4 = archive::recompress(&bundle, CompressionType::Lz4 as u8)?;
//!
//! // File to file
//! let opts = RecompressOptions { codec: CompressionType::Lzma, ..Default::default() };
//! archive::recompress_file("scene.bundle", "scene.lzma.bundle", &opts)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::block::StorageBlockInfo;
use crate::bundle::Bundle;
use crate::codec::CompressionType;
use crate::error::{Context, Result};
use crate::header::{Header, UnityVersion};
use crate::index::DirectoryInfo;
use crate::quirks::QuirkProfile;

// ── Options ───────────────────────────────────────────────────────────────────

/// Configuration for [`open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Key for the encrypted variant. Only its presence and length are checked.
    pub key: Option<String>,
}

/// Configuration for [`recompress_file`].
#[derive(Debug, Clone)]
pub struct RecompressOptions {
    pub codec: CompressionType,
    pub key:   Option<String>,
}

impl Default for RecompressOptions {
    fn default() -> Self {
        Self {
            codec: CompressionType::Lz4Hc,
            key:   None,
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

pub fn open(data: &[u8], opts: &OpenOptions) -> Result<Bundle> {
    Bundle::open_with_key(data, opts.key.as_deref()).context("load bundle")
}

/// Serialize `bundle` with every block compressed by the codec with this tag
/// (0 none, 1 LZMA, 2 LZ4, 3 LZ4HC).
pub fn recompress(bundle: &Bundle, codec: u8) -> Result<Vec<u8>> {
    bundle.recompress(codec)
}

pub fn current_compression_type(bundle: &Bundle) -> u8 {
    bundle.current_compression_type()
}

pub fn open_file<P: AsRef<Path>>(path: P, opts: &OpenOptions) -> Result<Bundle> {
    let data = fs::read(path)?;
    open(&data, opts)
}

/// Outcome of [`recompress_file`].
#[derive(Debug, Clone, Serialize)]
pub struct RecompressReport {
    pub input_size:  u64,
    pub output_size: u64,
    /// Highest codec tag seen in the source blocks.
    pub from:        u8,
    pub to:          CompressionType,
}

/// Read a bundle from `input`, recompress it and write it to `output`.
///
/// `input` and `output` may be the same path; the source is fully read
/// before anything is written.
pub fn recompress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input:  P,
    output: Q,
    opts:   &RecompressOptions,
) -> Result<RecompressReport> {
    let data = fs::read(input.as_ref())?;
    let bundle = open(&data, &OpenOptions { key: opts.key.clone() })?;
    let out = bundle.serialize(opts.codec)?;
    fs::write(output.as_ref(), &out)?;
    info!(
        input = %input.as_ref().display(),
        output = %output.as_ref().display(),
        codec = %opts.codec,
        before = data.len(),
        after = out.len(),
        "recompressed bundle"
    );
    Ok(RecompressReport {
        input_size:  data.len() as u64,
        output_size: out.len() as u64,
        from:        bundle.current_compression_type(),
        to:          opts.codec,
    })
}

// ── BundleSummary ─────────────────────────────────────────────────────────────

/// Serializable description of a loaded bundle, as printed by `unityfs info`.
#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub header:                   Header,
    pub unity_version:            UnityVersion,
    pub quirks:                   QuirkProfile,
    pub header_aligned:           bool,
    pub blocks_info_at_end:       bool,
    pub current_compression_type: u8,
    pub hash:                     String,
    pub payload_size:             u64,
    pub blocks:                   Vec<StorageBlockInfo>,
    pub directories:              Vec<DirectoryInfo>,
}

impl From<&Bundle> for BundleSummary {
    fn from(b: &Bundle) -> Self {
        BundleSummary {
            header:                   b.header().clone(),
            unity_version:            b.header().version_triplet(),
            quirks:                   b.quirks(),
            header_aligned:           b.header_aligned(),
            blocks_info_at_end:       b.blocks_info_at_end(),
            current_compression_type: b.current_compression_type(),
            hash:                     hex::encode(b.hash()),
            payload_size:             b.payload().len() as u64,
            blocks:                   b.blocks().to_vec(),
            directories:              b.directories().to_vec(),
        }
    }
}
