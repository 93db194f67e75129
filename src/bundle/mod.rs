//! Bundle engine.
//!
//! # Load
//! [`Bundle::open`] parses the header, picks the [`QuirkProfile`] for the
//! embedded engine version, checks whether the encrypted variant is in use,
//! applies the version-dependent alignment after the header, reads the
//! blocks-and-directory section and decompresses every storage block into one
//! contiguous payload.  After loading, the blocks and the header carry no
//! codec bits: the in-memory bundle is logically uncompressed.
//!
//! # Save
//! See [`writer`]: the payload is re-chunked if needed, every block is
//! compressed with the target codec and the whole container is laid out
//! again with the placement and padding choices recorded at load.

use tracing::{debug, warn};

use crate::block::{StorageBlockInfo, BLOCK_FLAG_LEGACY_COMPATIBILITY};
use crate::codec::{self, CompressionType, COMPRESSION_TYPE_MASK};
use crate::cursor::{padding_for, ByteReader, CursorError, DEFAULT_ALIGNMENT};
use crate::error::{BundleError, Context, Result};
use crate::header::Header;
use crate::index::{BlocksAndDirectoryInfo, DirectoryInfo, HASH_SIZE};
use crate::quirks::{HeaderAlignment, QuirkProfile};

pub mod writer;

pub use writer::{lzma_block_sizes, LZMA_MAX_BLOCK_SIZE};

/// Length a key must have to pass the encrypted-variant check.
pub const KEY_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Bundle {
    header:             Header,
    info:               BlocksAndDirectoryInfo,
    payload:            Vec<u8>,
    quirks:             QuirkProfile,
    header_aligned:     bool,
    blocks_info_at_end: bool,
    compression_type:   u8,
}

impl Bundle {
    pub fn open(data: &[u8]) -> Result<Self> {
        Self::open_with_key(data, None)
    }

    /// Load a bundle, supplying the key required by the encrypted variant.
    ///
    /// Only the key's presence and length are checked; the stream cipher
    /// itself is not implemented.
    pub fn open_with_key(data: &[u8], key: Option<&str>) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let header = Header::read(&mut reader).context("read header")?;
        Self::read_with_header(reader, header, key).context("read bundle with header")
    }

    fn read_with_header(mut reader: ByteReader<'_>, mut header: Header, key: Option<&str>) -> Result<Self> {
        let unity = header.version_triplet();
        let quirks = QuirkProfile::select(header.version, unity);
        debug!(
            format = header.version,
            revision = %header.unity_revision,
            %unity,
            ?quirks,
            "read bundle header"
        );

        if quirks.requires_key(header.flags) {
            match key {
                Some(k) if k.len() == KEY_LENGTH => {
                    warn!("bundle uses the encrypted variant; decryption is not implemented, reading raw bytes");
                }
                _ => return Err(BundleError::EncryptionKeyRequired),
            }
        }

        let header_aligned = match quirks.header_alignment {
            HeaderAlignment::Always => {
                reader.align(DEFAULT_ALIGNMENT);
                true
            }
            HeaderAlignment::Probe => {
                let aligned = probe_header_alignment(&mut reader)?;
                if !aligned {
                    warn!(position = reader.position(), "2019.4 bundle without header padding");
                }
                aligned
            }
            HeaderAlignment::Never => false,
        };

        let (mut info, blocks_info_at_end) =
            BlocksAndDirectoryInfo::read(&mut reader, &header).context("read blocks and directory info")?;

        for block in &mut info.blocks {
            block.flags &= !BLOCK_FLAG_LEGACY_COMPATIBILITY;
        }

        if quirks.pads_block_data(header.flags) {
            reader.align(DEFAULT_ALIGNMENT);
        }

        let (payload, compression_type) = read_blocks(&mut reader, &info).context("decompress blocks")?;

        for block in &mut info.blocks {
            block.flags = 0;
        }
        header.flags &= !COMPRESSION_TYPE_MASK;

        Ok(Self {
            header,
            info,
            payload,
            quirks,
            header_aligned,
            blocks_info_at_end,
            compression_type,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn header(&self) -> &Header { &self.header }

    pub fn blocks(&self) -> &[StorageBlockInfo] { &self.info.blocks }

    pub fn directories(&self) -> &[DirectoryInfo] { &self.info.directories }

    pub fn hash(&self) -> &[u8; HASH_SIZE] { &self.info.hash }

    /// Concatenation of every block's decompressed bytes.
    pub fn payload(&self) -> &[u8] { &self.payload }

    pub fn quirks(&self) -> QuirkProfile { self.quirks }

    pub fn header_aligned(&self) -> bool { self.header_aligned }

    pub fn blocks_info_at_end(&self) -> bool { self.blocks_info_at_end }

    /// Highest codec tag seen across the blocks at load. Diagnostic only.
    pub fn current_compression_type(&self) -> u8 { self.compression_type }

    /// Bytes of one directory entry.
    pub fn entry_data(&self, entry: &DirectoryInfo) -> Option<&[u8]> {
        entry.data(&self.payload)
    }
}

/// Consume the optional padding after a 2019.4 header.
///
/// Reads up to the next boundary; if every byte is zero the cursor stays past
/// them and `true` is returned, otherwise the cursor goes back to where it
/// started and `false` is returned.
pub(crate) fn probe_header_alignment(reader: &mut ByteReader<'_>) -> std::result::Result<bool, CursorError> {
    let start = reader.position();
    let padding = padding_for(start, DEFAULT_ALIGNMENT);
    for _ in 0..padding {
        if reader.read_u8()? != 0 {
            reader.set_position(start);
            return Ok(false);
        }
    }
    Ok(true)
}

/// Decompress every block, in order, into one payload buffer.
///
/// Declared sizes are checked against the bytes actually present before the
/// payload is allocated. Returns the payload and the highest codec tag seen.
fn read_blocks(reader: &mut ByteReader<'_>, info: &BlocksAndDirectoryInfo) -> Result<(Vec<u8>, u8)> {
    let total = info.data_size()?;
    let total = usize::try_from(total).map_err(|_| BundleError::TooLarge { what: "payload", size: total })?;

    let compressed_total: u64 = info.blocks.iter().map(|b| b.compressed_size as u64).sum();
    if compressed_total > reader.remaining() as u64 {
        return Err(CursorError::UnexpectedEndOfData {
            position: reader.position(),
            needed:   usize::try_from(compressed_total).unwrap_or(usize::MAX),
            len:      reader.len(),
        }
        .into());
    }

    let mut highest = 0u8;
    let mut bounded = 0usize;
    for block in &info.blocks {
        let compression = block.compression_type()?;
        compression.check_declared_size(block.compressed_size as u64, block.uncompressed_size as u64)?;
        highest = highest.max(compression.tag());
        if compression != CompressionType::Lzma {
            bounded = bounded.saturating_add(block.uncompressed_size as usize);
        }
    }

    let mut payload = Vec::new();
    codec::reserve(&mut payload, bounded.min(total))?;
    for (index, block) in info.blocks.iter().enumerate() {
        let compression = block.compression_type()?;
        let compressed = reader.read_bytes(block.compressed_size as usize)?;
        codec::decompress_append(compression, compressed, block.uncompressed_size as usize, &mut payload)?;
        debug!(
            index,
            %compression,
            compressed = block.compressed_size,
            uncompressed = block.uncompressed_size,
            "decompressed block"
        );
    }

    Ok((payload, highest))
}
