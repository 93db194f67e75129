//! Save pipeline.
//!
//! Output layout, in order:
//!
//! ```text
//! header | [pad to 16] | [metadata] | [pad to 16] | block 0 | block 1 | ... | [metadata]
//! ```
//!
//! - The pad after the header is present iff the header was aligned at load.
//! - The metadata section goes either before the blocks or at the very end,
//!   wherever it was found at load.  It is always LZ4HC-compressed.
//! - The pad before the blocks is present iff the quirk profile honours the
//!   padding flag and the header carries it.
//!
//! Every size field is recomputed from the data being written; nothing is
//! carried over from the source bundle's header.

use tracing::debug;

use crate::block::StorageBlockInfo;
use crate::codec::{self, CompressionType};
use crate::cursor::{padding_for, ByteWriter, DEFAULT_ALIGNMENT};
use crate::error::{BundleError, Context, Result};
use crate::index::BlocksAndDirectoryInfo;

use super::Bundle;

/// Largest block LZMA re-chunking produces.
pub const LZMA_MAX_BLOCK_SIZE: u64 = u32::MAX as u64;

/// Codec of the metadata section in every bundle this crate writes.
pub const BLOCKS_INFO_COMPRESSION: CompressionType = CompressionType::Lz4Hc;

/// Block sizes for an LZMA re-chunk of a `total`-byte payload.
///
/// Every block is [`LZMA_MAX_BLOCK_SIZE`] except the last, which holds the
/// remainder. An empty payload has no blocks.
pub fn lzma_block_sizes(total: u64) -> Vec<u32> {
    let count = total.div_ceil(LZMA_MAX_BLOCK_SIZE);
    (0..count)
        .map(|i| {
            let remaining = total - i * LZMA_MAX_BLOCK_SIZE;
            remaining.min(LZMA_MAX_BLOCK_SIZE) as u32
        })
        .collect()
}

impl Bundle {
    /// Serialize with the codec given by its numeric tag.
    pub fn recompress(&self, tag: u8) -> Result<Vec<u8>> {
        let compression = CompressionType::try_from(tag)?;
        self.serialize(compression)
    }

    /// Serialize the whole bundle with every block compressed by `compression`.
    ///
    /// The bundle itself is not modified; a failed save leaves nothing behind.
    pub fn serialize(&self, compression: CompressionType) -> Result<Vec<u8>> {
        let mut blocks: Vec<StorageBlockInfo> = match compression {
            CompressionType::Lzma => lzma_block_sizes(self.payload.len() as u64)
                .into_iter()
                .map(StorageBlockInfo::new)
                .collect(),
            _ => self.info.blocks.clone(),
        };

        let compressed = compress_blocks(&self.payload, &mut blocks, compression).context("compress blocks")?;

        let info = BlocksAndDirectoryInfo {
            hash:        self.info.hash,
            blocks,
            directories: self.info.directories.clone(),
        };
        let info_bytes = info
            .to_bytes(BLOCKS_INFO_COMPRESSION)
            .context("serialize blocks and directory info")?;

        let mut header = self.header.clone();
        header.uncompressed_blocks_info_size = to_u32("uncompressed blocks info", info.raw_size())?;
        header.compressed_blocks_info_size = to_u32("compressed blocks info", info_bytes.len())?;
        header.set_compression_type(BLOCKS_INFO_COMPRESSION);
        let pad_blocks = self.quirks.pads_block_data(header.flags);

        // Sizes follow the write order below, so every pad is measured at the
        // offset where it is actually written.
        let mut size = header.serialized_size();
        if self.header_aligned {
            size += padding_for(size, DEFAULT_ALIGNMENT);
        }
        if !self.blocks_info_at_end {
            size += info_bytes.len();
        }
        if pad_blocks {
            size += padding_for(size, DEFAULT_ALIGNMENT);
        }
        size += compressed.iter().map(Vec::len).sum::<usize>();
        if self.blocks_info_at_end {
            size += info_bytes.len();
        }
        header.size = size as u64;

        let mut out = vec![0u8; size];
        let mut writer = ByteWriter::new(&mut out);
        header.write(&mut writer)?;
        if self.header_aligned {
            writer.align(DEFAULT_ALIGNMENT)?;
        }
        if !self.blocks_info_at_end {
            writer.write_bytes(&info_bytes)?;
        }
        if pad_blocks {
            writer.align(DEFAULT_ALIGNMENT)?;
        }
        for block in &compressed {
            writer.write_bytes(block)?;
        }
        if self.blocks_info_at_end {
            writer.write_bytes(&info_bytes)?;
        }
        debug_assert_eq!(writer.position(), size);

        debug!(
            %compression,
            blocks = compressed.len(),
            blocks_info = info_bytes.len(),
            size,
            "serialized bundle"
        );
        Ok(out)
    }
}

/// Tag every block with `compression` and compress its slice of `payload`.
fn compress_blocks(
    payload:     &[u8],
    blocks:      &mut [StorageBlockInfo],
    compression: CompressionType,
) -> Result<Vec<Vec<u8>>> {
    let mut compressed = Vec::with_capacity(blocks.len());
    let mut offset = 0usize;
    for block in blocks.iter_mut() {
        block.set_compression_type(compression);
        let end = offset + block.uncompressed_size as usize;
        let slice = payload.get(offset..end).ok_or(BundleError::TooLarge {
            what: "block list",
            size: end as u64,
        })?;
        let bytes = codec::compress(compression, slice)?;
        block.compressed_size = to_u32("compressed block", bytes.len())?;
        compressed.push(bytes);
        offset = end;
    }
    Ok(compressed)
}

fn to_u32(what: &'static str, size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| BundleError::TooLarge { what, size: size as u64 })
}
