use serde::Serialize;
use std::fmt;

use crate::codec::{CodecError, CompressionType, COMPRESSION_TYPE_MASK};
use crate::cursor::{ByteReader, ByteWriter, CursorError};
use crate::error::{BundleError, Result};

pub const SIGNATURE: &str = "UnityFS";

const SIGNATURE_MAX_LEN: usize = 20;
const UNITY_VERSION_MAX_LEN: usize = 16;
const UNITY_REVISION_MAX_LEN: usize = 20;

// Archive flag bits. The low six bits are the metadata section's codec tag.
pub const FLAG_BLOCKS_AND_DIRECTORY_INFO_COMBINED: u32 = 0x40;
pub const FLAG_BLOCKS_INFO_AT_THE_END: u32 = 0x80;
pub const FLAG_OLD_WEB_PLUGIN_COMPATIBILITY: u32 = 0x100;
pub const FLAG_BLOCK_INFO_NEED_PADDING_AT_START: u32 = 0x200;
pub const FLAG_UNITY_CN_ENCRYPTION: u32 = 0x400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub signature: String,
    pub version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    pub size: u64,
    pub compressed_blocks_info_size: u32,
    pub uncompressed_blocks_info_size: u32,
    pub flags: u32,
}

impl Header {
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let start = reader.position();
        let signature = match reader.read_string(SIGNATURE_MAX_LEN) {
            Ok(s) if s == SIGNATURE => s,
            Ok(found) => return Err(BundleError::InvalidSignature { found }),
            Err(_) => {
                let data = reader.data();
                let end = data.len().min(start + SIGNATURE_MAX_LEN);
                let found = String::from_utf8_lossy(&data[start.min(end)..end]).into_owned();
                return Err(BundleError::InvalidSignature { found });
            }
        };
        Ok(Self {
            signature,
            version: reader.read_u32()?,
            unity_version: reader.read_string(UNITY_VERSION_MAX_LEN)?,
            unity_revision: reader.read_string(UNITY_REVISION_MAX_LEN)?,
            size: reader.read_u64()?,
            compressed_blocks_info_size: reader.read_u32()?,
            uncompressed_blocks_info_size: reader.read_u32()?,
            flags: reader.read_u32()?,
        })
    }

    pub fn write(&self, writer: &mut ByteWriter<'_>) -> std::result::Result<(), CursorError> {
        writer.write_cstring(&self.signature)?;
        writer.write_u32(self.version)?;
        writer.write_cstring(&self.unity_version)?;
        writer.write_cstring(&self.unity_revision)?;
        writer.write_u64(self.size)?;
        writer.write_u32(self.compressed_blocks_info_size)?;
        writer.write_u32(self.uncompressed_blocks_info_size)?;
        writer.write_u32(self.flags)?;
        Ok(())
    }

    /// Exact number of bytes [`Header::write`] emits.
    pub fn serialized_size(&self) -> usize {
        self.signature.len() + 1
            + 4
            + self.unity_version.len() + 1
            + self.unity_revision.len() + 1
            + 8 + 4 + 4 + 4
    }

    /// Codec of the metadata section.
    pub fn compression_type(&self) -> std::result::Result<CompressionType, CodecError> {
        CompressionType::from_flags(self.flags)
    }

    pub fn set_compression_type(&mut self, compression: CompressionType) {
        self.flags = (self.flags & !COMPRESSION_TYPE_MASK) | compression.tag() as u32;
    }

    pub fn blocks_info_at_end(&self) -> bool {
        self.flags & FLAG_BLOCKS_INFO_AT_THE_END != 0
    }

    pub fn version_triplet(&self) -> UnityVersion {
        UnityVersion::parse(&self.unity_revision)
    }
}

// ── UnityVersion ─────────────────────────────────────────────────────────────

/// Engine version parsed from a revision string such as `2021.3.2f1`.
///
/// Parsing is best effort: every non-digit character moves to the next slot,
/// scanning stops once three slots are filled, and unfilled slots stay zero.
/// Malformed strings are not rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UnityVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl UnityVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(revision: &str) -> Self {
        let mut slots = [0u32; 3];
        let mut slot = 0;
        for b in revision.bytes() {
            if slot >= slots.len() {
                break;
            }
            if b.is_ascii_digit() {
                slots[slot] = slots[slot].saturating_mul(10).saturating_add((b - b'0') as u32);
            } else {
                slot += 1;
            }
        }
        Self::new(slots[0], slots[1], slots[2])
    }
}

impl fmt::Display for UnityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
