//! Blocks-and-directory metadata section.
//!
//! Decompressed layout (big-endian):
//!
//! ```text
//! hash[16] | block_count u32 | block_count × StorageBlockInfo
//!          | dir_count u32   | dir_count × DirectoryInfo
//! ```
//!
//! The section itself is compressed with the codec named in the header flags
//! and sits either right after the header or at the very end of the bundle.
//! The uncompressed block sizes and the directory entry sizes must describe
//! the same payload; [`BlocksAndDirectoryInfo::data_size`] enforces that.

use std::borrow::Cow;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::block::{StorageBlockInfo, STORAGE_BLOCK_INFO_SIZE};
use crate::codec::{self, CompressionType};
use crate::cursor::{ByteReader, ByteWriter, CursorError};
use crate::error::{BundleError, Context, Result};
use crate::header::Header;

pub const HASH_SIZE: usize = 16;

/// Directory entry path, kept as the exact bytes found in the bundle.
///
/// Paths are usually ASCII `CAB-<hash>` names but nothing guarantees UTF-8, so
/// they are only decoded (lossily) for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryPath(Vec<u8>);

impl EntryPath {
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<Vec<u8>> for EntryPath {
    fn from(bytes: Vec<u8>) -> Self { EntryPath(bytes) }
}

impl From<&[u8]> for EntryPath {
    fn from(bytes: &[u8]) -> Self { EntryPath(bytes.to_vec()) }
}

impl From<&str> for EntryPath {
    fn from(s: &str) -> Self { EntryPath(s.as_bytes().to_vec()) }
}

impl AsRef<[u8]> for EntryPath {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl PartialEq<str> for EntryPath {
    fn eq(&self, other: &str) -> bool { self.0 == other.as_bytes() }
}

impl PartialEq<&str> for EntryPath {
    fn eq(&self, other: &&str) -> bool { self.0 == other.as_bytes() }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.to_string_lossy())
    }
}

impl Serialize for EntryPath {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string_lossy())
    }
}

/// A logical file inside the bundle payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryInfo {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub path: EntryPath,
}

impl DirectoryInfo {
    pub fn read(reader: &mut ByteReader<'_>) -> std::result::Result<Self, CursorError> {
        Ok(Self {
            offset: reader.read_u64()?,
            size: reader.read_u64()?,
            flags: reader.read_u32()?,
            path: reader.read_cstring()?.into(),
        })
    }

    pub fn write(&self, writer: &mut ByteWriter<'_>) -> std::result::Result<(), CursorError> {
        writer.write_u64(self.offset)?;
        writer.write_u64(self.size)?;
        writer.write_u32(self.flags)?;
        writer.write_cstring(&self.path)
    }

    pub fn serialized_size(&self) -> usize {
        8 + 8 + 4 + self.path.len() + 1
    }

    /// This entry's bytes within a decompressed payload, if in range.
    pub fn data<'a>(&self, payload: &'a [u8]) -> Option<&'a [u8]> {
        let start = usize::try_from(self.offset).ok()?;
        let end = start.checked_add(usize::try_from(self.size).ok()?)?;
        payload.get(start..end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlocksAndDirectoryInfo {
    #[serde(serialize_with = "serialize_hash")]
    pub hash: [u8; HASH_SIZE],
    pub blocks: Vec<StorageBlockInfo>,
    pub directories: Vec<DirectoryInfo>,
}

fn serialize_hash<S: Serializer>(hash: &[u8; HASH_SIZE], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(hash))
}

impl BlocksAndDirectoryInfo {
    /// Locate, decompress and parse the section described by `header`.
    ///
    /// When the section sits after the header it is read from the cursor,
    /// which then moves past it. Returns the section and whether it was found
    /// at the end of the bundle.
    pub fn read(reader: &mut ByteReader<'_>, header: &Header) -> Result<(Self, bool)> {
        let compressed_size = header.compressed_blocks_info_size as usize;
        let at_end = header.blocks_info_at_end();
        let compressed = if at_end {
            let data = reader.data();
            let start = usize::try_from(header.size)
                .ok()
                .and_then(|size| size.checked_sub(compressed_size))
                .filter(|&start| start + compressed_size <= data.len())
                .ok_or(CursorError::UnexpectedEndOfData {
                    position: header.size.saturating_sub(compressed_size as u64) as usize,
                    needed:   compressed_size,
                    len:      data.len(),
                })?;
            &data[start..start + compressed_size]
        } else {
            reader.read_bytes(compressed_size)?
        };

        let compression = header.compression_type()?;
        let mut raw = Vec::new();
        codec::decompress_append(compression, compressed, header.uncompressed_blocks_info_size as usize, &mut raw)
            .context("decompress blocks info")?;

        let info = Self::parse(&raw)?;
        info.data_size()?;
        tracing::debug!(
            blocks = info.blocks.len(),
            directories = info.directories.len(),
            at_end,
            %compression,
            "read blocks and directory info"
        );
        Ok((info, at_end))
    }

    /// Parse the decompressed section.
    pub fn parse(raw: &[u8]) -> std::result::Result<Self, CursorError> {
        let mut reader = ByteReader::new(raw);
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(reader.read_bytes(HASH_SIZE)?);

        let block_count = reader.read_u32()? as usize;
        let mut blocks = Vec::with_capacity(block_count.min(reader.remaining() / STORAGE_BLOCK_INFO_SIZE));
        for _ in 0..block_count {
            blocks.push(StorageBlockInfo::read(&mut reader)?);
        }

        let directory_count = reader.read_u32()? as usize;
        let mut directories = Vec::with_capacity(directory_count.min(reader.remaining() / 21));
        for _ in 0..directory_count {
            directories.push(DirectoryInfo::read(&mut reader)?);
        }

        Ok(Self { hash, blocks, directories })
    }

    /// Byte count of [`BlocksAndDirectoryInfo::to_raw_bytes`].
    pub fn raw_size(&self) -> usize {
        HASH_SIZE
            + 4
            + STORAGE_BLOCK_INFO_SIZE * self.blocks.len()
            + 4
            + self.directories.iter().map(DirectoryInfo::serialized_size).sum::<usize>()
    }

    pub fn to_raw_bytes(&self) -> Result<Vec<u8>> {
        let block_count = u32::try_from(self.blocks.len())
            .map_err(|_| BundleError::TooLarge { what: "block list", size: self.blocks.len() as u64 })?;
        let directory_count = u32::try_from(self.directories.len()).map_err(|_| BundleError::TooLarge {
            what: "directory list",
            size: self.directories.len() as u64,
        })?;

        let mut out = vec![0u8; self.raw_size()];
        let mut writer = ByteWriter::new(&mut out);
        writer.write_bytes(&self.hash)?;
        writer.write_u32(block_count)?;
        for block in &self.blocks {
            block.write(&mut writer)?;
        }
        writer.write_u32(directory_count)?;
        for directory in &self.directories {
            directory.write(&mut writer)?;
        }
        Ok(out)
    }

    /// Serialize and compress the section.
    pub fn to_bytes(&self, compression: CompressionType) -> Result<Vec<u8>> {
        let raw = self.to_raw_bytes()?;
        match compression {
            CompressionType::None => Ok(raw),
            other => Ok(codec::compress(other, &raw)?),
        }
    }

    /// Total payload size. Fails unless blocks and directory entries agree.
    pub fn data_size(&self) -> Result<u64> {
        let blocks: u64 = self.blocks.iter().map(|b| b.uncompressed_size as u64).sum();
        let directories = self.directories.iter().fold(0u64, |acc, d| acc.saturating_add(d.size));
        if blocks != directories {
            return Err(BundleError::DataSizeMismatch { blocks, directories });
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::header::{FLAG_BLOCKS_AND_DIRECTORY_INFO_COMBINED, FLAG_BLOCKS_INFO_AT_THE_END, SIGNATURE};

    fn sample() -> BlocksAndDirectoryInfo {
        BlocksAndDirectoryInfo {
            hash: [7u8; HASH_SIZE],
            blocks: vec![
                StorageBlockInfo { uncompressed_size: 100, compressed_size: 60, flags: 2 },
                StorageBlockInfo { uncompressed_size: 50, compressed_size: 50, flags: 0 },
            ],
            directories: vec![
                DirectoryInfo { offset: 0, size: 120, flags: 4, path: "CAB-a1b2c3".into() },
                DirectoryInfo { offset: 120, size: 30, flags: 0, path: "CAB-a1b2c3.resS".into() },
            ],
        }
    }

    fn header_for(compressed: usize, raw: usize, flags: u32, size: u64) -> Header {
        Header {
            signature: SIGNATURE.into(),
            version: 6,
            unity_version: "5.x.x".into(),
            unity_revision: "2018.4.0f1".into(),
            size,
            compressed_blocks_info_size: compressed as u32,
            uncompressed_blocks_info_size: raw as u32,
            flags,
        }
    }

    #[test]
    fn raw_size_matches_serializer() {
        let info = sample();
        let raw = info.to_raw_bytes().unwrap();
        assert_eq!(raw.len(), info.raw_size());
        assert_eq!(raw.len(), 16 + 4 + 20 + 4 + (31 + 36));
        assert_eq!(BlocksAndDirectoryInfo::parse(&raw).unwrap(), info);
    }

    #[test]
    fn data_size_checks_both_views() {
        let mut info = sample();
        assert_eq!(info.data_size().unwrap(), 150);
        info.directories[1].size = 31;
        let err = info.data_size().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
        let msg = err.to_string();
        assert!(msg.contains("150") && msg.contains("151"), "{msg}");
    }

    #[test]
    fn reads_section_after_header() {
        let info = sample();
        let packed = info.to_bytes(CompressionType::Lz4Hc).unwrap();
        let mut data = packed.clone();
        data.extend_from_slice(b"payload");
        let header = header_for(packed.len(), info.raw_size(), FLAG_BLOCKS_AND_DIRECTORY_INFO_COMBINED | 3, data.len() as u64);

        let mut reader = ByteReader::new(&data);
        let (parsed, at_end) = BlocksAndDirectoryInfo::read(&mut reader, &header).unwrap();
        assert!(!at_end);
        assert_eq!(parsed, info);
        assert_eq!(reader.position(), packed.len());
    }

    #[test]
    fn reads_section_at_end_without_moving() {
        let info = sample();
        let raw = info.to_raw_bytes().unwrap();
        let mut data = b"payload".to_vec();
        data.extend_from_slice(&raw);
        let header = header_for(raw.len(), raw.len(), FLAG_BLOCKS_INFO_AT_THE_END, data.len() as u64);

        let mut reader = ByteReader::new(&data);
        let (parsed, at_end) = BlocksAndDirectoryInfo::read(&mut reader, &header).unwrap();
        assert!(at_end);
        assert_eq!(parsed, info);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn wrong_uncompressed_size_is_fatal() {
        let info = sample();
        let packed = info.to_bytes(CompressionType::Lz4).unwrap();
        let header = header_for(packed.len(), info.raw_size() + 4, 2, packed.len() as u64);
        let err = BlocksAndDirectoryInfo::read(&mut ByteReader::new(&packed), &header).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    }

    #[test]
    fn oversized_section_declaration_is_rejected() {
        let info = sample();
        let packed = info.to_bytes(CompressionType::Lz4).unwrap();
        let header = header_for(packed.len(), u32::MAX as usize, 2, packed.len() as u64);
        let err = BlocksAndDirectoryInfo::read(&mut ByteReader::new(&packed), &header).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    }

    #[test]
    fn unknown_section_codec_is_rejected() {
        let raw = sample().to_raw_bytes().unwrap();
        let header = header_for(raw.len(), raw.len(), 5, raw.len() as u64);
        let err = BlocksAndDirectoryInfo::read(&mut ByteReader::new(&raw), &header).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCodec);
    }

    #[test]
    fn non_utf8_path_survives_parse_and_serialize() {
        let mut info = sample();
        info.directories[0].path = EntryPath::from(&b"CAB-\xb2\xe2\xca\xd4"[..]);
        let raw = info.to_raw_bytes().unwrap();
        assert_eq!(raw.len(), info.raw_size());

        let parsed = BlocksAndDirectoryInfo::parse(&raw).unwrap();
        assert_eq!(parsed.directories[0].path.as_bytes(), b"CAB-\xb2\xe2\xca\xd4");
        assert_eq!(parsed.to_raw_bytes().unwrap(), raw);
        assert_eq!(parsed.directories[0].path.to_string(), "CAB-\u{fffd}\u{fffd}\u{fffd}\u{fffd}");
    }

    #[test]
    fn directory_data_slices_payload() {
        let info = sample();
        let payload: Vec<u8> = (0..150u8).collect();
        assert_eq!(info.directories[1].data(&payload).unwrap(), &payload[120..150]);
        let out_of_range = DirectoryInfo { offset: 140, size: 20, flags: 0, path: EntryPath::default() };
        assert!(out_of_range.data(&payload).is_none());
    }
}
