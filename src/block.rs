use serde::Serialize;

use crate::codec::{CodecError, CompressionType, COMPRESSION_TYPE_MASK};
use crate::cursor::{ByteReader, ByteWriter, CursorError};

pub const BLOCK_FLAG_STREAMED: u16 = 0x40;
/// Legacy bit some writers leave set; it must not influence codec selection.
pub const BLOCK_FLAG_LEGACY_COMPATIBILITY: u16 = 0x100;

/// On-disk size of one storage block record.
pub const STORAGE_BLOCK_INFO_SIZE: usize = 4 + 4 + 2;

/// One physically compressed chunk of the bundle payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageBlockInfo {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
}

impl StorageBlockInfo {
    pub fn new(uncompressed_size: u32) -> Self {
        Self { uncompressed_size, compressed_size: 0, flags: 0 }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, CursorError> {
        Ok(Self {
            uncompressed_size: reader.read_u32()?,
            compressed_size: reader.read_u32()?,
            flags: reader.read_i16()? as u16,
        })
    }

    pub fn write(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u32(self.uncompressed_size)?;
        writer.write_u32(self.compressed_size)?;
        writer.write_i16(self.flags as i16)
    }

    pub fn compression_type(&self) -> Result<CompressionType, CodecError> {
        CompressionType::from_flags(self.flags as u32)
    }

    pub fn set_compression_type(&mut self, compression: CompressionType) {
        self.flags = (self.flags & !(COMPRESSION_TYPE_MASK as u16)) | compression.tag() as u16;
    }

    pub fn is_streamed(&self) -> bool {
        self.flags & BLOCK_FLAG_STREAMED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let block = StorageBlockInfo { uncompressed_size: 0x20000, compressed_size: 0x1234, flags: 0x43 };
        let mut buf = [0u8; STORAGE_BLOCK_INFO_SIZE];
        block.write(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf, [0, 2, 0, 0, 0, 0, 0x12, 0x34, 0, 0x43]);
        assert_eq!(StorageBlockInfo::read(&mut ByteReader::new(&buf)).unwrap(), block);
    }

    #[test]
    fn flag_helpers() {
        let mut block = StorageBlockInfo { flags: 0x142, ..Default::default() };
        assert_eq!(block.compression_type().unwrap(), CompressionType::Lz4);
        assert!(block.is_streamed());
        block.set_compression_type(CompressionType::Lzma);
        assert_eq!(block.flags, 0x141);
        block.flags = 0x3f;
        assert_eq!(block.compression_type(), Err(CodecError::UnsupportedCodec(0x3f)));
    }

    #[test]
    fn negative_on_disk_flags_survive() {
        let buf = [0, 0, 0, 1, 0, 0, 0, 1, 0xFF, 0xC2];
        let block = StorageBlockInfo::read(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(block.flags, 0xFFC2);
        let mut out = [0u8; STORAGE_BLOCK_INFO_SIZE];
        block.write(&mut ByteWriter::new(&mut out)).unwrap();
        assert_eq!(out, buf);
    }
}
