//! LZMA in the bundle's framing.
//!
//! Bundles store LZMA1 data as the 5-byte properties header immediately
//! followed by the range-coded stream.  The "alone" (`.lzma`) container that
//! liblzma speaks has an extra 8-byte little-endian uncompressed-size field
//! between those two parts:
//!
//! ```text
//! bundle:  [ props (5 B) | stream ... ]
//! alone:   [ props (5 B) | size u64 LE (8 B) | stream ... ]
//! ```
//!
//! Decoding splices the expected size in; encoding cuts the encoder's size
//! field back out.

use std::io::Write;

use xz2::stream::{Action, LzmaOptions, Status, Stream};

use super::{Codec, CodecError, CompressionType};

/// Byte length of the LZMA properties header (lc/lp/pb byte + dictionary size).
pub const PROPERTIES_SIZE: usize = 5;
/// Byte length of the size field the alone container carries and bundles omit.
pub const SIZE_FIELD_LEN: usize = 8;
/// Alone container header: properties plus size field.
pub const ALONE_HEADER_SIZE: usize = PROPERTIES_SIZE + SIZE_FIELD_LEN;
/// Dictionary size used when encoding.
pub const DICTIONARY_SIZE: u32 = 0x20_0000;

/// Output grows by at most this much per decoder call.
const OUTPUT_STEP: usize = 1 << 20;

const PRESET_LEVEL: u32 = 9;
const PRESET_EXTREME: u32 = 0x8000_0000;

pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn compression_type(&self) -> CompressionType { CompressionType::Lzma }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut options = LzmaOptions::new_preset(PRESET_LEVEL | PRESET_EXTREME)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        options.dict_size(DICTIONARY_SIZE);
        let stream = Stream::new_lzma_encoder(&options)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        let capacity = data.len() + data.len() / 3 + 128;
        let mut encoder = xz2::write::XzEncoder::new_stream(Vec::with_capacity(capacity), stream);
        encoder.write_all(data).map_err(|e| CodecError::Encode(e.to_string()))?;
        let encoded = encoder.finish().map_err(|e| CodecError::Encode(e.to_string()))?;
        strip_size_field(encoded)
    }

    fn decompress(&self, data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        let framed = insert_size_field(data, out.len() as u64)?;
        let mut stream = Stream::new_lzma_decoder(u64::MAX)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let status = stream
            .process(&framed, out, Action::Run)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        if status != Status::StreamEnd {
            return Err(CodecError::Decode(format!(
                "stream did not end after {} of {} byte(s)",
                stream.total_out(),
                out.len()
            )));
        }
        let produced = stream.total_out();
        if produced != out.len() as u64 {
            return Err(CodecError::Decode(format!(
                "stream ended after {} byte(s), expected {}",
                produced,
                out.len()
            )));
        }
        Ok(out.len())
    }

    /// Streams into `out`, so memory grows with what the data actually
    /// decodes to rather than with the declared size.
    fn decompress_append(&self, data: &[u8], expected: usize, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let framed = insert_size_field(data, expected as u64)?;
        let mut stream = Stream::new_lzma_decoder(u64::MAX)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let target = out
            .len()
            .checked_add(expected)
            .ok_or_else(|| CodecError::Decode(format!("declared size {} overflows", expected)))?;

        let mut input = &framed[..];
        loop {
            super::reserve(out, (target - out.len()).min(OUTPUT_STEP))?;
            let (in_before, out_before) = (stream.total_in(), stream.total_out());
            let status = stream
                .process_vec(input, out, Action::Run)
                .map_err(|e| CodecError::Decode(e.to_string()))?;
            input = &input[(stream.total_in() - in_before) as usize..];
            if status == Status::StreamEnd {
                break;
            }
            if stream.total_in() == in_before && stream.total_out() == out_before {
                return Err(CodecError::Decode(format!(
                    "stream stopped after {} of {} byte(s)",
                    stream.total_out(),
                    expected
                )));
            }
        }

        if stream.total_out() != expected as u64 {
            return Err(CodecError::Decode(format!(
                "stream ended after {} byte(s), expected {}",
                stream.total_out(),
                expected
            )));
        }
        Ok(())
    }
}

/// Turn bundle-framed LZMA into an alone stream declaring `uncompressed_size`.
pub fn insert_size_field(data: &[u8], uncompressed_size: u64) -> Result<Vec<u8>, CodecError> {
    if data.len() < PROPERTIES_SIZE {
        return Err(CodecError::Decode(format!(
            "LZMA data too small to contain properties ({} byte(s))",
            data.len()
        )));
    }
    let mut framed = Vec::with_capacity(data.len() + SIZE_FIELD_LEN);
    framed.extend_from_slice(&data[..PROPERTIES_SIZE]);
    framed.extend_from_slice(&uncompressed_size.to_le_bytes());
    framed.extend_from_slice(&data[PROPERTIES_SIZE..]);
    Ok(framed)
}

/// Turn an alone stream into bundle framing.
///
/// The properties are copied over the tail of the size field and the output
/// starts at offset 8, so the buffer is reused instead of reallocated.
pub fn strip_size_field(mut encoded: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    if encoded.len() < ALONE_HEADER_SIZE {
        return Err(CodecError::Encode(format!(
            "LZMA output too small ({} byte(s))",
            encoded.len()
        )));
    }
    encoded.copy_within(..PROPERTIES_SIZE, SIZE_FIELD_LEN);
    encoded.drain(..SIZE_FIELD_LEN);
    Ok(encoded)
}
