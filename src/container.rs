//! Column container: one logical column of a variant block.
//!
//! A column owns an uncompressed data buffer, an optional stride buffer and
//! the headers describing both. Finalization (`update`) runs uniformity
//! detection, integer width shrinking, stride reformatting and checksum
//! computation, in that order; `compress` then produces the on-disk payload.
use std::io::{Read, Write};

use crate::buffer::ByteBuffer;
use crate::checksum::{crc32, fingerprint};
use crate::codec;
use crate::error::{ArchiveError, Result};

pub mod header;

pub use header::{ColumnHeader, ColumnType, Encoding, StrideHeader};

/// In-band sentinels of the int32 value stream.
pub const MISSING_I32: i32 = i32::MIN;
pub const EOV_I32: i32 = i32::MIN + 1;

/// Buffers shorter than this are never worth a codec round-trip.
const COMPRESS_MIN_BYTES: usize = 64;

#[derive(Debug, Clone)]
pub struct Column {
    pub header: ColumnHeader,
    pub stride_header: StrideHeader,
    /// Logical rows.
    pub n_entries: u32,
    /// Physical value appends.
    pub n_additions: u32,
    n_strides: u32,
    /// Uncompressed value bytes.
    pub data: ByteBuffer,
    /// Uncompressed stride values; u32 words until `update` reformats them.
    pub strides: ByteBuffer,
    packed_data: Option<Vec<u8>>,
    packed_strides: Option<Vec<u8>>,
}

impl Column {
    pub fn new(ty: ColumnType, signed: bool) -> Self {
        Column {
            header: ColumnHeader::new(ty, signed),
            stride_header: StrideHeader::new(),
            n_entries: 0,
            n_additions: 0,
            n_strides: 0,
            data: ByteBuffer::new(),
            strides: ByteBuffer::new(),
            packed_data: None,
            packed_strides: None,
        }
    }

    /// A column whose every row carries exactly `stride` values.
    pub fn with_stride(ty: ColumnType, signed: bool, stride: i32) -> Self {
        let mut column = Column::new(ty, signed);
        column.header.stride = stride;
        column
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0 && self.data.is_empty()
    }

    pub fn ty(&self) -> ColumnType {
        self.header.controller.ty
    }

    /// Reset for reuse; type, signedness and fixed stride are retained.
    pub fn clear(&mut self) {
        let ty = self.header.controller.ty;
        let signed = self.header.controller.signed;
        let stride = if self.header.controller.mixed_stride {
            -1
        } else {
            self.header.stride
        };
        self.header = ColumnHeader::new(ty, signed);
        self.header.stride = stride;
        self.stride_header = StrideHeader::new();
        self.n_entries = 0;
        self.n_additions = 0;
        self.n_strides = 0;
        self.data.reset();
        self.strides.reset();
        self.packed_data = None;
        self.packed_strides = None;
    }

    /// Count one logical row.
    pub fn advance(&mut self) {
        self.n_entries += 1;
    }

    pub fn add_i32(&mut self, value: i32) {
        debug_assert_eq!(self.ty(), ColumnType::Int32);
        self.data.put_i32(value);
        self.n_additions += 1;
    }

    pub fn add_f32(&mut self, value: f32) {
        debug_assert_eq!(self.ty(), ColumnType::Float32);
        self.data.put_f32(value);
        self.n_additions += 1;
    }

    /// Append without width promotion; the column keeps its declared type.
    pub fn add_literal_u8(&mut self, value: u8) {
        self.data.put_u8(value);
        self.n_additions += 1;
    }

    pub fn add_literal_u16(&mut self, value: u16) {
        self.data.put_u16(value);
        self.n_additions += 1;
    }

    pub fn add_literal_u32(&mut self, value: u32) {
        self.data.put_u32(value);
        self.n_additions += 1;
    }

    pub fn add_literal_u64(&mut self, value: u64) {
        self.data.put_u64(value);
        self.n_additions += 1;
    }

    pub fn add_chars(&mut self, bytes: &[u8]) {
        self.data.put_bytes(bytes);
        self.n_additions += bytes.len() as u32;
    }

    /// Append raw words already laid out for this column.
    pub fn add_raw(&mut self, bytes: &[u8], n_values: u32) {
        self.data.put_bytes(bytes);
        self.n_additions += n_values;
    }

    /// Record the number of values the current row carries. The first
    /// differing stride switches the column to mixed-stride mode and
    /// backfills the stride buffer for all earlier rows.
    pub fn add_stride(&mut self, value: u32) {
        if self.header.controller.mixed_stride {
            self.strides.put_u32(value);
            self.n_strides += 1;
        } else if self.n_strides == 0 {
            self.header.stride = value as i32;
            self.n_strides = 1;
        } else if self.header.stride == value as i32 {
            self.n_strides += 1;
        } else {
            self.header.controller.mixed_stride = true;
            for _ in 0..self.n_strides {
                self.strides.put_u32(self.header.stride as u32);
            }
            self.strides.put_u32(value);
            self.n_strides += 1;
            self.header.stride = -1;
        }
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Finalize the column: uniformity check, integer width shrinking,
    /// stride reformat, checksum. Idempotent.
    pub fn update(&mut self) {
        self.check_uniformity();
        self.shrink();
        self.reformat_strides();

        self.header.u_length = self.data.len() as u32;
        if !self.header.controller.uniform {
            self.header.c_length = self.header.u_length;
        }
        self.header.crc = if self.data.is_empty() {
            0
        } else {
            crc32(&self.data)
        };

        if self.header.controller.mixed_stride {
            self.stride_header.u_length = self.strides.len() as u32;
            self.stride_header.c_length = self.stride_header.u_length;
            self.stride_header.crc = if self.strides.is_empty() {
                0
            } else {
                crc32(&self.strides)
            };
        }
    }

    /// Collapse the column to a single row if every logical row holds the
    /// same bytes. Requires a fixed positive stride and more than one row
    /// (a single-row column proceeds to width shrinking instead).
    fn check_uniformity(&mut self) {
        if self.n_entries <= 1 || self.header.controller.uniform {
            return;
        }
        if self.header.controller.mixed_stride || self.header.stride <= 0 {
            return;
        }
        let row_bytes = self.header.stride as usize * self.ty().width();
        if row_bytes == 0 || self.n_entries as usize * row_bytes != self.data.len() {
            return;
        }

        let first = fingerprint(&self.data[..row_bytes]);
        for row in 1..self.n_entries as usize {
            let range = row * row_bytes..(row + 1) * row_bytes;
            if fingerprint(&self.data[range]) != first {
                return;
            }
        }

        self.data.truncate(row_bytes);
        self.n_entries = 1;
        self.n_additions = self.header.stride as u32;
        self.header.u_length = row_bytes as u32;
        self.header.c_length = row_bytes as u32;
        self.header.controller.uniform = true;
        self.header.controller.mixed_stride = false;
        self.header.controller.encoding = Encoding::None;
    }

    /// Re-emit a signed int32 column at the smallest width that holds its
    /// value range, remapping the in-band sentinels to the narrower width.
    fn shrink(&mut self) {
        if self.ty() != ColumnType::Int32
            || !self.header.controller.signed
            || self.header.controller.uniform
            || self.data.is_empty()
        {
            return;
        }

        let words: Vec<u32> = self
            .data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let mut min = i64::MAX;
        let mut max = i64::MIN;
        let mut has_sentinel = false;
        for &word in &words {
            if word == MISSING_I32 as u32 || word == EOV_I32 as u32 {
                has_sentinel = true;
                continue;
            }
            let value = i64::from(word as i32);
            min = min.min(value);
            max = max.max(value);
        }
        if min > max {
            // Nothing but sentinels.
            min = 0;
            max = 0;
        }

        let mut shrunk = ByteBuffer::with_capacity(self.data.len());
        if min >= 0 && !has_sentinel {
            let width = unsigned_width(max as u64);
            if width == 4 {
                // Same bytes; only the declared signedness changes.
                self.header.controller.signed = false;
                return;
            }
            self.header.controller.signed = false;
            self.header.controller.ty = match width {
                1 => ColumnType::Int8,
                2 => ColumnType::Int16,
                _ => ColumnType::Int64,
            };
            for &word in &words {
                match width {
                    1 => shrunk.put_u8(word as u8),
                    2 => shrunk.put_u16(word as u16),
                    _ => shrunk.put_u64(u64::from(word)),
                }
            }
        } else {
            let width = signed_width(min, max);
            if width == 4 {
                return;
            }
            self.header.controller.ty = match width {
                1 => ColumnType::Int8,
                _ => ColumnType::Int16,
            };
            for &word in &words {
                let value = word as i32;
                match width {
                    1 => {
                        if value == MISSING_I32 {
                            shrunk.put_u8(0x80);
                        } else if value == EOV_I32 {
                            shrunk.put_u8(0x81);
                        } else {
                            shrunk.put_i8(value as i8);
                        }
                    }
                    _ => {
                        if value == MISSING_I32 {
                            shrunk.put_u16(0x8000);
                        } else if value == EOV_I32 {
                            shrunk.put_u16(0x8001);
                        } else {
                            shrunk.put_i16(value as i16);
                        }
                    }
                }
            }
        }
        self.data = shrunk;
    }

    /// Shrink the stride buffer to the smallest unsigned width that fits
    /// its maximum.
    fn reformat_strides(&mut self) {
        if !self.header.controller.mixed_stride
            || self.strides.is_empty()
            || self.stride_header.controller.ty != ColumnType::Int32
        {
            return;
        }

        let values: Vec<u32> = self
            .strides
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let max = values.iter().copied().max().unwrap_or(0);
        let width = unsigned_width(u64::from(max));
        if width == 4 {
            return;
        }

        let mut shrunk = ByteBuffer::with_capacity(self.strides.len());
        self.stride_header.controller.ty = match width {
            1 => ColumnType::Int8,
            2 => ColumnType::Int16,
            _ => ColumnType::Int64,
        };
        for value in values {
            match width {
                1 => shrunk.put_u8(value as u8),
                2 => shrunk.put_u16(value as u16),
                _ => shrunk.put_u64(u64::from(value)),
            }
        }
        self.strides = shrunk;
    }

    // ------------------------------------------------------------------
    // Compression and payload I/O
    // ------------------------------------------------------------------

    /// Produce the on-disk payload. Uniform columns are stored raw; other
    /// buffers are entropy-coded only when the codec actually wins.
    pub fn compress(&mut self) -> Result<()> {
        self.packed_data = None;
        self.packed_strides = None;
        if self.header.controller.uniform {
            return Ok(());
        }

        if self.data.len() >= COMPRESS_MIN_BYTES {
            let packed = codec::compress(&self.data)?;
            if packed.len() < self.data.len() {
                self.header.c_length = packed.len() as u32;
                self.header.controller.encoding = Encoding::Zstd;
                self.packed_data = Some(packed);
            }
        }

        if self.header.controller.mixed_stride && self.strides.len() >= COMPRESS_MIN_BYTES {
            let packed = codec::compress(&self.strides)?;
            if packed.len() < self.strides.len() {
                self.stride_header.c_length = packed.len() as u32;
                self.stride_header.controller.encoding = Encoding::Zstd;
                self.packed_strides = Some(packed);
            }
        }
        Ok(())
    }

    /// On-disk payload size: data bytes plus stride bytes.
    pub fn payload_size(&self) -> u32 {
        let mut total = self.header.c_length;
        if self.header.controller.mixed_stride {
            total += self.stride_header.c_length;
        }
        total
    }

    /// Write the payload (data, then strides) to `writer`.
    pub fn write_payload<W: Write>(&self, writer: &mut W) -> Result<()> {
        match &self.packed_data {
            Some(packed) => writer.write_all(packed)?,
            None => writer.write_all(&self.data)?,
        }
        if self.header.controller.mixed_stride {
            match &self.packed_strides {
                Some(packed) => writer.write_all(packed)?,
                None => writer.write_all(&self.strides)?,
            }
        }
        Ok(())
    }

    /// Read a payload previously written by [`Column::write_payload`],
    /// decompress it and verify both checksums.
    pub fn read_payload<R: Read>(
        reader: &mut R,
        header: ColumnHeader,
        stride_header: StrideHeader,
        block_id: u64,
        column: u32,
    ) -> Result<Self> {
        let mut raw = vec![0u8; header.c_length as usize];
        reader.read_exact(&mut raw)?;
        let data = match header.controller.encoding {
            Encoding::None => raw,
            Encoding::Zstd => codec::decompress(&raw, header.u_length as usize)?,
        };
        if !data.is_empty() {
            let computed = crc32(&data);
            if computed != header.crc {
                return Err(ArchiveError::ChecksumMismatch {
                    block_id,
                    column,
                    stored: header.crc,
                    computed,
                });
            }
        }

        let strides = if header.controller.mixed_stride {
            let mut raw = vec![0u8; stride_header.c_length as usize];
            reader.read_exact(&mut raw)?;
            let bytes = match stride_header.controller.encoding {
                Encoding::None => raw,
                Encoding::Zstd => codec::decompress(&raw, stride_header.u_length as usize)?,
            };
            // The stride buffer is verified against its own checksum.
            if !bytes.is_empty() {
                let computed = crc32(&bytes);
                if computed != stride_header.crc {
                    return Err(ArchiveError::ChecksumMismatch {
                        block_id,
                        column,
                        stored: stride_header.crc,
                        computed,
                    });
                }
            }
            bytes
        } else {
            Vec::new()
        };

        Ok(Column {
            header,
            stride_header,
            n_entries: 0,
            n_additions: 0,
            n_strides: 0,
            data: ByteBuffer::from(data),
            strides: ByteBuffer::from(strides),
            packed_data: None,
            packed_strides: None,
        })
    }

    // ------------------------------------------------------------------
    // Decode access
    // ------------------------------------------------------------------

    /// Stride of logical row `entry`.
    pub fn stride_of(&self, entry: usize) -> Result<u32> {
        if !self.header.controller.mixed_stride {
            return Ok(self.header.stride.max(0) as u32);
        }
        let width = self.stride_header.controller.ty.width();
        let offset = entry * width;
        if offset + width > self.strides.len() {
            return Err(ArchiveError::Truncated {
                what: "stride buffer",
                offset: offset as u64,
            });
        }
        let bytes = &self.strides[offset..offset + width];
        Ok(match self.stride_header.controller.ty {
            ColumnType::Int8 => u32::from(bytes[0]),
            ColumnType::Int16 => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            ColumnType::Int32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            ColumnType::Int64 => u64::from_le_bytes(bytes.try_into().expect("eight bytes")) as u32,
            other => {
                return Err(ArchiveError::InvariantViolation(format!(
                    "stride buffer typed {other:?}"
                )))
            }
        })
    }

    /// Decode the physical value stream back to i32, mapping width-specific
    /// sentinels back to the int32 sentinels.
    pub fn decode_i32s(&self) -> Result<Vec<i32>> {
        let signed = self.header.controller.signed;
        match self.ty() {
            ColumnType::Int8 => Ok(self
                .data
                .iter()
                .map(|&b| {
                    if signed {
                        match b {
                            0x80 => MISSING_I32,
                            0x81 => EOV_I32,
                            _ => i32::from(b as i8),
                        }
                    } else {
                        i32::from(b)
                    }
                })
                .collect()),
            ColumnType::Int16 => Ok(self
                .data
                .chunks_exact(2)
                .map(|c| {
                    let word = u16::from_le_bytes([c[0], c[1]]);
                    if signed {
                        match word {
                            0x8000 => MISSING_I32,
                            0x8001 => EOV_I32,
                            _ => i32::from(word as i16),
                        }
                    } else {
                        i32::from(word)
                    }
                })
                .collect()),
            ColumnType::Int32 => Ok(self
                .data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()),
            ColumnType::Int64 => Ok(self
                .data
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().expect("eight bytes")) as i32)
                .collect()),
            other => Err(ArchiveError::InvariantViolation(format!(
                "integer decode of {other:?} column"
            ))),
        }
    }

    pub fn decode_f32s(&self) -> Result<Vec<f32>> {
        if self.ty() != ColumnType::Float32 {
            return Err(ArchiveError::InvariantViolation(format!(
                "float decode of {:?} column",
                self.ty()
            )));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_bits(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect())
    }

    /// Decode unsigned words of the column's width to u64. Used by the
    /// genotype streams.
    pub fn decode_words(&self) -> Result<Vec<u64>> {
        let width = self.ty().width();
        if self.data.len() % width != 0 {
            return Err(ArchiveError::Truncated {
                what: "word stream",
                offset: self.data.len() as u64,
            });
        }
        Ok(self
            .data
            .chunks_exact(width)
            .map(|c| {
                let mut word = [0u8; 8];
                word[..width].copy_from_slice(c);
                u64::from_le_bytes(word)
            })
            .collect())
    }
}

/// Smallest unsigned width in {1, 2, 4, 8} that holds `max`.
fn unsigned_width(max: u64) -> usize {
    if max <= u64::from(u8::MAX) {
        1
    } else if max <= u64::from(u16::MAX) {
        2
    } else if max <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}

/// Smallest signed width in {1, 2, 4} whose non-sentinel range holds
/// `[min, max]`. The two most negative encodings of every width are reserved
/// for the sentinels.
fn signed_width(min: i64, max: i64) -> usize {
    for width in [1usize, 2, 4] {
        let lo = -(1i64 << (8 * width - 1)) + 2;
        let hi = (1i64 << (8 * width - 1)) - 1;
        if min >= lo && max <= hi {
            return width;
        }
    }
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_column(values: &[i32]) -> Column {
        let mut column = Column::with_stride(ColumnType::Int32, true, 1);
        for &v in values {
            column.add_i32(v);
            column.advance();
        }
        column
    }

    #[test]
    fn uniformity_collapses_identical_rows() {
        let mut column = int_column(&[42; 100]);
        column.update();
        assert!(column.header.controller.uniform);
        assert_eq!(column.n_entries, 1);
        assert_eq!(column.data.len(), 4);
        assert_eq!(column.header.u_length, column.header.c_length);
    }

    #[test]
    fn update_is_idempotent() {
        let mut column = int_column(&[42; 100]);
        column.update();
        let bytes = column.data.clone();
        let crc = column.header.crc;
        column.update();
        assert_eq!(column.data, bytes);
        assert_eq!(column.header.crc, crc);

        let mut mixed = int_column(&[1, 500, -3, MISSING_I32]);
        mixed.update();
        let bytes = mixed.data.clone();
        mixed.update();
        assert_eq!(mixed.data, bytes);
    }

    #[test]
    fn shrink_non_negative_to_u8() {
        let mut column = int_column(&[5, 5, 9]);
        column.update();
        assert_eq!(column.ty(), ColumnType::Int8);
        assert!(!column.header.controller.signed);
        assert_eq!(column.data.len(), 3);
        assert_eq!(column.decode_i32s().unwrap(), vec![5, 5, 9]);
    }

    #[test]
    fn shrink_preserves_sentinels() {
        let values = [7, MISSING_I32, -2, EOV_I32, 100];
        let mut column = int_column(&values);
        column.update();
        assert_eq!(column.ty(), ColumnType::Int8);
        assert!(column.header.controller.signed);
        assert_eq!(column.decode_i32s().unwrap(), values);
    }

    #[test]
    fn sentinel_patterns_never_come_from_values() {
        // -128 and -127 need i8 range but collide with the i8 sentinels, so
        // the shrink must widen to 16 bits.
        let values = [-128, -127, 0];
        let mut column = int_column(&values);
        column.update();
        assert_eq!(column.ty(), ColumnType::Int16);
        assert_eq!(column.decode_i32s().unwrap(), values);
    }

    #[test]
    fn mixed_stride_backfill_and_reformat() {
        let mut column = Column::new(ColumnType::Int32, true);
        for (stride, values) in [(2u32, vec![1, 2]), (2, vec![3, 4]), (3, vec![5, 6, 7])] {
            for v in values {
                column.add_i32(v);
            }
            column.advance();
            column.add_stride(stride);
        }
        assert!(column.header.controller.mixed_stride);
        column.update();
        assert_eq!(column.stride_header.controller.ty, ColumnType::Int8);
        assert_eq!(column.stride_of(0).unwrap(), 2);
        assert_eq!(column.stride_of(2).unwrap(), 3);
        assert_ne!(column.stride_header.crc, 0);
    }

    #[test]
    fn payload_round_trip_with_checksum() {
        let values: Vec<i32> = (0..200).map(|i| i % 17).collect();
        let mut column = int_column(&values);
        column.update();
        column.compress().unwrap();

        let mut payload = Vec::new();
        column.write_payload(&mut payload).unwrap();
        assert_eq!(payload.len(), column.payload_size() as usize);

        let back = Column::read_payload(
            &mut payload.as_slice(),
            column.header.clone(),
            column.stride_header.clone(),
            0,
            0,
        )
        .unwrap();
        assert_eq!(back.decode_i32s().unwrap(), values);
    }

    #[test]
    fn corrupted_payload_is_a_checksum_mismatch() {
        let values: Vec<i32> = (0..100).collect();
        let mut column = int_column(&values);
        column.update();
        // Leave the payload uncompressed so the flip lands in value bytes.
        let mut payload = Vec::new();
        column.write_payload(&mut payload).unwrap();
        payload[10] ^= 0xff;

        let err = Column::read_payload(
            &mut payload.as_slice(),
            column.header.clone(),
            column.stride_header.clone(),
            3,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::ChecksumMismatch { block_id: 3, .. }));
    }
}
