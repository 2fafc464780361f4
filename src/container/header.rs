//! Column header structures and their on-disk layout.
//!
//! Data header: `(controller: u16) (stride: i32) (offset: u32) (cLength: u32)
//! (uLength: u32) (crc: u32) (n_extra: u16) (extra bytes)`.
//! When `mixedStride` is set a stride header of shape
//! `(controller, cLength, uLength, crc, n_extra, extra)` follows.
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ArchiveError, Result};

/// Value type of a column. The code is stored in five controller bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Char,
    Struct,
}

impl ColumnType {
    pub fn code(self) -> u8 {
        match self {
            ColumnType::Int8 => 0,
            ColumnType::Int16 => 1,
            ColumnType::Int32 => 2,
            ColumnType::Int64 => 3,
            ColumnType::Float32 => 4,
            ColumnType::Float64 => 5,
            ColumnType::Char => 6,
            ColumnType::Struct => 7,
        }
    }

    pub fn from_code(code: u8, block_id: u64, column: u32) -> Result<Self> {
        Ok(match code {
            0 => ColumnType::Int8,
            1 => ColumnType::Int16,
            2 => ColumnType::Int32,
            3 => ColumnType::Int64,
            4 => ColumnType::Float32,
            5 => ColumnType::Float64,
            6 => ColumnType::Char,
            7 => ColumnType::Struct,
            _ => {
                return Err(ArchiveError::UnknownType {
                    block_id,
                    column,
                    code,
                })
            }
        })
    }

    /// Width in bytes of one value of this type.
    pub fn width(self) -> usize {
        match self {
            ColumnType::Int8 | ColumnType::Char | ColumnType::Struct => 1,
            ColumnType::Int16 => 2,
            ColumnType::Int32 | ColumnType::Float32 => 4,
            ColumnType::Int64 | ColumnType::Float64 => 8,
        }
    }
}

/// Entropy coder applied to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    None,
    Zstd,
}

impl Encoding {
    fn code(self) -> u8 {
        match self {
            Encoding::None => 0,
            Encoding::Zstd => 1,
        }
    }

    fn from_code(code: u8, block_id: u64, column: u32) -> Result<Self> {
        Ok(match code {
            0 => Encoding::None,
            1 => Encoding::Zstd,
            _ => {
                return Err(ArchiveError::UnknownType {
                    block_id,
                    column,
                    code,
                })
            }
        })
    }
}

/// Sixteen controller bits, LSB first:
/// `type: 5, encoding: 5, signedness: 1, uniform: 1, mixedStride: 1,
/// reserved: 3`.
#[derive(Debug, Clone, Copy)]
pub struct ColumnController {
    pub ty: ColumnType,
    pub encoding: Encoding,
    pub signed: bool,
    pub uniform: bool,
    pub mixed_stride: bool,
}

impl ColumnController {
    pub fn new(ty: ColumnType, signed: bool) -> Self {
        ColumnController {
            ty,
            encoding: Encoding::None,
            signed,
            uniform: false,
            mixed_stride: false,
        }
    }

    pub fn to_bits(self) -> u16 {
        u16::from(self.ty.code())
            | u16::from(self.encoding.code()) << 5
            | u16::from(self.signed) << 10
            | u16::from(self.uniform) << 11
            | u16::from(self.mixed_stride) << 12
    }

    pub fn from_bits(bits: u16, block_id: u64, column: u32) -> Result<Self> {
        Ok(ColumnController {
            ty: ColumnType::from_code((bits & 0x1f) as u8, block_id, column)?,
            encoding: Encoding::from_code((bits >> 5 & 0x1f) as u8, block_id, column)?,
            signed: bits >> 10 & 1 == 1,
            uniform: bits >> 11 & 1 == 1,
            mixed_stride: bits >> 12 & 1 == 1,
        })
    }
}

/// Header of a column's data buffer. `offset` is relative to the first byte
/// after the block header.
#[derive(Debug, Clone)]
pub struct ColumnHeader {
    pub controller: ColumnController,
    pub stride: i32,
    pub offset: u32,
    pub c_length: u32,
    pub u_length: u32,
    pub crc: u32,
    pub extra: Vec<u8>,
}

impl ColumnHeader {
    pub fn new(ty: ColumnType, signed: bool) -> Self {
        ColumnHeader {
            controller: ColumnController::new(ty, signed),
            stride: -1,
            offset: 0,
            c_length: 0,
            u_length: 0,
            crc: 0,
            extra: Vec::new(),
        }
    }

    /// Serialized size in bytes.
    pub fn object_size(&self) -> usize {
        2 + 4 + 4 + 4 + 4 + 4 + 2 + self.extra.len()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.controller.to_bits())?;
        writer.write_i32::<LittleEndian>(self.stride)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.c_length)?;
        writer.write_u32::<LittleEndian>(self.u_length)?;
        writer.write_u32::<LittleEndian>(self.crc)?;
        writer.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        writer.write_all(&self.extra)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, block_id: u64, column: u32) -> Result<Self> {
        let controller =
            ColumnController::from_bits(reader.read_u16::<LittleEndian>()?, block_id, column)?;
        let stride = reader.read_i32::<LittleEndian>()?;
        let offset = reader.read_u32::<LittleEndian>()?;
        let c_length = reader.read_u32::<LittleEndian>()?;
        let u_length = reader.read_u32::<LittleEndian>()?;
        let crc = reader.read_u32::<LittleEndian>()?;
        let n_extra = reader.read_u16::<LittleEndian>()?;
        let mut extra = vec![0u8; usize::from(n_extra)];
        reader.read_exact(&mut extra)?;
        Ok(ColumnHeader {
            controller,
            stride,
            offset,
            c_length,
            u_length,
            crc,
            extra,
        })
    }
}

/// Secondary header describing the stride buffer of a mixed-stride column.
#[derive(Debug, Clone)]
pub struct StrideHeader {
    pub controller: ColumnController,
    pub c_length: u32,
    pub u_length: u32,
    pub crc: u32,
    pub extra: Vec<u8>,
}

impl StrideHeader {
    pub fn new() -> Self {
        StrideHeader {
            controller: ColumnController::new(ColumnType::Int32, false),
            c_length: 0,
            u_length: 0,
            crc: 0,
            extra: Vec::new(),
        }
    }

    pub fn object_size(&self) -> usize {
        2 + 4 + 4 + 4 + 2 + self.extra.len()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.controller.to_bits())?;
        writer.write_u32::<LittleEndian>(self.c_length)?;
        writer.write_u32::<LittleEndian>(self.u_length)?;
        writer.write_u32::<LittleEndian>(self.crc)?;
        writer.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        writer.write_all(&self.extra)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, block_id: u64, column: u32) -> Result<Self> {
        let controller =
            ColumnController::from_bits(reader.read_u16::<LittleEndian>()?, block_id, column)?;
        let c_length = reader.read_u32::<LittleEndian>()?;
        let u_length = reader.read_u32::<LittleEndian>()?;
        let crc = reader.read_u32::<LittleEndian>()?;
        let n_extra = reader.read_u16::<LittleEndian>()?;
        let mut extra = vec![0u8; usize::from(n_extra)];
        reader.read_exact(&mut extra)?;
        Ok(StrideHeader {
            controller,
            c_length,
            u_length,
            crc,
            extra,
        })
    }
}

impl Default for StrideHeader {
    fn default() -> Self {
        StrideHeader::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_bits_round_trip() {
        let mut ctrl = ColumnController::new(ColumnType::Float64, true);
        ctrl.encoding = Encoding::Zstd;
        ctrl.uniform = true;
        let bits = ctrl.to_bits();
        let back = ColumnController::from_bits(bits, 0, 0).unwrap();
        assert_eq!(back.ty, ColumnType::Float64);
        assert_eq!(back.encoding, Encoding::Zstd);
        assert!(back.signed);
        assert!(back.uniform);
        assert!(!back.mixed_stride);
    }

    #[test]
    fn unknown_type_code_is_fatal() {
        // 0x1f is outside the enumerated type codes.
        assert!(ColumnController::from_bits(0x1f, 7, 3).is_err());
    }

    #[test]
    fn header_round_trip() {
        let mut header = ColumnHeader::new(ColumnType::Int32, true);
        header.stride = 2;
        header.offset = 4096;
        header.c_length = 100;
        header.u_length = 400;
        header.crc = 0xdead_beef;
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), header.object_size());
        let back = ColumnHeader::read(&mut bytes.as_slice(), 0, 0).unwrap();
        assert_eq!(back.stride, 2);
        assert_eq!(back.offset, 4096);
        assert_eq!(back.c_length, 100);
        assert_eq!(back.u_length, 400);
        assert_eq!(back.crc, 0xdead_beef);
    }
}
