//! Block header: `(block_id: u64) (contigID: i32) (minPosition: i64)
//! (maxPosition: i64) (n_variants: u32) (controller: u16)
//! (l_offset_footer: u32)`, 38 bytes, little-endian.
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;

pub const BLOCK_HEADER_SIZE: u64 = 8 + 4 + 8 + 8 + 4 + 2 + 4;

/// Block controller bits, LSB first: `hasGT, hasGTPermuted, reserved: 14`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockController {
    pub has_gt: bool,
    pub has_gt_permuted: bool,
}

impl BlockController {
    pub fn to_bits(self) -> u16 {
        u16::from(self.has_gt) | u16::from(self.has_gt_permuted) << 1
    }

    pub fn from_bits(bits: u16) -> Self {
        BlockController {
            has_gt: bits & 1 == 1,
            has_gt_permuted: bits >> 1 & 1 == 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockHeader {
    pub block_id: u64,
    pub contig_id: i32,
    pub min_position: i64,
    pub max_position: i64,
    pub n_variants: u32,
    pub controller: BlockController,
    /// Bytes from the first byte after this header to the footer start.
    pub l_offset_footer: u32,
}

impl BlockHeader {
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.block_id)?;
        writer.write_i32::<LittleEndian>(self.contig_id)?;
        writer.write_i64::<LittleEndian>(self.min_position)?;
        writer.write_i64::<LittleEndian>(self.max_position)?;
        writer.write_u32::<LittleEndian>(self.n_variants)?;
        writer.write_u16::<LittleEndian>(self.controller.to_bits())?;
        writer.write_u32::<LittleEndian>(self.l_offset_footer)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(BlockHeader {
            block_id: reader.read_u64::<LittleEndian>()?,
            contig_id: reader.read_i32::<LittleEndian>()?,
            min_position: reader.read_i64::<LittleEndian>()?,
            max_position: reader.read_i64::<LittleEndian>()?,
            n_variants: reader.read_u32::<LittleEndian>()?,
            controller: BlockController::from_bits(reader.read_u16::<LittleEndian>()?),
            l_offset_footer: reader.read_u32::<LittleEndian>()?,
        })
    }
}
