//! Block footer: stream counts, the per-column headers (permutation column
//! first, then the fixed columns in write order, then the dynamic columns
//! with their global ids), and the per-category pattern tables.
//!
//! The footer is written uncompressed; a u32 byte length and the 8-byte
//! end-of-block marker follow it.
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::container::{ColumnHeader, ColumnType, StrideHeader};
use crate::error::Result;
use crate::pattern::PatternBitset;

/// Number of fixed columns serialized per block, in write order: contig,
/// position, controller, quality, names, ref/alt, alleles, the three
/// pattern-id columns, the genotype support column, four RLE genotype
/// streams and four BCF-style genotype streams.
pub const N_FIXED_COLUMNS: usize = 19;

/// Header pair of one serialized column; the stride header exists only for
/// mixed-stride columns.
#[derive(Debug, Clone)]
pub struct FooterEntry {
    pub header: ColumnHeader,
    pub stride_header: Option<StrideHeader>,
}

impl FooterEntry {
    pub fn empty() -> Self {
        FooterEntry {
            header: ColumnHeader::new(ColumnType::Int8, false),
            stride_header: None,
        }
    }

    pub fn object_size(&self) -> usize {
        self.header.object_size()
            + self
                .stride_header
                .as_ref()
                .map_or(0, StrideHeader::object_size)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write(writer)?;
        if let Some(stride_header) = &self.stride_header {
            stride_header.write(writer)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, block_id: u64, column: u32) -> Result<Self> {
        let header = ColumnHeader::read(reader, block_id, column)?;
        let stride_header = if header.controller.mixed_stride {
            Some(StrideHeader::read(reader, block_id, column)?)
        } else {
            None
        };
        Ok(FooterEntry {
            header,
            stride_header,
        })
    }
}

/// Footer entry of a dynamic (INFO/FORMAT/FILTER) column, keyed by the
/// field's global id.
#[derive(Debug, Clone)]
pub struct DynamicEntry {
    pub global_id: u32,
    pub entry: FooterEntry,
}

impl DynamicEntry {
    pub fn object_size(&self) -> usize {
        4 + self.entry.object_size()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.global_id)?;
        self.entry.write(writer)
    }

    pub fn read<R: Read>(reader: &mut R, block_id: u64, column: u32) -> Result<Self> {
        let global_id = reader.read_u32::<LittleEndian>()?;
        Ok(DynamicEntry {
            global_id,
            entry: FooterEntry::read(reader, block_id, column)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BlockFooter {
    pub ppa: FooterEntry,
    pub fixed: Vec<FooterEntry>,
    pub info: Vec<DynamicEntry>,
    pub format: Vec<DynamicEntry>,
    pub filter: Vec<DynamicEntry>,
    pub info_patterns: Vec<PatternBitset>,
    pub format_patterns: Vec<PatternBitset>,
    pub filter_patterns: Vec<PatternBitset>,
}

impl Default for BlockFooter {
    fn default() -> Self {
        BlockFooter {
            ppa: FooterEntry::empty(),
            fixed: (0..N_FIXED_COLUMNS).map(|_| FooterEntry::empty()).collect(),
            info: Vec::new(),
            format: Vec::new(),
            filter: Vec::new(),
            info_patterns: Vec::new(),
            format_patterns: Vec::new(),
            filter_patterns: Vec::new(),
        }
    }
}

impl BlockFooter {
    pub fn object_size(&self) -> usize {
        let mut total = 6 * 2;
        total += self.ppa.object_size();
        total += self.fixed.iter().map(FooterEntry::object_size).sum::<usize>();
        total += self.info.iter().map(DynamicEntry::object_size).sum::<usize>();
        total += self
            .format
            .iter()
            .map(DynamicEntry::object_size)
            .sum::<usize>();
        total += self
            .filter
            .iter()
            .map(DynamicEntry::object_size)
            .sum::<usize>();
        total += self
            .info_patterns
            .iter()
            .chain(&self.format_patterns)
            .chain(&self.filter_patterns)
            .map(PatternBitset::object_size)
            .sum::<usize>();
        total
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.info.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.format.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.filter.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.info_patterns.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.format_patterns.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.filter_patterns.len() as u16)?;

        self.ppa.write(writer)?;
        for entry in &self.fixed {
            entry.write(writer)?;
        }
        for entry in &self.info {
            entry.write(writer)?;
        }
        for entry in &self.format {
            entry.write(writer)?;
        }
        for entry in &self.filter {
            entry.write(writer)?;
        }

        for bitset in &self.info_patterns {
            bitset.write(writer)?;
        }
        for bitset in &self.format_patterns {
            bitset.write(writer)?;
        }
        for bitset in &self.filter_patterns {
            bitset.write(writer)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, block_id: u64) -> Result<Self> {
        let n_info = reader.read_u16::<LittleEndian>()?;
        let n_format = reader.read_u16::<LittleEndian>()?;
        let n_filter = reader.read_u16::<LittleEndian>()?;
        let n_info_patterns = reader.read_u16::<LittleEndian>()?;
        let n_format_patterns = reader.read_u16::<LittleEndian>()?;
        let n_filter_patterns = reader.read_u16::<LittleEndian>()?;

        let ppa = FooterEntry::read(reader, block_id, 0)?;
        let mut fixed = Vec::with_capacity(N_FIXED_COLUMNS);
        for column in 0..N_FIXED_COLUMNS {
            fixed.push(FooterEntry::read(reader, block_id, column as u32 + 1)?);
        }
        let mut info = Vec::with_capacity(usize::from(n_info));
        for column in 0..n_info {
            info.push(DynamicEntry::read(reader, block_id, u32::from(column))?);
        }
        let mut format = Vec::with_capacity(usize::from(n_format));
        for column in 0..n_format {
            format.push(DynamicEntry::read(reader, block_id, u32::from(column))?);
        }
        let mut filter = Vec::with_capacity(usize::from(n_filter));
        for column in 0..n_filter {
            filter.push(DynamicEntry::read(reader, block_id, u32::from(column))?);
        }

        let read_patterns =
            |reader: &mut R, count: u16, width: usize| -> Result<Vec<PatternBitset>> {
                (0..count)
                    .map(|_| PatternBitset::read(reader, width))
                    .collect()
            };
        let info_patterns =
            read_patterns(reader, n_info_patterns, usize::from(n_info).div_ceil(8))?;
        let format_patterns =
            read_patterns(reader, n_format_patterns, usize::from(n_format).div_ceil(8))?;
        let filter_patterns =
            read_patterns(reader, n_filter_patterns, usize::from(n_filter).div_ceil(8))?;

        Ok(BlockFooter {
            ppa,
            fixed,
            info,
            format,
            filter,
            info_patterns,
            format_patterns,
            filter_patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ColumnType;

    #[test]
    fn footer_round_trip() {
        let mut footer = BlockFooter::default();
        footer.fixed[1].header.offset = 100;
        footer.fixed[1].header.u_length = 400;
        footer.info.push(DynamicEntry {
            global_id: 9,
            entry: FooterEntry {
                header: ColumnHeader::new(ColumnType::Float32, false),
                stride_header: None,
            },
        });
        footer.info_patterns.push(PatternBitset {
            locals: vec![0],
            bits: vec![0b1],
        });

        let mut bytes = Vec::new();
        footer.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), footer.object_size());

        let back = BlockFooter::read(&mut bytes.as_slice(), 0).unwrap();
        assert_eq!(back.fixed[1].header.offset, 100);
        assert_eq!(back.fixed[1].header.u_length, 400);
        assert_eq!(back.info.len(), 1);
        assert_eq!(back.info[0].global_id, 9);
        assert_eq!(back.info_patterns.len(), 1);
        assert!(back.info_patterns[0].contains(0));
    }
}
