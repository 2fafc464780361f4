//! Per-field digest table: a running SHA-512 over the uncompressed column
//! bytes of every INFO and FORMAT field across all blocks. Written between
//! the index and the file footer; a verifier can re-derive it from the
//! blocks and compare at field granularity.
use std::collections::BTreeMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha512};

use crate::block::VariantBlock;
use crate::error::Result;

pub const DIGEST_LEN: usize = 64;

#[derive(Debug, Default)]
pub struct FieldDigests {
    info: BTreeMap<u32, Sha512>,
    format: BTreeMap<u32, Sha512>,
}

impl FieldDigests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finalized block into the running digests.
    pub fn add_block(&mut self, block: &VariantBlock) {
        for (entry, column) in block.footer.info.iter().zip(&block.info_columns) {
            self.info
                .entry(entry.global_id)
                .or_default()
                .update(column.data.as_slice());
        }
        for (entry, column) in block.footer.format.iter().zip(&block.format_columns) {
            self.format
                .entry(entry.global_id)
                .or_default()
                .update(column.data.as_slice());
        }
    }

    pub fn finish(self) -> DigestTable {
        let seal = |map: BTreeMap<u32, Sha512>| {
            map.into_iter()
                .map(|(id, digest)| {
                    let mut bytes = [0u8; DIGEST_LEN];
                    bytes.copy_from_slice(&digest.finalize());
                    (id, bytes)
                })
                .collect()
        };
        DigestTable {
            info: seal(self.info),
            format: seal(self.format),
        }
    }
}

/// Sealed digest table as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestTable {
    pub info: Vec<(u32, [u8; DIGEST_LEN])>,
    pub format: Vec<(u32, [u8; DIGEST_LEN])>,
}

impl DigestTable {
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let write_side = |writer: &mut W, side: &[(u32, [u8; DIGEST_LEN])]| -> Result<()> {
            writer.write_u32::<LittleEndian>(side.len() as u32)?;
            for (global_id, digest) in side {
                writer.write_u32::<LittleEndian>(*global_id)?;
                writer.write_all(digest)?;
            }
            Ok(())
        };
        write_side(writer, &self.info)?;
        write_side(writer, &self.format)
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let read_side = |reader: &mut R| -> Result<Vec<(u32, [u8; DIGEST_LEN])>> {
            let count = reader.read_u32::<LittleEndian>()?;
            let mut side = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let global_id = reader.read_u32::<LittleEndian>()?;
                let mut digest = [0u8; DIGEST_LEN];
                reader.read_exact(&mut digest)?;
                side.push((global_id, digest));
            }
            Ok(side)
        };
        Ok(DigestTable {
            info: read_side(reader)?,
            format: read_side(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_io_round_trip() {
        let table = DigestTable {
            info: vec![(3, [7u8; DIGEST_LEN])],
            format: vec![(0, [1u8; DIGEST_LEN]), (2, [2u8; DIGEST_LEN])],
        };
        let mut bytes = Vec::new();
        table.write(&mut bytes).unwrap();
        let back = DigestTable::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, table);
    }
}
