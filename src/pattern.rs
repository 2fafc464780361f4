//! Pattern dictionaries for the FILTER, INFO and FORMAT categories.
//!
//! Each block owns one dictionary per category. A dictionary interns the
//! global field ids seen in the block (assigning dense local ids) and the
//! ordered field-id lists ("patterns") records carry, so each record stores a
//! single small pattern id per category instead of repeating its field list.
use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::constants::{MAX_FIELDS, MAX_PATTERNS};
use crate::error::{ArchiveError, Result};

#[derive(Debug, Default, Clone)]
pub struct PatternDictionary {
    /// Local id to global field id, in first-seen order.
    fields: Vec<u32>,
    field_index: HashMap<u32, u16>,
    /// Pattern id to ordered global field ids, in first-seen order.
    patterns: Vec<Vec<u32>>,
    pattern_index: HashMap<Vec<u32>, u16>,
}

impl PatternDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.field_index.clear();
        self.patterns.clear();
        self.pattern_index.clear();
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn n_patterns(&self) -> usize {
        self.patterns.len()
    }

    pub fn fields(&self) -> &[u32] {
        &self.fields
    }

    pub fn pattern(&self, id: u16) -> Option<&[u32]> {
        self.patterns.get(usize::from(id)).map(Vec::as_slice)
    }

    pub fn local_id(&self, global_id: u32) -> Option<u16> {
        self.field_index.get(&global_id).copied()
    }

    /// Intern a global field id; idempotent, local ids increase in
    /// first-seen order.
    pub fn add_field(&mut self, global_id: u32) -> Result<u16> {
        if let Some(&local) = self.field_index.get(&global_id) {
            return Ok(local);
        }
        if self.fields.len() >= MAX_FIELDS {
            return Err(ArchiveError::FieldLimitExceeded {
                count: self.fields.len(),
            });
        }
        let local = self.fields.len() as u16;
        self.fields.push(global_id);
        self.field_index.insert(global_id, local);
        Ok(local)
    }

    /// Intern an ordered field-id list; returns the existing id when the
    /// same list was seen before.
    pub fn add_pattern(&mut self, global_ids: &[u32]) -> Result<u16> {
        if let Some(&id) = self.pattern_index.get(global_ids) {
            return Ok(id);
        }
        if self.patterns.len() >= MAX_PATTERNS {
            return Err(ArchiveError::PatternOverflow {
                count: self.patterns.len(),
            });
        }
        let id = self.patterns.len() as u16;
        self.patterns.push(global_ids.to_vec());
        self.pattern_index.insert(global_ids.to_vec(), id);
        Ok(id)
    }

    /// Seal the dictionary into the dense per-pattern bitsets stored in the
    /// block footer. Bit `local_id(g)` is set for every `g` in the pattern.
    pub fn finalize(&self) -> Vec<PatternBitset> {
        let width = self.bitset_width();
        self.patterns
            .iter()
            .map(|pattern| {
                let mut bits = vec![0u8; width];
                let mut locals = Vec::with_capacity(pattern.len());
                for global in pattern {
                    let local = self.field_index[global];
                    bits[usize::from(local) / 8] |= 1 << (local % 8);
                    locals.push(local);
                }
                PatternBitset { locals, bits }
            })
            .collect()
    }

    /// Width in bytes of one pattern bitset.
    pub fn bitset_width(&self) -> usize {
        self.fields.len().div_ceil(8)
    }
}

/// One sealed pattern: the ordered local field ids plus the membership
/// bitset over the block's local fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternBitset {
    pub locals: Vec<u16>,
    pub bits: Vec<u8>,
}

impl PatternBitset {
    pub fn contains(&self, local: u16) -> bool {
        self.bits
            .get(usize::from(local) / 8)
            .is_some_and(|byte| byte >> (local % 8) & 1 == 1)
    }

    pub fn object_size(&self) -> usize {
        2 + 2 * self.locals.len() + self.bits.len()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.locals.len() as u16)?;
        for &local in &self.locals {
            writer.write_u16::<LittleEndian>(local)?;
        }
        writer.write_all(&self.bits)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R, bitset_width: usize) -> Result<Self> {
        let n = reader.read_u16::<LittleEndian>()?;
        let mut locals = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            locals.push(reader.read_u16::<LittleEndian>()?);
        }
        let mut bits = vec![0u8; bitset_width];
        reader.read_exact(&mut bits)?;
        Ok(PatternBitset { locals, bits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_ids_are_first_seen_order() {
        let mut dict = PatternDictionary::new();
        assert_eq!(dict.add_field(40).unwrap(), 0);
        assert_eq!(dict.add_field(12).unwrap(), 1);
        assert_eq!(dict.add_field(40).unwrap(), 0);
        assert_eq!(dict.fields(), &[40, 12]);
    }

    #[test]
    fn patterns_deduplicate_on_order() {
        let mut dict = PatternDictionary::new();
        dict.add_field(1).unwrap();
        dict.add_field(2).unwrap();
        let a = dict.add_pattern(&[1, 2]).unwrap();
        let b = dict.add_pattern(&[2, 1]).unwrap();
        let c = dict.add_pattern(&[1, 2]).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn bitsets_mark_member_fields() {
        let mut dict = PatternDictionary::new();
        for g in [7, 9, 11] {
            dict.add_field(g).unwrap();
        }
        dict.add_pattern(&[7]).unwrap();
        dict.add_pattern(&[9, 11]).unwrap();

        let bitsets = dict.finalize();
        assert_eq!(bitsets.len(), 2);
        assert_eq!(bitsets[0].bits, vec![0b001]);
        assert_eq!(bitsets[1].bits, vec![0b110]);
        assert!(bitsets[1].contains(1));
        assert!(!bitsets[1].contains(0));
    }

    #[test]
    fn bitset_io_round_trip() {
        let bitset = PatternBitset {
            locals: vec![0, 2],
            bits: vec![0b101],
        };
        let mut bytes = Vec::new();
        bitset.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), bitset.object_size());
        let back = PatternBitset::read(&mut bytes.as_slice(), 1).unwrap();
        assert_eq!(back, bitset);
    }
}
