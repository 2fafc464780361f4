//! The parsed variant record consumed by the block builder, and the
//! per-record controller bits stored in the controller column.
//!
//! Genotypes are carried as raw BCF-encoded bytes: `(allele + 1) << 1 |
//! phased`, with `0` for a missing allele and `0x81` for the end-of-vector
//! padding of mixed-ploidy sites.
use ndarray::Array2;

use crate::error::{ArchiveError, Result};

/// Raw genotype byte of a missing allele.
pub const GT_RAW_MISSING: u8 = 0;
/// Raw genotype byte of the end-of-vector padding slot.
pub const GT_RAW_EOV: u8 = 0x81;

/// Base codes used by the packed ref/alt byte of simple SNVs.
const BASE_CODES: [(u8, u8); 5] = [(b'A', 0), (b'T', 1), (b'G', 2), (b'C', 3), (b'N', 4)];
/// Code of the symbolic `<NON_REF>` alternate allele.
const NON_REF_CODE: u8 = 5;

/// Typed values of one INFO field.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValues {
    Int32(Vec<i32>),
    Float(Vec<f32>),
    Char(Vec<u8>),
    Flag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoField {
    pub id: u32,
    pub values: InfoValues,
}

/// Typed values of one FORMAT field: `n_samples x stride`.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatValues {
    Int32(Array2<i32>),
    Float(Array2<f32>),
    Char(Array2<u8>),
}

impl FormatValues {
    pub fn n_samples(&self) -> usize {
        match self {
            FormatValues::Int32(m) => m.nrows(),
            FormatValues::Float(m) => m.nrows(),
            FormatValues::Char(m) => m.nrows(),
        }
    }

    pub fn stride(&self) -> usize {
        match self {
            FormatValues::Int32(m) => m.ncols(),
            FormatValues::Float(m) => m.ncols(),
            FormatValues::Char(m) => m.ncols(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatField {
    pub id: u32,
    pub values: FormatValues,
}

/// One parsed variant site.
#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub contig_id: i32,
    /// 0-based position.
    pub position: i64,
    /// NaN when missing; the bit pattern is preserved end to end.
    pub quality: f32,
    pub name: String,
    /// First allele is the reference.
    pub alleles: Vec<Vec<u8>>,
    pub filters: Vec<u32>,
    pub info: Vec<InfoField>,
    pub format: Vec<FormatField>,
    /// `n_samples x ploidy` raw BCF genotype bytes.
    pub genotypes: Option<Array2<u8>>,
}

impl VariantRecord {
    pub fn n_alleles(&self) -> usize {
        self.alleles.len()
    }

    pub fn is_biallelic(&self) -> bool {
        self.alleles.len() == 2
    }

    /// Single-base reference and single-base alternate, both in {A,C,G,T,N}.
    pub fn is_simple_snv(&self) -> bool {
        self.is_biallelic()
            && self.alleles[0].len() == 1
            && self.alleles[1].len() == 1
            && base_code(self.alleles[0][0]).is_some()
            && base_code(self.alleles[1][0]).is_some()
    }

    /// Single-base reference with a symbolic `<NON_REF>` alternate.
    pub fn is_reference_non_ref(&self) -> bool {
        self.is_biallelic()
            && self.alleles[0].len() == 1
            && base_code(self.alleles[0][0]).is_some()
            && self.alleles[1].as_slice() == b"<NON_REF>"
    }

    /// Pack ref and alt into one byte, reference in the high nibble.
    pub fn packed_ref_alt(&self) -> Result<u8> {
        let r = base_code(self.alleles[0][0]).ok_or_else(|| {
            ArchiveError::InvariantViolation("packed ref/alt on a non-SNV reference".into())
        })?;
        let a = if self.is_reference_non_ref() {
            NON_REF_CODE
        } else {
            base_code(self.alleles[1][0]).ok_or_else(|| {
                ArchiveError::InvariantViolation("packed ref/alt on a non-SNV alternate".into())
            })?
        };
        Ok(r << 4 | a)
    }

    /// Reverse of [`VariantRecord::packed_ref_alt`].
    pub fn unpack_ref_alt(byte: u8) -> Result<(Vec<u8>, Vec<u8>)> {
        let reference = vec![base_from_code(byte >> 4)?];
        let alternate = if byte & 0x0f == NON_REF_CODE {
            b"<NON_REF>".to_vec()
        } else {
            vec![base_from_code(byte & 0x0f)?]
        };
        Ok((reference, alternate))
    }
}

fn base_code(base: u8) -> Option<u8> {
    BASE_CODES
        .iter()
        .find(|(b, _)| *b == base.to_ascii_uppercase())
        .map(|(_, code)| *code)
}

fn base_from_code(code: u8) -> Result<u8> {
    BASE_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(b, _)| *b)
        .ok_or_else(|| ArchiveError::InvariantViolation(format!("ref/alt base code {code}")))
}

/// Genotype stream encoding variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtEncoding {
    RleBiallelic = 0,
    RleNallelic = 1,
    BcfDiploid = 2,
    BcfMultiploid = 3,
}

impl GtEncoding {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => GtEncoding::RleBiallelic,
            1 => GtEncoding::RleNallelic,
            2 => GtEncoding::BcfDiploid,
            _ => GtEncoding::BcfMultiploid,
        }
    }

    pub fn is_rle(self) -> bool {
        matches!(self, GtEncoding::RleBiallelic | GtEncoding::RleNallelic)
    }
}

/// Primitive width of a genotype stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtWidth {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
}

impl GtWidth {
    pub const ALL: [GtWidth; 4] = [GtWidth::U8, GtWidth::U16, GtWidth::U32, GtWidth::U64];

    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => GtWidth::U8,
            1 => GtWidth::U16,
            2 => GtWidth::U32,
            _ => GtWidth::U64,
        }
    }

    pub fn bits(self) -> u32 {
        8 << self as u32
    }

    pub fn bytes(self) -> usize {
        1 << self as usize
    }
}

/// Sixteen per-record controller bits, LSB first:
/// `anyMissing, allPhased, mixedPhasing, biallelic, simpleSNV,
/// allelesPacked, hasGT, hasEOV, diploid, gt_encoding: 2, gt_primitive: 2,
/// reserved: 3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordController {
    pub any_missing: bool,
    pub all_phased: bool,
    pub mixed_phasing: bool,
    pub biallelic: bool,
    pub simple_snv: bool,
    pub alleles_packed: bool,
    pub has_gt: bool,
    pub has_eov: bool,
    pub diploid: bool,
    pub gt_encoding: Option<GtEncoding>,
    pub gt_width: Option<GtWidth>,
}

impl RecordController {
    pub fn to_bits(&self) -> u16 {
        u16::from(self.any_missing)
            | u16::from(self.all_phased) << 1
            | u16::from(self.mixed_phasing) << 2
            | u16::from(self.biallelic) << 3
            | u16::from(self.simple_snv) << 4
            | u16::from(self.alleles_packed) << 5
            | u16::from(self.has_gt) << 6
            | u16::from(self.has_eov) << 7
            | u16::from(self.diploid) << 8
            | (self.gt_encoding.map_or(0, |e| e as u16)) << 9
            | (self.gt_width.map_or(0, |w| w as u16)) << 11
    }

    pub fn from_bits(bits: u16) -> Self {
        let has_gt = bits >> 6 & 1 == 1;
        RecordController {
            any_missing: bits & 1 == 1,
            all_phased: bits >> 1 & 1 == 1,
            mixed_phasing: bits >> 2 & 1 == 1,
            biallelic: bits >> 3 & 1 == 1,
            simple_snv: bits >> 4 & 1 == 1,
            alleles_packed: bits >> 5 & 1 == 1,
            has_gt,
            has_eov: bits >> 7 & 1 == 1,
            diploid: bits >> 8 & 1 == 1,
            gt_encoding: has_gt.then(|| GtEncoding::from_bits(bits >> 9)),
            gt_width: has_gt.then(|| GtWidth::from_bits(bits >> 11)),
        }
    }
}

/// Build a raw BCF genotype byte.
pub fn gt_raw(allele: u8, phased: bool) -> u8 {
    (allele + 1) << 1 | u8::from(phased)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_ref_alt_round_trip() {
        for (reference, alternate) in [(b"A".to_vec(), b"C".to_vec()), (b"G".to_vec(), b"T".to_vec())]
        {
            let rec = VariantRecord {
                contig_id: 0,
                position: 0,
                quality: f32::NAN,
                name: String::new(),
                alleles: vec![reference.clone(), alternate.clone()],
                filters: vec![],
                info: vec![],
                format: vec![],
                genotypes: None,
            };
            assert!(rec.is_simple_snv());
            let packed = rec.packed_ref_alt().unwrap();
            assert_eq!(
                VariantRecord::unpack_ref_alt(packed).unwrap(),
                (reference, alternate)
            );
        }
    }

    #[test]
    fn non_ref_alternate_packs() {
        let rec = VariantRecord {
            contig_id: 0,
            position: 0,
            quality: f32::NAN,
            name: String::new(),
            alleles: vec![b"C".to_vec(), b"<NON_REF>".to_vec()],
            filters: vec![],
            info: vec![],
            format: vec![],
            genotypes: None,
        };
        assert!(!rec.is_simple_snv());
        assert!(rec.is_reference_non_ref());
        let packed = rec.packed_ref_alt().unwrap();
        let (reference, alternate) = VariantRecord::unpack_ref_alt(packed).unwrap();
        assert_eq!(reference, b"C");
        assert_eq!(alternate, b"<NON_REF>");
    }

    #[test]
    fn controller_bits_round_trip() {
        let ctrl = RecordController {
            any_missing: true,
            all_phased: false,
            mixed_phasing: true,
            biallelic: true,
            simple_snv: false,
            alleles_packed: false,
            has_gt: true,
            has_eov: false,
            diploid: true,
            gt_encoding: Some(GtEncoding::RleNallelic),
            gt_width: Some(GtWidth::U16),
        };
        let back = RecordController::from_bits(ctrl.to_bits());
        assert!(back.any_missing);
        assert!(back.mixed_phasing);
        assert!(back.biallelic);
        assert!(back.diploid);
        assert_eq!(back.gt_encoding, Some(GtEncoding::RleNallelic));
        assert_eq!(back.gt_width, Some(GtWidth::U16));
    }
}
