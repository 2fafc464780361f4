//! Sample permutation maintained across a block (PBWT-style).
//!
//! Each eligible record applies one stable 9-way radix-sort pass keyed on
//! the packed biallelic diploid genotype, so samples with locally similar
//! genotype rows end up adjacent and downstream run-length encoding sees
//! longer runs.
use ndarray::Array2;

use crate::record::{VariantRecord, GT_RAW_EOV};

/// Decoded allele symbols: 0 = reference, 1 = alternate, 2 = missing.
fn unpack_allele(raw: u8) -> u8 {
    match raw >> 1 {
        0 => 2,
        code => (code - 1).min(1),
    }
}

/// Bin of a packed two-allele code. The packed code is
/// `(alleleB << 2) | alleleA`; the table orders the nine states so that
/// homozygous classes cluster first.
fn radix_bin(packed: u8) -> usize {
    match packed {
        0x0 => 0, // ref, ref
        0x1 => 3, // alt, ref
        0x2 => 4, // missing, ref
        0x4 => 2, // ref, alt
        0x5 => 1, // alt, alt
        0x6 => 5, // missing, alt
        0x8 => 6, // ref, missing
        0x9 => 7, // alt, missing
        _ => 8,   // missing, missing
    }
}

#[derive(Debug)]
pub struct PermutationBuilder {
    n_samples: usize,
    ppa: Vec<u32>,
    bins: Vec<Vec<u32>>,
    codes: Vec<u8>,
}

impl PermutationBuilder {
    pub fn new(n_samples: usize) -> Self {
        PermutationBuilder {
            n_samples,
            ppa: (0..n_samples as u32).collect(),
            bins: (0..9).map(|_| Vec::with_capacity(n_samples)).collect(),
            codes: vec![0; n_samples],
        }
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// The current permutation: position `j` holds the sample index placed
    /// there.
    pub fn ppa(&self) -> &[u32] {
        &self.ppa
    }

    /// Back to the identity permutation (each block starts fresh).
    pub fn reset(&mut self) {
        for (i, slot) in self.ppa.iter_mut().enumerate() {
            *slot = i as u32;
        }
    }

    /// Apply one radix pass for `record`. Records that are not diploid,
    /// not biallelic, carry end-of-vector padding or have no genotypes
    /// leave the permutation unchanged; returns whether a pass ran.
    pub fn update(&mut self, record: &VariantRecord) -> bool {
        let Some(genotypes) = &record.genotypes else {
            return false;
        };
        if genotypes.ncols() != 2 || record.n_alleles() > 2 {
            return false;
        }
        if genotypes.iter().any(|&raw| raw == GT_RAW_EOV) {
            return false;
        }
        debug_assert_eq!(genotypes.nrows(), self.n_samples);

        self.scatter(genotypes);
        true
    }

    fn scatter(&mut self, genotypes: &Array2<u8>) {
        for (sample, row) in genotypes.outer_iter().enumerate() {
            self.codes[sample] = unpack_allele(row[1]) << 2 | unpack_allele(row[0]);
        }

        for bin in &mut self.bins {
            bin.clear();
        }
        for &sample in &self.ppa {
            let bin = radix_bin(self.codes[sample as usize]);
            self.bins[bin].push(sample);
        }

        let mut cursor = 0;
        for bin in &self.bins {
            self.ppa[cursor..cursor + bin.len()].copy_from_slice(bin);
            cursor += bin.len();
        }
        assert_eq!(cursor, self.n_samples);
    }
}
