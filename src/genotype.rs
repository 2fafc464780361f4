//! Genotype stream codec.
//!
//! A record's genotype matrix is packed into one of four encoding variants
//! (two run-length encoded diploid forms and two BCF-style forms) at one of
//! four primitive widths. Width selection is an assess pass: the smallest
//! total byte cost wins, ties going to the narrower width. Given identical
//! inputs the emitted bytes are deterministic.
use ndarray::Array2;

use crate::error::{ArchiveError, Result};
use crate::record::{GtEncoding, GtWidth, RecordController, GT_RAW_EOV};

/// Scan of one genotype matrix.
#[derive(Debug, Clone, Copy)]
pub struct GtSummary {
    pub n_samples: usize,
    pub ploidy: usize,
    pub has_missing: bool,
    pub has_eov: bool,
    pub all_phased: bool,
    pub mixed_phasing: bool,
}

/// One encoded genotype row, ready to be routed into a block stream.
#[derive(Debug, Clone)]
pub struct EncodedGenotypes {
    pub encoding: GtEncoding,
    pub width: GtWidth,
    pub n_runs: u32,
    pub payload: Vec<u8>,
}

impl EncodedGenotypes {
    /// Tag of the target stream: 1-4 for the RLE widths, 5-8 for the
    /// BCF-style widths.
    pub fn stream_tag(&self) -> u8 {
        stream_tag(self.encoding, self.width)
    }
}

pub fn stream_tag(encoding: GtEncoding, width: GtWidth) -> u8 {
    let base = if encoding.is_rle() { 1 } else { 5 };
    base + width as u8
}

pub fn summarize(genotypes: &Array2<u8>) -> GtSummary {
    let n_samples = genotypes.nrows();
    let ploidy = genotypes.ncols();
    let mut has_missing = false;
    let mut has_eov = false;
    let mut n_phase_slots = 0usize;
    let mut n_phased = 0usize;
    for row in genotypes.outer_iter() {
        for (slot, &raw) in row.iter().enumerate() {
            if raw == GT_RAW_EOV {
                has_eov = true;
                continue;
            }
            if raw >> 1 == 0 {
                has_missing = true;
            }
            if slot > 0 {
                n_phase_slots += 1;
                n_phased += usize::from(raw & 1 == 1);
            }
        }
    }
    let all_phased = n_phase_slots > 0 && n_phased == n_phase_slots;
    GtSummary {
        n_samples,
        ploidy,
        has_missing,
        has_eov,
        all_phased,
        mixed_phasing: n_phased > 0 && n_phased < n_phase_slots,
    }
}

/// Encode one record's genotypes under the current sample permutation.
pub fn encode(
    genotypes: &Array2<u8>,
    n_alleles: usize,
    summary: &GtSummary,
    ppa: &[u32],
) -> Result<EncodedGenotypes> {
    if summary.ploidy == 0 || summary.n_samples == 0 {
        return Err(ArchiveError::InvariantViolation(
            "genotype matrix with a zero dimension".into(),
        ));
    }
    if summary.ploidy == 2 {
        if n_alleles <= 2 && !summary.has_eov {
            return encode_diploid_rle_biallelic(genotypes, summary, ppa);
        }
        let shift = nallelic_shift(n_alleles, summary);
        let add = u32::from(summary.mixed_phasing);
        if 2 * shift + add < GtWidth::U64.bits() {
            return encode_diploid_rle_nallelic(genotypes, n_alleles, summary, ppa);
        }
        return encode_diploid_bcf(genotypes, n_alleles, summary, ppa);
    }
    encode_multiploid_bcf(genotypes, n_alleles, summary)
}

/// Decode one record's genotype words back into a raw matrix.
pub fn decode(
    words: &[u64],
    controller: &RecordController,
    n_samples: usize,
    n_alleles: usize,
    n_runs: u32,
    ppa: &[u32],
) -> Result<Array2<u8>> {
    let encoding = controller.gt_encoding.ok_or_else(|| {
        ArchiveError::InvariantViolation("genotype decode without an encoding tag".into())
    })?;
    match encoding {
        GtEncoding::RleBiallelic => decode_diploid_rle_biallelic(words, controller, n_samples, ppa),
        GtEncoding::RleNallelic => {
            decode_diploid_rle_nallelic(words, controller, n_samples, n_alleles, ppa)
        }
        GtEncoding::BcfDiploid => {
            decode_diploid_bcf(words, controller, n_samples, n_alleles, ppa)
        }
        GtEncoding::BcfMultiploid => decode_multiploid_bcf(words, n_samples, n_runs),
    }
}

// ----------------------------------------------------------------------
// Diploid biallelic RLE
// ----------------------------------------------------------------------

/// Allele symbol of a raw byte: 0 = reference, 1 = alternate, 2 = missing.
fn biallelic_symbol(raw: u8) -> u64 {
    match raw >> 1 {
        0 => 2,
        code => u64::from(code - 1),
    }
}

fn encode_diploid_rle_biallelic(
    genotypes: &Array2<u8>,
    summary: &GtSummary,
    ppa: &[u32],
) -> Result<EncodedGenotypes> {
    let shift = if summary.has_missing { 2u32 } else { 1 };
    let add = u32::from(summary.mixed_phasing);
    let sym_bits = 2 * shift + add;

    let symbols: Vec<u64> = ppa
        .iter()
        .map(|&sample| {
            let a = genotypes[[sample as usize, 0]];
            let b = genotypes[[sample as usize, 1]];
            let phase = if add == 1 { u64::from(b & 1) } else { 0 };
            biallelic_symbol(b) << (shift + add) | biallelic_symbol(a) << add | phase
        })
        .collect();

    let width = choose_rle_width(&symbols, sym_bits)?;
    let (payload, n_runs) = rle_encode(&symbols, sym_bits, width);
    Ok(EncodedGenotypes {
        encoding: GtEncoding::RleBiallelic,
        width,
        n_runs,
        payload,
    })
}

fn decode_diploid_rle_biallelic(
    words: &[u64],
    controller: &RecordController,
    n_samples: usize,
    ppa: &[u32],
) -> Result<Array2<u8>> {
    let shift = if controller.any_missing { 2u32 } else { 1 };
    let add = u32::from(controller.mixed_phasing);
    let mask = (1u64 << shift) - 1;

    let mut out = Array2::zeros((n_samples, 2));
    let mut j = 0usize;
    for &word in words {
        let run = word >> (2 * shift + add);
        let phase = if add == 1 {
            (word & 1) as u8
        } else {
            u8::from(controller.all_phased)
        };
        let sym_a = word >> add & mask;
        let sym_b = word >> (shift + add) & mask;
        let raw_a = biallelic_raw(sym_a, 0);
        let raw_b = biallelic_raw(sym_b, phase);
        for _ in 0..run {
            if j >= n_samples {
                return Err(ArchiveError::InvariantViolation(
                    "genotype run lengths exceed the sample count".into(),
                ));
            }
            let sample = ppa[j] as usize;
            out[[sample, 0]] = raw_a;
            out[[sample, 1]] = raw_b;
            j += 1;
        }
    }
    if j != n_samples {
        return Err(ArchiveError::InvariantViolation(
            "genotype run lengths fall short of the sample count".into(),
        ));
    }
    Ok(out)
}

fn biallelic_raw(symbol: u64, phase: u8) -> u8 {
    match symbol {
        2 => phase,
        allele => (allele as u8 + 1) << 1 | phase,
    }
}

// ----------------------------------------------------------------------
// Diploid n-allelic RLE
// ----------------------------------------------------------------------

/// Bits per allele field: missing and the optional end-of-vector mark get
/// their own code points below the shifted allele values.
fn nallelic_shift(n_alleles: usize, summary: &GtSummary) -> u32 {
    let states =
        n_alleles + 1 + usize::from(summary.has_missing) + usize::from(summary.has_eov);
    ceil_log2(states)
}

fn ceil_log2(states: usize) -> u32 {
    usize::BITS - (states - 1).leading_zeros()
}

/// Allele field value: 0 = missing, 1 = end-of-vector (when present),
/// allele `a` = `a + 1 + has_eov`.
fn nallelic_field(raw: u8, has_eov: bool) -> u64 {
    if raw == GT_RAW_EOV {
        1
    } else if raw >> 1 == 0 {
        0
    } else {
        u64::from(raw >> 1) + u64::from(has_eov)
    }
}

fn encode_diploid_rle_nallelic(
    genotypes: &Array2<u8>,
    n_alleles: usize,
    summary: &GtSummary,
    ppa: &[u32],
) -> Result<EncodedGenotypes> {
    let shift = nallelic_shift(n_alleles, summary);
    let add = u32::from(summary.mixed_phasing);
    let sym_bits = 2 * shift + add;

    let symbols: Vec<u64> = ppa
        .iter()
        .map(|&sample| {
            let a = genotypes[[sample as usize, 0]];
            let b = genotypes[[sample as usize, 1]];
            let phase = if add == 1 { u64::from(b & 1) } else { 0 };
            nallelic_field(b, summary.has_eov) << (shift + add)
                | nallelic_field(a, summary.has_eov) << add
                | phase
        })
        .collect();

    let width = choose_rle_width(&symbols, sym_bits)?;
    let (payload, n_runs) = rle_encode(&symbols, sym_bits, width);
    Ok(EncodedGenotypes {
        encoding: GtEncoding::RleNallelic,
        width,
        n_runs,
        payload,
    })
}

fn decode_diploid_rle_nallelic(
    words: &[u64],
    controller: &RecordController,
    n_samples: usize,
    n_alleles: usize,
    ppa: &[u32],
) -> Result<Array2<u8>> {
    let summary_bits = GtSummary {
        n_samples,
        ploidy: 2,
        has_missing: controller.any_missing,
        has_eov: controller.has_eov,
        all_phased: controller.all_phased,
        mixed_phasing: controller.mixed_phasing,
    };
    let shift = nallelic_shift(n_alleles, &summary_bits);
    let add = u32::from(controller.mixed_phasing);
    let mask = (1u64 << shift) - 1;

    let mut out = Array2::zeros((n_samples, 2));
    let mut j = 0usize;
    for &word in words {
        let run = word >> (2 * shift + add);
        let phase = if add == 1 {
            (word & 1) as u8
        } else {
            u8::from(controller.all_phased)
        };
        let field_a = word >> add & mask;
        let field_b = word >> (shift + add) & mask;
        let raw_a = nallelic_raw(field_a, controller.has_eov, 0)?;
        let raw_b = nallelic_raw(field_b, controller.has_eov, phase)?;
        for _ in 0..run {
            if j >= n_samples {
                return Err(ArchiveError::InvariantViolation(
                    "genotype run lengths exceed the sample count".into(),
                ));
            }
            let sample = ppa[j] as usize;
            out[[sample, 0]] = raw_a;
            out[[sample, 1]] = raw_b;
            j += 1;
        }
    }
    if j != n_samples {
        return Err(ArchiveError::InvariantViolation(
            "genotype run lengths fall short of the sample count".into(),
        ));
    }
    Ok(out)
}

fn nallelic_raw(field: u64, has_eov: bool, phase: u8) -> Result<u8> {
    if field == 0 {
        return Ok(phase);
    }
    if has_eov && field == 1 {
        return Ok(GT_RAW_EOV);
    }
    let code = field - u64::from(has_eov);
    u8::try_from(code << 1 | u64::from(phase)).map_err(|_| {
        ArchiveError::InvariantViolation(format!("allele field {field} out of byte range"))
    })
}

// ----------------------------------------------------------------------
// Diploid BCF-style (packed pairs, no run-length coding)
// ----------------------------------------------------------------------

/// Allele field of the packed diploid form: 0 = missing, 1 = end-of-vector,
/// allele `a` = `a + 2`.
fn bcf_field(raw: u8) -> u64 {
    if raw == GT_RAW_EOV {
        1
    } else if raw >> 1 == 0 {
        0
    } else {
        u64::from(raw >> 1) + 1
    }
}

fn encode_diploid_bcf(
    genotypes: &Array2<u8>,
    n_alleles: usize,
    summary: &GtSummary,
    ppa: &[u32],
) -> Result<EncodedGenotypes> {
    let max_field = n_alleles as u64 + 1;
    let width = [GtWidth::U8, GtWidth::U16, GtWidth::U32]
        .into_iter()
        .find(|w| max_field < 1u64 << ((w.bits() - 1) / 2))
        .ok_or_else(|| {
            ArchiveError::InvariantViolation(format!(
                "{n_alleles} alleles exceed the packed diploid width"
            ))
        })?;
    let shift_size = (width.bits() - 1) / 2;

    let mut payload = Vec::with_capacity(summary.n_samples * width.bytes());
    for &sample in ppa {
        let a = genotypes[[sample as usize, 0]];
        let b = genotypes[[sample as usize, 1]];
        let word = bcf_field(b) << (shift_size + 1) | bcf_field(a) << 1 | u64::from(b & 1);
        put_word(&mut payload, word, width);
    }
    Ok(EncodedGenotypes {
        encoding: GtEncoding::BcfDiploid,
        width,
        n_runs: summary.n_samples as u32,
        payload,
    })
}

fn decode_diploid_bcf(
    words: &[u64],
    controller: &RecordController,
    n_samples: usize,
    _n_alleles: usize,
    ppa: &[u32],
) -> Result<Array2<u8>> {
    let width = controller.gt_width.ok_or_else(|| {
        ArchiveError::InvariantViolation("genotype decode without a width tag".into())
    })?;
    let shift_size = (width.bits() - 1) / 2;
    let mask = (1u64 << shift_size) - 1;
    if words.len() != n_samples {
        return Err(ArchiveError::InvariantViolation(
            "packed diploid stream length differs from the sample count".into(),
        ));
    }

    let mut out = Array2::zeros((n_samples, 2));
    for (j, &word) in words.iter().enumerate() {
        let phase = (word & 1) as u8;
        let field_a = word >> 1 & mask;
        let field_b = word >> (shift_size + 1) & mask;
        let sample = ppa[j] as usize;
        out[[sample, 0]] = bcf_raw(field_a, 0)?;
        out[[sample, 1]] = bcf_raw(field_b, phase)?;
    }
    Ok(out)
}

fn bcf_raw(field: u64, phase: u8) -> Result<u8> {
    match field {
        0 => Ok(phase),
        1 => Ok(GT_RAW_EOV),
        code => u8::try_from((code - 1) << 1 | u64::from(phase)).map_err(|_| {
            ArchiveError::InvariantViolation(format!("allele field {field} out of byte range"))
        }),
    }
}

// ----------------------------------------------------------------------
// Multiploid BCF-style (one value per allele slot, input sample order)
// ----------------------------------------------------------------------

fn encode_multiploid_bcf(
    genotypes: &Array2<u8>,
    n_alleles: usize,
    summary: &GtSummary,
) -> Result<EncodedGenotypes> {
    let max_value = u64::from(crate::record::gt_raw(n_alleles as u8, true));
    let width = [GtWidth::U8, GtWidth::U16, GtWidth::U32]
        .into_iter()
        .find(|w| max_value < 1u64 << w.bits())
        .ok_or_else(|| {
            ArchiveError::InvariantViolation(format!(
                "{n_alleles} alleles exceed the genotype value width"
            ))
        })?;

    let mut payload = Vec::with_capacity(summary.n_samples * summary.ploidy * width.bytes());
    for row in genotypes.outer_iter() {
        for &raw in row.iter() {
            let value = if raw == GT_RAW_EOV {
                1
            } else if raw >> 1 == 0 {
                0
            } else {
                u64::from(raw)
            };
            put_word(&mut payload, value, width);
        }
    }
    Ok(EncodedGenotypes {
        encoding: GtEncoding::BcfMultiploid,
        width,
        n_runs: (summary.n_samples * summary.ploidy) as u32,
        payload,
    })
}

fn decode_multiploid_bcf(words: &[u64], n_samples: usize, n_runs: u32) -> Result<Array2<u8>> {
    if n_samples == 0 || n_runs as usize % n_samples != 0 {
        return Err(ArchiveError::InvariantViolation(
            "multiploid stream length is not a multiple of the sample count".into(),
        ));
    }
    let ploidy = n_runs as usize / n_samples;
    if words.len() != n_runs as usize {
        return Err(ArchiveError::InvariantViolation(
            "multiploid stream length differs from its declared run count".into(),
        ));
    }

    let mut out = Array2::zeros((n_samples, ploidy));
    for (slot, &value) in words.iter().enumerate() {
        let raw = match value {
            0 => 0,
            1 => GT_RAW_EOV,
            v => u8::try_from(v).map_err(|_| {
                ArchiveError::InvariantViolation(format!("genotype value {v} out of byte range"))
            })?,
        };
        out[[slot / ploidy, slot % ploidy]] = raw;
    }
    Ok(out)
}

// ----------------------------------------------------------------------
// Run-length machinery
// ----------------------------------------------------------------------

fn run_limit(sym_bits: u32, width: GtWidth) -> u64 {
    let run_bits = width.bits() - sym_bits;
    if run_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << run_bits) - 1
    }
}

fn count_runs(symbols: &[u64], limit: u64) -> u64 {
    let mut n_runs = 1u64;
    let mut current = symbols[0];
    let mut length = 0u64;
    for &symbol in symbols {
        if symbol != current || length == limit {
            current = symbol;
            length = 0;
            n_runs += 1;
        }
        length += 1;
    }
    n_runs
}

/// Smallest-cost width whose word still has room for a run length.
fn choose_rle_width(symbols: &[u64], sym_bits: u32) -> Result<GtWidth> {
    let mut best: Option<(u64, GtWidth)> = None;
    for width in GtWidth::ALL {
        if width.bits() <= sym_bits {
            continue;
        }
        let runs = count_runs(symbols, run_limit(sym_bits, width));
        let cost = runs * width.bytes() as u64;
        if best.is_none_or(|(best_cost, _)| cost < best_cost) {
            best = Some((cost, width));
        }
    }
    best.map(|(_, width)| width).ok_or_else(|| {
        ArchiveError::InvariantViolation(format!(
            "no genotype word width admits {sym_bits} symbol bits"
        ))
    })
}

fn rle_encode(symbols: &[u64], sym_bits: u32, width: GtWidth) -> (Vec<u8>, u32) {
    let limit = run_limit(sym_bits, width);
    let mut payload = Vec::new();
    let mut n_runs = 0u32;
    let mut current = symbols[0];
    let mut length = 0u64;
    for &symbol in symbols {
        if symbol != current || length == limit {
            put_word(&mut payload, length << sym_bits | current, width);
            n_runs += 1;
            current = symbol;
            length = 0;
        }
        length += 1;
    }
    put_word(&mut payload, length << sym_bits | current, width);
    n_runs += 1;
    (payload, n_runs)
}

fn put_word(payload: &mut Vec<u8>, word: u64, width: GtWidth) {
    payload.extend_from_slice(&word.to_le_bytes()[..width.bytes()]);
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;
    use crate::record::gt_raw;

    fn identity(n: usize) -> Vec<u32> {
        (0..n as u32).collect()
    }

    fn controller_for(summary: &GtSummary, encoded: &EncodedGenotypes) -> RecordController {
        RecordController {
            any_missing: summary.has_missing,
            all_phased: summary.all_phased,
            mixed_phasing: summary.mixed_phasing,
            diploid: summary.ploidy == 2,
            has_gt: true,
            has_eov: summary.has_eov,
            gt_encoding: Some(encoded.encoding),
            gt_width: Some(encoded.width),
            ..Default::default()
        }
    }

    fn round_trip(genotypes: Array2<u8>, n_alleles: usize, ppa: &[u32]) -> EncodedGenotypes {
        let summary = summarize(&genotypes);
        let encoded = encode(&genotypes, n_alleles, &summary, ppa).unwrap();
        let ctrl = controller_for(&summary, &encoded);
        let words = decode_payload_words(&encoded);
        let back = decode(
            &words,
            &ctrl,
            genotypes.nrows(),
            n_alleles,
            encoded.n_runs,
            ppa,
        )
        .unwrap();
        assert_eq!(back, genotypes);
        encoded
    }

    fn decode_payload_words(encoded: &EncodedGenotypes) -> Vec<u64> {
        encoded
            .payload
            .chunks_exact(encoded.width.bytes())
            .map(|chunk| {
                let mut word = [0u8; 8];
                word[..chunk.len()].copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect()
    }

    #[test]
    fn biallelic_phased_runs() {
        // Two hom-ref samples then two het samples, all phased.
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(0, true)],
            [gt_raw(0, false), gt_raw(0, true)],
            [gt_raw(0, false), gt_raw(1, true)],
            [gt_raw(0, false), gt_raw(1, true)],
        ]);
        let encoded = round_trip(gts, 2, &identity(4));
        assert_eq!(encoded.encoding, GtEncoding::RleBiallelic);
        assert_eq!(encoded.width, GtWidth::U8);
        assert_eq!(encoded.n_runs, 2);
        // shift = 1, add = 0: word = run << 2 | symbol.
        assert_eq!(encoded.payload, vec![0b0000_1000, 0b0000_1010]);
    }

    #[test]
    fn mixed_phasing_gets_a_phase_bit() {
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(0, true)],
            [gt_raw(0, false), gt_raw(1, false)],
            [gt_raw(1, false), gt_raw(1, true)],
        ]);
        let summary = summarize(&gts);
        assert!(summary.mixed_phasing);
        assert!(!summary.all_phased);
        let encoded = round_trip(gts, 2, &identity(3));
        assert_eq!(encoded.encoding, GtEncoding::RleBiallelic);
        assert_eq!(encoded.width, GtWidth::U8);
        // Three distinct symbols, run length 1 each.
        assert_eq!(encoded.n_runs, 3);
    }

    #[test]
    fn missing_widens_the_symbol() {
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(0, false)],
            [0u8, 0u8],
        ]);
        let summary = summarize(&gts);
        assert!(summary.has_missing);
        let encoded = round_trip(gts, 2, &identity(2));
        assert_eq!(encoded.encoding, GtEncoding::RleBiallelic);
        assert_eq!(encoded.n_runs, 2);
    }

    #[test]
    fn permutation_is_inverted_on_decode() {
        let gts = arr2(&[
            [gt_raw(1, false), gt_raw(1, false)],
            [gt_raw(0, false), gt_raw(0, false)],
            [gt_raw(1, false), gt_raw(1, false)],
            [gt_raw(0, false), gt_raw(0, false)],
        ]);
        // Permutation clusters the hom-ref samples first.
        let ppa = vec![1u32, 3, 0, 2];
        let encoded = round_trip(gts, 2, &ppa);
        // Clustered input encodes to exactly two runs of two.
        assert_eq!(encoded.n_runs, 2);
    }

    #[test]
    fn six_alleles_choose_nallelic() {
        // Six alleles, no missing, no EOV: shift = ceil(log2(7)) = 3.
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(5, true)],
            [gt_raw(2, false), gt_raw(3, false)],
            [gt_raw(4, false), gt_raw(1, true)],
        ]);
        let summary = summarize(&gts);
        let encoded = encode(&gts, 6, &summary, &identity(3)).unwrap();
        assert_eq!(encoded.encoding, GtEncoding::RleNallelic);
        assert_eq!(nallelic_shift(6, &summary), 3);
        // Symbol needs 2*3+1 = 7 bits; u8 leaves a 1-bit run length, so
        // three distinct symbols cost 3 bytes either way and u8 wins the tie.
        assert_eq!(encoded.width, GtWidth::U8);
        round_trip(gts, 6, &identity(3));
    }

    #[test]
    fn u8_run_limit_of_one_forces_u16_for_long_runs() {
        // Identical 6-allele genotypes across many samples: at u8 the run
        // limit is 1 (one word per sample); u16 holds the whole run.
        let n = 40;
        let rows: Vec<[u8; 2]> = (0..n).map(|_| [gt_raw(0, false), gt_raw(5, true)]).collect();
        let gts = Array2::from_shape_vec((n, 2), rows.concat()).unwrap();
        let mut summary = summarize(&gts);
        // Force the mixed-phasing bit so the symbol spends 7 bits at u8.
        summary.mixed_phasing = true;
        let encoded = encode(&gts, 6, &summary, &identity(n)).unwrap();
        assert_eq!(encoded.encoding, GtEncoding::RleNallelic);
        assert_eq!(encoded.width, GtWidth::U16);
        assert_eq!(encoded.n_runs, 1);
    }

    #[test]
    fn eov_padding_round_trips() {
        // Mixed ploidy: second sample is haploid, padded with EOV.
        let gts = arr2(&[
            [gt_raw(2, false), gt_raw(1, false)],
            [gt_raw(0, false), GT_RAW_EOV],
        ]);
        let summary = summarize(&gts);
        assert!(summary.has_eov);
        let encoded = round_trip(gts, 3, &identity(2));
        assert_eq!(encoded.encoding, GtEncoding::RleNallelic);
    }

    #[test]
    fn packed_diploid_bcf_round_trips() {
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(3, true)],
            [0u8, 0u8],
            [gt_raw(2, false), gt_raw(2, false)],
        ]);
        let summary = summarize(&gts);
        let encoded = encode_diploid_bcf(&gts, 4, &summary, &identity(3)).unwrap();
        assert_eq!(encoded.width, GtWidth::U8);
        assert_eq!(encoded.n_runs, 3);
        let ctrl = controller_for(&summary, &encoded);
        let words = decode_payload_words(&encoded);
        let back = decode(&words, &ctrl, 3, 4, encoded.n_runs, &identity(3)).unwrap();
        assert_eq!(back, gts);
    }

    #[test]
    fn multiploid_keeps_input_order() {
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(1, true), gt_raw(2, true)],
            [gt_raw(1, false), GT_RAW_EOV, GT_RAW_EOV],
        ]);
        let summary = summarize(&gts);
        let encoded = encode(&gts, 3, &summary, &identity(2)).unwrap();
        assert_eq!(encoded.encoding, GtEncoding::BcfMultiploid);
        assert_eq!(encoded.n_runs, 6);
        let ctrl = controller_for(&summary, &encoded);
        let words = decode_payload_words(&encoded);
        let back = decode(&words, &ctrl, 2, 3, encoded.n_runs, &identity(2)).unwrap();
        assert_eq!(back, gts);
    }

    #[test]
    fn output_is_deterministic() {
        let gts = arr2(&[
            [gt_raw(0, false), gt_raw(1, false)],
            [gt_raw(1, false), gt_raw(1, false)],
        ]);
        let summary = summarize(&gts);
        let first = encode(&gts, 2, &summary, &identity(2)).unwrap();
        let second = encode(&gts, 2, &summary, &identity(2)).unwrap();
        assert_eq!(first.payload, second.payload);
        assert_eq!(first.n_runs, second.n_runs);
    }
}
