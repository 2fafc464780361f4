//! Checksum primitives: a 32-bit polynomial checksum for on-disk buffers and
//! a 64-bit non-cryptographic fingerprint for uniform-run detection.
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::constants::FINGERPRINT_SEED;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 over a byte range (the zlib polynomial).
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// 64-bit fingerprint used to compare logical rows during uniformity
/// detection. Not cryptographic.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    rapidhash::rapidhash_seeded(bytes, FINGERPRINT_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_is_stable() {
        // Reference value of the ISO-HDLC polynomial over "123456789".
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn fingerprint_discriminates() {
        assert_eq!(fingerprint(b"aaaa"), fingerprint(b"aaaa"));
        assert_ne!(fingerprint(b"aaaa"), fingerprint(b"aaab"));
    }
}
