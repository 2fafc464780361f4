//! Magic numbers and fixed sentinels of the archive format.
//!
//! Every value in this module is part of the on-disk contract: changing any
//! of them breaks compatibility with existing archives.
use hex_literal::hex;

/// Eight-byte file magic written at offset zero.
pub const FILE_MAGIC: [u8; 8] = *b"COLVAR\x07\x01";

/// Marker written after every block footer. A reader positioned at the end
/// of a block must find exactly this value.
pub const BLOCK_EOF_MARKER: u64 = 0x7c56_1e49_92d3_a8b1;

/// Thirty-two byte end-of-file sentinel, the last bytes of every archive.
pub const FILE_EOF_MARKER: [u8; 32] =
    hex!("4d9e31c804cf6ab2e7501b6cd28f93a1760de45b8c12f0a39b64d7e852c10f3d");

/// Suggested suffix for archive files.
pub const OUTPUT_SUFFIX: &str = "cva";

/// Default number of records per block.
pub const DEFAULT_CHECKPOINT_RECORDS: u32 = 1000;

/// Default maximum positional span of one block, in bases.
pub const DEFAULT_CHECKPOINT_BASES: i64 = 5_000_000;

/// Upper bound on pattern ids and local field ids within one block; both are
/// stored as u16 on disk.
pub const MAX_PATTERNS: usize = u16::MAX as usize;
pub const MAX_FIELDS: usize = u16::MAX as usize;

/// Seed for the 64-bit uniformity fingerprint.
pub const FINGERPRINT_SEED: u64 = 2_147_483_647;
