//! Compression codec behind the `compress -> (bytes, uLen, cLen)` /
//! `decompress` contract. The container stores only lengths, checksum and
//! the encoding tag; everything else is internal to this module.
use crate::error::{ArchiveError, Result};

/// Compression level for all column payloads.
const LEVEL: i32 = 3;

/// Compress a buffer. Returns the compressed bytes; the caller decides
/// whether the result is worth keeping (`encoding` stays `None` otherwise).
pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::bulk::compress(raw, LEVEL)?)
}

/// Decompress `compressed` into exactly `expected_len` bytes.
pub fn decompress(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let out = zstd::bulk::decompress(compressed, expected_len)?;
    if out.len() != expected_len {
        return Err(ArchiveError::Truncated {
            what: "compressed column payload",
            offset: out.len() as u64,
        });
    }
    Ok(out)
}
