//! Typed failure kinds for the archive core.
//!
//! Integrity faults (`ChecksumMismatch`, `BlockMarkerMismatch`,
//! `FileMarkerMismatch`, `Truncated`) are distinct variants so a caller
//! recovering a damaged file can skip to the next block via the index.
//! The application layer wraps these in `anyhow` with call-site context.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unknown column type code {code} (block {block_id}, column {column})")]
    UnknownType { block_id: u64, column: u32, code: u8 },

    #[error("truncated {what} at byte offset {offset}")]
    Truncated { what: &'static str, offset: u64 },

    #[error(
        "checksum mismatch in block {block_id}, column {column}: \
         stored {stored:#010x}, computed {computed:#010x}"
    )]
    ChecksumMismatch {
        block_id: u64,
        column: u32,
        stored: u32,
        computed: u32,
    },

    #[error("pattern dictionary overflow: block already holds {count} patterns")]
    PatternOverflow { count: usize },

    #[error("field dictionary overflow: block already holds {count} fields")]
    FieldLimitExceeded { count: usize },

    #[error("end-of-block marker mismatch for block {block_id}: found {found:#018x}")]
    BlockMarkerMismatch { block_id: u64, found: u64 },

    #[error("end-of-file marker mismatch")]
    FileMarkerMismatch,

    #[error("input invariant violated: {0}")]
    InvariantViolation(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// True for faults where the rest of the file may still be readable.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ArchiveError::ChecksumMismatch { .. }
                | ArchiveError::BlockMarkerMismatch { .. }
                | ArchiveError::FileMarkerMismatch
                | ArchiveError::Truncated { .. }
        )
    }
}
