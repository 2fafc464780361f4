//! # colvar
//!
//! Columnar compressed archiving of variant call data. A stream of parsed
//! variant records is batched into blocks; each block transposes its records
//! into typed columns (site metadata, run-length encoded genotype streams
//! under a PBWT-style sample permutation, and per-field INFO/FORMAT columns
//! multiplexed through pattern dictionaries), finalizes and compresses every
//! column, and lands in a seekable archive with a global index and per-field
//! digests. The same crate reads archives back, selectively by column.
pub mod archive;
pub mod block;
pub mod buffer;
pub mod checksum;
pub mod cli;
pub mod codec;
pub mod constants;
pub mod container;
pub mod digest;
pub mod error;
pub mod genotype;
pub mod io;
pub mod pattern;
pub mod permutation;
pub mod record;
pub mod schema;
pub mod settings;
pub mod stats;

pub use error::{ArchiveError, Result};
