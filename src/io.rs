//! I/O adapters between external formats and the archive core.
pub mod vcf;
