//! # Command line interface for `colvar`
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::archive::ImportOptions;
use crate::constants::{DEFAULT_CHECKPOINT_BASES, DEFAULT_CHECKPOINT_RECORDS};

#[derive(Parser)]
#[command(
    name = "colvar",
    author,
    version,
    about = "Columnar compressed archiving of variant call data",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a VCF/BCF file into a columnar variant archive
    Import(ImportArgs),
    /// Reconstruct an archive and print it as VCF on stdout
    View(ViewArgs),
    /// Print the block index and field digests of an archive
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct ImportArgs {
    /// Input variant file. Can be VCF, VCF.gz or BCF.
    #[arg(short, long)]
    pub input: String,

    /// Output archive path
    #[arg(short, long)]
    pub output: String,

    /// Records per block
    #[arg(short, long, default_value_t = DEFAULT_CHECKPOINT_RECORDS, value_parser = checkpoint_in_range)]
    pub checkpoint: u32,

    /// Break a block when its positional span exceeds this many bases
    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_BASES)]
    pub checkpoint_bases: i64,

    /// Do not permute diploid genotypes before run-length encoding
    #[arg(long)]
    pub no_permute: bool,

    /// Number of threads to use for genotype encoding
    #[arg(long, default_value_t = 1, value_parser = threads_in_range)]
    pub threads: usize,

    /// Hide all progress messages
    #[arg(short, long)]
    pub silent: bool,
}

impl ImportArgs {
    pub fn to_options(&self) -> ImportOptions {
        ImportOptions {
            checkpoint_records: self.checkpoint,
            checkpoint_bases: self.checkpoint_bases,
            permute: !self.no_permute,
            threads: self.threads,
        }
    }
}

#[derive(Args)]
pub struct ViewArgs {
    /// Input archive
    #[arg(short, long)]
    pub input: String,

    /// Hide all progress messages
    #[arg(short, long)]
    pub silent: bool,
}

#[derive(Args)]
pub struct StatsArgs {
    /// Input archive
    #[arg(short, long)]
    pub input: String,

    /// Hide all progress messages
    #[arg(short, long)]
    pub silent: bool,
}

fn threads_in_range(s: &str) -> Result<usize> {
    let threads = s
        .parse()
        .context("Could not parse value passed to --threads to integer")?;
    if threads < 1 {
        bail!("--threads must be at least 1");
    }
    Ok(threads)
}

fn checkpoint_in_range(s: &str) -> Result<u32> {
    let checkpoint = s
        .parse()
        .context("Could not parse value passed to --checkpoint to integer")?;
    if checkpoint < 1 {
        bail!("--checkpoint must be at least 1");
    }
    Ok(checkpoint)
}
