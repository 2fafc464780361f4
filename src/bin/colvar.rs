use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rayon::ThreadPoolBuilder;

use colvar::archive::ArchiveReader;
use colvar::cli::{Cli, Commands};
use colvar::io::vcf;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let silent = match &cli.command {
        Commands::Import(args) => args.silent,
        Commands::View(args) => args.silent,
        Commands::Stats(args) => args.silent,
    };
    let default_level = if silent { "error" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match &cli.command {
        Commands::Import(args) => {
            if args.threads > 1 {
                ThreadPoolBuilder::new()
                    .num_threads(args.threads)
                    .build_global()?;
                info!("using {} threads for genotype encoding", args.threads);
            }
            vcf::import(&args.input, &args.output, args.to_options())?;
        }
        Commands::View(args) => {
            vcf::view(&args.input)?;
        }
        Commands::Stats(args) => {
            print_stats(&args.input)?;
        }
    }

    Ok(())
}

fn print_stats(input: &str) -> Result<()> {
    let file = BufReader::new(
        File::open(input).with_context(|| format!("failed to open archive at {input}"))?,
    );
    let archive = ArchiveReader::open(file).context("reading the archive trailer")?;

    println!(
        "{} samples, {} contigs, {} records in {} blocks",
        archive.schema.n_samples(),
        archive.schema.contigs.len(),
        archive.footer.n_records,
        archive.footer.n_blocks,
    );
    println!("block\tcontig\tspan\tvariants\tbytes");
    for entry in &archive.index {
        let contig = archive
            .schema
            .contig(entry.contig_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|_| entry.contig_id.to_string());
        println!(
            "{}\t{}\t{}-{}\t{}\t{}",
            entry.block_id,
            contig,
            entry.min_position + 1,
            entry.max_position + 1,
            entry.n_variants,
            entry.byte_offset_end - entry.byte_offset,
        );
    }

    for (global_id, digest) in &archive.digests.info {
        let name = archive
            .schema
            .info_field(*global_id)
            .map(|f| f.name.clone())
            .unwrap_or_else(|_| global_id.to_string());
        println!("INFO/{name}\tsha512:{}", hex_prefix(digest));
    }
    for (global_id, digest) in &archive.digests.format {
        let name = archive
            .schema
            .format_field(*global_id)
            .map(|f| f.name.clone())
            .unwrap_or_else(|_| global_id.to_string());
        println!("FORMAT/{name}\tsha512:{}", hex_prefix(digest));
    }
    Ok(())
}

fn hex_prefix(digest: &[u8]) -> String {
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
