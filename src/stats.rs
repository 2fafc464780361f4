//! Import statistics: compressed and uncompressed byte tallies per column
//! family, logged at the end of an import run.
use log::info;

use crate::block::VariantBlock;
use crate::container::Column;

/// One row per fixed column plus the grouped INFO and FORMAT families.
pub const FAMILY_NAMES: [&str; 23] = [
    "BlockHeader",
    "GT-PPA",
    "Contig",
    "Position",
    "Controller",
    "Quality",
    "Names",
    "RefAlt",
    "Alleles",
    "InfoIds",
    "FilterIds",
    "FormatIds",
    "GT-Support",
    "GT-RLE8",
    "GT-RLE16",
    "GT-RLE32",
    "GT-RLE64",
    "GT-Simple8",
    "GT-Simple16",
    "GT-Simple32",
    "GT-Simple64",
    "INFO",
    "FORMAT",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct FamilyStats {
    pub uncompressed: u64,
    pub compressed: u64,
}

impl FamilyStats {
    fn add_column(&mut self, column: &Column) {
        self.uncompressed += u64::from(column.header.u_length);
        self.compressed += u64::from(column.header.c_length);
        if column.header.controller.mixed_stride {
            self.uncompressed += u64::from(column.stride_header.u_length);
            self.compressed += u64::from(column.stride_header.c_length);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    families: [FamilyStats; 23],
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn families(&self) -> impl Iterator<Item = (&'static str, FamilyStats)> + '_ {
        FAMILY_NAMES.iter().copied().zip(self.families)
    }

    pub fn add_block(&mut self, block: &VariantBlock, header_and_footer_bytes: u64) {
        self.families[0].uncompressed += header_and_footer_bytes;
        self.families[0].compressed += header_and_footer_bytes;
        if let Some(column) = &block.ppa_column {
            self.families[1].add_column(column);
        }
        for (index, column) in block.fixed_columns().iter().enumerate() {
            self.families[2 + index].add_column(column);
        }
        for column in &block.info_columns {
            self.families[21].add_column(column);
        }
        for column in &block.format_columns {
            self.families[22].add_column(column);
        }
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.families.iter().map(|f| f.uncompressed).sum()
    }

    pub fn total_compressed(&self) -> u64 {
        self.families.iter().map(|f| f.compressed).sum()
    }

    pub fn log_summary(&self) {
        for (name, family) in self.families() {
            if family.uncompressed == 0 {
                continue;
            }
            let ratio = family.uncompressed as f64 / family.compressed.max(1) as f64;
            info!(
                "{name}\t{} -> {} bytes ({ratio:.2}x)",
                family.uncompressed, family.compressed
            );
        }
        info!(
            "total\t{} -> {} bytes",
            self.total_uncompressed(),
            self.total_compressed()
        );
    }
}
