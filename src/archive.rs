//! File framing and the import driver.
//!
//! Archive layout:
//!
//! ```text
//! [file magic: 8 bytes]
//! [global header column: serialized schema, compressed]
//! [block 1] ... [block K]
//! [global index: u64 count, fixed-size entries]
//! [per-field digest table]
//! [file footer: eod_offset u64, n_blocks u64, n_records u64,
//!  controller u16, eof marker: 32 bytes]
//! ```
//!
//! `eod_offset` points at the first byte after the last block. The footer is
//! fixed-size and sits at the end of the file.
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use rayon::prelude::*;

use crate::block::{BlockController, VariantBlock};
use crate::constants::{
    DEFAULT_CHECKPOINT_BASES, DEFAULT_CHECKPOINT_RECORDS, FILE_EOF_MARKER, FILE_MAGIC,
};
use crate::container::{Column, ColumnHeader, ColumnType};
use crate::digest::{DigestTable, FieldDigests};
use crate::error::{ArchiveError, Result};
use crate::genotype::{self, EncodedGenotypes};
use crate::permutation::PermutationBuilder;
use crate::record::VariantRecord;
use crate::schema::Schema;
use crate::settings::BlockLoadSettings;
use crate::stats::ImportStats;

/// Fixed-size file footer at the end of every archive.
const FILE_FOOTER_SIZE: i64 = 8 + 8 + 8 + 2 + FILE_EOF_MARKER.len() as i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub block_id: u64,
    pub byte_offset: u64,
    pub byte_offset_end: u64,
    pub contig_id: i32,
    pub min_position: i64,
    pub max_position: i64,
    pub n_variants: u32,
}

impl IndexEntry {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.block_id)?;
        writer.write_u64::<LittleEndian>(self.byte_offset)?;
        writer.write_u64::<LittleEndian>(self.byte_offset_end)?;
        writer.write_i32::<LittleEndian>(self.contig_id)?;
        writer.write_i64::<LittleEndian>(self.min_position)?;
        writer.write_i64::<LittleEndian>(self.max_position)?;
        writer.write_u32::<LittleEndian>(self.n_variants)?;
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(IndexEntry {
            block_id: reader.read_u64::<LittleEndian>()?,
            byte_offset: reader.read_u64::<LittleEndian>()?,
            byte_offset_end: reader.read_u64::<LittleEndian>()?,
            contig_id: reader.read_i32::<LittleEndian>()?,
            min_position: reader.read_i64::<LittleEndian>()?,
            max_position: reader.read_i64::<LittleEndian>()?,
            n_variants: reader.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileFooter {
    pub eod_offset: u64,
    pub n_blocks: u64,
    pub n_records: u64,
    pub controller: u16,
}

impl FileFooter {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.eod_offset)?;
        writer.write_u64::<LittleEndian>(self.n_blocks)?;
        writer.write_u64::<LittleEndian>(self.n_records)?;
        writer.write_u16::<LittleEndian>(self.controller)?;
        writer.write_all(&FILE_EOF_MARKER)?;
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let footer = FileFooter {
            eod_offset: reader.read_u64::<LittleEndian>()?,
            n_blocks: reader.read_u64::<LittleEndian>()?,
            n_records: reader.read_u64::<LittleEndian>()?,
            controller: reader.read_u16::<LittleEndian>()?,
        };
        let mut marker = [0u8; FILE_EOF_MARKER.len()];
        reader.read_exact(&mut marker)?;
        if marker != FILE_EOF_MARKER {
            return Err(ArchiveError::FileMarkerMismatch);
        }
        Ok(footer)
    }
}

// ----------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------

pub struct ArchiveWriter<W: Write + Seek> {
    writer: W,
    index: Vec<IndexEntry>,
    digests: FieldDigests,
    stats: ImportStats,
    n_blocks: u64,
    n_records: u64,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Write the file magic and the global header column.
    pub fn create(mut writer: W, schema: &Schema) -> Result<Self> {
        writer.write_all(&FILE_MAGIC)?;

        let payload = serde_json::to_vec(schema)
            .map_err(|e| ArchiveError::Schema(format!("schema serialization: {e}")))?;
        let mut column = Column::new(ColumnType::Char, false);
        column.add_chars(&payload);
        column.advance();
        column.update();
        column.compress()?;
        column.header.write(&mut writer)?;
        column.write_payload(&mut writer)?;

        Ok(ArchiveWriter {
            writer,
            index: Vec::new(),
            digests: FieldDigests::new(),
            stats: ImportStats::new(),
            n_blocks: 0,
            n_records: 0,
        })
    }

    /// Append a finalized block; assigns its id and maintains the index,
    /// digests and statistics.
    pub fn write_block(&mut self, block: &mut VariantBlock) -> Result<()> {
        block.header.block_id = self.n_blocks;
        let byte_offset = self.writer.stream_position()?;
        block.write(&mut self.writer)?;
        let byte_offset_end = self.writer.stream_position()?;

        self.index.push(IndexEntry {
            block_id: block.header.block_id,
            byte_offset,
            byte_offset_end,
            contig_id: block.header.contig_id,
            min_position: block.header.min_position,
            max_position: block.header.max_position,
            n_variants: block.header.n_variants,
        });
        self.digests.add_block(block);
        let column_bytes: u64 = u64::from(block.header.l_offset_footer);
        self.stats
            .add_block(block, byte_offset_end - byte_offset - column_bytes);
        self.n_blocks += 1;
        self.n_records += u64::from(block.header.n_variants);
        debug!(
            "wrote block {} ({} records, {} bytes)",
            block.header.block_id,
            block.header.n_variants,
            byte_offset_end - byte_offset
        );
        Ok(())
    }

    /// Write the index, the digest table and the file footer.
    pub fn finish(mut self) -> Result<(W, ImportStats)> {
        let eod_offset = self.writer.stream_position()?;

        self.writer.write_u64::<LittleEndian>(self.n_blocks)?;
        for entry in &self.index {
            entry.write(&mut self.writer)?;
        }
        self.digests.finish().write(&mut self.writer)?;

        FileFooter {
            eod_offset,
            n_blocks: self.n_blocks,
            n_records: self.n_records,
            controller: 0,
        }
        .write(&mut self.writer)?;
        self.writer.flush()?;
        Ok((self.writer, self.stats))
    }
}

// ----------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------

#[derive(Debug)]
pub struct ArchiveReader<R: Read + Seek> {
    reader: R,
    pub schema: Schema,
    pub footer: FileFooter,
    pub index: Vec<IndexEntry>,
    pub digests: DigestTable,
    first_block_offset: u64,
    blocks_read: u64,
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn open(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; FILE_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if magic != FILE_MAGIC {
            return Err(ArchiveError::InvariantViolation(
                "file magic does not name a variant archive".into(),
            ));
        }

        let header = ColumnHeader::read(&mut reader, u64::MAX, 0)?;
        let column = Column::read_payload(
            &mut reader,
            header,
            crate::container::StrideHeader::new(),
            u64::MAX,
            0,
        )?;
        let schema: Schema = serde_json::from_slice(&column.data)
            .map_err(|e| ArchiveError::Schema(format!("schema deserialization: {e}")))?;
        let first_block_offset = reader.stream_position()?;

        reader.seek(SeekFrom::End(-FILE_FOOTER_SIZE))?;
        let footer = FileFooter::read(&mut reader).map_err(|err| match err {
            ArchiveError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                ArchiveError::Truncated {
                    what: "file footer",
                    offset: 0,
                }
            }
            other => other,
        })?;

        reader.seek(SeekFrom::Start(footer.eod_offset))?;
        let n_index = reader.read_u64::<LittleEndian>()?;
        if n_index != footer.n_blocks {
            return Err(ArchiveError::Truncated {
                what: "block index",
                offset: footer.eod_offset,
            });
        }
        let mut index = Vec::with_capacity(n_index as usize);
        for _ in 0..n_index {
            index.push(IndexEntry::read(&mut reader)?);
        }
        let digests = DigestTable::read(&mut reader)?;

        reader.seek(SeekFrom::Start(first_block_offset))?;
        Ok(ArchiveReader {
            reader,
            schema,
            footer,
            index,
            digests,
            first_block_offset,
            blocks_read: 0,
        })
    }

    /// Sequentially read the next block, or `None` past the last one.
    pub fn next_block(&mut self, settings: &BlockLoadSettings) -> Result<Option<VariantBlock>> {
        if self.blocks_read == self.footer.n_blocks {
            return Ok(None);
        }
        let block = VariantBlock::read(&mut self.reader, settings)?;
        self.blocks_read += 1;
        Ok(Some(block))
    }

    /// Random-access read of one indexed block.
    pub fn block_at(
        &mut self,
        entry: &IndexEntry,
        settings: &BlockLoadSettings,
    ) -> Result<VariantBlock> {
        self.reader.seek(SeekFrom::Start(entry.byte_offset))?;
        VariantBlock::read(&mut self.reader, settings)
    }

    /// Rewind to the first block.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(self.first_block_offset))?;
        self.blocks_read = 0;
        Ok(())
    }

    /// Decode every record of the archive (testing and the view path).
    pub fn all_records(&mut self) -> Result<Vec<VariantRecord>> {
        self.rewind()?;
        let settings = BlockLoadSettings::all();
        let mut records = Vec::with_capacity(self.footer.n_records as usize);
        let schema = self.schema.clone();
        while let Some(block) = self.next_block(&settings)? {
            records.extend(block.records(&schema)?);
        }
        Ok(records)
    }
}

// ----------------------------------------------------------------------
// Import driver
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Records per block.
    pub checkpoint_records: u32,
    /// Maximum positional span of one block on its contig.
    pub checkpoint_bases: i64,
    pub permute: bool,
    pub threads: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            checkpoint_records: DEFAULT_CHECKPOINT_RECORDS,
            checkpoint_bases: DEFAULT_CHECKPOINT_BASES,
            permute: true,
            threads: 1,
        }
    }
}

/// Batches records into blocks: runs the permutation pre-pass, encodes,
/// finalizes and writes each block, cutting on the record checkpoint, the
/// base-pair window or a contig change.
pub struct Importer<W: Write + Seek> {
    options: ImportOptions,
    schema: Schema,
    writer: ArchiveWriter<W>,
    block: VariantBlock,
    permutation: PermutationBuilder,
    batch: Vec<VariantRecord>,
}

impl<W: Write + Seek> Importer<W> {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn new(writer: W, schema: Schema, options: ImportOptions) -> Result<Self> {
        let archive = ArchiveWriter::create(writer, &schema)?;
        let n_samples = schema.n_samples();
        Ok(Importer {
            options,
            schema,
            writer: archive,
            block: VariantBlock::new(),
            permutation: PermutationBuilder::new(n_samples),
            batch: Vec::new(),
        })
    }

    pub fn push(&mut self, record: VariantRecord) -> Result<()> {
        let contig = self.schema.contig(record.contig_id)?;
        if contig.length > 0 && record.position >= contig.length as i64 {
            return Err(ArchiveError::InvariantViolation(format!(
                "position {} beyond contig {} length {}",
                record.position, contig.name, contig.length
            )));
        }
        if let Some(genotypes) = &record.genotypes {
            if genotypes.nrows() != self.schema.n_samples() {
                return Err(ArchiveError::InvariantViolation(format!(
                    "record carries {} genotype rows for {} samples",
                    genotypes.nrows(),
                    self.schema.n_samples()
                )));
            }
        }

        if let Some(first) = self.batch.first() {
            let full = self.batch.len() >= self.options.checkpoint_records as usize;
            let contig_change = record.contig_id != first.contig_id;
            let span_exceeded = record.position - first.position > self.options.checkpoint_bases;
            if full || contig_change || span_exceeded {
                self.flush_block()?;
            }
        }
        self.batch.push(record);
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let has_gt = self.batch.iter().any(|r| r.genotypes.is_some());
        let permuted = has_gt && self.options.permute && self.schema.n_samples() > 1;

        self.block.header.contig_id = self.batch[0].contig_id;
        self.block.header.min_position = self.batch[0].position;
        self.block.header.max_position =
            self.batch.last().map(|r| r.position).unwrap_or_default();
        self.block.header.controller = BlockController {
            has_gt,
            has_gt_permuted: permuted,
        };

        // Sequential permutation pre-pass over the whole batch; encoding
        // then sees one fixed permutation.
        if permuted {
            for record in &self.batch {
                self.permutation.update(record);
            }
        }
        let ppa = self.permutation.ppa().to_vec();

        if self.options.threads > 1 {
            // Genotype rows encode independently; everything else stays
            // sequential and order-preserving.
            let encoded: Vec<Option<EncodedGenotypes>> = self
                .batch
                .par_iter()
                .map(|record| {
                    record.genotypes.as_ref().map(|genotypes| {
                        let summary = genotype::summarize(genotypes);
                        genotype::encode(genotypes, record.n_alleles(), &summary, &ppa)
                    })
                })
                .map(Option::transpose)
                .collect::<Result<_>>()?;
            for (record, encoded) in self.batch.iter().zip(encoded) {
                self.block.add(record, &ppa, encoded)?;
            }
        } else {
            for record in &self.batch {
                self.block.add(record, &ppa, None)?;
            }
        }

        self.block.finalize(&ppa)?;
        self.writer.write_block(&mut self.block)?;
        self.block.clear();
        self.permutation.reset();
        self.batch.clear();
        Ok(())
    }

    /// Flush the trailing partial block and seal the archive.
    pub fn finish(mut self) -> Result<(W, ImportStats)> {
        self.flush_block()?;
        let (writer, stats) = self.writer.finish()?;
        info!("import complete");
        stats.log_summary();
        Ok((writer, stats))
    }
}
