//! Variant block: the unit of batching, compression and on-disk layout.
//!
//! A block owns nineteen fixed columns (site metadata, pattern-id streams,
//! the genotype support column and eight genotype word streams), dynamic
//! arrays of INFO and FORMAT columns, the three pattern dictionaries and an
//! optional sample permutation column. Records are appended one at a time;
//! `finalize` seals every column and lays out the footer; `write` and `read`
//! implement the serialized form:
//!
//! ```text
//! [block header]
//! [permutation column]            (only when hasGT && hasGTPermuted)
//! [19 fixed column payloads]
//! [info columns: header+payload] [format columns: header+payload]
//! [footer] [footer length: u32] [end-of-block marker: u64]
//! ```
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;

use crate::constants::BLOCK_EOF_MARKER;
use crate::container::{Column, ColumnType};
use crate::error::{ArchiveError, Result};
use crate::genotype::{self, EncodedGenotypes};
use crate::pattern::PatternDictionary;
use crate::record::{
    FormatField, FormatValues, InfoField, InfoValues, RecordController, VariantRecord,
};
use crate::schema::{FieldType, Schema};
use crate::settings::BlockLoadSettings;

pub mod footer;
pub mod header;

pub use footer::{BlockFooter, DynamicEntry, FooterEntry, N_FIXED_COLUMNS};
pub use header::{BlockController, BlockHeader};

/// Fixed column indices, in write order.
const COL_CONTIG: usize = 0;
const COL_POSITION: usize = 1;
const COL_CONTROLLER: usize = 2;
const COL_QUALITY: usize = 3;
const COL_NAMES: usize = 4;
const COL_REFALT: usize = 5;
const COL_ALLELES: usize = 6;
const COL_INFO_IDS: usize = 7;
const COL_FILTER_IDS: usize = 8;
const COL_FORMAT_IDS: usize = 9;
const COL_GT_SUPPORT: usize = 10;
/// Streams 11..=18 hold the eight genotype streams; the stream tag of
/// [`EncodedGenotypes::stream_tag`] (1..=8) maps to index `10 + tag`.
const COL_GT_FIRST: usize = 11;

#[derive(Debug)]
pub struct VariantBlock {
    pub header: BlockHeader,
    pub footer: BlockFooter,
    pub ppa_column: Option<Column>,
    fixed: Vec<Column>,
    pub info_columns: Vec<Column>,
    pub format_columns: Vec<Column>,
    pub info_dict: PatternDictionary,
    pub format_dict: PatternDictionary,
    pub filter_dict: PatternDictionary,
}

fn new_fixed_columns() -> Vec<Column> {
    let gt_stream = |ty| Column::new(ty, false);
    vec![
        Column::with_stride(ColumnType::Int32, true, 1), // contig
        Column::with_stride(ColumnType::Int32, true, 1), // position
        Column::with_stride(ColumnType::Int16, false, 1), // controller
        Column::with_stride(ColumnType::Float32, false, 1), // quality
        Column::new(ColumnType::Char, false),            // names
        Column::with_stride(ColumnType::Int8, false, 1), // packed ref/alt
        Column::new(ColumnType::Struct, false),          // alleles
        Column::with_stride(ColumnType::Int32, true, 1), // info pattern ids
        Column::with_stride(ColumnType::Int32, true, 1), // filter pattern ids
        Column::with_stride(ColumnType::Int32, true, 1), // format pattern ids
        Column::new(ColumnType::Int32, true),            // gt support
        gt_stream(ColumnType::Int8),
        gt_stream(ColumnType::Int16),
        gt_stream(ColumnType::Int32),
        gt_stream(ColumnType::Int64),
        gt_stream(ColumnType::Int8),
        gt_stream(ColumnType::Int16),
        gt_stream(ColumnType::Int32),
        gt_stream(ColumnType::Int64),
    ]
}

impl Default for VariantBlock {
    fn default() -> Self {
        VariantBlock::new()
    }
}

impl VariantBlock {
    pub fn new() -> Self {
        VariantBlock {
            header: BlockHeader::default(),
            footer: BlockFooter::default(),
            ppa_column: None,
            fixed: new_fixed_columns(),
            info_columns: Vec::new(),
            format_columns: Vec::new(),
            info_dict: PatternDictionary::new(),
            format_dict: PatternDictionary::new(),
            filter_dict: PatternDictionary::new(),
        }
    }

    /// Reset for the next batch; column capacity is retained.
    pub fn clear(&mut self) {
        self.header = BlockHeader::default();
        self.footer = BlockFooter::default();
        self.ppa_column = None;
        self.fixed = new_fixed_columns();
        self.info_columns.clear();
        self.format_columns.clear();
        self.info_dict.clear();
        self.format_dict.clear();
        self.filter_dict.clear();
    }

    pub fn n_variants(&self) -> u32 {
        self.header.n_variants
    }

    /// The nineteen fixed columns in write order.
    pub fn fixed_columns(&self) -> &[Column] {
        &self.fixed
    }

    fn gt_stream_mut(&mut self, tag: u8) -> &mut Column {
        &mut self.fixed[COL_GT_FIRST - 1 + tag as usize]
    }

    // ------------------------------------------------------------------
    // Append path
    // ------------------------------------------------------------------

    /// Append one parsed record. Genotypes are encoded under `ppa` unless a
    /// pre-encoded row (from the parallel path) is supplied.
    pub fn add(
        &mut self,
        record: &VariantRecord,
        ppa: &[u32],
        pre_encoded: Option<EncodedGenotypes>,
    ) -> Result<()> {
        let mut ctrl = RecordController {
            biallelic: record.is_biallelic(),
            simple_snv: record.is_simple_snv(),
            ..Default::default()
        };

        let filter_pattern = self.add_filter_fields(record)?;
        let info_pattern = self.add_info_fields(record)?;
        let format_pattern = self.add_format_fields(record)?;

        if let Some(genotypes) = &record.genotypes {
            ctrl.has_gt = true;
            let summary = genotype::summarize(genotypes);
            ctrl.any_missing = summary.has_missing;
            ctrl.all_phased = summary.all_phased;
            ctrl.mixed_phasing = summary.mixed_phasing;
            ctrl.has_eov = summary.has_eov;
            ctrl.diploid = summary.ploidy == 2;

            let encoded = match pre_encoded {
                Some(encoded) => encoded,
                None => genotype::encode(genotypes, record.n_alleles(), &summary, ppa)?,
            };
            ctrl.gt_encoding = Some(encoded.encoding);
            ctrl.gt_width = Some(encoded.width);
            self.route_genotypes(&encoded);
        }

        // Site metadata.
        let position = i32::try_from(record.position).map_err(|_| {
            ArchiveError::InvariantViolation(format!(
                "position {} exceeds the 32-bit position column",
                record.position
            ))
        })?;
        self.fixed[COL_POSITION].add_i32(position);
        self.fixed[COL_POSITION].advance();
        self.fixed[COL_CONTIG].add_i32(record.contig_id);
        self.fixed[COL_CONTIG].advance();

        if ctrl.simple_snv || record.is_reference_non_ref() {
            ctrl.alleles_packed = true;
            let packed = record.packed_ref_alt()?;
            self.fixed[COL_REFALT].add_literal_u8(packed);
            self.fixed[COL_REFALT].advance();
        } else {
            let alleles = &mut self.fixed[COL_ALLELES];
            for allele in &record.alleles {
                alleles.add_literal_u16(allele.len() as u16);
                alleles.add_chars(allele);
            }
            alleles.advance();
            alleles.add_stride(record.n_alleles() as u32);
        }

        self.fixed[COL_QUALITY].add_f32(record.quality);
        self.fixed[COL_QUALITY].advance();

        let names = &mut self.fixed[COL_NAMES];
        names.add_stride(record.name.len() as u32);
        names.add_chars(record.name.as_bytes());
        names.advance();

        self.fixed[COL_INFO_IDS].add_i32(info_pattern);
        self.fixed[COL_INFO_IDS].advance();
        self.fixed[COL_FORMAT_IDS].add_i32(format_pattern);
        self.fixed[COL_FORMAT_IDS].advance();
        self.fixed[COL_FILTER_IDS].add_i32(filter_pattern);
        self.fixed[COL_FILTER_IDS].advance();

        self.fixed[COL_CONTROLLER].add_literal_u16(ctrl.to_bits());
        self.fixed[COL_CONTROLLER].advance();

        self.header.n_variants += 1;
        Ok(())
    }

    fn add_filter_fields(&mut self, record: &VariantRecord) -> Result<i32> {
        if record.filters.is_empty() {
            return Ok(-1);
        }
        for &global_id in &record.filters {
            self.filter_dict.add_field(global_id)?;
        }
        Ok(i32::from(self.filter_dict.add_pattern(&record.filters)?))
    }

    fn add_info_fields(&mut self, record: &VariantRecord) -> Result<i32> {
        if record.info.is_empty() {
            return Ok(-1);
        }
        let mut pattern = Vec::with_capacity(record.info.len());
        for field in &record.info {
            let local = self.info_dict.add_field(field.id)?;
            pattern.push(field.id);
            if usize::from(local) == self.info_columns.len() {
                self.info_columns.push(info_column_for(&field.values));
            }
            let column = &mut self.info_columns[usize::from(local)];
            match &field.values {
                InfoValues::Int32(values) => {
                    for &v in values {
                        column.add_i32(v);
                    }
                    column.add_stride(values.len() as u32);
                }
                InfoValues::Float(values) => {
                    for &v in values {
                        column.add_f32(v);
                    }
                    column.add_stride(values.len() as u32);
                }
                InfoValues::Char(bytes) => {
                    column.add_chars(bytes);
                    column.add_stride(bytes.len() as u32);
                }
                InfoValues::Flag => {
                    column.add_literal_u8(1);
                    column.add_stride(1);
                }
            }
            column.advance();
        }
        Ok(i32::from(self.info_dict.add_pattern(&pattern)?))
    }

    fn add_format_fields(&mut self, record: &VariantRecord) -> Result<i32> {
        if record.format.is_empty() {
            return Ok(-1);
        }
        let mut pattern = Vec::with_capacity(record.format.len());
        for field in &record.format {
            let local = self.format_dict.add_field(field.id)?;
            pattern.push(field.id);
            if usize::from(local) == self.format_columns.len() {
                self.format_columns.push(format_column_for(&field.values));
            }
            let column = &mut self.format_columns[usize::from(local)];
            // Sample-major append; the stride is per sample.
            match &field.values {
                FormatValues::Int32(matrix) => {
                    for &v in matrix.iter() {
                        column.add_i32(v);
                    }
                    column.add_stride(matrix.ncols() as u32);
                }
                FormatValues::Float(matrix) => {
                    for &v in matrix.iter() {
                        column.add_f32(v);
                    }
                    column.add_stride(matrix.ncols() as u32);
                }
                FormatValues::Char(matrix) => {
                    for &v in matrix.iter() {
                        column.add_literal_u8(v);
                    }
                    column.add_stride(matrix.ncols() as u32);
                }
            }
            column.advance();
        }
        Ok(i32::from(self.format_dict.add_pattern(&pattern)?))
    }

    fn route_genotypes(&mut self, encoded: &EncodedGenotypes) {
        let tag = encoded.stream_tag();
        let stream = self.gt_stream_mut(tag);
        stream.add_raw(&encoded.payload, encoded.n_runs);
        stream.advance();

        let support = &mut self.fixed[COL_GT_SUPPORT];
        support.add_i32(encoded.n_runs as i32);
        support.add_stride(u32::from(tag));
        support.advance();
    }

    // ------------------------------------------------------------------
    // Finalization and serialization
    // ------------------------------------------------------------------

    /// Seal every column, build the footer and assign column offsets.
    /// `ppa` is stored only when the header says genotypes were permuted.
    pub fn finalize(&mut self, ppa: &[u32]) -> Result<()> {
        if self.header.controller.has_gt && self.header.controller.has_gt_permuted {
            let mut column = Column::with_stride(ColumnType::Int32, false, 1);
            for &sample in ppa {
                column.add_literal_u32(sample);
                column.advance();
            }
            self.ppa_column = Some(column);
        }

        if let Some(column) = &mut self.ppa_column {
            column.update();
            column.compress()?;
        }
        for column in &mut self.fixed {
            column.update();
            column.compress()?;
        }
        for column in self.info_columns.iter_mut().chain(&mut self.format_columns) {
            column.update();
            column.compress()?;
        }

        let mut footer = BlockFooter::default();
        let mut offset = 0u32;

        if let Some(column) = &mut self.ppa_column {
            column.header.offset = offset;
            footer.ppa = footer_entry(column);
            offset += column.payload_size();
        }
        for (index, column) in self.fixed.iter_mut().enumerate() {
            column.header.offset = offset;
            footer.fixed[index] = footer_entry(column);
            offset += column.payload_size();
        }
        for (index, column) in self.info_columns.iter_mut().enumerate() {
            column.header.offset = offset;
            let entry = footer_entry(column);
            offset += entry.object_size() as u32 + column.payload_size();
            footer.info.push(DynamicEntry {
                global_id: self.info_dict.fields()[index],
                entry,
            });
        }
        for (index, column) in self.format_columns.iter_mut().enumerate() {
            column.header.offset = offset;
            let entry = footer_entry(column);
            offset += entry.object_size() as u32 + column.payload_size();
            footer.format.push(DynamicEntry {
                global_id: self.format_dict.fields()[index],
                entry,
            });
        }
        for &global_id in self.filter_dict.fields() {
            footer.filter.push(DynamicEntry {
                global_id,
                entry: FooterEntry::empty(),
            });
        }

        footer.info_patterns = self.info_dict.finalize();
        footer.format_patterns = self.format_dict.finalize();
        footer.filter_patterns = self.filter_dict.finalize();

        self.header.l_offset_footer = offset;
        self.footer = footer;
        Ok(())
    }

    /// Serialize the finalized block.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write(writer)?;

        if let Some(column) = &self.ppa_column {
            column.write_payload(writer)?;
        }
        for column in &self.fixed {
            column.write_payload(writer)?;
        }
        for (entry, column) in self.footer.info.iter().zip(&self.info_columns) {
            entry.entry.write(writer)?;
            column.write_payload(writer)?;
        }
        for (entry, column) in self.footer.format.iter().zip(&self.format_columns) {
            entry.entry.write(writer)?;
            column.write_payload(writer)?;
        }

        let mut footer_bytes = Vec::with_capacity(self.footer.object_size());
        self.footer.write(&mut footer_bytes)?;
        writer.write_all(&footer_bytes)?;
        writer.write_u32::<LittleEndian>(footer_bytes.len() as u32)?;
        writer.write_u64::<LittleEndian>(BLOCK_EOF_MARKER)?;
        Ok(())
    }

    /// Read header and footer of the block at the current position, leaving
    /// the stream positioned at the start of the column payloads.
    pub fn read_header_footer<R: Read + Seek>(
        reader: &mut R,
    ) -> Result<(BlockHeader, BlockFooter, u64, u64)> {
        let header = BlockHeader::read(reader)?;
        let start_data = reader.stream_position()?;
        let footer_start = start_data + u64::from(header.l_offset_footer);
        reader.seek(SeekFrom::Start(footer_start))?;

        let footer = BlockFooter::read(reader, header.block_id).map_err(map_eof("block footer"))?;
        let footer_len = reader
            .read_u32::<LittleEndian>()
            .map_err(io_eof("block footer length"))?;
        if u64::from(footer_len) != reader.stream_position()? - footer_start - 4 {
            return Err(ArchiveError::Truncated {
                what: "block footer",
                offset: footer_start,
            });
        }
        let marker = reader
            .read_u64::<LittleEndian>()
            .map_err(io_eof("end-of-block marker"))?;
        if marker != BLOCK_EOF_MARKER {
            return Err(ArchiveError::BlockMarkerMismatch {
                block_id: header.block_id,
                found: marker,
            });
        }
        let end_block = reader.stream_position()?;
        reader.seek(SeekFrom::Start(start_data))?;
        Ok((header, footer, start_data, end_block))
    }

    /// Read one block at the current position, loading the column families
    /// requested by `settings`. The stream ends up at the end of the block.
    pub fn read<R: Read + Seek>(reader: &mut R, settings: &BlockLoadSettings) -> Result<Self> {
        let (header, footer, start_data, end_block) = Self::read_header_footer(reader)?;
        let block_id = header.block_id;

        let mut block = VariantBlock {
            header,
            footer,
            ppa_column: None,
            fixed: new_fixed_columns(),
            info_columns: Vec::new(),
            format_columns: Vec::new(),
            info_dict: PatternDictionary::new(),
            format_dict: PatternDictionary::new(),
            filter_dict: PatternDictionary::new(),
        };

        let load_fixed = |reader: &mut R, entry: &FooterEntry, column: u32| -> Result<Column> {
            reader.seek(SeekFrom::Start(start_data + u64::from(entry.header.offset)))?;
            Column::read_payload(
                reader,
                entry.header.clone(),
                entry.stride_header.clone().unwrap_or_default(),
                block_id,
                column,
            )
        };

        if settings.ppa
            && block.header.controller.has_gt
            && block.header.controller.has_gt_permuted
        {
            block.ppa_column = Some(load_fixed(reader, &block.footer.ppa, 0)?);
        }

        let wanted: Vec<(usize, bool)> = vec![
            (COL_CONTIG, settings.contig),
            (COL_POSITION, settings.positions),
            (COL_CONTROLLER, settings.controllers),
            (COL_QUALITY, settings.quality),
            (COL_NAMES, settings.names),
            (COL_REFALT, settings.alleles),
            (COL_ALLELES, settings.alleles),
            (COL_INFO_IDS, settings.set_membership),
            (COL_FILTER_IDS, settings.set_membership),
            (COL_FORMAT_IDS, settings.set_membership),
            (COL_GT_SUPPORT, settings.genotypes_support),
            (COL_GT_FIRST, settings.genotypes_rle),
            (COL_GT_FIRST + 1, settings.genotypes_rle),
            (COL_GT_FIRST + 2, settings.genotypes_rle),
            (COL_GT_FIRST + 3, settings.genotypes_rle),
            (COL_GT_FIRST + 4, settings.genotypes_simple),
            (COL_GT_FIRST + 5, settings.genotypes_simple),
            (COL_GT_FIRST + 6, settings.genotypes_simple),
            (COL_GT_FIRST + 7, settings.genotypes_simple),
        ];
        for (index, wanted) in wanted {
            if !wanted {
                continue;
            }
            let entry = block.footer.fixed[index].clone();
            block.fixed[index] = load_fixed(reader, &entry, index as u32 + 1)?;
        }

        let mut load_dynamic = |reader: &mut R,
                                entries: &[DynamicEntry],
                                selection: &crate::settings::FieldSelection|
         -> Result<Vec<(usize, Column)>> {
            let mut loaded = Vec::new();
            for (index, dynamic) in entries.iter().enumerate() {
                if !selection.wants(dynamic.global_id) {
                    continue;
                }
                let offset = start_data + u64::from(dynamic.entry.header.offset);
                reader.seek(SeekFrom::Start(offset))?;
                // Skip the inline header copy; the footer copy is canonical.
                let _ = FooterEntry::read(reader, block_id, index as u32)?;
                loaded.push((
                    index,
                    Column::read_payload(
                        reader,
                        dynamic.entry.header.clone(),
                        dynamic.entry.stride_header.clone().unwrap_or_default(),
                        block_id,
                        index as u32,
                    )?,
                ));
            }
            Ok(loaded)
        };

        let info_entries = block.footer.info.clone();
        block.info_columns = (0..info_entries.len())
            .map(|_| Column::new(ColumnType::Int8, false))
            .collect();
        for (index, column) in load_dynamic(reader, &info_entries, &settings.info)? {
            block.info_columns[index] = column;
        }
        let format_entries = block.footer.format.clone();
        block.format_columns = (0..format_entries.len())
            .map(|_| Column::new(ColumnType::Int8, false))
            .collect();
        for (index, column) in load_dynamic(reader, &format_entries, &settings.format)? {
            block.format_columns[index] = column;
        }

        reader.seek(SeekFrom::Start(end_block))?;
        Ok(block)
    }

    // ------------------------------------------------------------------
    // Record reconstruction
    // ------------------------------------------------------------------

    /// Decoded sample permutation, or the identity when genotypes were not
    /// permuted.
    pub fn ppa(&self, n_samples: usize) -> Result<Vec<u32>> {
        match &self.ppa_column {
            Some(column) => Ok(column
                .decode_i32s()?
                .into_iter()
                .map(|v| v as u32)
                .collect()),
            None => Ok((0..n_samples as u32).collect()),
        }
    }

    /// Rebuild the block's records. Requires a block loaded with
    /// [`BlockLoadSettings::all`].
    pub fn records(&self, schema: &Schema) -> Result<Vec<VariantRecord>> {
        let n = self.header.n_variants as usize;
        let n_samples = schema.n_samples();
        if self.header.controller.has_gt
            && self.header.controller.has_gt_permuted
            && self.ppa_column.is_none()
        {
            return Err(ArchiveError::InvariantViolation(
                "record reconstruction without the permutation column".into(),
            ));
        }
        let ppa = self.ppa(n_samples)?;

        let contigs = expand_i32(&self.fixed[COL_CONTIG], n)?;
        let positions = expand_i32(&self.fixed[COL_POSITION], n)?;
        let controllers = expand_i32(&self.fixed[COL_CONTROLLER], n)?;
        let qualities = expand_f32(&self.fixed[COL_QUALITY], n)?;
        let info_ids = expand_i32(&self.fixed[COL_INFO_IDS], n)?;
        let filter_ids = expand_i32(&self.fixed[COL_FILTER_IDS], n)?;
        let format_ids = expand_i32(&self.fixed[COL_FORMAT_IDS], n)?;
        for (what, len) in [
            ("contig", contigs.len()),
            ("position", positions.len()),
            ("controller", controllers.len()),
            ("quality", qualities.len()),
            ("pattern id", info_ids.len().min(filter_ids.len()).min(format_ids.len())),
        ] {
            if len != n {
                return Err(ArchiveError::InvariantViolation(format!(
                    "{what} column holds {len} rows for {n} records"
                )));
            }
        }

        let mut names = RowBytes::new(&self.fixed[COL_NAMES]);
        let mut refalt = RowBytes::new(&self.fixed[COL_REFALT]);
        let mut alleles_cursor = RowBytes::new(&self.fixed[COL_ALLELES]);

        let mut info_cursors = self
            .info_columns
            .iter()
            .map(FieldCursor::new)
            .collect::<Result<Vec<_>>>()?;
        let mut format_cursors = self
            .format_columns
            .iter()
            .map(FieldCursor::new)
            .collect::<Result<Vec<_>>>()?;

        let support = &self.fixed[COL_GT_SUPPORT];
        let support_runs = support.decode_i32s()?;
        let gt_words: Vec<Vec<u64>> = (0..8)
            .map(|i| self.fixed[COL_GT_FIRST + i].decode_words())
            .collect::<Result<_>>()?;
        let mut gt_entry = 0usize;
        let mut gt_positions = [0usize; 8];

        let mut records = Vec::with_capacity(n);
        for r in 0..n {
            let ctrl = RecordController::from_bits(controllers[r] as u16);

            let alleles = if ctrl.alleles_packed {
                let byte = refalt.next_row(1)?[0];
                let (reference, alternate) = VariantRecord::unpack_ref_alt(byte)?;
                vec![reference, alternate]
            } else {
                let n_alleles = alleles_cursor.next_stride()?;
                let row = alleles_cursor.remaining();
                let mut parsed = Vec::with_capacity(n_alleles as usize);
                let mut pos = 0usize;
                for _ in 0..n_alleles {
                    let truncated = ArchiveError::Truncated {
                        what: "allele column row",
                        offset: pos as u64,
                    };
                    let len_bytes = row.get(pos..pos + 2).ok_or(truncated)?;
                    let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
                    let allele = row.get(pos + 2..pos + 2 + len).ok_or(ArchiveError::Truncated {
                        what: "allele column row",
                        offset: pos as u64,
                    })?;
                    parsed.push(allele.to_vec());
                    pos += 2 + len;
                }
                alleles_cursor.consume(pos)?;
                parsed
            };

            let name_bytes = names.next_row_by_stride()?;
            let name = String::from_utf8_lossy(name_bytes).into_owned();

            let mut filters = Vec::new();
            for local in pattern_locals(filter_ids[r], &self.footer.filter_patterns)? {
                let dynamic = self.footer.filter.get(usize::from(local)).ok_or_else(|| {
                    ArchiveError::InvariantViolation(format!(
                        "filter local id {local} out of range"
                    ))
                })?;
                filters.push(dynamic.global_id);
            }

            let mut info = Vec::new();
            for local in pattern_locals(info_ids[r], &self.footer.info_patterns)? {
                let global_id = self
                    .footer
                    .info
                    .get(usize::from(local))
                    .ok_or_else(|| {
                        ArchiveError::InvariantViolation(format!(
                            "info local id {local} out of range"
                        ))
                    })?
                    .global_id;
                let def = schema.info_field(global_id)?;
                let cursor = &mut info_cursors[usize::from(local)];
                let stride = cursor.next_stride()? as usize;
                let values = match def.ty {
                    FieldType::Integer => InfoValues::Int32(cursor.take_i32(stride)?),
                    FieldType::Float => InfoValues::Float(cursor.take_f32(stride)?),
                    FieldType::String => InfoValues::Char(cursor.take_bytes(stride)?),
                    FieldType::Flag => {
                        cursor.take_bytes(stride)?;
                        InfoValues::Flag
                    }
                };
                info.push(InfoField {
                    id: global_id,
                    values,
                });
            }

            let mut format = Vec::new();
            for local in pattern_locals(format_ids[r], &self.footer.format_patterns)? {
                let global_id = self
                    .footer
                    .format
                    .get(usize::from(local))
                    .ok_or_else(|| {
                        ArchiveError::InvariantViolation(format!(
                            "format local id {local} out of range"
                        ))
                    })?
                    .global_id;
                let def = schema.format_field(global_id)?;
                let cursor = &mut format_cursors[usize::from(local)];
                let stride = cursor.next_stride()? as usize;
                let count = stride * n_samples;
                let values = match def.ty {
                    FieldType::Integer => FormatValues::Int32(to_matrix(
                        cursor.take_i32(count)?,
                        n_samples,
                        stride,
                    )?),
                    FieldType::Float => FormatValues::Float(to_matrix(
                        cursor.take_f32(count)?,
                        n_samples,
                        stride,
                    )?),
                    FieldType::String | FieldType::Flag => FormatValues::Char(to_matrix(
                        cursor.take_bytes(count)?,
                        n_samples,
                        stride,
                    )?),
                };
                format.push(FormatField {
                    id: global_id,
                    values,
                });
            }

            let genotypes = if ctrl.has_gt {
                let entry = support_entry_index(support, gt_entry);
                let n_runs = support_value(&support_runs, entry)?;
                let tag = support.stride_of(entry)?;
                if !(1..=8).contains(&tag) {
                    return Err(ArchiveError::InvariantViolation(format!(
                        "genotype stream tag {tag} out of range"
                    )));
                }
                let stream = tag as usize - 1;
                let words = gt_words[stream]
                    .get(gt_positions[stream]..gt_positions[stream] + n_runs as usize)
                    .ok_or(ArchiveError::Truncated {
                        what: "genotype stream",
                        offset: gt_positions[stream] as u64,
                    })?;
                gt_positions[stream] += n_runs as usize;
                gt_entry += 1;
                Some(genotype::decode(
                    words,
                    &ctrl,
                    n_samples,
                    alleles.len(),
                    n_runs,
                    &ppa,
                )?)
            } else {
                None
            };

            records.push(VariantRecord {
                contig_id: contigs[r],
                position: i64::from(positions[r]),
                quality: qualities[r],
                name,
                alleles,
                filters,
                info,
                format,
                genotypes,
            });
        }
        Ok(records)
    }
}

fn footer_entry(column: &Column) -> FooterEntry {
    FooterEntry {
        header: column.header.clone(),
        stride_header: column
            .header
            .controller
            .mixed_stride
            .then(|| column.stride_header.clone()),
    }
}

fn info_column_for(values: &InfoValues) -> Column {
    match values {
        InfoValues::Int32(_) => Column::new(ColumnType::Int32, true),
        InfoValues::Float(_) => Column::new(ColumnType::Float32, false),
        InfoValues::Char(_) | InfoValues::Flag => Column::new(ColumnType::Char, false),
    }
}

fn format_column_for(values: &FormatValues) -> Column {
    match values {
        FormatValues::Int32(_) => Column::new(ColumnType::Int32, true),
        FormatValues::Float(_) => Column::new(ColumnType::Float32, false),
        FormatValues::Char(_) => Column::new(ColumnType::Char, false),
    }
}

fn map_eof(what: &'static str) -> impl Fn(ArchiveError) -> ArchiveError {
    move |err| match err {
        ArchiveError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            ArchiveError::Truncated { what, offset: 0 }
        }
        other => other,
    }
}

fn io_eof(what: &'static str) -> impl Fn(std::io::Error) -> ArchiveError {
    move |err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ArchiveError::Truncated { what, offset: 0 }
        } else {
            ArchiveError::Io(err)
        }
    }
}

/// Expand a per-record int column to `n` rows, replicating uniform rows.
fn expand_i32(column: &Column, n: usize) -> Result<Vec<i32>> {
    let values = column.decode_i32s()?;
    if column.header.controller.uniform {
        Ok(vec![values[0]; n])
    } else {
        Ok(values)
    }
}

fn expand_f32(column: &Column, n: usize) -> Result<Vec<f32>> {
    let values = column.decode_f32s()?;
    if column.header.controller.uniform {
        Ok(vec![values[0]; n])
    } else {
        Ok(values)
    }
}

fn support_entry_index(support: &Column, entry: usize) -> usize {
    if support.header.controller.uniform {
        0
    } else {
        entry
    }
}

fn support_value(values: &[i32], entry: usize) -> Result<u32> {
    let value = *values.get(entry).ok_or(ArchiveError::Truncated {
        what: "genotype support column",
        offset: entry as u64,
    })?;
    u32::try_from(value)
        .map_err(|_| ArchiveError::InvariantViolation(format!("negative run count {value}")))
}

fn pattern_locals(pattern_id: i32, patterns: &[crate::pattern::PatternBitset]) -> Result<Vec<u16>> {
    if pattern_id < 0 {
        return Ok(Vec::new());
    }
    patterns
        .get(pattern_id as usize)
        .map(|p| p.locals.clone())
        .ok_or_else(|| {
            ArchiveError::InvariantViolation(format!("pattern id {pattern_id} out of range"))
        })
}

fn to_matrix<T: Clone>(values: Vec<T>, n_samples: usize, stride: usize) -> Result<Array2<T>> {
    Array2::from_shape_vec((n_samples, stride), values)
        .map_err(|e| ArchiveError::InvariantViolation(format!("format matrix shape: {e}")))
}

/// Cursor over a byte-typed column with per-row strides (names, alleles).
struct RowBytes<'a> {
    column: &'a Column,
    entry: usize,
    pos: usize,
}

impl<'a> RowBytes<'a> {
    fn new(column: &'a Column) -> Self {
        RowBytes {
            column,
            entry: 0,
            pos: 0,
        }
    }

    fn next_stride(&mut self) -> Result<u32> {
        let entry = if self.column.header.controller.uniform {
            0
        } else {
            self.entry
        };
        self.column.stride_of(entry)
    }

    /// The row's byte count equals its stride (char columns).
    fn next_row_by_stride(&mut self) -> Result<&'a [u8]> {
        let stride = self.next_stride()? as usize;
        self.next_row(stride)
    }

    fn next_row(&mut self, bytes: usize) -> Result<&'a [u8]> {
        if self.column.header.controller.uniform {
            self.entry += 1;
            return Ok(&self.column.data[..bytes]);
        }
        if self.pos + bytes > self.column.data.len() {
            return Err(ArchiveError::Truncated {
                what: "column row",
                offset: self.pos as u64,
            });
        }
        let row = &self.column.data[self.pos..self.pos + bytes];
        self.pos += bytes;
        self.entry += 1;
        Ok(row)
    }

    /// Remaining bytes from the cursor (uniform columns replay row zero).
    fn remaining(&self) -> &'a [u8] {
        if self.column.header.controller.uniform {
            &self.column.data
        } else {
            &self.column.data[self.pos..]
        }
    }

    /// Consume `bytes` previously inspected through [`RowBytes::remaining`].
    fn consume(&mut self, bytes: usize) -> Result<()> {
        if !self.column.header.controller.uniform {
            if self.pos + bytes > self.column.data.len() {
                return Err(ArchiveError::Truncated {
                    what: "column row",
                    offset: self.pos as u64,
                });
            }
            self.pos += bytes;
        }
        self.entry += 1;
        Ok(())
    }
}

/// Cursor over a dynamic column's decoded values.
struct FieldCursor<'a> {
    column: &'a Column,
    ints: Vec<i32>,
    floats: Vec<f32>,
    entry: usize,
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(column: &'a Column) -> Result<Self> {
        let (ints, floats) = match column.ty() {
            ColumnType::Float32 => (Vec::new(), column.decode_f32s()?),
            ColumnType::Char | ColumnType::Struct => (Vec::new(), Vec::new()),
            _ => (column.decode_i32s()?, Vec::new()),
        };
        Ok(FieldCursor {
            column,
            ints,
            floats,
            entry: 0,
            pos: 0,
        })
    }

    fn next_stride(&mut self) -> Result<u32> {
        let entry = if self.column.header.controller.uniform {
            0
        } else {
            self.entry
        };
        self.column.stride_of(entry)
    }

    fn advance(&mut self, count: usize) -> usize {
        let start = if self.column.header.controller.uniform {
            0
        } else {
            self.pos
        };
        self.pos = start + count;
        self.entry += 1;
        start
    }

    fn take_i32(&mut self, count: usize) -> Result<Vec<i32>> {
        let start = self.advance(count);
        self.ints
            .get(start..start + count)
            .map(<[i32]>::to_vec)
            .ok_or(ArchiveError::Truncated {
                what: "info/format values",
                offset: start as u64,
            })
    }

    fn take_f32(&mut self, count: usize) -> Result<Vec<f32>> {
        let start = self.advance(count);
        self.floats
            .get(start..start + count)
            .map(<[f32]>::to_vec)
            .ok_or(ArchiveError::Truncated {
                what: "info/format values",
                offset: start as u64,
            })
    }

    fn take_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let start = self.advance(count);
        self.column
            .data
            .get(start..start + count)
            .map(<[u8]>::to_vec)
            .ok_or(ArchiveError::Truncated {
                what: "info/format values",
                offset: start as u64,
            })
    }
}
