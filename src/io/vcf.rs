//! VCF/BCF adapter: reads records through `rust_htslib` into the parsed
//! record model for import, and writes reconstructed records back out as
//! VCF for the view path.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::str;

use anyhow::{bail, Context, Result};
use linear_map::LinearMap;
use log::{debug, info, warn};
use ndarray::Array2;
use rust_htslib::bcf::{
    header::{Header, HeaderRecord, HeaderView},
    record::GenotypeAllele,
    Format, Read, Reader, Record, Writer,
};

use crate::archive::{ArchiveReader, ImportOptions, Importer};
use crate::record::{
    gt_raw, FormatField, FormatValues, InfoField, InfoValues, VariantRecord, GT_RAW_EOV,
};
use crate::schema::{ContigDef, FieldDef, FieldType, Schema};
use crate::stats::ImportStats;

/// More alternate alleles than the raw genotype byte can name.
const MAX_ALLELES: usize = 126;

/// Convert a VCF/BCF header into the archive schema. Field ids are assigned
/// in header order per category; the GT format field is omitted (genotypes
/// travel through their own streams), and the implicit PASS filter always
/// gets filter id 0.
pub fn schema_from_header(header: &HeaderView) -> Result<Schema> {
    let mut schema = Schema::default();
    schema.filter_fields.push(FieldDef {
        id: 0,
        name: "PASS".into(),
        ty: FieldType::Flag,
        description: "All filters passed".into(),
    });

    for record in header.header_records() {
        match record {
            HeaderRecord::Contig { values, .. } => {
                let name = values
                    .get("ID")
                    .context("contig header line without an ID")?
                    .clone();
                let length = values
                    .get("length")
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(0);
                schema.contigs.push(ContigDef { name, length });
            }
            HeaderRecord::Info { values, .. } => {
                schema
                    .info_fields
                    .push(field_def(schema.info_fields.len() as u32, &values)?);
            }
            HeaderRecord::Format { values, .. } => {
                let def = field_def(schema.format_fields.len() as u32, &values)?;
                if def.name != "GT" {
                    schema.format_fields.push(def);
                }
            }
            HeaderRecord::Filter { values, .. } => {
                let mut def = field_def(schema.filter_fields.len() as u32, &values)?;
                if def.name == "PASS" {
                    continue;
                }
                def.ty = FieldType::Flag;
                schema.filter_fields.push(def);
            }
            _ => {}
        }
    }

    for sample in header.samples() {
        schema.samples.push(str::from_utf8(sample)?.to_string());
    }
    Ok(schema)
}

fn field_def(id: u32, values: &LinearMap<String, String>) -> Result<FieldDef> {
    let name = values
        .get("ID")
        .context("field header line without an ID")?
        .clone();
    let ty = match values.get("Type").map(String::as_str) {
        Some("Integer") => FieldType::Integer,
        Some("Float") => FieldType::Float,
        Some("Flag") => FieldType::Flag,
        Some("String") | Some("Character") | None => FieldType::String,
        Some(other) => bail!("unsupported field type '{other}' for {name}"),
    };
    Ok(FieldDef {
        id,
        name,
        ty,
        description: values.get("Description").cloned().unwrap_or_default(),
    })
}

/// Convert one BCF record into the parsed record model, probing the
/// schema's field tables for present INFO and FORMAT values.
pub fn record_from_bcf(
    record: &Record,
    header: &HeaderView,
    schema: &Schema,
) -> Result<VariantRecord> {
    let contig_id = record.rid().context("record without a contig id")? as i32;

    let alleles: Vec<Vec<u8>> = record.alleles().iter().map(|a| a.to_vec()).collect();
    if alleles.len() > MAX_ALLELES + 1 {
        bail!(
            "{} alternate alleles exceed the supported genotype width",
            alleles.len() - 1
        );
    }

    let name_bytes = record.id();
    let name = if name_bytes.as_slice() == b"." {
        String::new()
    } else {
        str::from_utf8(&name_bytes)?.to_string()
    };

    let mut filters = Vec::new();
    for filter in record.filters() {
        let filter_name = str::from_utf8(&header.id_to_name(filter))?.to_string();
        let def = schema
            .filter_fields
            .iter()
            .find(|def| def.name == filter_name)
            .with_context(|| format!("filter '{filter_name}' not declared in the header"))?;
        filters.push(def.id);
    }

    let mut info = Vec::new();
    for def in &schema.info_fields {
        let tag = def.name.as_bytes();
        let values = match def.ty {
            FieldType::Integer => record
                .info(tag)
                .integer()
                .with_context(|| format!("reading INFO {}", def.name))?
                .map(|v| InfoValues::Int32(v.to_vec())),
            FieldType::Float => record
                .info(tag)
                .float()
                .with_context(|| format!("reading INFO {}", def.name))?
                .map(|v| InfoValues::Float(v.to_vec())),
            FieldType::String => record
                .info(tag)
                .string()
                .with_context(|| format!("reading INFO {}", def.name))?
                .map(|v| InfoValues::Char(v.join(&b","[..]))),
            FieldType::Flag => record
                .info(tag)
                .flag()
                .with_context(|| format!("reading INFO {}", def.name))?
                .then_some(InfoValues::Flag),
        };
        if let Some(values) = values {
            info.push(InfoField {
                id: def.id,
                values,
            });
        }
    }

    let n_samples = schema.n_samples();
    let mut format = Vec::new();
    for def in &schema.format_fields {
        let tag = def.name.as_bytes();
        let values = match def.ty {
            FieldType::Integer => record
                .format(tag)
                .integer()
                .ok()
                .map(|rows| sample_matrix(&rows, n_samples).map(FormatValues::Int32))
                .transpose()?,
            FieldType::Float => record
                .format(tag)
                .float()
                .ok()
                .map(|rows| sample_matrix(&rows, n_samples).map(FormatValues::Float))
                .transpose()?,
            FieldType::String | FieldType::Flag => record
                .format(tag)
                .string()
                .ok()
                .map(|rows| sample_matrix(&rows, n_samples).map(FormatValues::Char))
                .transpose()?,
        };
        if let Some(values) = values {
            format.push(FormatField {
                id: def.id,
                values,
            });
        }
    }

    let genotypes = if n_samples > 0 {
        match record.genotypes() {
            Ok(genotypes) => {
                let mut rows: Vec<Vec<u8>> = Vec::with_capacity(n_samples);
                let mut ploidy = 0usize;
                for sample in 0..n_samples {
                    let alleles = genotypes.get(sample);
                    let mut row = Vec::with_capacity(alleles.len());
                    for (slot, allele) in alleles.iter().enumerate() {
                        let mut raw = match allele {
                            GenotypeAllele::Unphased(a) => gt_raw(*a as u8, false),
                            GenotypeAllele::Phased(a) => gt_raw(*a as u8, true),
                            GenotypeAllele::UnphasedMissing => 0,
                            GenotypeAllele::PhasedMissing => 1,
                        };
                        if slot == 0 {
                            // The first allele of a sample carries no phase bit.
                            raw &= !1;
                        }
                        row.push(raw);
                    }
                    ploidy = ploidy.max(row.len());
                    rows.push(row);
                }

                let mut matrix = Array2::zeros((n_samples, ploidy));
                for (sample, row) in rows.iter().enumerate() {
                    for (slot, &raw) in row.iter().enumerate() {
                        matrix[[sample, slot]] = raw;
                    }
                    for slot in row.len()..ploidy {
                        matrix[[sample, slot]] = GT_RAW_EOV;
                    }
                }
                Some(matrix)
            }
            Err(_) => None,
        }
    } else {
        None
    };

    Ok(VariantRecord {
        contig_id,
        position: record.pos(),
        quality: record.qual(),
        name,
        alleles,
        filters,
        info,
        format,
        genotypes,
    })
}

fn sample_matrix<T: Copy + Default>(rows: &[&[T]], n_samples: usize) -> Result<Array2<T>> {
    let stride = rows.first().map_or(0, |r| r.len());
    let mut matrix = Array2::from_elem((n_samples, stride), T::default());
    for (sample, row) in rows.iter().enumerate().take(n_samples) {
        for (slot, &value) in row.iter().enumerate().take(stride) {
            matrix[[sample, slot]] = value;
        }
    }
    Ok(matrix)
}

/// Import a VCF/BCF file into an archive at `output`.
pub fn import(input: &str, output: &str, options: ImportOptions) -> Result<ImportStats> {
    let mut bcf =
        Reader::from_path(input).with_context(|| format!("failed to open VCF file at {input}"))?;
    let header = bcf.header().to_owned();
    let schema = schema_from_header(&header)?;
    info!(
        "importing {} samples over {} contigs",
        schema.n_samples(),
        schema.contigs.len()
    );

    let out = BufWriter::new(
        File::create(output).with_context(|| format!("failed to create archive at {output}"))?,
    );
    let mut importer = Importer::new(out, schema, options).context("initializing the archive")?;

    let mut n_records = 0u64;
    for result in bcf.records() {
        let record = result.with_context(|| format!("error reading VCF record in {input}"))?;
        let parsed = record_from_bcf(&record, &header, importer.schema())?;
        importer
            .push(parsed)
            .with_context(|| format!("importing record {n_records}"))?;
        n_records += 1;
    }
    let (_, stats) = importer.finish().context("sealing the archive")?;
    info!("imported {n_records} records from {input}");
    Ok(stats)
}

/// Reconstruct every record of an archive and write VCF to stdout.
pub fn view(input: &str) -> Result<()> {
    let file = BufReader::new(
        File::open(input).with_context(|| format!("failed to open archive at {input}"))?,
    );
    let mut archive = ArchiveReader::open(file).context("reading the archive trailer")?;
    let schema = archive.schema.clone();

    let header = vcf_header(&schema);
    let mut vcf =
        Writer::from_stdout(&header, true, Format::Vcf).context("opening the VCF writer")?;

    let records = archive.all_records().context("decoding archive blocks")?;
    debug!("decoded {} records", records.len());
    for record in &records {
        write_vcf_record(&mut vcf, &schema, record)?;
    }
    Ok(())
}

/// Rebuild a VCF header from the schema.
pub fn vcf_header(schema: &Schema) -> Header {
    let mut header = Header::new();
    for contig in &schema.contigs {
        let line = format!(r#"##contig=<ID={},length={}>"#, contig.name, contig.length);
        header.push_record(line.as_bytes());
    }
    for def in &schema.filter_fields {
        if def.name == "PASS" {
            continue;
        }
        let line = format!(
            r#"##FILTER=<ID={},Description="{}">"#,
            def.name,
            description_or_dot(def)
        );
        header.push_record(line.as_bytes());
    }
    for def in &schema.info_fields {
        let line = format!(
            r#"##INFO=<ID={},Number=.,Type={},Description="{}">"#,
            def.name,
            type_name(def.ty),
            description_or_dot(def)
        );
        header.push_record(line.as_bytes());
    }
    header.push_record(br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#);
    for def in &schema.format_fields {
        let line = format!(
            r#"##FORMAT=<ID={},Number=.,Type={},Description="{}">"#,
            def.name,
            type_name(def.ty),
            description_or_dot(def)
        );
        header.push_record(line.as_bytes());
    }
    for sample in &schema.samples {
        header.push_sample(sample.as_bytes());
    }
    header
}

fn type_name(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Integer => "Integer",
        FieldType::Float => "Float",
        FieldType::String => "String",
        FieldType::Flag => "Flag",
    }
}

fn description_or_dot(def: &FieldDef) -> &str {
    if def.description.is_empty() {
        "."
    } else {
        &def.description
    }
}

/// Emit one reconstructed record through a VCF writer opened with a header
/// from [`vcf_header`].
pub fn write_vcf_record(vcf: &mut Writer, schema: &Schema, record: &VariantRecord) -> Result<()> {
    let context = || format!("writing record at position {}", record.position + 1);

    let mut out = vcf.empty_record();
    out.set_rid(Some(record.contig_id as u32));
    out.set_pos(record.position);
    if !record.name.is_empty() {
        out.set_id(record.name.as_bytes()).with_context(context)?;
    }

    let alleles: Vec<&[u8]> = record.alleles.iter().map(Vec::as_slice).collect();
    out.set_alleles(&alleles).with_context(context)?;
    out.set_qual(record.quality);

    for &filter in &record.filters {
        let def = schema.filter_field(filter).with_context(context)?;
        out.push_filter(def.name.as_bytes()).with_context(context)?;
    }

    for field in &record.info {
        let def = schema.info_field(field.id).with_context(context)?;
        let tag = def.name.as_bytes();
        match &field.values {
            InfoValues::Int32(values) => {
                out.push_info_integer(tag, values).with_context(context)?
            }
            InfoValues::Float(values) => {
                out.push_info_float(tag, values).with_context(context)?
            }
            InfoValues::Char(bytes) => out
                .push_info_string(tag, &[bytes.as_slice()])
                .with_context(context)?,
            InfoValues::Flag => out.push_info_flag(tag).with_context(context)?,
        }
    }

    if let Some(genotypes) = &record.genotypes {
        let mut alleles = Vec::with_capacity(genotypes.len());
        for &raw in genotypes.iter() {
            alleles.push(match raw {
                0 => GenotypeAllele::UnphasedMissing,
                1 => GenotypeAllele::PhasedMissing,
                GT_RAW_EOV => {
                    // VCF text has no end-of-vector notation; pad as missing.
                    warn!("flattening end-of-vector genotype padding to missing");
                    GenotypeAllele::UnphasedMissing
                }
                raw if raw & 1 == 1 => GenotypeAllele::Phased(i32::from(raw >> 1) - 1),
                raw => GenotypeAllele::Unphased(i32::from(raw >> 1) - 1),
            });
        }
        out.push_genotypes(&alleles).with_context(context)?;
    }

    for field in &record.format {
        let def = schema.format_field(field.id).with_context(context)?;
        let tag = def.name.as_bytes();
        match &field.values {
            FormatValues::Int32(matrix) => {
                let flat: Vec<i32> = matrix.iter().copied().collect();
                out.push_format_integer(tag, &flat).with_context(context)?;
            }
            FormatValues::Float(matrix) => {
                let flat: Vec<f32> = matrix.iter().copied().collect();
                out.push_format_float(tag, &flat).with_context(context)?;
            }
            FormatValues::Char(matrix) => {
                let rows: Vec<Vec<u8>> = matrix.outer_iter().map(|row| row.to_vec()).collect();
                let rows: Vec<&[u8]> = rows.iter().map(Vec::as_slice).collect();
                out.push_format_string(tag, &rows).with_context(context)?;
            }
        }
    }

    vcf.write(&out).with_context(context)?;
    Ok(())
}
