//! End-to-end archive round-trips over in-memory and on-disk files.
use std::fs;
use std::io::{Cursor, Seek, SeekFrom, Write};

use ndarray::{arr2, Array2};
use rust_htslib::bcf::{Format, Writer as BcfWriter};

use colvar::archive::{ArchiveReader, ImportOptions, Importer};
use colvar::block::VariantBlock;
use colvar::digest::FieldDigests;
use colvar::io::vcf::{vcf_header, write_vcf_record};
use colvar::record::{
    gt_raw, FormatField, FormatValues, GtEncoding, GtWidth, InfoField, InfoValues,
    RecordController, VariantRecord, GT_RAW_EOV,
};
use colvar::schema::{ContigDef, FieldDef, FieldType, Schema};
use colvar::settings::BlockLoadSettings;

/// Fixed column indices in block write order.
const COL_POSITION: usize = 1;
const COL_CONTROLLER: usize = 2;
const COL_QUALITY: usize = 3;
const COL_NAMES: usize = 4;
const COL_REFALT: usize = 5;
const COL_GT_RLE8: usize = 11;

fn test_schema(n_samples: usize) -> Schema {
    Schema {
        contigs: vec![
            ContigDef {
                name: "chr1".into(),
                length: 10_000_000,
            },
            ContigDef {
                name: "chr2".into(),
                length: 10_000_000,
            },
        ],
        samples: (0..n_samples).map(|i| format!("S{i}")).collect(),
        info_fields: vec![
            FieldDef {
                id: 0,
                name: "DP".into(),
                ty: FieldType::Integer,
                description: "Depth".into(),
            },
            FieldDef {
                id: 1,
                name: "AF".into(),
                ty: FieldType::Float,
                description: "Allele frequency".into(),
            },
            FieldDef {
                id: 2,
                name: "DB".into(),
                ty: FieldType::Flag,
                description: "dbSNP membership".into(),
            },
        ],
        format_fields: vec![FieldDef {
            id: 0,
            name: "GQ".into(),
            ty: FieldType::Integer,
            description: "Genotype quality".into(),
        }],
        filter_fields: vec![
            FieldDef {
                id: 0,
                name: "PASS".into(),
                ty: FieldType::Flag,
                description: "All filters passed".into(),
            },
            FieldDef {
                id: 1,
                name: "q10".into(),
                ty: FieldType::Flag,
                description: "Quality below 10".into(),
            },
        ],
    }
}

fn snv(position: i64, genotypes: Option<Array2<u8>>) -> VariantRecord {
    VariantRecord {
        contig_id: 0,
        position,
        quality: 60.0,
        name: String::new(),
        alleles: vec![b"A".to_vec(), b"G".to_vec()],
        filters: vec![],
        info: vec![],
        format: vec![],
        genotypes,
    }
}

fn import_records(
    records: Vec<VariantRecord>,
    n_samples: usize,
    options: ImportOptions,
) -> Vec<u8> {
    let schema = test_schema(n_samples);
    let mut importer = Importer::new(Cursor::new(Vec::new()), schema, options).unwrap();
    for record in records {
        importer.push(record).unwrap();
    }
    let (cursor, _) = importer.finish().unwrap();
    cursor.into_inner()
}

fn read_all(bytes: Vec<u8>) -> Vec<VariantRecord> {
    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    archive.all_records().unwrap()
}

fn assert_records_eq(written: &[VariantRecord], decoded: &[VariantRecord]) {
    assert_eq!(written.len(), decoded.len());
    for (w, d) in written.iter().zip(decoded) {
        assert_eq!(w.contig_id, d.contig_id);
        assert_eq!(w.position, d.position);
        assert_eq!(w.quality.to_bits(), d.quality.to_bits(), "quality bits");
        assert_eq!(w.name, d.name);
        assert_eq!(w.alleles, d.alleles);
        assert_eq!(w.filters, d.filters);
        assert_eq!(w.info, d.info);
        assert_eq!(w.format, d.format);
        assert_eq!(w.genotypes, d.genotypes);
    }
}

#[test]
/// Biallelic diploid records with mixed phasing and no missing alleles land
/// in the 8-bit RLE stream; with all sample genotypes distinct, every run
/// has length one.
fn biallelic_rle_block() {
    let gts = |a: [u8; 2], b: [u8; 2], c: [u8; 2]| Some(arr2(&[a, b, c]));
    let records = vec![
        snv(100, gts([2, 3], [2, 4], [4, 5])), // 0|0 0/1 1|1
        snv(101, gts([2, 4], [4, 5], [2, 3])), // 0/1 1|1 0|0
        snv(102, gts([4, 5], [2, 3], [2, 4])), // 1|1 0|0 0/1
        snv(103, gts([2, 5], [4, 2], [2, 3])), // 0|1 1/0 0|0
    ];
    let bytes = import_records(records.clone(), 3, ImportOptions::default());

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();
    assert!(block.header.controller.has_gt);
    assert!(block.header.controller.has_gt_permuted);

    let controllers = block.fixed_columns()[COL_CONTROLLER].decode_i32s().unwrap();
    for &bits in &controllers {
        let ctrl = RecordController::from_bits(bits as u16);
        assert!(ctrl.has_gt);
        assert!(ctrl.biallelic);
        assert!(ctrl.diploid);
        assert!(ctrl.mixed_phasing);
        assert!(!ctrl.any_missing);
        assert_eq!(ctrl.gt_encoding, Some(GtEncoding::RleBiallelic));
        assert_eq!(ctrl.gt_width, Some(GtWidth::U8));
    }

    // shift = 1, add = 1: the run length sits above 3 symbol bits.
    let words = block.fixed_columns()[COL_GT_RLE8].decode_words().unwrap();
    assert_eq!(words.len(), 12);
    for word in words {
        assert_eq!(word >> 3, 1, "expected unit-length runs");
    }

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// Two records with disjoint INFO fields produce two columns, two patterns
/// with complementary bitsets, and an integer column shrunk to one byte.
fn info_patterns_and_shrinking() {
    let mut first = snv(500, None);
    first.info = vec![InfoField {
        id: 0,
        values: InfoValues::Int32(vec![5]),
    }];
    let mut second = snv(501, None);
    second.info = vec![InfoField {
        id: 1,
        values: InfoValues::Float(vec![3.14]),
    }];

    let bytes = import_records(vec![first.clone(), second.clone()], 0, ImportOptions::default());
    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();

    assert_eq!(block.footer.info.len(), 2);
    assert_eq!(block.footer.info_patterns.len(), 2);
    assert_eq!(block.footer.info_patterns[0].bits, vec![0b01]);
    assert_eq!(block.footer.info_patterns[1].bits, vec![0b10]);

    // DP held a single 5: min == max == 5 shrinks to an unsigned byte.
    let dp = &block.info_columns[0];
    assert_eq!(dp.ty(), colvar::container::ColumnType::Int8);
    assert!(!dp.header.controller.signed);

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&[first, second], &decoded);
}

#[test]
/// One hundred identical records: every populated fixed column collapses to
/// one uniform row stored raw.
fn uniform_columns_collapse() {
    let mut records = Vec::new();
    for _ in 0..100 {
        let mut record = snv(4242, None);
        record.name = "rs99".into();
        records.push(record);
    }
    let bytes = import_records(records.clone(), 0, ImportOptions::default());

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();

    for index in [COL_POSITION, COL_CONTROLLER, COL_QUALITY, COL_NAMES, COL_REFALT] {
        let column = &block.fixed_columns()[index];
        assert!(
            column.header.controller.uniform,
            "fixed column {index} did not collapse"
        );
        assert_eq!(column.header.c_length, column.header.u_length);
        let row_bytes = column.header.stride as u32 * column.ty().width() as u32;
        assert_eq!(column.header.u_length, row_bytes);
    }

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// Six alleles force the n-allelic RLE form; identical genotypes across
/// many samples make the 16-bit width cheaper than the run-limited 8-bit
/// width.
fn six_allele_records_choose_nallelic() {
    let n_samples = 40;
    let rows: Vec<[u8; 2]> = (0..n_samples)
        .map(|_| [gt_raw(0, false), gt_raw(5, true)])
        .collect();
    let mut record = snv(900, Some(Array2::from_shape_vec((n_samples, 2), rows.concat()).unwrap()));
    record.alleles = vec![
        b"A".to_vec(),
        b"C".to_vec(),
        b"G".to_vec(),
        b"T".to_vec(),
        b"AC".to_vec(),
        b"ACGT".to_vec(),
    ];

    let bytes = import_records(vec![record.clone()], n_samples, ImportOptions::default());
    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();

    let controllers = block.fixed_columns()[COL_CONTROLLER].decode_i32s().unwrap();
    let ctrl = RecordController::from_bits(controllers[0] as u16);
    assert_eq!(ctrl.gt_encoding, Some(GtEncoding::RleNallelic));
    assert_eq!(ctrl.gt_width, Some(GtWidth::U16));

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&[record], &decoded);
}

#[test]
/// Truncating the file tail surfaces an integrity error, not a panic or a
/// generic failure.
fn truncated_archive_is_an_integrity_error() {
    let records = vec![snv(100, None), snv(101, None)];
    let mut bytes = import_records(records, 0, ImportOptions::default());
    bytes.truncate(bytes.len() - 40);

    let err = ArchiveReader::open(Cursor::new(bytes)).unwrap_err();
    assert!(err.is_integrity(), "unexpected error kind: {err:?}");
}

#[test]
/// Truncating a serialized block clips its end-of-block marker.
fn truncated_block_is_an_integrity_error() {
    let mut block = VariantBlock::new();
    let ppa: Vec<u32> = vec![0, 1];
    for position in 0..10 {
        let record = snv(
            position,
            Some(arr2(&[
                [gt_raw(0, false), gt_raw(0, false)],
                [gt_raw(1, false), gt_raw(1, false)],
            ])),
        );
        block.add(&record, &ppa, None).unwrap();
    }
    block.header.controller.has_gt = true;
    block.finalize(&ppa).unwrap();

    let mut bytes = Vec::new();
    block.write(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 4);

    let err = VariantBlock::read(&mut Cursor::new(bytes), &BlockLoadSettings::all()).unwrap_err();
    assert!(err.is_integrity(), "unexpected error kind: {err:?}");
}

#[test]
/// With a single sample the permutation step is skipped even when the
/// caller asked for it.
fn single_sample_skips_permutation() {
    let records = vec![
        snv(10, Some(arr2(&[[gt_raw(0, false), gt_raw(1, false)]]))),
        snv(11, Some(arr2(&[[gt_raw(1, false), gt_raw(1, false)]]))),
    ];
    let options = ImportOptions {
        permute: true,
        ..Default::default()
    };
    let bytes = import_records(records.clone(), 1, options);

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();
    assert!(block.header.controller.has_gt);
    assert!(!block.header.controller.has_gt_permuted);
    assert!(block.ppa_column.is_none());

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// The decoded records are independent of whether permutation ran.
fn permutation_invariance() {
    let gts = |a: [u8; 2], b: [u8; 2], c: [u8; 2], d: [u8; 2]| Some(arr2(&[a, b, c, d]));
    let hom = [gt_raw(1, false), gt_raw(1, false)];
    let het = [gt_raw(0, false), gt_raw(1, false)];
    let wild = [gt_raw(0, false), gt_raw(0, false)];
    let records: Vec<VariantRecord> = (0..50)
        .map(|i| match i % 3 {
            0 => snv(i, gts(hom, wild, het, wild)),
            1 => snv(i, gts(wild, wild, hom, het)),
            _ => snv(i, gts(het, hom, wild, wild)),
        })
        .collect();

    let permuted = read_all(import_records(
        records.clone(),
        4,
        ImportOptions::default(),
    ));
    let unpermuted = read_all(import_records(
        records.clone(),
        4,
        ImportOptions {
            permute: false,
            ..Default::default()
        },
    ));
    assert_records_eq(&records, &permuted);
    assert_records_eq(&records, &unpermuted);
}

#[test]
/// Blocks cut on the record checkpoint and on contig changes; the index
/// tiles the block region.
fn block_cuts_and_index() {
    let mut records: Vec<VariantRecord> = (0..25).map(|i| snv(i * 10, None)).collect();
    for record in records.iter_mut().skip(20) {
        record.contig_id = 1;
    }
    let options = ImportOptions {
        checkpoint_records: 10,
        ..Default::default()
    };
    let bytes = import_records(records.clone(), 0, options);

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    // 10 + 10 on chr1, then the contig change cuts: 20 landed in two full
    // blocks, the last 5 in a third.
    assert_eq!(archive.footer.n_blocks, 3);
    assert_eq!(archive.footer.n_records, 25);
    assert_eq!(archive.index.len(), 3);
    for pair in archive.index.windows(2) {
        assert_eq!(pair[0].byte_offset_end, pair[1].byte_offset);
    }
    assert_eq!(archive.index[2].contig_id, 1);
    assert_eq!(archive.index[2].n_variants, 5);

    let decoded = archive.all_records().unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// A block wider than the base-pair window is cut even below the record
/// checkpoint.
fn checkpoint_bases_cut() {
    let records = vec![snv(0, None), snv(100, None), snv(2_000_000, None)];
    let options = ImportOptions {
        checkpoint_bases: 1_000_000,
        ..Default::default()
    };
    let bytes = import_records(records, 0, options);
    let archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.footer.n_blocks, 2);
}

#[test]
/// Filters, all INFO value types and FORMAT matrices survive a round trip,
/// missing sentinels included.
fn fields_round_trip() {
    let mut first = snv(1000, Some(arr2(&[
        [gt_raw(0, false), gt_raw(1, true)],
        [gt_raw(1, false), gt_raw(1, true)],
    ])));
    first.filters = vec![0];
    first.name = "rs123".into();
    first.info = vec![
        InfoField {
            id: 0,
            values: InfoValues::Int32(vec![30, i32::MIN, 12]),
        },
        InfoField {
            id: 2,
            values: InfoValues::Flag,
        },
    ];
    first.format = vec![FormatField {
        id: 0,
        values: FormatValues::Int32(arr2(&[[99, 12], [i32::MIN, 7]])),
    }];

    let mut second = snv(1001, Some(arr2(&[
        [gt_raw(0, false), gt_raw(0, false)],
        [0u8, 0u8],
    ])));
    second.filters = vec![1, 0];
    second.quality = f32::NAN;
    second.info = vec![InfoField {
        id: 1,
        values: InfoValues::Float(vec![0.25, f32::NAN]),
    }];

    let records = vec![first, second];
    let decoded = read_all(import_records(records.clone(), 2, ImportOptions::default()));
    // Float equality must be bitwise (NaN payloads count), so compare the
    // info fields explicitly before the structural assert.
    match (&records[1].info[0].values, &decoded[1].info[0].values) {
        (InfoValues::Float(w), InfoValues::Float(d)) => {
            assert_eq!(w.len(), d.len());
            for (a, b) in w.iter().zip(d) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
        other => panic!("unexpected info decode: {other:?}"),
    }
    assert_eq!(records[0].info, decoded[0].info);
    assert_eq!(records[0].format, decoded[0].format);
    assert_eq!(records[0].filters, decoded[0].filters);
    assert_eq!(records[1].filters, decoded[1].filters);
    assert_eq!(records[0].genotypes, decoded[0].genotypes);
    assert_eq!(records[1].genotypes, decoded[1].genotypes);
}

#[test]
/// Re-deriving the per-field digests from decoded blocks reproduces the
/// stored digest table.
fn digest_table_is_stable() {
    let mut records = Vec::new();
    for i in 0..30 {
        let mut record = snv(i, None);
        record.info = vec![InfoField {
            id: 0,
            values: InfoValues::Int32(vec![i as i32 % 5]),
        }];
        records.push(record);
    }
    let bytes = import_records(records, 0, ImportOptions::default());

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let stored = archive.digests.clone();

    let mut rederived = FieldDigests::new();
    while let Some(block) = archive.next_block(&BlockLoadSettings::all()).unwrap() {
        rederived.add_block(&block);
    }
    assert_eq!(rederived.finish(), stored);
}

#[test]
/// Selective loading pulls single columns without touching the rest.
fn selective_column_loading() {
    let records: Vec<VariantRecord> = (0..10)
        .map(|i| {
            let mut record = snv(i * 7, None);
            record.info = vec![InfoField {
                id: 0,
                values: InfoValues::Int32(vec![i as i32]),
            }];
            record
        })
        .collect();
    let bytes = import_records(records, 0, ImportOptions::default());

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::sites())
        .unwrap()
        .unwrap();

    let positions = block.fixed_columns()[COL_POSITION].decode_i32s().unwrap();
    assert_eq!(positions, (0..10).map(|i| i * 7).collect::<Vec<i32>>());
    // INFO was not loaded.
    assert!(block.info_columns[0].is_empty());
}

#[test]
/// Field selection by name loads only the requested INFO columns.
fn field_selection_by_name() {
    let records: Vec<VariantRecord> = (0..8)
        .map(|i| {
            let mut record = snv(i, None);
            record.info = vec![
                InfoField {
                    id: 0,
                    values: InfoValues::Int32(vec![i as i32 + 1]),
                },
                InfoField {
                    id: 1,
                    values: InfoValues::Float(vec![0.5]),
                },
            ];
            record
        })
        .collect();
    let bytes = import_records(records, 0, ImportOptions::default());

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let mut settings = BlockLoadSettings::all();
    settings.select_fields(&archive.schema, &["DP".to_string()]);
    let block = archive.next_block(&settings).unwrap().unwrap();

    // DP (global id 0) is loaded, AF (global id 1) is not.
    assert!(!block.info_columns[0].is_empty());
    assert!(block.info_columns[1].is_empty());
    assert_eq!(
        block.info_columns[0].decode_i32s().unwrap(),
        (1..=8).collect::<Vec<i32>>()
    );
}

#[test]
/// The archive survives a real file on disk, not just an in-memory cursor.
fn on_disk_round_trip() {
    let records: Vec<VariantRecord> = (0..200)
        .map(|i| {
            snv(
                i,
                Some(arr2(&[
                    [gt_raw(0, false), gt_raw((i % 2) as u8, false)],
                    [gt_raw(0, false), gt_raw(0, false)],
                ])),
            )
        })
        .collect();

    let mut file = tempfile::tempfile().unwrap();
    {
        let schema = test_schema(2);
        let mut importer = Importer::new(&mut file, schema, ImportOptions::default()).unwrap();
        for record in records.clone() {
            importer.push(record).unwrap();
        }
        importer.finish().unwrap();
    }
    file.flush().unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut archive = ArchiveReader::open(file).unwrap();
    let decoded = archive.all_records().unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// Triploid, diploid and genotype-free records coexist in one block: the
/// multiploid records travel unpermuted through the BCF-style streams while
/// the diploid ones stay in the RLE streams.
fn multiploid_and_mixed_records() {
    let triploid = arr2(&[
        [gt_raw(0, false), gt_raw(1, true), gt_raw(2, true)],
        [gt_raw(1, false), GT_RAW_EOV, GT_RAW_EOV],
    ]);
    let diploid = arr2(&[
        [gt_raw(0, false), gt_raw(1, false)],
        [gt_raw(0, false), gt_raw(0, false)],
    ]);
    let mut records = vec![
        snv(10, Some(triploid)),
        snv(11, Some(diploid)),
        snv(12, None),
    ];
    records[0].alleles = vec![b"A".to_vec(), b"C".to_vec(), b"G".to_vec()];

    let bytes = import_records(records.clone(), 2, ImportOptions::default());
    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();

    let controllers = block.fixed_columns()[COL_CONTROLLER].decode_i32s().unwrap();
    let first = RecordController::from_bits(controllers[0] as u16);
    assert_eq!(first.gt_encoding, Some(GtEncoding::BcfMultiploid));
    assert!(!first.diploid);
    assert!(first.has_eov);
    let second = RecordController::from_bits(controllers[1] as u16);
    assert_eq!(second.gt_encoding, Some(GtEncoding::RleBiallelic));
    let third = RecordController::from_bits(controllers[2] as u16);
    assert!(!third.has_gt);

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// Indel alleles take the length-prefixed allele column instead of the
/// packed ref/alt byte.
fn indel_alleles_round_trip() {
    let mut deletion = snv(300, None);
    deletion.alleles = vec![b"ACGT".to_vec(), b"A".to_vec()];
    deletion.name = "indel1".into();
    let mut insertion = snv(301, None);
    insertion.alleles = vec![b"T".to_vec(), b"TTTAGA".to_vec(), b"TA".to_vec()];
    let plain = snv(302, None);

    let records = vec![deletion, insertion, plain.clone()];
    let bytes = import_records(records.clone(), 0, ImportOptions::default());
    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();

    let controllers = block.fixed_columns()[COL_CONTROLLER].decode_i32s().unwrap();
    assert!(!RecordController::from_bits(controllers[0] as u16).alleles_packed);
    assert!(!RecordController::from_bits(controllers[1] as u16).alleles_packed);
    assert!(RecordController::from_bits(controllers[2] as u16).alleles_packed);

    let decoded = block.records(&archive.schema).unwrap();
    assert_records_eq(&records, &decoded);
}

#[test]
/// For every record and every local field, the field's value is present
/// exactly when its bit in the record's pattern bitset is set.
fn pattern_bitset_law() {
    let records: Vec<VariantRecord> = (0..12)
        .map(|i| {
            let mut record = snv(i, None);
            if i % 2 == 0 {
                record.info.push(InfoField {
                    id: 0,
                    values: InfoValues::Int32(vec![i as i32]),
                });
            }
            if i % 3 == 0 {
                record.info.push(InfoField {
                    id: 1,
                    values: InfoValues::Float(vec![1.5]),
                });
            }
            record
        })
        .collect();
    let bytes = import_records(records.clone(), 0, ImportOptions::default());

    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let block = archive
        .next_block(&BlockLoadSettings::all())
        .unwrap()
        .unwrap();
    let decoded = block.records(&archive.schema).unwrap();
    let pattern_ids = block.fixed_columns()[7].decode_i32s().unwrap();

    for (record, &pattern_id) in decoded.iter().zip(&pattern_ids) {
        for (local, entry) in block.footer.info.iter().enumerate() {
            let present = record.info.iter().any(|f| f.id == entry.global_id);
            let bit = pattern_id >= 0
                && block.footer.info_patterns[pattern_id as usize].contains(local as u16);
            assert_eq!(present, bit, "record at {} field {local}", record.position);
        }
    }
    assert_records_eq(&records, &decoded);
}

#[test]
/// The end-of-block marker sits exactly at each block's declared end.
fn block_boundary_markers() {
    let records: Vec<VariantRecord> = (0..30).map(|i| snv(i, None)).collect();
    let options = ImportOptions {
        checkpoint_records: 10,
        ..Default::default()
    };
    let bytes = import_records(records, 0, options);

    let archive = ArchiveReader::open(Cursor::new(bytes.clone())).unwrap();
    assert_eq!(archive.index.len(), 3);
    for entry in &archive.index {
        let end = entry.byte_offset_end as usize;
        let marker = u64::from_le_bytes(bytes[end - 8..end].try_into().unwrap());
        assert_eq!(marker, colvar::constants::BLOCK_EOF_MARKER);
    }
}

#[test]
/// Phased and unphased missing alleles survive the mixed-phasing RLE path.
fn phased_missing_round_trip() {
    let gts = arr2(&[
        [gt_raw(0, false), 1u8],              // 0|. (phased missing)
        [gt_raw(0, false), gt_raw(1, false)], // 0/1
        [0u8, 0u8],                           // ./.
    ]);
    let records = vec![snv(77, Some(gts))];
    let decoded = read_all(import_records(records.clone(), 3, ImportOptions::default()));
    assert_records_eq(&records, &decoded);
}

#[test]
/// Reconstructed records exported through the VCF writer produce the
/// expected text: phase separators, missing alleles, INFO/FORMAT values,
/// and end-of-vector padding flattened to missing.
fn exported_vcf_text() {
    let mut first = snv(
        5,
        Some(arr2(&[
            [gt_raw(0, false), gt_raw(1, true)],
            [0u8, 0u8],
        ])),
    );
    first.name = "rs7".into();
    first.filters = vec![0];
    first.info = vec![InfoField {
        id: 0,
        values: InfoValues::Int32(vec![7]),
    }];
    first.format = vec![FormatField {
        id: 0,
        values: FormatValues::Int32(arr2(&[[40], [50]])),
    }];

    let mut second = snv(
        9,
        Some(arr2(&[
            [gt_raw(0, false), gt_raw(1, true), gt_raw(2, true)],
            [gt_raw(1, false), GT_RAW_EOV, GT_RAW_EOV],
        ])),
    );
    second.alleles = vec![b"A".to_vec(), b"C".to_vec(), b"G".to_vec()];

    let bytes = import_records(vec![first, second], 2, ImportOptions::default());
    let mut archive = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    let schema = archive.schema.clone();
    let decoded = archive.all_records().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.vcf");
    {
        let header = vcf_header(&schema);
        let mut vcf = BcfWriter::from_path(&path, &header, true, Format::Vcf).unwrap();
        for record in &decoded {
            write_vcf_record(&mut vcf, &schema, record).unwrap();
        }
    }

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(lines.len(), 2);

    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(
        &fields[..9],
        &["chr1", "6", "rs7", "A", "G", "60", "PASS", "DP=7", "GT:GQ"]
    );
    assert_eq!(fields[9], "0|1:40");
    assert_eq!(fields[10], "./.:50");

    let fields: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(fields[1], "10");
    assert_eq!(fields[2], ".");
    assert_eq!(fields[3], "A");
    assert_eq!(fields[4], "C,G");
    assert_eq!(fields[6], ".");
    assert_eq!(fields[7], ".");
    assert_eq!(fields[8], "GT");
    assert_eq!(fields[9], "0|1|2");
    // End-of-vector padding has no VCF notation and flattens to missing.
    assert_eq!(fields[10], "1/./.");
}

#[test]
/// The parallel genotype-encoding path emits byte-identical archives.
fn parallel_encoding_matches_serial() {
    let records: Vec<VariantRecord> = (0..120)
        .map(|i| {
            snv(
                i,
                Some(arr2(&[
                    [gt_raw(0, false), gt_raw((i % 2) as u8, false)],
                    [gt_raw(1, false), gt_raw(1, false)],
                    [gt_raw(0, false), gt_raw(0, false)],
                ])),
            )
        })
        .collect();

    let serial = import_records(records.clone(), 3, ImportOptions::default());
    let parallel = import_records(
        records,
        3,
        ImportOptions {
            threads: 4,
            ..Default::default()
        },
    );
    assert_eq!(serial, parallel);
}
