//! Archive-wide schema: contigs, samples and the INFO/FORMAT/FILTER field
//! dictionaries. Serialized as the global header column right after the
//! file magic; every block refers to fields by their global ids here.
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigDef {
    pub name: String,
    pub length: u64,
}

/// Declared value type of an INFO or FORMAT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    String,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: u32,
    pub name: String,
    pub ty: FieldType,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub contigs: Vec<ContigDef>,
    pub samples: Vec<String>,
    pub info_fields: Vec<FieldDef>,
    pub format_fields: Vec<FieldDef>,
    pub filter_fields: Vec<FieldDef>,
}

impl Schema {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn contig(&self, id: i32) -> Result<&ContigDef> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.contigs.get(i))
            .ok_or_else(|| ArchiveError::Schema(format!("contig id {id} not in schema")))
    }

    pub fn info_field(&self, id: u32) -> Result<&FieldDef> {
        self.info_fields
            .get(id as usize)
            .filter(|f| f.id == id)
            .ok_or_else(|| ArchiveError::Schema(format!("info field id {id} not in schema")))
    }

    pub fn format_field(&self, id: u32) -> Result<&FieldDef> {
        self.format_fields
            .get(id as usize)
            .filter(|f| f.id == id)
            .ok_or_else(|| ArchiveError::Schema(format!("format field id {id} not in schema")))
    }

    pub fn filter_field(&self, id: u32) -> Result<&FieldDef> {
        self.filter_fields
            .get(id as usize)
            .filter(|f| f.id == id)
            .ok_or_else(|| ArchiveError::Schema(format!("filter field id {id} not in schema")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let schema = Schema {
            contigs: vec![ContigDef {
                name: "chr1".into(),
                length: 248_956_422,
            }],
            samples: vec!["HG001".into(), "HG002".into()],
            info_fields: vec![FieldDef {
                id: 0,
                name: "DP".into(),
                ty: FieldType::Integer,
                description: "Total depth".into(),
            }],
            format_fields: vec![],
            filter_fields: vec![FieldDef {
                id: 0,
                name: "PASS".into(),
                ty: FieldType::Flag,
                description: "All filters passed".into(),
            }],
        };
        let json = serde_json::to_vec(&schema).unwrap();
        let back: Schema = serde_json::from_slice(&json).unwrap();
        assert_eq!(schema, back);
    }
}
