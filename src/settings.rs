//! Selective column loading for block reads.
use crate::schema::Schema;

/// Which dynamic columns of a category to load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    #[default]
    All,
    None,
    /// Global field ids.
    Ids(Vec<u32>),
}

impl FieldSelection {
    pub fn wants(&self, global_id: u32) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::None => false,
            FieldSelection::Ids(ids) => ids.contains(&global_id),
        }
    }
}

/// One flag per fixed column family plus the dynamic-field selections.
#[derive(Debug, Clone)]
pub struct BlockLoadSettings {
    pub ppa: bool,
    pub contig: bool,
    pub positions: bool,
    pub controllers: bool,
    pub quality: bool,
    pub names: bool,
    pub alleles: bool,
    pub set_membership: bool,
    pub genotypes_rle: bool,
    pub genotypes_simple: bool,
    pub genotypes_support: bool,
    pub info: FieldSelection,
    pub format: FieldSelection,
}

impl BlockLoadSettings {
    /// Load everything (the import/export default).
    pub fn all() -> Self {
        BlockLoadSettings {
            ppa: true,
            contig: true,
            positions: true,
            controllers: true,
            quality: true,
            names: true,
            alleles: true,
            set_membership: true,
            genotypes_rle: true,
            genotypes_simple: true,
            genotypes_support: true,
            info: FieldSelection::All,
            format: FieldSelection::All,
        }
    }

    /// Core site fields only: positions, alleles and controllers.
    pub fn sites() -> Self {
        BlockLoadSettings {
            ppa: false,
            contig: true,
            positions: true,
            controllers: true,
            quality: true,
            names: true,
            alleles: true,
            set_membership: false,
            genotypes_rle: false,
            genotypes_simple: false,
            genotypes_support: false,
            info: FieldSelection::None,
            format: FieldSelection::None,
        }
    }

    /// Restrict INFO/FORMAT loads to fields named in `names`, resolved
    /// against the schema.
    pub fn select_fields(&mut self, schema: &Schema, names: &[String]) {
        let resolve = |defs: &[crate::schema::FieldDef]| {
            defs.iter()
                .filter(|def| names.contains(&def.name))
                .map(|def| def.id)
                .collect::<Vec<_>>()
        };
        self.info = FieldSelection::Ids(resolve(&schema.info_fields));
        self.format = FieldSelection::Ids(resolve(&schema.format_fields));
    }
}

impl Default for BlockLoadSettings {
    fn default() -> Self {
        BlockLoadSettings::all()
    }
}
