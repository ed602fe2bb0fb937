//! Static field tables.

use super::{FieldSpec, ValueDomain};

pub const FEATURE_ID: &str = "feature_id";
pub const UID: &str = "uid";
pub const CHROMOSOME_ID: &str = "chromosome_id";
pub const CHROMOSOME_NAME: &str = "chromosome_name";
pub const START_INDEX: &str = "start_index";
pub const END_INDEX: &str = "end_index";
pub const FEATURE_TYPE: &str = "feature_type";
pub const FILE_ID: &str = "file_id";
pub const FEATURE_NAME: &str = "feature_name";

pub const VARIATION_TYPE: &str = "variation_type";
pub const QUALITY: &str = "quality";
pub const FAILED_FILTER: &str = "failed_filter";
pub const GENE_ID: &str = "gene_id";
pub const GENE_IDS: &str = "gene_ids";
pub const GENE_NAME: &str = "gene_name";
pub const GENE_NAMES: &str = "gene_names";
pub const IS_EXON: &str = "is_exon";

pub const FRAME: &str = "frame";
pub const SCORE: &str = "score";
pub const SOURCE: &str = "source";
pub const STRAND: &str = "strand";

pub const FACET_CHR_ID: &str = "facet_chr_id";
pub const FACET_UID: &str = "facet_uid";

/// Suffix of the parallel sort/grouping key of a sortable field.
pub const SORT_SUFFIX: &str = "_s";

pub fn base_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(FEATURE_ID, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(UID, ValueDomain::String)
            .indexed()
            .stored()
            .facet(FACET_UID),
        FieldSpec::new(CHROMOSOME_ID, ValueDomain::String)
            .indexed()
            .stored()
            .sortable()
            .facet(FACET_CHR_ID),
        FieldSpec::new(CHROMOSOME_NAME, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(START_INDEX, ValueDomain::Integer)
            .range()
            .stored()
            .sortable(),
        FieldSpec::new(END_INDEX, ValueDomain::Integer)
            .range()
            .stored()
            .sortable(),
        FieldSpec::new(FEATURE_TYPE, ValueDomain::String).indexed().stored(),
        FieldSpec::new(FILE_ID, ValueDomain::String).indexed().stored(),
        FieldSpec::new(FEATURE_NAME, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
    ]
}

pub fn variant_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(VARIATION_TYPE, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(QUALITY, ValueDomain::Float)
            .range()
            .stored()
            .sortable(),
        FieldSpec::new(FAILED_FILTER, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(GENE_ID, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(GENE_IDS, ValueDomain::String).stored(),
        FieldSpec::new(GENE_NAME, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(GENE_NAMES, ValueDomain::String).stored(),
        FieldSpec::new(IS_EXON, ValueDomain::Flag).indexed().stored(),
    ]
}

pub fn gene_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(FRAME, ValueDomain::Integer)
            .range()
            .stored()
            .sortable(),
        FieldSpec::new(SCORE, ValueDomain::Float)
            .range()
            .stored()
            .sortable(),
        FieldSpec::new(SOURCE, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
        FieldSpec::new(STRAND, ValueDomain::String)
            .indexed()
            .stored()
            .sortable(),
    ]
}
