use crate::annotation::AnnotationValue;
use crate::reference::Chromosome;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of an indexed genomic feature
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureKind {
    Variation,
    Gene,
    Transcript,
    Exon,
    Cds,
    Utr,
    #[default]
    Generic,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Variation => "VARIATION",
            FeatureKind::Gene => "GENE",
            FeatureKind::Transcript => "TRANSCRIPT",
            FeatureKind::Exon => "EXON",
            FeatureKind::Cds => "CDS",
            FeatureKind::Utr => "UTR",
            FeatureKind::Generic => "GENERIC",
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        match self {
            FeatureKind::Variation => RecordKind::Variant,
            FeatureKind::Gene
            | FeatureKind::Transcript
            | FeatureKind::Exon
            | FeatureKind::Cds
            | FeatureKind::Utr => RecordKind::GeneFeature,
            FeatureKind::Generic => RecordKind::Generic,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VARIATION" => Ok(FeatureKind::Variation),
            "GENE" => Ok(FeatureKind::Gene),
            "TRANSCRIPT" => Ok(FeatureKind::Transcript),
            "EXON" => Ok(FeatureKind::Exon),
            "CDS" => Ok(FeatureKind::Cds),
            "UTR" => Ok(FeatureKind::Utr),
            "GENERIC" => Ok(FeatureKind::Generic),
            _ => Err(Error::InvalidInput(format!("unknown feature kind: {}", s))),
        }
    }
}

/// The closed set of record shapes a codec exists for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Variant,
    GeneFeature,
    Generic,
}

/// Structural class of a variation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariationType {
    Snv,
    Mnp,
    Ins,
    Del,
    Mixed,
    Dup,
    Inv,
    Bnd,
    #[default]
    Unk,
}

impl VariationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariationType::Snv => "SNV",
            VariationType::Mnp => "MNP",
            VariationType::Ins => "INS",
            VariationType::Del => "DEL",
            VariationType::Mixed => "MIXED",
            VariationType::Dup => "DUP",
            VariationType::Inv => "INV",
            VariationType::Bnd => "BND",
            VariationType::Unk => "UNK",
        }
    }
}

impl fmt::Display for VariationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SNV" => Ok(VariationType::Snv),
            "MNP" => Ok(VariationType::Mnp),
            "INS" => Ok(VariationType::Ins),
            "DEL" => Ok(VariationType::Del),
            "MIXED" => Ok(VariationType::Mixed),
            "DUP" => Ok(VariationType::Dup),
            "INV" => Ok(VariationType::Inv),
            "BND" => Ok(VariationType::Bnd),
            "UNK" => Ok(VariationType::Unk),
            _ => Err(Error::InvalidInput(format!("unknown variation type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Strand {
    #[serde(rename = "+")]
    Positive,
    #[serde(rename = "-")]
    Negative,
    #[default]
    #[serde(rename = ".")]
    Unknown,
}

impl Strand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strand::Positive => "+",
            Strand::Negative => "-",
            Strand::Unknown => ".",
        }
    }

    /// Lenient parse; anything unrecognised is an unknown strand.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "+" | "POSITIVE" | "positive" => Strand::Positive,
            "-" | "NEGATIVE" | "negative" => Strand::Negative,
            _ => Strand::Unknown,
        }
    }
}

/// Fields shared by every indexed feature.
///
/// Coordinates are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureIndexEntry {
    pub uuid: Uuid,
    pub feature_id: String,
    pub chromosome: Option<Chromosome>,
    pub start: u64,
    pub end: u64,
    pub kind: FeatureKind,
    pub file_id: u64,
    pub feature_name: String,
}

impl FeatureIndexEntry {
    pub fn new(kind: FeatureKind, chromosome: Chromosome, start: u64, end: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            feature_id: String::new(),
            chromosome: Some(chromosome),
            start,
            end,
            kind,
            file_id: 0,
            feature_name: String::new(),
        }
    }

    /// Check the invariants an entry must hold before it is persisted.
    pub fn validate(&self) -> Result<&Chromosome> {
        let chromosome = self.chromosome.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!("feature {} has no chromosome", self.feature_id))
        })?;
        if self.start > self.end {
            return Err(Error::InvalidRange(format!(
                "feature {} starts after it ends: {}-{}",
                self.feature_id, self.start, self.end
            )));
        }
        Ok(chromosome)
    }
}

/// A variant call, possibly multi-valued until simplified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantIndexEntry {
    pub base: FeatureIndexEntry,
    pub variation_type: Option<VariationType>,
    pub variation_types: BTreeSet<VariationType>,
    pub quality: f64,
    pub failed_filter: String,
    pub gene_id: String,
    pub gene_name: String,
    pub gene_ids: String,
    pub gene_names: String,
    pub is_exon: bool,
    pub annotations: BTreeMap<String, AnnotationValue>,
}

impl VariantIndexEntry {
    pub fn new(base: FeatureIndexEntry) -> Self {
        Self {
            base,
            variation_type: None,
            variation_types: BTreeSet::new(),
            quality: 0.0,
            failed_filter: String::new(),
            gene_id: String::new(),
            gene_name: String::new(),
            gene_ids: String::new(),
            gene_names: String::new(),
            is_exon: false,
            annotations: BTreeMap::new(),
        }
    }
}

/// A gene model feature from a GFF/GTF file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneIndexEntry {
    pub base: FeatureIndexEntry,
    pub frame: i32,
    pub score: f32,
    pub strand: Strand,
    pub source: String,
    pub attributes: BTreeMap<String, String>,
}

impl GeneIndexEntry {
    pub fn new(base: FeatureIndexEntry) -> Self {
        Self {
            base,
            frame: -1,
            score: 0.0,
            strand: Strand::Unknown,
            source: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Gene identity used for overlap reporting.
    pub fn gene_id(&self) -> &str {
        self.attributes
            .get("gene_id")
            .map(String::as_str)
            .unwrap_or(&self.base.feature_id)
    }

    pub fn gene_name(&self) -> &str {
        self.attributes
            .get("gene_name")
            .or_else(|| self.attributes.get("Name"))
            .or_else(|| self.attributes.get("name"))
            .map(String::as_str)
            .unwrap_or(&self.base.feature_name)
    }
}

/// Any entry the index writer can persist
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEntry {
    Variant(VariantIndexEntry),
    Gene(GeneIndexEntry),
    Generic(FeatureIndexEntry),
}

impl IndexEntry {
    pub fn base(&self) -> &FeatureIndexEntry {
        match self {
            IndexEntry::Variant(v) => &v.base,
            IndexEntry::Gene(g) => &g.base,
            IndexEntry::Generic(b) => b,
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        match self {
            IndexEntry::Variant(_) => RecordKind::Variant,
            IndexEntry::Gene(_) => RecordKind::GeneFeature,
            IndexEntry::Generic(_) => RecordKind::Generic,
        }
    }
}

impl From<VariantIndexEntry> for IndexEntry {
    fn from(entry: VariantIndexEntry) -> Self {
        IndexEntry::Variant(entry)
    }
}

impl From<GeneIndexEntry> for IndexEntry {
    fn from(entry: GeneIndexEntry) -> Self {
        IndexEntry::Gene(entry)
    }
}

impl From<FeatureIndexEntry> for IndexEntry {
    fn from(entry: FeatureIndexEntry) -> Self {
        IndexEntry::Generic(entry)
    }
}

/// A gene overlapping a queried coordinate.
///
/// Equality, ordering and hashing look at `gene_id` only, so a set of these
/// keeps the first entry seen for an id even when names or exon flags differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneOverlapInfo {
    pub gene_id: String,
    pub gene_name: String,
    pub is_exon: bool,
}

impl GeneOverlapInfo {
    pub fn new(gene_id: impl Into<String>, gene_name: impl Into<String>, is_exon: bool) -> Self {
        Self {
            gene_id: gene_id.into(),
            gene_name: gene_name.into(),
            is_exon,
        }
    }
}

impl PartialEq for GeneOverlapInfo {
    fn eq(&self, other: &Self) -> bool {
        self.gene_id == other.gene_id
    }
}

impl Eq for GeneOverlapInfo {}

impl Hash for GeneOverlapInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.gene_id.hash(state);
    }
}

impl PartialOrd for GeneOverlapInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GeneOverlapInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gene_id.cmp(&other.gene_id)
    }
}
