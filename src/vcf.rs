//! VCF source adapter.
//!
//! Turns VCF records into master [`VariantIndexEntry`] values ready for gene
//! lookup and simplification. Records on contigs the reference cannot resolve
//! and records whose alternates carry no variation are skipped and counted.

use crate::annotation::{AnnotationDecl, ambiguous_fields, parse_info};
use crate::reference::{Chromosome, Reference};
use crate::types::{FeatureIndexEntry, FeatureKind, VariantIndexEntry, VariationType};
use crate::{Error, Result};
use noodles::bgzf;
use noodles::vcf;
use noodles::vcf::variant::record::{AlternateBases as _, Filters as _, Ids as _};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A master variant and the filters it failed, in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    pub entry: VariantIndexEntry,
    pub filters: Vec<String>,
}

impl VariantRecord {
    pub fn chromosome(&self) -> Option<&Chromosome> {
        self.entry.base.chromosome.as_ref()
    }
}

/// Classify one alternate allele against the reference allele.
///
/// Returns `None` for alleles that carry no variation: missing (`.`), the
/// overlapping-deletion marker (`*`), gVCF reference blocks (`<*>`,
/// `<NON_REF>`) and an alternate equal to the reference.
pub fn classify_allele(reference: &str, alternate: &str) -> Option<VariationType> {
    let reference = reference.trim().to_ascii_uppercase();
    let alternate = alternate.trim().to_ascii_uppercase();

    match alternate.as_str() {
        "" | "." | "*" | "<*>" | "<NON_REF>" => return None,
        alt if alt == reference => return None,
        _ => {}
    }

    if let Some(symbol) = alternate
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
    {
        let kind = symbol.split(':').next().unwrap_or_default();
        return Some(match kind {
            "DEL" => VariationType::Del,
            "INS" => VariationType::Ins,
            "DUP" => VariationType::Dup,
            "INV" => VariationType::Inv,
            _ => VariationType::Unk,
        });
    }

    if alternate.contains(['[', ']'])
        || alternate.starts_with('.')
        || alternate.ends_with('.')
    {
        return Some(VariationType::Bnd);
    }

    let (r, a) = (reference.len(), alternate.len());
    Some(if r == a {
        if r == 1 {
            VariationType::Snv
        } else {
            VariationType::Mnp
        }
    } else if a > r && alternate.starts_with(&reference) {
        VariationType::Ins
    } else if r > a && reference.starts_with(&alternate) {
        VariationType::Del
    } else {
        VariationType::Mixed
    })
}

/// Variation sub-types of a record; empty when no alternate carries variation.
pub fn variation_types<'a>(
    reference: &str,
    alternates: impl IntoIterator<Item = &'a str>,
) -> BTreeSet<VariationType> {
    alternates
        .into_iter()
        .filter_map(|alt| classify_allele(reference, alt))
        .collect()
}

/// Missing, NaN and negative "no call" qualities all index as 0.
pub fn normalize_quality(quality: Option<f32>) -> f64 {
    match quality {
        Some(q) if q.is_finite() && q >= 0.0 => f64::from(q),
        _ => 0.0,
    }
}

/// `END` from a raw INFO column, if present and numeric.
fn info_end(info: &str) -> Option<u64> {
    info.split(';')
        .find_map(|field| field.strip_prefix("END="))
        .and_then(|v| v.trim().parse().ok())
}

/// Borrowed columns of one VCF data line.
#[derive(Debug, Clone, Default)]
pub struct RawVariant<'a> {
    pub chromosome: &'a str,
    pub position: u64,
    pub ids: Vec<&'a str>,
    pub reference: &'a str,
    pub alternates: Vec<&'a str>,
    pub quality: Option<f32>,
    pub filters: Vec<&'a str>,
    pub info: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedVariant {
    Record(VariantRecord),
    UnknownChromosome(String),
    NoVariation,
    /// Start or end past the chromosome length
    OutOfBounds(String),
}

/// Build the master entry of one raw variant.
pub fn build_variant(
    raw: &RawVariant<'_>,
    reference: &Reference,
    declarations: &BTreeMap<String, AnnotationDecl>,
    file_id: u64,
) -> Result<ParsedVariant> {
    let Some(chromosome) = reference.resolve(raw.chromosome) else {
        return Ok(ParsedVariant::UnknownChromosome(raw.chromosome.to_string()));
    };

    let types = variation_types(raw.reference, raw.alternates.iter().copied());
    if types.is_empty() {
        return Ok(ParsedVariant::NoVariation);
    }

    if raw.position == 0 {
        return Err(Error::InvalidInput(format!(
            "variant at {}:0 has no position",
            raw.chromosome
        )));
    }
    let start = raw.position;
    let span_end = start + (raw.reference.len().max(1) as u64) - 1;
    let end = info_end(raw.info)
        .filter(|end| *end >= start)
        .unwrap_or(span_end);
    if !chromosome.contains(start) || !chromosome.contains(end) {
        return Ok(ParsedVariant::OutOfBounds(format!(
            "{}:{}-{}",
            raw.chromosome, start, end
        )));
    }

    let ids: Vec<&str> = raw
        .ids
        .iter()
        .copied()
        .filter(|id| !id.is_empty() && *id != ".")
        .collect();
    let feature_id = if ids.is_empty() {
        format!(
            "{}_{}_{}/{}",
            raw.chromosome,
            start,
            raw.reference,
            raw.alternates.join(",")
        )
    } else {
        ids.join(";")
    };

    let mut base = FeatureIndexEntry::new(FeatureKind::Variation, chromosome.clone(), start, end);
    base.feature_name = feature_id.clone();
    base.feature_id = feature_id;
    base.file_id = file_id;

    let mut entry = VariantIndexEntry::new(base);
    entry.variation_type = types.iter().next().copied();
    entry.variation_types = types;
    entry.quality = normalize_quality(raw.quality);
    entry.annotations = parse_info(raw.info, declarations);

    let filters = raw
        .filters
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty() && *f != "." && *f != "PASS")
        .map(str::to_string)
        .collect();

    Ok(ParsedVariant::Record(VariantRecord { entry, filters }))
}

/// Counters of one pass over a VCF source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    pub records: u64,
    pub unknown_chromosome: u64,
    pub no_variation: u64,
    pub out_of_bounds: u64,
}

pub struct VcfSource<R> {
    reader: vcf::io::Reader<R>,
    header: vcf::Header,
    whitelist: Vec<String>,
    declarations: BTreeMap<String, AnnotationDecl>,
    stats: ReadStats,
}

impl VcfSource<Box<dyn BufRead + Send>> {
    /// Open a plain or bgzip-compressed (`.gz`) VCF file.
    pub fn open(path: &Path, whitelist: &[String]) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;

        let inner: Box<dyn BufRead + Send> =
            if path.extension().is_some_and(|ext| ext == "gz" || ext == "bgz") {
                Box::new(bgzf::Reader::new(file))
            } else {
                Box::new(BufReader::new(file))
            };

        Self::from_reader(inner, whitelist)
    }
}

impl<R: BufRead> VcfSource<R> {
    pub fn from_reader(inner: R, whitelist: &[String]) -> Result<Self> {
        let mut reader = vcf::io::Reader::new(inner);
        let header = reader
            .read_header()
            .map_err(|e| Error::InvalidInput(format!("failed to read VCF header: {}", e)))?;

        let mut declarations = BTreeMap::new();
        for (name, info) in header.infos() {
            if !whitelist.iter().any(|w| w == name) {
                continue;
            }
            use vcf::header::record::value::map::info::Number;
            let number = match info.number() {
                Number::Count(n) => n.to_string(),
                Number::AlternateBases => "A".to_string(),
                Number::ReferenceAlternateBases => "R".to_string(),
                Number::Samples => "G".to_string(),
                Number::Unknown => ".".to_string(),
            };
            match AnnotationDecl::parse(name, &number, &info.ty().to_string()) {
                Ok(decl) => {
                    declarations.insert(name.to_string(), decl);
                }
                Err(e) => tracing::warn!("ignoring INFO declaration {}: {}", name, e),
            }
        }

        for name in whitelist {
            if !declarations.contains_key(name) {
                tracing::warn!("INFO field {} is not declared in the header", name);
            }
        }

        Ok(Self {
            reader,
            header,
            whitelist: whitelist.to_vec(),
            declarations,
            stats: ReadStats::default(),
        })
    }

    /// Whitelisted INFO declarations, keyed by header name.
    pub fn declarations(&self) -> &BTreeMap<String, AnnotationDecl> {
        &self.declarations
    }

    /// Whitelisted fields whose fixed cardinality exceeds one.
    pub fn ambiguous_fields(&self) -> Vec<String> {
        let decls: Vec<AnnotationDecl> = self.declarations.values().cloned().collect();
        ambiguous_fields(&decls, &self.whitelist)
    }

    /// Reference built from the header `##contig` lines.
    pub fn header_reference(&self, id: u64, name: &str) -> Result<Reference> {
        Reference::from_lengths(
            id,
            name,
            self.header
                .contigs()
                .iter()
                .map(|(contig, map)| (contig.to_string(), map.length().unwrap_or(0) as u64)),
        )
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Next indexable record, skipping what cannot be indexed.
    pub fn next_record(
        &mut self,
        reference: &Reference,
        file_id: u64,
    ) -> Result<Option<VariantRecord>> {
        let mut record = vcf::Record::default();

        loop {
            let read = self
                .reader
                .read_record(&mut record)
                .map_err(|e| Error::InvalidInput(format!("failed to read VCF record: {}", e)))?;
            if read == 0 {
                return Ok(None);
            }

            let parsed = self.parse(&record, reference, file_id)?;
            match parsed {
                ParsedVariant::Record(variant) => {
                    self.stats.records += 1;
                    return Ok(Some(variant));
                }
                ParsedVariant::UnknownChromosome(name) => {
                    tracing::debug!("skipping record on unknown contig {}", name);
                    self.stats.unknown_chromosome += 1;
                }
                ParsedVariant::NoVariation => {
                    self.stats.no_variation += 1;
                }
                ParsedVariant::OutOfBounds(span) => {
                    tracing::debug!("skipping record past the contig end at {}", span);
                    self.stats.out_of_bounds += 1;
                }
            }
        }
    }

    fn parse(
        &self,
        record: &vcf::Record,
        reference: &Reference,
        file_id: u64,
    ) -> Result<ParsedVariant> {
        let invalid = |e: std::io::Error| Error::InvalidInput(format!("bad VCF record: {}", e));

        let position = match record.variant_start() {
            Some(start) => usize::from(start.map_err(invalid)?) as u64,
            None => 0,
        };
        let alternate_bases = record.alternate_bases();
        let alternates = alternate_bases
            .iter()
            .collect::<std::io::Result<Vec<&str>>>()
            .map_err(invalid)?;
        let quality = record.quality_score().transpose().map_err(invalid)?;
        let record_filters = record.filters();
        let filters = record_filters
            .iter(&self.header)
            .collect::<std::io::Result<Vec<&str>>>()
            .map_err(invalid)?;

        let ids = record.ids();
        let info = record.info();
        let raw = RawVariant {
            chromosome: record.reference_sequence_name(),
            position,
            ids: ids.iter().collect(),
            reference: record.reference_bases(),
            alternates,
            quality,
            filters,
            info: info.as_ref(),
        };

        build_variant(&raw, reference, &self.declarations, file_id)
    }
}

impl<R: BufRead + Send + 'static> VcfSource<R> {
    /// Read the remaining records on a blocking thread into a bounded channel.
    ///
    /// Reading stops at the first error, which is sent as the last item, or as
    /// soon as the receiver is dropped. The task returns the final counters.
    pub fn spawn_reader(
        mut self,
        reference: Reference,
        file_id: u64,
        capacity: usize,
    ) -> (mpsc::Receiver<Result<VariantRecord>>, JoinHandle<ReadStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let handle = tokio::task::spawn_blocking(move || {
            loop {
                let next = match self.next_record(&reference, file_id) {
                    Ok(Some(record)) => Ok(record),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = next.is_err();
                if tx.blocking_send(next).is_err() || failed {
                    break;
                }
            }
            self.stats
        });

        (rx, handle)
    }
}
