//! Explosion of a multi-valued variant into single-valued entries.
//!
//! A master variant may carry several variation sub-types, overlap several
//! genes, fail several filters and hold arrays for annotation fields whose
//! declared cardinality is fixed above one. The search index stores one value
//! per field, so the master is split along each of these dimensions in turn:
//!
//! 1. variation type
//! 2. overlapping gene (every copy also carries the aggregate id/name lists)
//! 3. failed filter
//! 4. each ambiguous annotation, folded in declaration order
//!
//! The output size is `|T| * max(|G|,1) * max(|F|,1) * product(len(array))`
//! and its order is fully determined by the inputs.

use crate::annotation::{AnnotationValue, view_key};
use crate::types::{GeneOverlapInfo, VariantIndexEntry, VariationType};
use crate::{Error, Result};
use std::collections::BTreeSet;

/// Explode `master` into simplified entries.
///
/// `genes` is already deduplicated by gene id, `filters` is in source order and
/// `ambiguous` names annotation fields with a fixed cardinality above one.
pub fn simplify(
    master: &VariantIndexEntry,
    genes: &BTreeSet<GeneOverlapInfo>,
    filters: &[String],
    ambiguous: &[String],
) -> Result<Vec<VariantIndexEntry>> {
    let entries = split_by_type(master)?;
    let entries = split_by_gene(entries, genes);
    let entries = split_by_filter(entries, filters);

    Ok(ambiguous
        .iter()
        .fold(entries, |entries, name| split_by_annotation(entries, name)))
}

fn split_by_type(master: &VariantIndexEntry) -> Result<Vec<VariantIndexEntry>> {
    let types: Vec<VariationType> = master.variation_types.iter().copied().collect();
    if types.is_empty() {
        return Err(Error::Internal(format!(
            "variant {} has no variation type",
            master.base.feature_id
        )));
    }

    Ok(types
        .into_iter()
        .map(|ty| {
            let mut entry = master.clone();
            entry.variation_type = Some(ty);
            entry
        })
        .collect())
}

fn split_by_gene(
    entries: Vec<VariantIndexEntry>,
    genes: &BTreeSet<GeneOverlapInfo>,
) -> Vec<VariantIndexEntry> {
    if genes.is_empty() {
        return entries;
    }

    let gene_ids = join(genes.iter().map(|g| g.gene_id.as_str()));
    let gene_names = join(genes.iter().map(|g| g.gene_name.as_str()));

    entries
        .into_iter()
        .flat_map(|entry| {
            genes.iter().map(move |gene| {
                let mut copy = entry.clone();
                copy.gene_id = gene.gene_id.clone();
                copy.gene_name = gene.gene_name.clone();
                copy.is_exon = gene.is_exon;
                copy
            })
        })
        .map(|mut entry| {
            entry.gene_ids = gene_ids.clone();
            entry.gene_names = gene_names.clone();
            entry
        })
        .collect()
}

fn split_by_filter(entries: Vec<VariantIndexEntry>, filters: &[String]) -> Vec<VariantIndexEntry> {
    if filters.is_empty() {
        return entries;
    }

    entries
        .into_iter()
        .flat_map(|entry| {
            filters.iter().map(move |filter| {
                let mut copy = entry.clone();
                copy.failed_filter = filter.clone();
                copy
            })
        })
        .collect()
}

/// One copy per array element of `name`; entries without an array pass through.
fn split_by_annotation(entries: Vec<VariantIndexEntry>, name: &str) -> Vec<VariantIndexEntry> {
    let view = view_key(name);

    entries
        .into_iter()
        .flat_map(|entry| {
            let elements = match entry.annotations.get(name).cloned() {
                Some(AnnotationValue::Array(elements)) if !elements.is_empty() => elements,
                _ => return vec![entry],
            };

            elements
                .into_iter()
                .map(|element| {
                    let mut copy = entry.clone();
                    copy.annotations.remove(&view);
                    copy.annotations
                        .insert(name.to_string(), AnnotationValue::from(element));
                    copy
                })
                .collect()
        })
        .collect()
}

fn join<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(",")
}
