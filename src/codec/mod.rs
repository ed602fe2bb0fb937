//! Document codecs, one per record kind.
//!
//! Every codec writes the same base fields and then appends its kind-specific
//! fields through [`FeatureCodec::add_extra_fields`]. Decoding is the inverse:
//! stored fields are read back into an entry, absent optional fields become
//! zero values.
//!
//! # Codecs
//!
//! - [`VariantCodec`] - variant calls, including dynamic annotation fields
//! - [`GeneCodec`] - GFF/GTF gene model features and their attributes
//! - [`GenericCodec`] - any other feature, base fields only
//!
//! [`encode`] and [`decode`] pick the codec from the record kind.

mod gene;
mod generic;
mod variant;

pub use gene::GeneCodec;
pub use generic::GenericCodec;
pub use variant::VariantCodec;

use crate::document::{Document, FieldValue};
use crate::reference::Chromosome;
use crate::schema::{FieldRegistry, FieldSpec, fields};
use crate::types::{FeatureIndexEntry, FeatureKind, IndexEntry, RecordKind};
use crate::{Error, Result};
use uuid::Uuid;

pub trait FeatureCodec {
    type Entry;

    fn registry(&self) -> &FieldRegistry;

    fn base_of(entry: &Self::Entry) -> &FeatureIndexEntry;

    /// Append the kind-specific fields of `entry`.
    fn add_extra_fields(&self, doc: &mut Document, entry: &Self::Entry) -> Result<()>;

    /// Rebuild a kind-specific entry around an already decoded base.
    fn read_extra_fields(&self, doc: &Document, base: FeatureIndexEntry) -> Result<Self::Entry>;

    fn encode(&self, entry: &Self::Entry, file_id: u64) -> Result<Document> {
        let mut doc = Document::new();
        write_base_fields(self.registry(), &mut doc, Self::base_of(entry), file_id)?;
        self.add_extra_fields(&mut doc, entry)?;
        Ok(doc)
    }

    fn decode(&self, doc: &Document) -> Result<Self::Entry> {
        let base = read_base_fields(doc)?;
        self.read_extra_fields(doc, base)
    }
}

/// Encode any entry with the codec of its kind.
pub fn encode(registry: &FieldRegistry, entry: &IndexEntry, file_id: u64) -> Result<Document> {
    match entry {
        IndexEntry::Variant(v) => VariantCodec::new(registry).encode(v, file_id),
        IndexEntry::Gene(g) => GeneCodec::new(registry).encode(g, file_id),
        IndexEntry::Generic(b) => GenericCodec::new(registry).encode(b, file_id),
    }
}

/// Decode a document with the codec matching its stored feature type.
pub fn decode(registry: &FieldRegistry, doc: &Document) -> Result<IndexEntry> {
    match stored_kind(doc)?.record_kind() {
        RecordKind::Variant => VariantCodec::new(registry).decode(doc).map(IndexEntry::Variant),
        RecordKind::GeneFeature => GeneCodec::new(registry).decode(doc).map(IndexEntry::Gene),
        RecordKind::Generic => GenericCodec::new(registry).decode(doc).map(IndexEntry::Generic),
    }
}

fn write_base_fields(
    registry: &FieldRegistry,
    doc: &mut Document,
    entry: &FeatureIndexEntry,
    file_id: u64,
) -> Result<()> {
    let chromosome = entry.validate()?;

    emit_fixed(registry, doc, fields::FEATURE_ID, entry.feature_id.as_str().into())?;
    emit_fixed(registry, doc, fields::UID, entry.uuid.to_string().into())?;
    emit_fixed(registry, doc, fields::CHROMOSOME_ID, chromosome.id.to_string().into())?;
    emit_fixed(registry, doc, fields::CHROMOSOME_NAME, chromosome.name.as_str().into())?;
    emit_fixed(registry, doc, fields::START_INDEX, coordinate(entry.start)?)?;
    emit_fixed(registry, doc, fields::END_INDEX, coordinate(entry.end)?)?;
    emit_fixed(registry, doc, fields::FEATURE_TYPE, entry.kind.as_str().into())?;
    emit_fixed(registry, doc, fields::FILE_ID, file_id.to_string().into())?;
    emit_fixed(registry, doc, fields::FEATURE_NAME, entry.feature_name.as_str().into())?;
    Ok(())
}

fn read_base_fields(doc: &Document) -> Result<FeatureIndexEntry> {
    let uuid = match doc.stored_str(fields::UID) {
        Some(uid) => Uuid::parse_str(uid)
            .map_err(|e| Error::MalformedDocument(format!("bad uid {}: {}", uid, e)))?,
        None => Uuid::nil(),
    };

    let chromosome_id = doc.stored_str(fields::CHROMOSOME_ID);
    let chromosome_name = doc.stored_str(fields::CHROMOSOME_NAME);
    let chromosome = match (chromosome_id, chromosome_name) {
        (None, None) => None,
        (id, name) => Some(Chromosome::new(
            parse_u64(fields::CHROMOSOME_ID, id)?,
            name.unwrap_or_default(),
            0,
        )),
    };

    Ok(FeatureIndexEntry {
        uuid,
        feature_id: stored_string(doc, fields::FEATURE_ID),
        chromosome,
        start: stored_coordinate(doc, fields::START_INDEX)?,
        end: stored_coordinate(doc, fields::END_INDEX)?,
        kind: stored_kind(doc)?,
        file_id: parse_u64(fields::FILE_ID, doc.stored_str(fields::FILE_ID))?,
        feature_name: stored_string(doc, fields::FEATURE_NAME),
    })
}

fn stored_kind(doc: &Document) -> Result<FeatureKind> {
    match doc.stored_str(fields::FEATURE_TYPE) {
        Some(kind) => kind
            .parse()
            .map_err(|_| Error::MalformedDocument(format!("unknown feature type: {}", kind))),
        None => Ok(FeatureKind::Generic),
    }
}

/// Write `value` under a registered field following its declared encoding.
pub(crate) fn emit_fixed(
    registry: &FieldRegistry,
    doc: &mut Document,
    name: &str,
    value: FieldValue,
) -> Result<()> {
    let spec = registry
        .get(name)
        .ok_or_else(|| Error::Internal(format!("field not registered: {}", name)))?;
    emit(doc, spec, value);
    Ok(())
}

/// Filter and facet copies are lower-cased; stored and sort copies keep case.
pub(crate) fn emit(doc: &mut Document, spec: &FieldSpec, value: FieldValue) {
    if spec.indexed {
        match &value {
            FieldValue::Str(s) => doc.keyword(&spec.name, s.trim().to_lowercase()),
            other if !spec.range => doc.keyword(&spec.name, other.to_label()),
            _ => {}
        }
    }
    if spec.range && matches!(value, FieldValue::Long(_) | FieldValue::Double(_)) {
        doc.point(&spec.name, value.clone());
    }
    if let Some(sort_key) = spec.sort_key() {
        doc.sort_key(&sort_key, value.clone());
    }
    if let Some(dimension) = &spec.facet {
        doc.facet(dimension, value.to_label());
    }
    if spec.stored {
        doc.stored(&spec.name, value);
    }
}

/// Write a boolean field: indexed as text, stored in the binary encoding.
pub(crate) fn emit_flag(
    registry: &FieldRegistry,
    doc: &mut Document,
    name: &str,
    value: bool,
) -> Result<()> {
    let spec = registry
        .get(name)
        .ok_or_else(|| Error::Internal(format!("field not registered: {}", name)))?;
    if spec.indexed {
        doc.keyword(&spec.name, value.to_string());
    }
    if let Some(sort_key) = spec.sort_key() {
        doc.sort_key(&sort_key, FieldValue::Long(value as i64));
    }
    if spec.stored {
        doc.stored(&spec.name, FieldValue::Bytes(vec![value as u8]));
    }
    Ok(())
}

/// Read a boolean stored either as binary or as plain text; binary wins.
pub(crate) fn read_flag(doc: &Document, name: &str) -> bool {
    let values: Vec<&FieldValue> = doc.stored_values(name).collect();
    if let Some(bytes) = values.iter().find_map(|v| v.as_bytes()) {
        return bytes.first().is_some_and(|b| *b != 0);
    }
    values
        .iter()
        .find_map(|v| v.as_str())
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("true"))
}

pub(crate) fn stored_string(doc: &Document, name: &str) -> String {
    doc.stored_str(name).unwrap_or_default().to_string()
}

fn stored_coordinate(doc: &Document, name: &str) -> Result<u64> {
    match doc.stored_long(name) {
        Some(v) => u64::try_from(v)
            .map_err(|_| Error::MalformedDocument(format!("negative {}: {}", name, v))),
        None => Ok(0),
    }
}

fn coordinate(pos: u64) -> Result<FieldValue> {
    i64::try_from(pos)
        .map(FieldValue::Long)
        .map_err(|_| Error::InvalidRange(format!("coordinate out of range: {}", pos)))
}

fn parse_u64(name: &str, value: Option<&str>) -> Result<u64> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| Error::MalformedDocument(format!("bad {}: {}", name, v))),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Encoding;
    use crate::types::{GeneIndexEntry, VariantIndexEntry};

    fn registry() -> FieldRegistry {
        FieldRegistry::standard().unwrap()
    }

    fn generic_entry() -> FeatureIndexEntry {
        let mut entry =
            FeatureIndexEntry::new(FeatureKind::Generic, Chromosome::new(3, "chr3", 0), 10, 20);
        entry.feature_id = "peak_1".to_string();
        entry.feature_name = "Peak One".to_string();
        entry
    }

    #[test]
    fn test_base_fields_encoding() {
        let registry = registry();
        let doc = GenericCodec::new(&registry)
            .encode(&generic_entry(), 42)
            .unwrap();

        let names: Vec<&str> = doc
            .values(fields::FEATURE_NAME, Encoding::Keyword)
            .filter_map(FieldValue::as_str)
            .collect();
        assert_eq!(names, vec!["peak one"]);
        assert_eq!(doc.stored_str(fields::FEATURE_NAME), Some("Peak One"));
        let sort: Vec<_> = doc.values("feature_name_s", Encoding::SortKey).collect();
        assert_eq!(sort, vec![&FieldValue::from("Peak One")]);

        assert_eq!(doc.stored_str(fields::FILE_ID), Some("42"));
        assert_eq!(doc.stored_long(fields::START_INDEX), Some(10));
        assert!(doc.is_queryable(fields::START_INDEX));
        assert_eq!(
            doc.facet_labels(fields::FACET_CHR_ID).collect::<Vec<_>>(),
            vec!["3"]
        );
        assert_eq!(doc.facet_labels(fields::FACET_UID).count(), 1);
    }

    #[test]
    fn test_encode_requires_chromosome() {
        let registry = registry();
        let mut entry = generic_entry();
        entry.chromosome = None;
        assert!(GenericCodec::new(&registry).encode(&entry, 1).is_err());
    }

    #[test]
    fn test_factory_dispatches_on_kind() {
        let registry = registry();
        let chr = Chromosome::new(1, "chr1", 0);

        let variant = VariantIndexEntry::new(FeatureIndexEntry::new(
            FeatureKind::Variation,
            chr.clone(),
            5,
            5,
        ));
        let gene = GeneIndexEntry::new(FeatureIndexEntry::new(FeatureKind::Exon, chr, 1, 9));

        for entry in [IndexEntry::from(variant), IndexEntry::from(gene)] {
            let doc = encode(&registry, &entry, 1).unwrap();
            let back = decode(&registry, &doc).unwrap();
            assert_eq!(back.record_kind(), entry.record_kind());
        }
    }

    #[test]
    fn test_read_flag_prefers_binary() {
        let mut doc = Document::new();
        doc.stored("is_exon", FieldValue::from("true"));
        doc.stored("is_exon", FieldValue::Bytes(vec![0]));
        assert!(!read_flag(&doc, "is_exon"));

        let mut legacy = Document::new();
        legacy.stored("is_exon", FieldValue::from("TRUE"));
        assert!(read_flag(&legacy, "is_exon"));

        assert!(!read_flag(&Document::new(), "is_exon"));
    }

    #[test]
    fn test_decode_absent_fields_are_zero() {
        let registry = registry();
        let mut doc = Document::new();
        doc.stored(fields::FEATURE_TYPE, FieldValue::from("GENERIC"));

        let entry = GenericCodec::new(&registry).decode(&doc).unwrap();
        assert_eq!(entry.feature_id, "");
        assert_eq!(entry.start, 0);
        assert_eq!(entry.file_id, 0);
        assert!(entry.chromosome.is_none());
        assert!(entry.uuid.is_nil());
    }

    #[test]
    fn test_decode_rejects_bad_uid() {
        let registry = registry();
        let mut doc = Document::new();
        doc.stored(fields::UID, FieldValue::from("not-a-uuid"));
        assert!(matches!(
            GenericCodec::new(&registry).decode(&doc),
            Err(Error::MalformedDocument(_))
        ));
    }
}
