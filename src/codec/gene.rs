use super::{FeatureCodec, emit_fixed, stored_string};
use crate::document::{Document, FieldValue};
use crate::schema::{FieldRegistry, dynamic_field_name, fields, sort_key_name};
use crate::types::{FeatureIndexEntry, GeneIndexEntry, Strand};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Attributes that map onto fixed fields instead of dynamic ones.
const IDENTITY_ATTRIBUTES: [&str; 2] = [fields::GENE_ID, fields::GENE_NAME];

pub struct GeneCodec<'r> {
    registry: &'r FieldRegistry,
}

impl<'r> GeneCodec<'r> {
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self { registry }
    }

    fn add_attributes(&self, doc: &mut Document, attributes: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in attributes {
            let name = dynamic_field_name(key);

            if IDENTITY_ATTRIBUTES.contains(&name.as_str()) {
                emit_fixed(self.registry, doc, &name, value.as_str().into())?;
                continue;
            }
            if self.registry.is_reserved(&name) {
                tracing::warn!("gene attribute {} collides with a fixed field, skipping", key);
                continue;
            }

            doc.keyword(&name, value.trim().to_lowercase());
            doc.sort_key(&sort_key_name(&name), value.as_str().into());
            doc.stored(&name, value.as_str().into());
        }
        Ok(())
    }
}

impl FeatureCodec for GeneCodec<'_> {
    type Entry = GeneIndexEntry;

    fn registry(&self) -> &FieldRegistry {
        self.registry
    }

    fn base_of(entry: &GeneIndexEntry) -> &FeatureIndexEntry {
        &entry.base
    }

    fn add_extra_fields(&self, doc: &mut Document, entry: &GeneIndexEntry) -> Result<()> {
        let registry = self.registry;

        emit_fixed(registry, doc, fields::FRAME, FieldValue::Long(entry.frame.into()))?;
        emit_fixed(registry, doc, fields::SCORE, FieldValue::Double(entry.score.into()))?;
        if !entry.source.is_empty() {
            emit_fixed(registry, doc, fields::SOURCE, entry.source.as_str().into())?;
        }
        emit_fixed(registry, doc, fields::STRAND, entry.strand.as_str().into())?;

        self.add_attributes(doc, &entry.attributes)
    }

    fn read_extra_fields(&self, doc: &Document, base: FeatureIndexEntry) -> Result<GeneIndexEntry> {
        let frame = match doc.stored_long(fields::FRAME) {
            Some(frame) => i32::try_from(frame)
                .map_err(|_| Error::MalformedDocument(format!("bad frame: {}", frame)))?,
            None => -1,
        };

        let mut attributes = BTreeMap::new();
        for name in IDENTITY_ATTRIBUTES {
            if let Some(value) = doc.stored_str(name) {
                attributes.insert(name.to_string(), value.to_string());
            }
        }
        for name in doc.stored_names() {
            if self.registry.is_reserved(name) {
                continue;
            }
            if let Some(value) = doc.stored_str(name) {
                attributes.insert(name.to_string(), value.to_string());
            }
        }

        Ok(GeneIndexEntry {
            base,
            frame,
            score: doc.stored_double(fields::SCORE).unwrap_or(0.0) as f32,
            strand: doc
                .stored_str(fields::STRAND)
                .map(Strand::parse)
                .unwrap_or_default(),
            source: stored_string(doc, fields::SOURCE),
            attributes,
        })
    }
}
