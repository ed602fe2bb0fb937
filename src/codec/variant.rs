use super::{FeatureCodec, emit_fixed, emit_flag, read_flag, stored_string};
use crate::annotation::{AnnotationValue, ScalarValue, is_view_key, view_key};
use crate::document::{Document, FieldValue};
use crate::schema::{FieldRegistry, ValueDomain, dynamic_field_name, fields, sort_key_name};
use crate::types::{FeatureIndexEntry, VariantIndexEntry};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

pub struct VariantCodec<'r> {
    registry: &'r FieldRegistry,
}

impl<'r> VariantCodec<'r> {
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self { registry }
    }

    fn add_annotation_fields(
        &self,
        doc: &mut Document,
        annotations: &BTreeMap<String, AnnotationValue>,
    ) {
        for (key, value) in annotations {
            if is_view_key(key) {
                continue;
            }

            let name = dynamic_field_name(key);
            if self.registry.is_reserved(&name) {
                tracing::warn!("annotation {} collides with a fixed field, skipping", key);
                continue;
            }
            let sort_key = sort_key_name(&name);
            let view = annotations.get(&view_key(key)).map(|v| v.to_string());

            match value {
                AnnotationValue::Array(elements) => {
                    for element in elements {
                        let (indexed, stored) = match element {
                            ScalarValue::Integer(v) => {
                                (FieldValue::Long(*v), FieldValue::Long(*v))
                            }
                            ScalarValue::Float(v) => {
                                (FieldValue::Double(*v), FieldValue::Double(*v))
                            }
                            ScalarValue::String(s) => (
                                FieldValue::Str(s.trim().to_lowercase()),
                                FieldValue::Str(s.trim().to_string()),
                            ),
                        };
                        match indexed {
                            FieldValue::Str(term) => doc.keyword(&name, term),
                            numeric => doc.point(&name, numeric),
                        }
                        if view.is_none() {
                            doc.stored(&name, stored);
                        }
                    }
                    if let Some(view) = view {
                        doc.stored(&name, FieldValue::Str(view.clone()));
                        doc.facet(&name, view);
                    }
                }
                AnnotationValue::Integer(_) | AnnotationValue::Float(_) => {
                    let number = match value {
                        AnnotationValue::Integer(v) => FieldValue::Long(*v),
                        AnnotationValue::Float(v) => FieldValue::Double(*v),
                        _ => continue,
                    };
                    doc.point(&name, number.clone());
                    let display = view.map(FieldValue::Str).unwrap_or(number);
                    doc.sort_key(&sort_key, display.clone());
                    doc.stored(&name, display);
                }
                AnnotationValue::String(_) | AnnotationValue::Boolean(_) => {
                    let original = value.to_string();
                    let (term, stored) = match view {
                        Some(view) => (view.clone(), view),
                        None => (
                            original.trim().to_lowercase(),
                            original.trim().to_string(),
                        ),
                    };
                    doc.keyword(&name, term.clone());
                    doc.sort_key(&sort_key, FieldValue::Str(term));
                    doc.stored(&name, FieldValue::Str(stored));
                }
            }
        }
    }

    fn read_annotations(&self, doc: &Document) -> BTreeMap<String, AnnotationValue> {
        let mut annotations = BTreeMap::new();

        for name in doc.stored_names() {
            if self.registry.is_reserved(name) {
                continue;
            }
            let domain = self.registry.annotation_domain(name);
            let values: Vec<&FieldValue> = doc.stored_values(name).collect();

            let value = match values.as_slice() {
                [single] => Some(annotation_value(single, domain)),
                many => {
                    let elements: Vec<ScalarValue> =
                        many.iter().filter_map(|v| scalar_value(v)).collect();
                    (!elements.is_empty()).then_some(AnnotationValue::Array(elements))
                }
            };

            if let Some(value) = value {
                annotations.insert(name.to_string(), value);
            }
        }

        annotations
    }
}

impl FeatureCodec for VariantCodec<'_> {
    type Entry = VariantIndexEntry;

    fn registry(&self) -> &FieldRegistry {
        self.registry
    }

    fn base_of(entry: &VariantIndexEntry) -> &FeatureIndexEntry {
        &entry.base
    }

    fn add_extra_fields(&self, doc: &mut Document, entry: &VariantIndexEntry) -> Result<()> {
        let registry = self.registry;

        if let Some(ty) = entry.variation_type {
            emit_fixed(registry, doc, fields::VARIATION_TYPE, ty.as_str().into())?;
        }
        emit_fixed(registry, doc, fields::QUALITY, FieldValue::Double(entry.quality))?;

        for (name, value) in [
            (fields::FAILED_FILTER, &entry.failed_filter),
            (fields::GENE_ID, &entry.gene_id),
            (fields::GENE_IDS, &entry.gene_ids),
            (fields::GENE_NAME, &entry.gene_name),
            (fields::GENE_NAMES, &entry.gene_names),
        ] {
            if !value.is_empty() {
                emit_fixed(registry, doc, name, value.as_str().into())?;
            }
        }

        emit_flag(registry, doc, fields::IS_EXON, entry.is_exon)?;
        self.add_annotation_fields(doc, &entry.annotations);
        Ok(())
    }

    fn read_extra_fields(
        &self,
        doc: &Document,
        base: FeatureIndexEntry,
    ) -> Result<VariantIndexEntry> {
        let variation_type = doc
            .stored_str(fields::VARIATION_TYPE)
            .map(|s| {
                s.parse()
                    .map_err(|_| Error::MalformedDocument(format!("bad variation type: {}", s)))
            })
            .transpose()?;

        Ok(VariantIndexEntry {
            base,
            variation_type,
            variation_types: variation_type.into_iter().collect::<BTreeSet<_>>(),
            quality: doc.stored_double(fields::QUALITY).unwrap_or(0.0),
            failed_filter: stored_string(doc, fields::FAILED_FILTER),
            gene_id: stored_string(doc, fields::GENE_ID),
            gene_name: stored_string(doc, fields::GENE_NAME),
            gene_ids: stored_string(doc, fields::GENE_IDS),
            gene_names: stored_string(doc, fields::GENE_NAMES),
            is_exon: read_flag(doc, fields::IS_EXON),
            annotations: self.read_annotations(doc),
        })
    }
}

fn scalar_value(value: &FieldValue) -> Option<ScalarValue> {
    match value {
        FieldValue::Long(v) => Some(ScalarValue::Integer(*v)),
        FieldValue::Double(v) => Some(ScalarValue::Float(*v)),
        FieldValue::Str(s) => Some(ScalarValue::String(s.clone())),
        FieldValue::Bytes(_) => None,
    }
}

fn annotation_value(value: &FieldValue, domain: Option<ValueDomain>) -> AnnotationValue {
    match (value, domain) {
        (FieldValue::Str(s), Some(ValueDomain::Flag)) => {
            AnnotationValue::Boolean(s.eq_ignore_ascii_case("true"))
        }
        (FieldValue::Bytes(b), _) => AnnotationValue::Boolean(b.first().is_some_and(|b| *b != 0)),
        (FieldValue::Long(v), _) => AnnotationValue::Integer(*v),
        (FieldValue::Double(v), _) => AnnotationValue::Float(*v),
        (FieldValue::Str(s), _) => AnnotationValue::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationDecl, AnnotationType, Cardinality};
    use crate::document::Encoding;
    use crate::reference::Chromosome;
    use crate::types::{FeatureKind, VariationType};

    fn registry() -> FieldRegistry {
        let decls = [
            AnnotationDecl::new("AF", AnnotationType::Float, Cardinality::PerAlternate),
            AnnotationDecl::new("DP", AnnotationType::Integer, Cardinality::Fixed(1)),
            AnnotationDecl::new("DB", AnnotationType::Flag, Cardinality::Fixed(0)),
            AnnotationDecl::new("SVTYPE", AnnotationType::String, Cardinality::Fixed(1)),
        ];
        FieldRegistry::with_annotations(&decls).unwrap()
    }

    fn variant() -> VariantIndexEntry {
        let mut base = FeatureIndexEntry::new(
            FeatureKind::Variation,
            Chromosome::new(1, "chr1", 248_956_422),
            14_370,
            14_372,
        );
        base.feature_id = "rs6054257".to_string();
        base.feature_name = "rs6054257".to_string();
        base.file_id = 9;

        let mut entry = VariantIndexEntry::new(base);
        entry.variation_type = Some(VariationType::Del);
        entry.variation_types.insert(VariationType::Del);
        entry.quality = 29.5;
        entry.failed_filter = "q10".to_string();
        entry.gene_id = "ENSG0001".to_string();
        entry.gene_name = "BRCA1".to_string();
        entry.gene_ids = "ENSG0001,ENSG0002".to_string();
        entry.gene_names = "BRCA1,NBR2".to_string();
        entry.is_exon = true;
        entry
    }

    #[test]
    fn test_round_trip_stored_fields() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let mut entry = variant();
        entry
            .annotations
            .insert("DP".to_string(), AnnotationValue::Integer(14));
        entry
            .annotations
            .insert("SVTYPE".to_string(), AnnotationValue::String("Del".to_string()));
        entry
            .annotations
            .insert("DB".to_string(), AnnotationValue::Boolean(true));

        let doc = codec.encode(&entry, 9).unwrap();
        let back = codec.decode(&doc).unwrap();

        assert_eq!(back.base.uuid, entry.base.uuid);
        assert_eq!(back.base.feature_id, "rs6054257");
        assert_eq!(back.base.start, 14_370);
        assert_eq!(back.base.end, 14_372);
        assert_eq!(back.base.file_id, 9);
        assert_eq!(back.base.chromosome.as_ref().unwrap().name, "chr1");
        assert_eq!(back.variation_type, Some(VariationType::Del));
        assert_eq!(back.quality, 29.5);
        assert_eq!(back.failed_filter, "q10");
        assert_eq!(back.gene_id, "ENSG0001");
        assert_eq!(back.gene_name, "BRCA1");
        assert_eq!(back.gene_ids, "ENSG0001,ENSG0002");
        assert_eq!(back.gene_names, "BRCA1,NBR2");
        assert!(back.is_exon);

        assert_eq!(back.annotations.get("dp"), Some(&AnnotationValue::Integer(14)));
        assert_eq!(
            back.annotations.get("svtype"),
            Some(&AnnotationValue::String("Del".to_string()))
        );
        assert_eq!(back.annotations.get("db"), Some(&AnnotationValue::Boolean(true)));
    }

    #[test]
    fn test_view_field_encoding() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let mut entry = variant();
        entry.annotations.insert(
            "AF".to_string(),
            AnnotationValue::Array(vec![ScalarValue::Float(0.1), ScalarValue::Float(0.2)]),
        );
        entry.annotations.insert(
            "_AF_v".to_string(),
            AnnotationValue::String("0.1,0.2".to_string()),
        );

        let doc = codec.encode(&entry, 9).unwrap();

        let points: Vec<&FieldValue> = doc.values("af", Encoding::Point).collect();
        assert_eq!(
            points,
            vec![&FieldValue::Double(0.1), &FieldValue::Double(0.2)]
        );
        let stored: Vec<&FieldValue> = doc.stored_values("af").collect();
        assert_eq!(stored, vec![&FieldValue::from("0.1,0.2")]);
        assert_eq!(doc.facet_labels("af").collect::<Vec<_>>(), vec!["0.1,0.2"]);

        assert!(
            doc.fields()
                .iter()
                .all(|f| !f.name.eq_ignore_ascii_case("_af_v"))
        );
    }

    #[test]
    fn test_scalar_prefers_view_for_display() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let mut entry = variant();
        entry
            .annotations
            .insert("DP".to_string(), AnnotationValue::Integer(7));
        entry
            .annotations
            .insert("_DP_v".to_string(), AnnotationValue::String("7,9".to_string()));

        let doc = codec.encode(&entry, 9).unwrap();
        assert_eq!(
            doc.values("dp", Encoding::Point).collect::<Vec<_>>(),
            vec![&FieldValue::Long(7)]
        );
        assert_eq!(doc.stored_str("dp"), Some("7,9"));
        assert_eq!(
            doc.values("dp_s", Encoding::SortKey).collect::<Vec<_>>(),
            vec![&FieldValue::from("7,9")]
        );
    }

    #[test]
    fn test_string_annotation_lower_cased_for_filtering() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let mut entry = variant();
        entry.annotations.insert(
            "SVTYPE".to_string(),
            AnnotationValue::String("  Del ".to_string()),
        );

        let doc = codec.encode(&entry, 9).unwrap();
        assert_eq!(
            doc.values("svtype", Encoding::Keyword).collect::<Vec<_>>(),
            vec![&FieldValue::from("del")]
        );
        assert_eq!(doc.stored_str("svtype"), Some("Del"));
    }

    #[test]
    fn test_array_without_view_round_trips() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let mut entry = variant();
        let af = AnnotationValue::Array(vec![ScalarValue::Float(0.25), ScalarValue::Float(0.5)]);
        entry.annotations.insert("AF".to_string(), af.clone());

        let back = codec.decode(&codec.encode(&entry, 9).unwrap()).unwrap();
        assert_eq!(back.annotations.get("af"), Some(&af));
    }

    #[test]
    fn test_is_exon_binary_encoding() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let doc = codec.encode(&variant(), 9).unwrap();
        assert_eq!(
            doc.first_stored(fields::IS_EXON),
            Some(&FieldValue::Bytes(vec![1]))
        );
        assert_eq!(
            doc.values(fields::IS_EXON, Encoding::Keyword).collect::<Vec<_>>(),
            vec![&FieldValue::from("true")]
        );
    }

    #[test]
    fn test_annotation_colliding_with_fixed_field_is_skipped() {
        let registry = registry();
        let codec = VariantCodec::new(&registry);
        let mut entry = variant();
        entry
            .annotations
            .insert("QUALITY".to_string(), AnnotationValue::Integer(1));

        let doc = codec.encode(&entry, 9).unwrap();
        let qualities: Vec<_> = doc.stored_values(fields::QUALITY).collect();
        assert_eq!(qualities, vec![&FieldValue::Double(29.5)]);
    }
}
