use super::FeatureCodec;
use crate::Result;
use crate::document::Document;
use crate::schema::FieldRegistry;
use crate::types::FeatureIndexEntry;

/// Codec for features without kind-specific fields.
pub struct GenericCodec<'r> {
    registry: &'r FieldRegistry,
}

impl<'r> GenericCodec<'r> {
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self { registry }
    }
}

impl FeatureCodec for GenericCodec<'_> {
    type Entry = FeatureIndexEntry;

    fn registry(&self) -> &FieldRegistry {
        self.registry
    }

    fn base_of(entry: &FeatureIndexEntry) -> &FeatureIndexEntry {
        entry
    }

    fn add_extra_fields(&self, _doc: &mut Document, _entry: &FeatureIndexEntry) -> Result<()> {
        Ok(())
    }

    fn read_extra_fields(&self, _doc: &Document, base: FeatureIndexEntry) -> Result<FeatureIndexEntry> {
        Ok(base)
    }
}
