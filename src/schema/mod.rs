//! Field schema registry.
//!
//! Maps logical field names to the encoding rules the document codecs follow:
//! value domain, whether the field is indexed for filtering, range-queryable,
//! sortable through a parallel `<field>_s` key, stored for retrieval, and
//! which facet dimension (if any) it feeds.
//!
//! The registry is assembled once at startup from the static tables in
//! [`fields`] plus the annotation fields surfaced for a file. Registering a
//! name twice with a different encoding fails immediately.

pub mod fields;

use crate::annotation::{AnnotationDecl, AnnotationType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use fields::SORT_SUFFIX;

/// Value domain of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueDomain {
    Integer,
    Float,
    String,
    Flag,
}

impl From<AnnotationType> for ValueDomain {
    fn from(ty: AnnotationType) -> Self {
        match ty {
            AnnotationType::Integer => ValueDomain::Integer,
            AnnotationType::Float => ValueDomain::Float,
            AnnotationType::Flag => ValueDomain::Flag,
            AnnotationType::Character | AnnotationType::String => ValueDomain::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub domain: ValueDomain,
    pub indexed: bool,
    pub range: bool,
    pub sortable: bool,
    pub stored: bool,
    pub facet: Option<String>,
    pub dynamic: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, domain: ValueDomain) -> Self {
        Self {
            name: name.into(),
            domain,
            indexed: false,
            range: false,
            sortable: false,
            stored: false,
            facet: None,
            dynamic: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn range(mut self) -> Self {
        self.range = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    pub fn facet(mut self, dimension: impl Into<String>) -> Self {
        self.facet = Some(dimension.into());
        self
    }

    fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Name of the parallel sort key, if the field is sortable.
    pub fn sort_key(&self) -> Option<String> {
        self.sortable.then(|| sort_key_name(&self.name))
    }

    fn same_encoding(&self, other: &FieldSpec) -> bool {
        self.domain == other.domain
            && self.indexed == other.indexed
            && self.range == other.range
            && self.sortable == other.sortable
            && self.stored == other.stored
            && self.facet == other.facet
    }
}

/// A facet dimension the engine must be configured with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetDimension {
    pub dimension: String,
    pub field: String,
    pub multi_valued: bool,
}

pub fn sort_key_name(field: &str) -> String {
    format!("{}{}", field, SORT_SUFFIX)
}

/// Index field name for a source annotation or attribute name.
pub fn dynamic_field_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: BTreeMap<String, FieldSpec>,
}

impl FieldRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every fixed field of every record kind.
    pub fn standard() -> Result<Self> {
        let mut registry = Self::empty();
        for spec in fields::base_fields()
            .into_iter()
            .chain(fields::variant_fields())
            .chain(fields::gene_fields())
        {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Standard registry plus the given annotation declarations.
    pub fn with_annotations<'a, I>(decls: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a AnnotationDecl>,
    {
        let mut registry = Self::standard()?;
        for decl in decls {
            registry.register_annotation(decl)?;
        }
        Ok(registry)
    }

    /// Register a field. Re-registering an identical encoding is a no-op.
    pub fn register(&mut self, spec: FieldSpec) -> Result<()> {
        match self.fields.get(&spec.name) {
            Some(existing) if existing.same_encoding(&spec) => Ok(()),
            Some(existing) => Err(Error::SchemaConflict(format!(
                "{} registered as {:?} and as {:?}",
                spec.name, existing, spec
            ))),
            None => {
                self.fields.insert(spec.name.clone(), spec);
                Ok(())
            }
        }
    }

    /// Register a source-declared annotation under its lower-cased name.
    pub fn register_annotation(&mut self, decl: &AnnotationDecl) -> Result<()> {
        let name = dynamic_field_name(&decl.name);
        if self.is_fixed(&name) {
            return Err(Error::SchemaConflict(format!(
                "annotation {} shadows a fixed field",
                decl.name
            )));
        }

        let domain = ValueDomain::from(decl.ty);
        let spec = match domain {
            ValueDomain::Integer | ValueDomain::Float => FieldSpec::new(&name, domain).range(),
            ValueDomain::String | ValueDomain::Flag => FieldSpec::new(&name, domain).indexed(),
        }
        .stored()
        .dynamic();

        // Variable-length arrays are written whole, labelled by their display
        // text; everything else is a scalar by the time it reaches the codec.
        let spec = if decl.is_multi_valued() {
            spec.facet(&name)
        } else {
            spec.sortable()
        };

        self.register(spec)
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Whether `name` belongs to the fixed schema of some record kind.
    pub fn is_fixed(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|spec| !spec.dynamic)
    }

    /// Whether `name` is an internal companion of a fixed field (sort key, facet).
    pub fn is_reserved(&self, name: &str) -> bool {
        if self.is_fixed(name) {
            return true;
        }
        self.fields.values().filter(|spec| !spec.dynamic).any(|spec| {
            spec.facet.as_deref() == Some(name) || spec.sort_key().as_deref() == Some(name)
        })
    }

    pub fn annotation_domain(&self, name: &str) -> Option<ValueDomain> {
        self.fields
            .get(name)
            .filter(|spec| spec.dynamic)
            .map(|spec| spec.domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    /// Facet dimensions the engine must know about before documents arrive.
    pub fn facets(&self) -> Vec<FacetDimension> {
        self.fields
            .values()
            .filter_map(|spec| {
                spec.facet.as_ref().map(|dimension| FacetDimension {
                    dimension: dimension.clone(),
                    field: spec.name.clone(),
                    multi_valued: spec.dynamic,
                })
            })
            .collect()
    }
}
