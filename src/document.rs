//! Document shape handed to the search-index engine.
//!
//! A [`Document`] is a flat list of fields. The same logical name may occur
//! several times with different [`Encoding`]s (an indexed copy, a stored copy,
//! a sort key), and several times with the same encoding for multi-valued
//! fields. This mirrors how column-oriented search engines accept documents.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Str(String),
    Long(i64),
    Double(f64),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            FieldValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Textual form used for facet labels and keyword copies.
    pub fn to_label(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Long(v) => v.to_string(),
            FieldValue::Double(v) => v.to_string(),
            FieldValue::Bytes(b) => STANDARD.encode(b),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Long(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

/// How the engine must treat one field occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoding {
    /// Indexed, untokenized term
    Keyword,
    /// Numeric point, range-queryable
    Point,
    /// Retrievable verbatim, not searchable
    Stored,
    /// Per-document sort/grouping value
    SortKey,
    /// Facet label under a dimension
    Facet { dimension: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocField {
    pub name: String,
    pub value: FieldValue,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<DocField>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: FieldValue, encoding: Encoding) {
        self.fields.push(DocField {
            name: name.into(),
            value,
            encoding,
        });
    }

    pub fn keyword(&mut self, name: &str, value: impl Into<String>) {
        self.push(name, FieldValue::Str(value.into()), Encoding::Keyword);
    }

    pub fn point(&mut self, name: &str, value: FieldValue) {
        self.push(name, value, Encoding::Point);
    }

    pub fn stored(&mut self, name: &str, value: FieldValue) {
        self.push(name, value, Encoding::Stored);
    }

    pub fn sort_key(&mut self, name: &str, value: FieldValue) {
        self.push(name, value, Encoding::SortKey);
    }

    pub fn facet(&mut self, dimension: &str, label: impl Into<String>) {
        self.push(
            dimension,
            FieldValue::Str(label.into()),
            Encoding::Facet {
                dimension: dimension.to_string(),
            },
        );
    }

    pub fn fields(&self) -> &[DocField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All occurrences of `name` with the given encoding, in insertion order.
    pub fn values<'a, 'n>(
        &'a self,
        name: &'n str,
        encoding: Encoding,
    ) -> impl Iterator<Item = &'a FieldValue> + use<'a, 'n> {
        self.fields
            .iter()
            .filter(move |f| f.name == name && f.encoding == encoding)
            .map(|f| &f.value)
    }

    pub fn stored_values<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a FieldValue> + use<'a, 'n> {
        self.values(name, Encoding::Stored)
    }

    pub fn first_stored(&self, name: &str) -> Option<&FieldValue> {
        self.stored_values(name).next()
    }

    pub fn stored_str(&self, name: &str) -> Option<&str> {
        self.stored_values(name).find_map(FieldValue::as_str)
    }

    pub fn stored_long(&self, name: &str) -> Option<i64> {
        self.stored_values(name).find_map(FieldValue::as_long)
    }

    pub fn stored_double(&self, name: &str) -> Option<f64> {
        self.stored_values(name).find_map(FieldValue::as_double)
    }

    /// Names of stored fields, deduplicated, in first-occurrence order.
    pub fn stored_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for field in self.fields.iter().filter(|f| f.encoding == Encoding::Stored) {
            if !names.contains(&field.name.as_str()) {
                names.push(&field.name);
            }
        }
        names
    }

    /// Whether any occurrence of `name` is searchable (keyword or point).
    pub fn is_queryable(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name == name && matches!(f.encoding, Encoding::Keyword | Encoding::Point))
    }

    pub fn facet_labels<'a>(&'a self, dimension: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter_map(move |f| match &f.encoding {
            Encoding::Facet { dimension: d } if d == dimension => f.value.as_str(),
            _ => None,
        })
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
