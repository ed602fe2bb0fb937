//! Typed annotation values and the header declarations they are parsed against.
//!
//! A variant's annotation map holds one [`AnnotationValue`] per surfaced INFO
//! field. Values decomposed into an array also keep their original display
//! text under a *view key* (`_NAME_v`), which is only ever used for display.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Single element of an array annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::String(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<ScalarValue>),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ScalarValue> for AnnotationValue {
    fn from(value: ScalarValue) -> Self {
        match value {
            ScalarValue::Integer(v) => AnnotationValue::Integer(v),
            ScalarValue::Float(v) => AnnotationValue::Float(v),
            ScalarValue::String(v) => AnnotationValue::String(v),
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Boolean(v) => write!(f, "{}", v),
            AnnotationValue::Integer(v) => write!(f, "{}", v),
            AnnotationValue::Float(v) => write!(f, "{}", v),
            AnnotationValue::String(v) => f.write_str(v),
            AnnotationValue::Array(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
        }
    }
}

/// Key under which the display text of `name` is kept.
pub fn view_key(name: &str) -> String {
    format!("_{}_v", name)
}

/// Whether `key` follows the view naming convention.
pub fn is_view_key(key: &str) -> bool {
    key.len() > 3 && key.starts_with('_') && key.ends_with("_v")
}

/// Declared value type of an annotation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Integer => "Integer",
            AnnotationType::Float => "Float",
            AnnotationType::Flag => "Flag",
            AnnotationType::Character => "Character",
            AnnotationType::String => "String",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AnnotationType::Integer | AnnotationType::Float)
    }
}

impl FromStr for AnnotationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Integer" => Ok(AnnotationType::Integer),
            "Float" => Ok(AnnotationType::Float),
            "Flag" => Ok(AnnotationType::Flag),
            "Character" => Ok(AnnotationType::Character),
            "String" => Ok(AnnotationType::String),
            _ => Err(Error::InvalidInput(format!("unknown annotation type: {}", s))),
        }
    }
}

/// Declared number of values (the header `Number=` attribute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Fixed(usize),
    PerAlternate,
    PerAllele,
    PerGenotype,
    Unbounded,
}

impl FromStr for Cardinality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(Cardinality::PerAlternate),
            "R" => Ok(Cardinality::PerAllele),
            "G" => Ok(Cardinality::PerGenotype),
            "." => Ok(Cardinality::Unbounded),
            n => n
                .parse::<usize>()
                .map(Cardinality::Fixed)
                .map_err(|_| Error::InvalidInput(format!("invalid cardinality: {}", s))),
        }
    }
}

/// A source-declared annotation field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationDecl {
    pub name: String,
    pub ty: AnnotationType,
    pub cardinality: Cardinality,
}

impl AnnotationDecl {
    pub fn new(name: impl Into<String>, ty: AnnotationType, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            ty,
            cardinality,
        }
    }

    /// Build a declaration from the textual `Number` and `Type` header attributes.
    pub fn parse(name: &str, number: &str, ty: &str) -> Result<Self> {
        Ok(Self::new(name, ty.parse()?, number.parse()?))
    }

    /// Fixed cardinality above one: explode instead of joining.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.cardinality, Cardinality::Fixed(n) if n > 1)
    }

    /// Variable-length arrays, kept whole with their display text as facet label.
    pub fn is_multi_valued(&self) -> bool {
        !self.is_single() && !self.is_ambiguous()
    }

    fn is_single(&self) -> bool {
        matches!(self.cardinality, Cardinality::Fixed(0) | Cardinality::Fixed(1))
    }

    /// Parse raw INFO text for this field.
    ///
    /// `None` is a flag without a value. Missing elements (`.`) are dropped; a
    /// value consisting only of missing elements yields `Ok(None)`.
    pub fn parse_value(&self, raw: Option<&str>) -> Result<Option<AnnotationValue>> {
        if self.ty == AnnotationType::Flag {
            return Ok(Some(AnnotationValue::Boolean(true)));
        }

        let Some(raw) = raw.map(str::trim) else {
            return Err(Error::type_mismatch(&self.name, self.ty.as_str(), ""));
        };

        if self.is_single() {
            return match raw {
                "" | "." => Ok(None),
                value => self.parse_scalar(value).map(|v| Some(v.into())),
            };
        }

        let values = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != ".")
            .map(|v| self.parse_scalar(v))
            .collect::<Result<Vec<_>>>()?;

        if values.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AnnotationValue::Array(values)))
        }
    }

    fn parse_scalar(&self, raw: &str) -> Result<ScalarValue> {
        match self.ty {
            AnnotationType::Integer => raw
                .parse::<i64>()
                .map(ScalarValue::Integer)
                .map_err(|_| Error::type_mismatch(&self.name, "Integer", raw)),
            // nan and inf parse as f64 but have no stored representation
            AnnotationType::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ScalarValue::Float)
                .ok_or_else(|| Error::type_mismatch(&self.name, "Float", raw)),
            AnnotationType::Character | AnnotationType::String | AnnotationType::Flag => {
                Ok(ScalarValue::String(raw.to_string()))
            }
        }
    }
}

/// Names of the whitelisted declarations whose fixed cardinality exceeds one,
/// in whitelist order.
pub fn ambiguous_fields(decls: &[AnnotationDecl], whitelist: &[String]) -> Vec<String> {
    whitelist
        .iter()
        .filter(|name| {
            decls
                .iter()
                .any(|decl| &decl.name == *name && decl.is_ambiguous())
        })
        .cloned()
        .collect()
}

/// Parse a raw INFO column (`KEY=VALUE;FLAG;...`) into an annotation map.
///
/// Only declared fields are kept. A value that fails to parse against its
/// declaration is logged and dropped; the rest of the record is unaffected.
/// Array values also record their original text under the view key.
pub fn parse_info(
    info: &str,
    decls: &BTreeMap<String, AnnotationDecl>,
) -> BTreeMap<String, AnnotationValue> {
    let mut annotations = BTreeMap::new();

    if info.trim() == "." {
        return annotations;
    }

    for field in info.split(';').filter(|f| !f.is_empty()) {
        let (key, raw) = match field.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (field, None),
        };

        let Some(decl) = decls.get(key) else {
            continue;
        };

        match decl.parse_value(raw) {
            Ok(Some(value)) => {
                if let (AnnotationValue::Array(_), Some(raw)) = (&value, raw) {
                    annotations.insert(
                        view_key(key),
                        AnnotationValue::String(raw.trim().to_string()),
                    );
                }
                annotations.insert(key.to_string(), value);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("dropping annotation {}: {}", key, e);
            }
        }
    }

    annotations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls() -> BTreeMap<String, AnnotationDecl> {
        [
            AnnotationDecl::parse("DP", "1", "Integer").unwrap(),
            AnnotationDecl::parse("AF", "A", "Float").unwrap(),
            AnnotationDecl::parse("CIPOS", "2", "Integer").unwrap(),
            AnnotationDecl::parse("DB", "0", "Flag").unwrap(),
            AnnotationDecl::parse("SVTYPE", "1", "String").unwrap(),
        ]
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect()
    }

    #[test]
    fn test_view_key_convention() {
        assert_eq!(view_key("AF"), "_AF_v");
        assert!(is_view_key("_AF_v"));
        assert!(!is_view_key("AF"));
        assert!(!is_view_key("_v"));
        assert!(!is_view_key("_AF"));
    }

    #[test]
    fn test_cardinality_parsing() {
        assert_eq!("2".parse::<Cardinality>().unwrap(), Cardinality::Fixed(2));
        assert_eq!("A".parse::<Cardinality>().unwrap(), Cardinality::PerAlternate);
        assert_eq!(".".parse::<Cardinality>().unwrap(), Cardinality::Unbounded);
        assert!("x".parse::<Cardinality>().is_err());
    }

    #[test]
    fn test_ambiguous_only_for_fixed_multi() {
        let decls: Vec<_> = decls().into_values().collect();
        let whitelist: Vec<String> = ["AF", "CIPOS", "DP", "MISSING"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ambiguous_fields(&decls, &whitelist), vec!["CIPOS".to_string()]);
    }

    #[test]
    fn test_parse_info_typed_values() {
        let annotations = parse_info("DP=14;AF=0.1,0.2;DB;SVTYPE=DEL;XX=1", &decls());

        assert_eq!(annotations.get("DP"), Some(&AnnotationValue::Integer(14)));
        assert_eq!(annotations.get("DB"), Some(&AnnotationValue::Boolean(true)));
        assert_eq!(
            annotations.get("SVTYPE"),
            Some(&AnnotationValue::String("DEL".to_string()))
        );
        assert_eq!(
            annotations.get("AF"),
            Some(&AnnotationValue::Array(vec![
                ScalarValue::Float(0.1),
                ScalarValue::Float(0.2)
            ]))
        );
        assert_eq!(
            annotations.get("_AF_v"),
            Some(&AnnotationValue::String("0.1,0.2".to_string()))
        );
        assert!(!annotations.contains_key("XX"));
    }

    #[test]
    fn test_type_mismatch_drops_only_that_field() {
        let annotations = parse_info("DP=high;CIPOS=-5,5", &decls());
        assert!(!annotations.contains_key("DP"));
        assert_eq!(
            annotations.get("CIPOS"),
            Some(&AnnotationValue::Array(vec![
                ScalarValue::Integer(-5),
                ScalarValue::Integer(5)
            ]))
        );
    }

    #[test]
    fn test_parse_value_mismatch_error() {
        let decl = AnnotationDecl::parse("DP", "1", "Integer").unwrap();
        let err = decl.parse_value(Some("1.5")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_float_drops_only_that_field() {
        let annotations = parse_info("AF=nan,0.2;DP=4", &decls());
        assert!(!annotations.contains_key("AF"));
        assert!(!annotations.contains_key("_AF_v"));
        assert_eq!(annotations.get("DP"), Some(&AnnotationValue::Integer(4)));

        let decl = AnnotationDecl::parse("QD", "1", "Float").unwrap();
        for raw in ["nan", "inf", "-Infinity"] {
            assert!(matches!(
                decl.parse_value(Some(raw)),
                Err(Error::TypeMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_multi_valued_cardinalities() {
        let multi = |number: &str| {
            AnnotationDecl::parse("X", number, "Integer")
                .unwrap()
                .is_multi_valued()
        };
        assert!(multi("A"));
        assert!(multi("."));
        assert!(!multi("1"));
        assert!(!multi("2"));
    }

    #[test]
    fn test_missing_values() {
        let decl = AnnotationDecl::parse("AF", "A", "Float").unwrap();
        assert_eq!(decl.parse_value(Some(".")).unwrap(), None);
        assert_eq!(
            decl.parse_value(Some("0.5,.")).unwrap(),
            Some(AnnotationValue::Array(vec![ScalarValue::Float(0.5)]))
        );
        assert!(parse_info(".", &decls()).is_empty());
    }

    #[test]
    fn test_display_joins_arrays() {
        let value = AnnotationValue::Array(vec![ScalarValue::Integer(1), ScalarValue::Integer(2)]);
        assert_eq!(value.to_string(), "1,2");
    }
}
