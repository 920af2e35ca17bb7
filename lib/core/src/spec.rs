//! Index schema definitions
//!
//! A [`Spec`] is the ordered list of typed fields an index is built over.
//! For the lexicographic index the order is significant: it fixes the order
//! of the components inside every composite key.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use crate::{Error, Result};

/// How a field is indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Normalized string, optionally with every word-boundary suffix
    Prefix { index_suffixes: bool },
    Numeric,
    /// Geohash cell at `precision` characters
    Geo { precision: usize },
    /// One full-text index aggregating weighted source properties
    FullText { weights: BTreeMap<String, f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    pub fn prefix(name: impl Into<String>, index_suffixes: bool) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Prefix { index_suffixes },
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Numeric,
        }
    }

    pub fn geo(name: impl Into<String>, precision: usize) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Geo { precision },
        }
    }

    /// A full-text field over `sources`, each weighted 1.0
    pub fn fulltext<I, S>(name: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let weights = sources.into_iter().map(|s| (s.into(), 1.0)).collect();
        Self {
            name: name.into(),
            kind: FieldKind::FullText { weights },
        }
    }

    pub fn fulltext_weighted(name: impl Into<String>, weights: BTreeMap<String, f64>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::FullText { weights },
        }
    }

    /// A full-text field matches its own name and any of its weighted sources
    pub fn matches(&self, field_name: &str) -> bool {
        if self.name == field_name {
            return true;
        }
        match &self.kind {
            FieldKind::FullText { weights } => weights.contains_key(field_name),
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            FieldKind::Prefix { .. } => "prefix",
            FieldKind::Numeric => "numeric",
            FieldKind::Geo { .. } => "geo",
            FieldKind::FullText { .. } => "fulltext",
        }
    }
}

/// Ordered, immutable set of fields with unique names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Spec {
    fields: Vec<Field>,
}

impl Spec {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::Configuration("spec has no fields".to_string()));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() {
                return Err(Error::Configuration("field with empty name".to_string()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            if let FieldKind::Geo { precision } = field.kind {
                if !(1..=12).contains(&precision) {
                    return Err(Error::Configuration(format!(
                        "geo field '{}' has invalid precision {}",
                        field.name, precision
                    )));
                }
            }
        }

        Ok(Self { fields })
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The single field a filter property resolves to
    pub fn resolve(&self, property: &str) -> Result<&Field> {
        let mut matching = self.fields.iter().filter(|f| f.matches(property));
        match (matching.next(), matching.next()) {
            (Some(field), None) => Ok(field),
            (None, _) => Err(Error::Configuration(format!(
                "no field in spec matches property '{}'",
                property
            ))),
            (Some(_), Some(_)) => Err(Error::Configuration(format!(
                "property '{}' matches more than one field",
                property
            ))),
        }
    }
}

impl TryFrom<Vec<Field>> for Spec {
    type Error = Error;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Spec::new(fields)
    }
}

impl From<Spec> for Vec<Field> {
    fn from(spec: Spec) -> Self {
        spec.fields
    }
}
