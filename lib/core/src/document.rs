use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::value::Value;

/// A document handed to the indexes, identified by an opaque string id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    #[serde(default = "default_score")]
    score: f64,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

fn default_score() -> f64 {
    1.0
}

impl Document {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_score(id, 1.0)
    }

    #[inline]
    #[must_use]
    pub fn with_score(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            properties: HashMap::new(),
        }
    }

    /// Set a property, builder style
    #[inline]
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn get_score(&self) -> f64 {
        self.score
    }

    #[inline]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    #[inline]
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let doc = Document::new("doc1")
            .score(0.5)
            .set("name", "hello")
            .set("age", 42)
            .set("location", (32.0667, 34.8));

        assert_eq!(doc.id(), "doc1");
        assert_eq!(doc.get_score(), 0.5);
        assert_eq!(doc.property("name").and_then(Value::as_str), Some("hello"));
        assert_eq!(doc.property("age"), Some(&Value::Integer(42)));
        assert!(doc.property("location").and_then(Value::as_geo).is_some());
        assert!(!doc.has_property("missing"));
    }

    #[test]
    fn test_default_score() {
        assert_eq!(Document::new("x").get_score(), 1.0);
        let parsed: Document = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(parsed.get_score(), 1.0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let doc = Document::with_score("doc2", 3.0)
            .set("foo", "bar")
            .set("pi", 3.14)
            .set("where", (1.5, -2.5));
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, parsed);
    }
}
