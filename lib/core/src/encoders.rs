//! Order-preserving value encoders for lexicographic keys
//!
//! Every Prefix, Numeric and Geo field of a [`Spec`] gets an [`Encoder`];
//! the set of them is owned by the index that was built over the [`Spec`](crate::Spec).

use std::collections::HashMap;
use std::sync::Arc;
use crate::geohash;
use crate::text::{NaiveNormalizer, TextNormalizer};
use crate::{Error, FieldKind, GeoPoint, Result, Spec, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    /// 8 bytes big-endian. Floats are written as raw IEEE-754 bits and
    /// integers as two's complement, so negative values sort after positive
    /// ones.
    Numeric,
    Prefix { index_suffixes: bool },
    Geohash { precision: usize },
}

impl Encoder {
    pub const NUMERIC_WIDTH: usize = 8;

    /// Length in bytes of every encoding, when fixed
    #[inline]
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Encoder::Numeric => Some(Self::NUMERIC_WIDTH),
            Encoder::Geohash { precision } => Some(*precision),
            Encoder::Prefix { .. } => None,
        }
    }

    fn encode(
        &self,
        field: &str,
        value: &Value,
        normalizer: &dyn TextNormalizer,
        expand: bool,
    ) -> Result<Vec<Vec<u8>>> {
        match self {
            Encoder::Numeric => Ok(vec![encode_numeric(field, value)?.to_vec()]),
            Encoder::Geohash { precision } => {
                let p = value
                    .as_geo()
                    .ok_or_else(|| Error::encoding(field, format!("expected geo, got {}", value.type_name())))?;
                let cell = geohash::encode(p.lat, p.lon, *precision)
                    .map_err(|e| Error::encoding(field, e.to_string()))?;
                Ok(vec![cell.into_bytes()])
            }
            Encoder::Prefix { index_suffixes } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| Error::encoding(field, format!("expected text, got {}", value.type_name())))?;
                let normalized = normalizer.normalize(text);

                let mut out = Vec::new();
                if expand && *index_suffixes {
                    for (i, _) in normalized.match_indices(' ') {
                        out.push(normalized[i + 1..].as_bytes().to_vec());
                    }
                }
                out.insert(0, normalized.into_bytes());
                Ok(out)
            }
        }
    }
}

/// Big-endian bytes of a numeric value
pub fn encode_numeric(field: &str, value: &Value) -> Result<[u8; 8]> {
    match value {
        Value::Integer(i) => Ok(i.to_be_bytes()),
        Value::Float(f) => Ok(f.to_bits().to_be_bytes()),
        other => Err(Error::encoding(field, format!("expected number, got {}", other.type_name()))),
    }
}

/// Per-spec encoder registry
#[derive(Clone)]
pub struct EncoderSet {
    encoders: HashMap<String, Encoder>,
    normalizer: Arc<dyn TextNormalizer>,
}

impl EncoderSet {
    pub fn new(spec: &Spec) -> Self {
        Self::with_normalizer(spec, Arc::new(NaiveNormalizer))
    }

    /// Full-text fields get no encoder
    pub fn with_normalizer(spec: &Spec, normalizer: Arc<dyn TextNormalizer>) -> Self {
        let encoders = spec
            .fields()
            .iter()
            .filter_map(|f| {
                let enc = match &f.kind {
                    FieldKind::Prefix { index_suffixes } => Encoder::Prefix {
                        index_suffixes: *index_suffixes,
                    },
                    FieldKind::Numeric => Encoder::Numeric,
                    FieldKind::Geo { precision } => Encoder::Geohash {
                        precision: *precision,
                    },
                    FieldKind::FullText { .. } => return None,
                };
                Some((f.name.clone(), enc))
            })
            .collect();

        Self { encoders, normalizer }
    }

    pub fn get(&self, field: &str) -> Result<&Encoder> {
        self.encoders
            .get(field)
            .ok_or_else(|| Error::Configuration(format!("no encoder for field '{}'", field)))
    }

    /// All encodings of a document value. Prefix fields with suffix
    /// indexing yield one entry per word-boundary suffix.
    pub fn encode(&self, field: &str, value: &Value) -> Result<Vec<Vec<u8>>> {
        self.get(field)?.encode(field, value, self.normalizer.as_ref(), true)
    }

    /// The single encoding of a filter operand
    pub fn encode_operand(&self, field: &str, value: &Value) -> Result<Vec<u8>> {
        let mut out = self.get(field)?.encode(field, value, self.normalizer.as_ref(), false)?;
        Ok(out.swap_remove(0))
    }

    /// Encoding of a lat/lon pair for a geo field
    pub fn encode_point(&self, field: &str, lat: f64, lon: f64) -> Result<Vec<u8>> {
        self.encode_operand(field, &Value::Geo(GeoPoint::new(lat, lon)))
    }
}

impl std::fmt::Debug for EncoderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSet")
            .field("encoders", &self.encoders)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }

    fn set() -> EncoderSet {
        let spec = Spec::new(vec![
            Field::numeric("n"),
            Field::prefix("name", true),
            Field::prefix("plain", false),
            Field::geo("loc", geohash::PRECISION_1KM),
        ])
        .unwrap();
        EncoderSet::new(&spec)
    }

    #[test]
    fn test_numeric_encoding() {
        let set = set();
        assert_eq!(hex(&set.encode("n", &Value::Float(3.4456)).unwrap()[0]), "400B9096BB98C7E3");
        assert_eq!(hex(&set.encode("n", &Value::Integer(5)).unwrap()[0]), "0000000000000005");
        assert_eq!(hex(&set.encode_operand("n", &Value::Integer(1234)).unwrap()), "00000000000004D2");
    }

    #[test]
    fn test_negative_floats_sort_after_positive() {
        let set = set();
        let neg = set.encode_operand("n", &Value::Float(-1.0)).unwrap();
        let pos = set.encode_operand("n", &Value::Float(1.0)).unwrap();
        let more_neg = set.encode_operand("n", &Value::Float(-2.0)).unwrap();
        // known ordering defect of the raw-bits encoding
        assert!(neg > pos);
        assert!(more_neg > neg);
    }

    #[test]
    fn test_prefix_suffixes() {
        let set = set();
        let out = set.encode("name", &Value::from("Hello ...  El Niño")).unwrap();
        let out: Vec<String> = out.into_iter().map(|b| String::from_utf8(b).unwrap()).collect();
        assert_eq!(out, vec!["hello el nino", "el nino", "nino"]);

        let plain = set.encode("plain", &Value::from("Hello ...  El Niño")).unwrap();
        assert_eq!(plain, vec![b"hello el nino".to_vec()]);

        // operands are never expanded
        assert_eq!(set.encode_operand("name", &Value::from("El Niño")).unwrap(), b"el nino".to_vec());
    }

    #[test]
    fn test_geohash_encoding() {
        let set = set();
        assert_eq!(set.encode_point("loc", 32.0667, 34.8).unwrap(), b"sv8wrv".to_vec());
        assert_eq!(
            set.encode("loc", &Value::from((32.0667, 34.8))).unwrap(),
            vec![b"sv8wrv".to_vec()]
        );
        assert!(matches!(set.encode_point("loc", 100.0, 0.0), Err(Error::Encoding { .. })));
    }

    #[test]
    fn test_wrong_type() {
        let set = set();
        assert!(matches!(set.encode("n", &Value::from("x")), Err(Error::Encoding { .. })));
        assert!(matches!(set.encode("name", &Value::Integer(3)), Err(Error::Encoding { .. })));
        assert!(matches!(set.encode("loc", &Value::Float(1.0)), Err(Error::Encoding { .. })));
        assert!(matches!(set.encode("missing", &Value::Float(1.0)), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_fixed_width() {
        assert_eq!(Encoder::Numeric.fixed_width(), Some(8));
        assert_eq!(Encoder::Geohash { precision: 5 }.fixed_width(), Some(5));
        assert_eq!(Encoder::Prefix { index_suffixes: false }.fixed_width(), None);
    }
}
