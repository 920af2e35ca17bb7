//! Lexicographic range index
//!
//! Every document becomes one or more members of a single sorted set, all
//! scored 0, so that one `ZRANGEBYLEX` answers equality, prefix and range
//! filters over a leading run of spec fields. A member is laid out as
//!
//! ```text
//! [bucket]value|[bucket]value|...||<score: 8 bytes>|<id>
//! ```
//!
//! where the bucket byte only precedes Prefix values.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use zindex_core::quantile::NUM_BUCKETS;
use zindex_core::{
    BucketEstimator, Document, EncoderSet, Entry, Error, Field, FieldKind, Filter, Op, Query,
    Result, Spec,
};
use zindex_storage::{Command, Pipeline, SortedSetStore};
use crate::config::IndexConfig;
use crate::registry::Registry;
use crate::shard::ShardIndex;

pub const SEPARATOR: u8 = b'|';
const SCORE_WIDTH: usize = 8;

/// Lex bounds of one scan, in the store's `[` / `(` syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexRange {
    pub from: Vec<u8>,
    pub to: Vec<u8>,
    /// The range constrains a Prefix field, so every score bucket needs a scan
    pub uses_prefix: bool,
}

pub struct SimpleIndex {
    name: String,
    spec: Spec,
    encoders: EncoderSet,
    store: Arc<dyn SortedSetStore>,
    buckets: Mutex<BucketEstimator>,
    registry: Registry,
}

impl SimpleIndex {
    pub fn new(
        name: &str,
        spec: Spec,
        store: Arc<dyn SortedSetStore>,
        config: &IndexConfig,
    ) -> Result<Self> {
        if let Some(f) = spec
            .fields()
            .iter()
            .find(|f| matches!(f.kind, FieldKind::FullText { .. }))
        {
            return Err(Error::Configuration(format!(
                "full-text field '{}' cannot be part of a simple index",
                f.name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            encoders: EncoderSet::new(&spec),
            spec,
            store,
            buckets: Mutex::new(BucketEstimator::new(config.buckets)),
            registry: Registry::new(name),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Id and score of one of this index's members
    #[inline]
    pub fn decode(&self, raw: &[u8]) -> Result<Entry> {
        decode_entry(&self.spec, &self.encoders, raw)
    }

    /// All sorted-set members for a document, one per combination of the
    /// encodings of its fields
    pub fn encode(&self, doc: &Document) -> Result<Vec<Vec<u8>>> {
        if doc.id().is_empty() {
            return Err(Error::encoding("id", "document id is empty"));
        }

        let bucket = {
            let mut est = self.buckets.lock();
            est.sample(doc.get_score());
            est.bucket(doc.get_score())
        };

        let mut heads: Vec<Vec<u8>> = vec![Vec::new()];
        for field in self.spec.fields() {
            let value = doc
                .property(&field.name)
                .ok_or_else(|| Error::encoding(&field.name, "missing property"))?;
            let encoded = self.encoders.encode(&field.name, value)?;
            let is_prefix = matches!(field.kind, FieldKind::Prefix { .. });

            let mut next = Vec::with_capacity(heads.len() * encoded.len());
            for head in &heads {
                for enc in &encoded {
                    let mut key = head.clone();
                    if is_prefix {
                        key.push(bucket);
                    }
                    key.extend_from_slice(enc);
                    key.push(SEPARATOR);
                    next.push(key);
                }
            }
            heads = next;
        }

        let score = doc.get_score().to_bits().to_be_bytes();
        for key in &mut heads {
            key.push(SEPARATOR);
            key.extend_from_slice(&score);
            key.push(SEPARATOR);
            key.extend_from_slice(doc.id().as_bytes());
        }
        Ok(heads)
    }

    fn operands(&self, field: &Field, filter: &Filter, expected: usize) -> Result<Vec<Vec<u8>>> {
        if filter.values.len() != expected {
            return Err(Error::UnsupportedFilter(format!(
                "{:?} on '{}' takes {} value(s), got {}",
                filter.op,
                field.name,
                expected,
                filter.values.len()
            )));
        }
        filter
            .values
            .iter()
            .map(|v| self.encoders.encode_operand(&field.name, v))
            .collect()
    }

    /// The scan range for `query` within score `bucket`
    pub fn range(&self, query: &Query, bucket: u8) -> Result<LexRange> {
        let mut lower_inclusive = true;
        let mut upper_inclusive = false;
        let mut from = vec![b'['];
        let mut to = vec![b'('];
        let mut uses_prefix = false;

        for field in self.spec.fields() {
            let Some(filter) = query.filters.iter().find(|f| f.property == field.name) else {
                break;
            };
            let is_prefix = matches!(field.kind, FieldKind::Prefix { .. });
            uses_prefix |= is_prefix;
            let lead: &[u8] = if is_prefix { std::slice::from_ref(&bucket) } else { &[] };

            match filter.op {
                Op::Equals => {
                    let v = self.operands(field, filter, 1)?.swap_remove(0);
                    for buf in [&mut from, &mut to] {
                        buf.extend_from_slice(lead);
                        buf.extend_from_slice(&v);
                        buf.push(SEPARATOR);
                    }
                }
                Op::Between => {
                    let mut vs = self.operands(field, filter, 2)?;
                    let hi = vs.swap_remove(1);
                    let lo = vs.swap_remove(0);
                    from.extend_from_slice(lead);
                    from.extend_from_slice(&lo);
                    from.push(SEPARATOR);
                    to.extend_from_slice(lead);
                    to.extend_from_slice(&hi);
                    to.push(SEPARATOR);
                    break;
                }
                Op::Prefix => {
                    if !is_prefix {
                        return Err(Error::UnsupportedFilter(format!(
                            "prefix filter on non-prefix field '{}'",
                            field.name
                        )));
                    }
                    let v = self.operands(field, filter, 1)?.swap_remove(0);
                    for buf in [&mut from, &mut to] {
                        buf.push(bucket);
                        buf.extend_from_slice(&v);
                    }
                    break;
                }
                Op::Greater | Op::GreaterEquals => {
                    let v = self.operands(field, filter, 1)?.swap_remove(0);
                    from.extend_from_slice(lead);
                    from.extend_from_slice(&v);
                    from.push(SEPARATOR);
                    to.extend_from_slice(lead);
                    to.extend(std::iter::repeat(0xFF).take(v.len()));
                    to.push(SEPARATOR);
                    lower_inclusive = filter.op == Op::GreaterEquals;
                    break;
                }
                Op::Less | Op::LessEqual => {
                    let v = self.operands(field, filter, 1)?.swap_remove(0);
                    from.extend_from_slice(lead);
                    from.extend(std::iter::repeat(0x00).take(v.len()));
                    from.push(SEPARATOR);
                    to.extend_from_slice(lead);
                    to.extend_from_slice(&v);
                    to.push(SEPARATOR);
                    upper_inclusive = filter.op == Op::LessEqual;
                    break;
                }
                Op::Near => {
                    if !matches!(field.kind, FieldKind::Geo { .. }) {
                        return Err(Error::UnsupportedFilter(format!(
                            "near filter on non-geo field '{}'",
                            field.name
                        )));
                    }
                    let (lat, lon) = match filter.values.as_slice() {
                        [lat, lon] => match (lat.as_f64(), lon.as_f64()) {
                            (Some(lat), Some(lon)) => (lat, lon),
                            _ => {
                                return Err(Error::UnsupportedFilter(
                                    "near filter takes a numeric lat, lon pair".to_string(),
                                ))
                            }
                        },
                        _ => {
                            return Err(Error::UnsupportedFilter(
                                "near filter takes a lat, lon pair".to_string(),
                            ))
                        }
                    };
                    let cell = self.encoders.encode_point(&field.name, lat, lon)?;
                    for buf in [&mut from, &mut to] {
                        buf.extend_from_slice(&cell);
                        buf.push(SEPARATOR);
                    }
                }
                Op::In | Op::Radius | Op::Matches => {
                    return Err(Error::UnsupportedFilter(format!(
                        "{:?} is not supported by a simple index",
                        filter.op
                    )));
                }
            }
        }

        to.push(0xFF);
        from[0] = if lower_inclusive { b'[' } else { b'(' };
        to[0] = if upper_inclusive { b'[' } else { b'(' };

        Ok(LexRange {
            from,
            to,
            uses_prefix,
        })
    }

    async fn scan(&self, range: LexRange, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut pipeline = Pipeline::new();
        pipeline.zrangebylex(self.name.as_str(), range.from, range.to, Some((0, count)));
        self.store
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("missing ZRANGEBYLEX reply".to_string()))?
            .into_members()
    }
}

/// Split a member back into id and score, walking the field layout of
/// `spec`. Numeric and Geo values have a fixed width and may contain the
/// separator byte; Prefix values are a bucket byte plus normalized text,
/// which never does.
pub fn decode_entry(spec: &Spec, encoders: &EncoderSet, raw: &[u8]) -> Result<Entry> {
    let corrupt = |reason: &str| {
        Error::CorruptEntry(format!("{} in {:?}", reason, String::from_utf8_lossy(raw)))
    };

    let mut pos = 0;
    for field in spec.fields() {
        pos = match encoders.get(&field.name)?.fixed_width() {
            Some(width) => pos + width,
            None => {
                let text = raw.get(pos + 1..).ok_or_else(|| corrupt("truncated prefix value"))?;
                let len = text
                    .iter()
                    .position(|&b| b == SEPARATOR)
                    .ok_or_else(|| corrupt("unterminated prefix value"))?;
                pos + 1 + len
            }
        };
        if raw.get(pos) != Some(&SEPARATOR) {
            return Err(corrupt(&format!("no separator after '{}'", field.name)));
        }
        pos += 1;
    }

    if raw.get(pos) != Some(&SEPARATOR) || raw.get(pos + 1 + SCORE_WIDTH) != Some(&SEPARATOR) {
        return Err(corrupt("no score marker"));
    }
    let mut score = [0u8; SCORE_WIDTH];
    score.copy_from_slice(&raw[pos + 1..pos + 1 + SCORE_WIDTH]);
    let id = std::str::from_utf8(&raw[pos + 2 + SCORE_WIDTH..])
        .map_err(|e| Error::CorruptEntry(format!("id is not utf-8: {}", e)))?;
    if id.is_empty() {
        return Err(corrupt("empty id"));
    }

    Ok(Entry::new(id, f64::from_bits(u64::from_be_bytes(score))))
}

#[async_trait]
impl ShardIndex for SimpleIndex {
    fn id(&self) -> &str {
        &self.name
    }

    async fn index(&self, docs: Vec<Document>) -> Result<usize> {
        let mut pipeline = Pipeline::new();
        let mut indexed = 0;

        for doc in &docs {
            let keys = match self.encode(doc) {
                Ok(keys) => keys,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping document '{}' in index '{}': {}", doc.id(), self.name, e);
                    continue;
                }
            };
            pipeline.push(Command::ZAdd {
                key: self.name.clone(),
                members: keys.iter().map(|k| (0.0, k.clone())).collect(),
            });
            self.registry.record(&mut pipeline, doc.id(), keys);
            indexed += 1;
        }

        if pipeline.is_empty() {
            return Ok(0);
        }
        tracing::debug!("Indexing {} documents into '{}' ({} commands)", indexed, self.name, pipeline.len());
        self.store.execute(pipeline).await?;
        Ok(indexed)
    }

    async fn get(&self, query: &Query) -> Result<Vec<Entry>> {
        query.validate(&self.spec)?;
        let (offset, limit) = (query.sort.offset, query.sort.limit);
        let wanted = query.sort.end();
        if limit == 0 {
            return Ok(Vec::new());
        }

        let first = self.range(query, 0)?;
        let buckets = if first.uses_prefix { NUM_BUCKETS } else { 1 };

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut next = Some(first);
        for bucket in 0..buckets {
            let range = match next.take() {
                Some(r) => r,
                None => self.range(query, bucket)?,
            };
            tracing::debug!("Scanning '{}' bucket {} for {} entries", self.name, bucket, wanted - entries.len());

            for raw in self.scan(range, wanted - entries.len()).await? {
                let entry = self.decode(&raw)?;
                if seen.insert(entry.id.clone()) {
                    entries.push(entry);
                }
            }
            if entries.len() >= wanted {
                break;
            }
        }

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let members: Vec<Vec<u8>> = self
            .registry
            .reverse_members(&self.store, ids)
            .await?
            .into_iter()
            .flatten()
            .collect();

        let mut pipeline = Pipeline::new();
        if !members.is_empty() {
            pipeline.zrem(self.name.as_str(), members);
        }
        let pos = self.registry.forget(&mut pipeline, ids);
        let removed = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .nth(pos)
            .ok_or_else(|| Error::Store("missing ZREM reply".to_string()))?
            .into_integer()?;
        Ok(removed as usize)
    }

    async fn drop_index(&self) -> Result<bool> {
        let ids = self.registry.all_ids(&self.store).await?;
        let mut keys = vec![self.name.clone(), self.registry.ids_key()];
        keys.extend(ids.iter().map(|id| self.registry.reverse_key(id)));

        let mut pipeline = Pipeline::new();
        pipeline.del(keys);
        let removed = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("missing DEL reply".to_string()))?
            .into_integer()?;
        tracing::debug!("Dropped index '{}' ({} keys)", self.name, removed);
        Ok(removed > 0)
    }
}
