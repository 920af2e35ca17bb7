//! In-process sorted-set store
//!
//! Keeps the whole keyspace behind one mutex, so a pipeline is applied
//! atomically. Expired keys are dropped lazily at the start of every call.

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::{Duration, Instant};
use zindex_core::{Error, Result};
use crate::command::{Aggregate, Command, Pipeline, Reply, ScoreBound};
use crate::store::SortedSetStore;

type ZSet = BTreeMap<Vec<u8>, f64>;

#[derive(Debug)]
enum Slot {
    ZSet(ZSet),
    Str(Vec<u8>),
}

fn wrong_type(key: &str) -> Error {
    Error::Store(format!(
        "WRONGTYPE key '{}' holds the wrong kind of value",
        key
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LexBound {
    NegInf,
    PosInf,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

impl LexBound {
    fn parse(raw: &[u8]) -> Result<Self> {
        match raw.split_first() {
            Some((&b'-', [])) => Ok(LexBound::NegInf),
            Some((&b'+', [])) => Ok(LexBound::PosInf),
            Some((&b'[', rest)) => Ok(LexBound::Inclusive(rest.to_vec())),
            Some((&b'(', rest)) => Ok(LexBound::Exclusive(rest.to_vec())),
            _ => Err(Error::Store(
                "min or max not valid string range item".to_string(),
            )),
        }
    }

    fn value(&self) -> Option<&[u8]> {
        match self {
            LexBound::Inclusive(v) | LexBound::Exclusive(v) => Some(v),
            _ => None,
        }
    }

    fn into_bound(self) -> Bound<Vec<u8>> {
        match self {
            LexBound::Inclusive(v) => Bound::Included(v),
            LexBound::Exclusive(v) => Bound::Excluded(v),
            LexBound::NegInf | LexBound::PosInf => Bound::Unbounded,
        }
    }
}

/// `None` when the bounds select nothing; BTreeMap::range panics on
/// inverted ranges.
fn lex_range(min: LexBound, max: LexBound) -> Option<(Bound<Vec<u8>>, Bound<Vec<u8>>)> {
    if min == LexBound::PosInf || max == LexBound::NegInf {
        return None;
    }
    if let (Some(lo), Some(hi)) = (min.value(), max.value()) {
        let exclusive = matches!(min, LexBound::Exclusive(_)) || matches!(max, LexBound::Exclusive(_));
        if lo > hi || (lo == hi && exclusive) {
            return None;
        }
    }
    Some((min.into_bound(), max.into_bound()))
}

/// Redis rank semantics: negative ranks count from the end, `stop` inclusive
fn rank_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn by_score(set: &ZSet) -> Vec<(&Vec<u8>, f64)> {
    let mut entries: Vec<(&Vec<u8>, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
    entries.sort_by(|a, b| (OrderedFloat(a.1), a.0).cmp(&(OrderedFloat(b.1), b.0)));
    entries
}

#[inline]
fn fold(aggregate: Aggregate, acc: Option<f64>, value: f64) -> f64 {
    match (aggregate, acc) {
        (_, None) => value,
        (Aggregate::Sum, Some(a)) => a + value,
        (Aggregate::Max, Some(a)) => a.max(value),
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Slot>,
    expiry: HashMap<String, Instant>,
}

impl Keyspace {
    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.expiry.remove(&key);
            self.data.remove(&key);
        }
    }

    fn zset(&self, key: &str) -> Result<Option<&ZSet>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Slot::ZSet(z)) => Ok(Some(z)),
            Some(Slot::Str(_)) => Err(wrong_type(key)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut ZSet> {
        let slot = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Slot::ZSet(ZSet::new()));
        match slot {
            Slot::ZSet(z) => Ok(z),
            Slot::Str(_) => Err(wrong_type(key)),
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.expiry.remove(key);
        self.data.remove(key).is_some()
    }

    /// Replace `key` with `set`; an empty result leaves no key behind
    fn store_zset(&mut self, key: &str, set: ZSet) -> i64 {
        self.remove(key);
        let len = set.len() as i64;
        if !set.is_empty() {
            self.data.insert(key.to_string(), Slot::ZSet(set));
        }
        len
    }

    fn expire(&mut self, key: &str, ttl_secs: u64, now: Instant) -> i64 {
        if !self.data.contains_key(key) {
            return 0;
        }
        if ttl_secs == 0 {
            self.remove(key);
        } else {
            self.expiry
                .insert(key.to_string(), now + Duration::from_secs(ttl_secs));
        }
        1
    }

    fn combine(
        &self,
        keys: &[String],
        weights: &[f64],
        aggregate: Aggregate,
        intersect: bool,
    ) -> Result<ZSet> {
        let mut sets = Vec::with_capacity(keys.len());
        for key in keys {
            sets.push(self.zset(key)?);
        }
        let weight = |i: usize| weights.get(i).copied().unwrap_or(1.0);

        let mut out = ZSet::new();
        if intersect {
            let Some(first) = sets.first() else {
                return Ok(out);
            };
            let Some(first) = first else {
                return Ok(out);
            };
            'members: for (member, score) in first.iter() {
                let mut acc = fold(aggregate, None, weight(0) * score);
                for (i, set) in sets.iter().enumerate().skip(1) {
                    match set.and_then(|s| s.get(member)) {
                        Some(s) => acc = fold(aggregate, Some(acc), weight(i) * s),
                        None => continue 'members,
                    }
                }
                out.insert(member.clone(), acc);
            }
        } else {
            for (i, set) in sets.iter().enumerate() {
                let Some(set) = set else { continue };
                for (member, score) in set.iter() {
                    let acc = out.get(member).copied();
                    out.insert(member.clone(), fold(aggregate, acc, weight(i) * score));
                }
            }
        }
        Ok(out)
    }

    fn apply(&mut self, command: Command, now: Instant) -> Result<Reply> {
        match command {
            Command::ZAdd { key, members } => {
                if members.is_empty() {
                    return Ok(Reply::Integer(0));
                }
                let set = self.zset_mut(&key)?;
                let mut added = 0;
                for (score, member) in members {
                    if set.insert(member, score).is_none() {
                        added += 1;
                    }
                }
                Ok(Reply::Integer(added))
            }
            Command::ZRem { key, members } => {
                let mut removed = 0;
                let empty = match self.data.get_mut(&key) {
                    None => return Ok(Reply::Integer(0)),
                    Some(Slot::Str(_)) => return Err(wrong_type(&key)),
                    Some(Slot::ZSet(set)) => {
                        for member in &members {
                            if set.remove(member).is_some() {
                                removed += 1;
                            }
                        }
                        set.is_empty()
                    }
                };
                if empty {
                    self.remove(&key);
                }
                Ok(Reply::Integer(removed))
            }
            Command::ZCard { key } => {
                let card = self.zset(&key)?.map_or(0, |s| s.len());
                Ok(Reply::Integer(card as i64))
            }
            Command::ZRange { key, start, stop } => {
                let Some(set) = self.zset(&key)? else {
                    return Ok(Reply::Members(Vec::new()));
                };
                let sorted = by_score(set);
                let members = match rank_range(sorted.len(), start, stop) {
                    Some((lo, hi)) => sorted[lo..=hi].iter().map(|(m, _)| (*m).clone()).collect(),
                    None => Vec::new(),
                };
                Ok(Reply::Members(members))
            }
            Command::ZRangeByLex { key, min, max, limit } => {
                let min = LexBound::parse(&min)?;
                let max = LexBound::parse(&max)?;
                let Some(set) = self.zset(&key)? else {
                    return Ok(Reply::Members(Vec::new()));
                };
                let Some(range) = lex_range(min, max) else {
                    return Ok(Reply::Members(Vec::new()));
                };
                let (offset, count) = limit.unwrap_or((0, usize::MAX));
                let members = set
                    .range::<Vec<u8>, _>(range)
                    .skip(offset)
                    .take(count)
                    .map(|(m, _)| m.clone())
                    .collect();
                Ok(Reply::Members(members))
            }
            Command::ZRevRangeWithScores { key, start, stop } => {
                let Some(set) = self.zset(&key)? else {
                    return Ok(Reply::Scored(Vec::new()));
                };
                let mut sorted = by_score(set);
                sorted.reverse();
                let scored = match rank_range(sorted.len(), start, stop) {
                    Some((lo, hi)) => sorted[lo..=hi].iter().map(|(m, s)| ((*m).clone(), *s)).collect(),
                    None => Vec::new(),
                };
                Ok(Reply::Scored(scored))
            }
            Command::ZInterStore { dest, keys, weights, aggregate } => {
                let set = self.combine(&keys, &weights, aggregate, true)?;
                Ok(Reply::Integer(self.store_zset(&dest, set)))
            }
            Command::ZUnionStore { dest, keys, weights, aggregate } => {
                let set = self.combine(&keys, &weights, aggregate, false)?;
                Ok(Reply::Integer(self.store_zset(&dest, set)))
            }
            Command::IdfIntersect { dest, keys, total_docs, ttl_secs } => {
                let mut weights = Vec::with_capacity(keys.len());
                for key in &keys {
                    let card = self.zset(key)?.map_or(0, |s| s.len());
                    weights.push((total_docs / (1.0 + card as f64)).ln());
                }
                let set = self.combine(&keys, &weights, Aggregate::Sum, true)?;
                let count = self.store_zset(&dest, set);
                self.expire(&dest, ttl_secs, now);
                Ok(Reply::Integer(count))
            }
            Command::CopyScoreRange { src, dest, min, max, ttl_secs } => {
                let set: ZSet = match self.zset(&src)? {
                    Some(set) => set
                        .iter()
                        .filter(|(_, s)| min.admits_from_below(**s) && max.admits_from_above(**s))
                        .map(|(m, s)| (m.clone(), *s))
                        .collect(),
                    None => ZSet::new(),
                };
                let count = self.store_zset(&dest, set);
                self.expire(&dest, ttl_secs, now);
                Ok(Reply::Integer(count))
            }
            Command::Expire { key, ttl_secs } => Ok(Reply::Integer(self.expire(&key, ttl_secs, now))),
            Command::Del { keys } => {
                let removed = keys.iter().filter(|k| self.remove(k)).count();
                Ok(Reply::Integer(removed as i64))
            }
            Command::Set { key, value } => {
                self.remove(&key);
                self.data.insert(key, Slot::Str(value));
                Ok(Reply::Ok)
            }
            Command::MGet { keys } => {
                let values = keys
                    .iter()
                    .map(|k| match self.data.get(k) {
                        Some(Slot::Str(v)) => Some(v.clone()),
                        _ => None,
                    })
                    .collect();
                Ok(Reply::Values(values))
            }
        }
    }
}

/// Sorted-set store living in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        let mut ks = self.keyspace.lock();
        ks.purge_expired(Instant::now());
        ks.data.len()
    }

    pub fn exists(&self, key: &str) -> bool {
        let mut ks = self.keyspace.lock();
        ks.purge_expired(Instant::now());
        ks.data.contains_key(key)
    }

    /// Remaining time to live, `None` for missing or persistent keys
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut ks = self.keyspace.lock();
        ks.purge_expired(now);
        ks.expiry.get(key).map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Live keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut ks = self.keyspace.lock();
        ks.purge_expired(Instant::now());
        let mut keys: Vec<String> = ks
            .data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Apply a pipeline synchronously
    pub fn execute_now(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let now = Instant::now();
        let mut ks = self.keyspace.lock();
        ks.purge_expired(now);

        let mut replies = Vec::with_capacity(pipeline.len());
        for command in pipeline.into_commands() {
            replies.push(ks.apply(command, now)?);
        }
        Ok(replies)
    }
}

#[async_trait]
impl SortedSetStore for MemoryStore {
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        self.execute_now(pipeline)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
