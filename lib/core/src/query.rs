// Query, filters and paging
use serde::{Deserialize, Serialize};
use crate::{Spec, Result, Value};

/// Filtering ops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Equals,
    In,
    Prefix,
    Greater,
    GreaterEquals,
    Less,
    LessEqual,
    Between,
    /// lat, lon, radius in meters
    Radius,
    /// lat, lon; same geohash cell as the document
    Near,
    /// full-text match
    Matches,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub property: String,
    pub op: Op,
    pub values: Vec<Value>,
}

impl Filter {
    pub fn new(property: impl Into<String>, op: Op, values: Vec<Value>) -> Self {
        Self {
            property: property.into(),
            op,
            values,
        }
    }
}

/// How results are sorted and paged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sorting {
    pub by: String,
    pub ascending: bool,
    pub offset: usize,
    pub limit: usize,
}

impl Default for Sorting {
    fn default() -> Self {
        Self {
            by: String::new(),
            ascending: true,
            offset: 0,
            limit: 10,
        }
    }
}

impl Sorting {
    /// Highest rank a store range can address (`i64::MAX`)
    pub const MAX_RANK: usize = i64::MAX as usize;

    /// One past the last rank this page covers, at most [`Self::MAX_RANK`]
    #[inline]
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.limit).min(Self::MAX_RANK)
    }

    /// First rank of the page, at most [`Self::MAX_RANK`]
    #[inline]
    pub fn start(&self) -> usize {
        self.offset.min(Self::MAX_RANK)
    }
}

/// A query against one named index. Filters are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub index_name: String,
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Sorting,
}

impl Query {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            filters: Vec::new(),
            sort: Sorting::default(),
        }
    }

    #[must_use]
    pub fn sort_by(mut self, by: impl Into<String>, ascending: bool) -> Self {
        self.sort.by = by.into();
        self.sort.ascending = ascending;
        self
    }

    #[must_use]
    pub fn limit(mut self, offset: usize, limit: usize) -> Self {
        self.sort.offset = offset;
        self.sort.limit = limit;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn filter_equals(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(property, Op::Equals, vec![value.into()]))
    }

    #[must_use]
    pub fn filter_in<I, V>(self, property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Filter::new(property, Op::In, values))
    }

    #[must_use]
    pub fn filter_prefix(self, property: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filter(Filter::new(property, Op::Prefix, vec![Value::Text(prefix.into())]))
    }

    #[must_use]
    pub fn filter_between(
        self,
        property: impl Into<String>,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        self.filter(Filter::new(property, Op::Between, vec![min.into(), max.into()]))
    }

    #[must_use]
    pub fn filter_greater_than(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(property, Op::Greater, vec![value.into()]))
    }

    #[must_use]
    pub fn filter_greater_equal(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(property, Op::GreaterEquals, vec![value.into()]))
    }

    #[must_use]
    pub fn filter_less_than(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(property, Op::Less, vec![value.into()]))
    }

    #[must_use]
    pub fn filter_less_equal(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(property, Op::LessEqual, vec![value.into()]))
    }

    /// Rough proximity: same geohash cell at the index precision
    #[must_use]
    pub fn filter_near(self, property: impl Into<String>, lat: f64, lon: f64) -> Self {
        self.filter(Filter::new(
            property,
            Op::Near,
            vec![Value::Float(lat), Value::Float(lon)],
        ))
    }

    #[must_use]
    pub fn filter_radius(self, property: impl Into<String>, lat: f64, lon: f64, meters: f64) -> Self {
        self.filter(Filter::new(
            property,
            Op::Radius,
            vec![Value::Float(lat), Value::Float(lon), Value::Float(meters)],
        ))
    }

    #[must_use]
    pub fn filter_matches(self, property: impl Into<String>, text: impl Into<String>) -> Self {
        self.filter(Filter::new(property, Op::Matches, vec![Value::Text(text.into())]))
    }

    /// Every filter must resolve to exactly one field of `spec`
    pub fn validate(&self, spec: &Spec) -> Result<()> {
        for filter in &self.filters {
            spec.resolve(&filter.property)?;
        }
        Ok(())
    }

    /// Copy of this query asking for the first `offset + limit` results
    #[must_use]
    pub fn head(&self) -> Self {
        let mut q = self.clone();
        q.sort.limit = self.sort.end();
        q.sort.offset = 0;
        q
    }
}
