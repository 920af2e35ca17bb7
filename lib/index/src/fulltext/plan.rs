//! Query plans for the faceted index
//!
//! A query compiles into a tree of [`Step`]s. Evaluating the root appends
//! every command needed to materialise it to one pipeline, children first,
//! and yields the key the final result will live under.

use zindex_core::{geohash, Error, Field, FieldKind, Filter, Op, Query, Result, Spec, Tokenizer};
use zindex_storage::{Aggregate, Command, Pipeline, ScoreBound};

/// Key naming and temp-key policy of one index
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub name: String,
    pub ttl_secs: u64,
    pub total_docs: f64,
}

impl PlanContext {
    pub fn token_key(&self, token: &str) -> String {
        format!("f:{}:{}", self.name, token)
    }

    pub fn numeric_key(&self, field: &str) -> String {
        format!("k:{}:{}", self.name, field)
    }

    pub fn geo_key(&self, cell: &str) -> String {
        format!("g:{}:{}", self.name, cell)
    }

    /// Content-addressed temporary key: equal inputs give equal keys
    pub fn temp_key<I, S>(&self, kind: &str, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(kind.as_bytes());
        for part in parts {
            hasher.update(&[0]);
            hasher.update(part.as_ref().as_bytes());
        }
        format!("tmp:{}:{}:{:08x}", self.name, kind, hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Intersect(Vec<Step>),
    Union(Vec<Step>),
    TextIntersect {
        tokens: Vec<String>,
    },
    Range {
        field: String,
        min: ScoreBound,
        max: ScoreBound,
    },
    GeoRadius {
        field: String,
        lat: f64,
        lon: f64,
        radius: f64,
        cells: Vec<String>,
    },
}

impl Step {
    /// Weight of this step's scores inside an aggregation. Only text
    /// relevance ranks; ranges and radii filter.
    pub fn weight(&self) -> f64 {
        match self {
            Step::TextIntersect { .. } => 1.0,
            Step::Range { .. } | Step::GeoRadius { .. } => 0.0,
            Step::Intersect(children) | Step::Union(children) => {
                if children.iter().any(|c| c.weight() > 0.0) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Whether a required text step ended up with no tokens
    pub fn matches_nothing(&self) -> bool {
        match self {
            Step::TextIntersect { tokens } => tokens.is_empty(),
            Step::Intersect(children) => children.iter().any(Step::matches_nothing),
            Step::Union(children) => children.iter().all(Step::matches_nothing),
            Step::Range { .. } | Step::GeoRadius { .. } => false,
        }
    }

    /// Append the commands producing this step's set; returns its key
    pub fn evaluate(&self, ctx: &PlanContext, pipeline: &mut Pipeline) -> String {
        match self {
            Step::TextIntersect { tokens } => {
                let keys: Vec<String> = tokens.iter().map(|t| ctx.token_key(t)).collect();
                if keys.len() == 1 {
                    return keys[0].clone();
                }
                let dest = ctx.temp_key("text", &keys);
                pipeline.push(Command::IdfIntersect {
                    dest: dest.clone(),
                    keys,
                    total_docs: ctx.total_docs,
                    ttl_secs: ctx.ttl_secs,
                });
                dest
            }
            Step::Range { field, min, max } => {
                let src = ctx.numeric_key(field);
                let dest = ctx.temp_key("range", [src.clone(), min.to_redis(), max.to_redis()]);
                pipeline.push(Command::CopyScoreRange {
                    src,
                    dest: dest.clone(),
                    min: *min,
                    max: *max,
                    ttl_secs: ctx.ttl_secs,
                });
                dest
            }
            Step::GeoRadius { cells, .. } => {
                let keys: Vec<String> = cells.iter().map(|c| ctx.geo_key(c)).collect();
                let dest = ctx.temp_key("geo", &keys);
                pipeline.push(Command::ZUnionStore {
                    dest: dest.clone(),
                    weights: vec![0.0; keys.len()],
                    keys,
                    aggregate: Aggregate::Max,
                });
                pipeline.expire(dest.clone(), ctx.ttl_secs);
                dest
            }
            Step::Intersect(children) => combine(ctx, pipeline, "and", children, true),
            Step::Union(children) => combine(ctx, pipeline, "or", children, false),
        }
    }
}

fn combine(
    ctx: &PlanContext,
    pipeline: &mut Pipeline,
    kind: &str,
    children: &[Step],
    intersect: bool,
) -> String {
    let keys: Vec<String> = children.iter().map(|c| c.evaluate(ctx, pipeline)).collect();
    let weights: Vec<f64> = children.iter().map(Step::weight).collect();
    let dest = ctx.temp_key(kind, &keys);

    let command = if intersect {
        Command::ZInterStore {
            dest: dest.clone(),
            keys,
            weights,
            aggregate: Aggregate::Sum,
        }
    } else {
        Command::ZUnionStore {
            dest: dest.clone(),
            keys,
            weights,
            aggregate: Aggregate::Max,
        }
    };
    pipeline.push(command);
    pipeline.expire(dest.clone(), ctx.ttl_secs);
    dest
}

fn number(filter: &Filter, i: usize) -> Result<f64> {
    filter.values.get(i).and_then(|v| v.as_f64()).ok_or_else(|| {
        Error::UnsupportedFilter(format!(
            "{:?} on '{}' needs a numeric operand at position {}",
            filter.op, filter.property, i
        ))
    })
}

fn arity(filter: &Filter, expected: usize) -> Result<()> {
    if filter.values.len() != expected {
        return Err(Error::UnsupportedFilter(format!(
            "{:?} on '{}' takes {} value(s), got {}",
            filter.op,
            filter.property,
            expected,
            filter.values.len()
        )));
    }
    Ok(())
}

fn range_step(field: &Field, filter: &Filter) -> Result<Step> {
    let (min, max) = match filter.op {
        Op::Equals => {
            arity(filter, 1)?;
            let v = number(filter, 0)?;
            (ScoreBound::Inclusive(v), ScoreBound::Inclusive(v))
        }
        Op::Between => {
            arity(filter, 2)?;
            (ScoreBound::Inclusive(number(filter, 0)?), ScoreBound::Inclusive(number(filter, 1)?))
        }
        Op::Greater => {
            arity(filter, 1)?;
            (ScoreBound::Exclusive(number(filter, 0)?), ScoreBound::PosInf)
        }
        Op::GreaterEquals => {
            arity(filter, 1)?;
            (ScoreBound::Inclusive(number(filter, 0)?), ScoreBound::PosInf)
        }
        Op::Less => {
            arity(filter, 1)?;
            (ScoreBound::NegInf, ScoreBound::Exclusive(number(filter, 0)?))
        }
        Op::LessEqual => {
            arity(filter, 1)?;
            (ScoreBound::NegInf, ScoreBound::Inclusive(number(filter, 0)?))
        }
        Op::In => {
            if filter.values.is_empty() {
                return Err(Error::UnsupportedFilter(format!(
                    "In on '{}' needs at least one value",
                    filter.property
                )));
            }
            let points = (0..filter.values.len())
                .map(|i| {
                    let v = number(filter, i)?;
                    Ok(Step::Range {
                        field: field.name.clone(),
                        min: ScoreBound::Inclusive(v),
                        max: ScoreBound::Inclusive(v),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Step::Union(points));
        }
        op => {
            return Err(Error::UnsupportedFilter(format!(
                "{:?} is not supported on numeric field '{}'",
                op, field.name
            )))
        }
    };

    Ok(Step::Range {
        field: field.name.clone(),
        min,
        max,
    })
}

fn step_for(spec: &Spec, tokenizer: &dyn Tokenizer, filter: &Filter) -> Result<Step> {
    let field = spec.resolve(&filter.property)?;

    match (&field.kind, filter.op) {
        (FieldKind::FullText { .. }, Op::Matches) => {
            arity(filter, 1)?;
            let text = filter.values[0].as_str().ok_or_else(|| {
                Error::UnsupportedFilter(format!("Matches on '{}' needs a text value", filter.property))
            })?;
            let tokens = tokenizer.tokenize(text).into_iter().map(|t| t.text).collect();
            Ok(Step::TextIntersect { tokens })
        }
        (FieldKind::Numeric, _) => range_step(field, filter),
        (FieldKind::Geo { precision }, Op::Radius) => {
            arity(filter, 3)?;
            let (lat, lon, radius) = (number(filter, 0)?, number(filter, 1)?, number(filter, 2)?);
            if !radius.is_finite() || radius < 0.0 {
                return Err(Error::UnsupportedFilter(format!("invalid radius {}", radius)));
            }
            let cells = geohash::cells_within(lat, lon, radius, *precision)
                .map_err(|e| Error::UnsupportedFilter(e.to_string()))?;
            Ok(Step::GeoRadius {
                field: field.name.clone(),
                lat,
                lon,
                radius,
                cells,
            })
        }
        (_, op) => Err(Error::UnsupportedFilter(format!(
            "{:?} is not supported on {} field '{}'",
            op,
            field.kind_name(),
            field.name
        ))),
    }
}

/// Compile `query` into a step tree. Filters are intersected in order.
pub fn plan(spec: &Spec, tokenizer: &dyn Tokenizer, query: &Query) -> Result<Step> {
    let mut steps = query
        .filters
        .iter()
        .map(|f| step_for(spec, tokenizer, f))
        .collect::<Result<Vec<_>>>()?;

    match steps.len() {
        0 => Err(Error::UnsupportedFilter(
            "a full-text query needs at least one filter".to_string(),
        )),
        1 => Ok(steps.swap_remove(0)),
        _ => Ok(Step::Intersect(steps)),
    }
}
