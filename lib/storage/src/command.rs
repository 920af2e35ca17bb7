//! Commands understood by a sorted-set store and their replies
//!
//! A [`Pipeline`] is applied in submission order and yields exactly one
//! [`Reply`] per command.

use zindex_core::{Error, Result};

/// Score range bound in the store's syntax
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
    NegInf,
    PosInf,
}

impl ScoreBound {
    pub fn to_redis(&self) -> String {
        match self {
            ScoreBound::Inclusive(v) => format!("{}", v),
            ScoreBound::Exclusive(v) => format!("({}", v),
            ScoreBound::NegInf => "-inf".to_string(),
            ScoreBound::PosInf => "+inf".to_string(),
        }
    }

    /// Whether `score` satisfies this bound used as a minimum
    #[inline]
    pub fn admits_from_below(&self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(v) => score >= *v,
            ScoreBound::Exclusive(v) => score > *v,
            ScoreBound::NegInf => true,
            ScoreBound::PosInf => false,
        }
    }

    /// Whether `score` satisfies this bound used as a maximum
    #[inline]
    pub fn admits_from_above(&self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(v) => score <= *v,
            ScoreBound::Exclusive(v) => score < *v,
            ScoreBound::NegInf => false,
            ScoreBound::PosInf => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Sum,
    Max,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ZAdd {
        key: String,
        members: Vec<(f64, Vec<u8>)>,
    },
    ZRem {
        key: String,
        members: Vec<Vec<u8>>,
    },
    ZCard {
        key: String,
    },
    /// Members by ascending rank, `stop` inclusive, negative ranks count from the end
    ZRange {
        key: String,
        start: isize,
        stop: isize,
    },
    /// Members between two lex bounds (`[`, `(`, `-`, `+` syntax)
    ZRangeByLex {
        key: String,
        min: Vec<u8>,
        max: Vec<u8>,
        limit: Option<(usize, usize)>,
    },
    ZRevRangeWithScores {
        key: String,
        start: isize,
        stop: isize,
    },
    ZInterStore {
        dest: String,
        keys: Vec<String>,
        weights: Vec<f64>,
        aggregate: Aggregate,
    },
    ZUnionStore {
        dest: String,
        keys: Vec<String>,
        weights: Vec<f64>,
        aggregate: Aggregate,
    },
    /// Server-side intersection weighting each key by ln(total / (1 + card)),
    /// summed, then expired after `ttl_secs`
    IdfIntersect {
        dest: String,
        keys: Vec<String>,
        total_docs: f64,
        ttl_secs: u64,
    },
    /// Server-side copy of the members of `src` scored within the bounds,
    /// scores kept, into a fresh `dest` expiring after `ttl_secs`
    CopyScoreRange {
        src: String,
        dest: String,
        min: ScoreBound,
        max: ScoreBound,
        ttl_secs: u64,
    },
    Expire {
        key: String,
        ttl_secs: u64,
    },
    Del {
        keys: Vec<String>,
    },
    Set {
        key: String,
        value: Vec<u8>,
    },
    MGet {
        keys: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Integer(i64),
    Members(Vec<Vec<u8>>),
    Scored(Vec<(Vec<u8>, f64)>),
    Values(Vec<Option<Vec<u8>>>),
}

impl Reply {
    fn unexpected(&self, wanted: &str) -> Error {
        Error::Store(format!("expected {} reply, got {:?}", wanted, self))
    }

    pub fn into_integer(self) -> Result<i64> {
        match self {
            Reply::Integer(i) => Ok(i),
            other => Err(other.unexpected("integer")),
        }
    }

    pub fn into_members(self) -> Result<Vec<Vec<u8>>> {
        match self {
            Reply::Members(m) => Ok(m),
            other => Err(other.unexpected("members")),
        }
    }

    pub fn into_scored(self) -> Result<Vec<(Vec<u8>, f64)>> {
        match self {
            Reply::Scored(s) => Ok(s),
            other => Err(other.unexpected("scored members")),
        }
    }

    pub fn into_values(self) -> Result<Vec<Option<Vec<u8>>>> {
        match self {
            Reply::Values(v) => Ok(v),
            other => Err(other.unexpected("values")),
        }
    }
}

/// An ordered batch of commands sent in one round trip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, returning the position of its reply
    pub fn push(&mut self, command: Command) -> usize {
        self.commands.push(command);
        self.commands.len() - 1
    }

    pub fn extend(&mut self, other: Pipeline) {
        self.commands.extend(other.commands);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn zadd(&mut self, key: impl Into<String>, score: f64, member: impl Into<Vec<u8>>) -> usize {
        self.push(Command::ZAdd {
            key: key.into(),
            members: vec![(score, member.into())],
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, members: Vec<Vec<u8>>) -> usize {
        self.push(Command::ZRem {
            key: key.into(),
            members,
        })
    }

    pub fn zcard(&mut self, key: impl Into<String>) -> usize {
        self.push(Command::ZCard { key: key.into() })
    }

    pub fn zrange(&mut self, key: impl Into<String>, start: isize, stop: isize) -> usize {
        self.push(Command::ZRange {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn zrangebylex(
        &mut self,
        key: impl Into<String>,
        min: Vec<u8>,
        max: Vec<u8>,
        limit: Option<(usize, usize)>,
    ) -> usize {
        self.push(Command::ZRangeByLex {
            key: key.into(),
            min,
            max,
            limit,
        })
    }

    pub fn zrevrange_withscores(&mut self, key: impl Into<String>, start: isize, stop: isize) -> usize {
        self.push(Command::ZRevRangeWithScores {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl_secs: u64) -> usize {
        self.push(Command::Expire {
            key: key.into(),
            ttl_secs,
        })
    }

    pub fn del(&mut self, keys: Vec<String>) -> usize {
        self.push(Command::Del { keys })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> usize {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn mget(&mut self, keys: Vec<String>) -> usize {
        self.push(Command::MGet { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_positions() {
        let mut p = Pipeline::new();
        assert!(p.is_empty());
        assert_eq!(p.zadd("a", 1.0, "x"), 0);
        assert_eq!(p.zcard("a"), 1);
        assert_eq!(p.expire("a", 10), 2);
        assert_eq!(p.len(), 3);

        let mut q = Pipeline::new();
        q.del(vec!["a".to_string()]);
        p.extend(q);
        assert_eq!(p.len(), 4);
        assert!(matches!(p.commands()[3], Command::Del { .. }));
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(ScoreBound::Inclusive(1.5).to_redis(), "1.5");
        assert_eq!(ScoreBound::Exclusive(3.0).to_redis(), "(3");
        assert_eq!(ScoreBound::NegInf.to_redis(), "-inf");
        assert_eq!(ScoreBound::PosInf.to_redis(), "+inf");

        assert!(ScoreBound::Inclusive(1.0).admits_from_below(1.0));
        assert!(!ScoreBound::Exclusive(1.0).admits_from_below(1.0));
        assert!(ScoreBound::Exclusive(1.0).admits_from_above(0.5));
        assert!(ScoreBound::PosInf.admits_from_above(f64::MAX));
    }

    #[test]
    fn test_reply_conversion() {
        assert_eq!(Reply::Integer(3).into_integer().unwrap(), 3);
        assert!(matches!(Reply::Ok.into_integer(), Err(Error::Store(_))));
        assert_eq!(Reply::Members(vec![b"a".to_vec()]).into_members().unwrap().len(), 1);
        assert!(Reply::Integer(1).into_scored().is_err());
    }
}
