//! Range-bound parsing for score and lexicographic sorted-set queries
//!
//! Mirrors the Redis range-bound grammar: a score bound is a finite float or
//! `+inf`/`-inf`, optionally prefixed with `(` for exclusivity; a lex bound is
//! `-`/`+` for the unbounded ends, otherwise `[member` (inclusive) or
//! `(member` (exclusive).

use bramble_core::{Error, Result};

/// One end of a score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    /// The boundary value.
    pub value: f64,
    /// Whether the boundary itself is included in the range.
    pub inclusive: bool,
}

impl ScoreBound {
    /// Parse a score bound token (`"5"`, `"(5"`, `"+inf"`, `"-inf"`).
    pub fn parse(token: &str) -> Result<Self> {
        let (raw, inclusive) = match token.strip_prefix('(') {
            Some(rest) => (rest, false),
            None => (token, true),
        };
        let value = match raw {
            "+inf" | "inf" => f64::INFINITY,
            "-inf" => f64::NEG_INFINITY,
            other => other
                .parse::<f64>()
                .map_err(|_| Error::validation("min or max is not a float"))?,
        };
        if value.is_nan() {
            return Err(Error::validation("min or max is not a float"));
        }
        Ok(ScoreBound { value, inclusive })
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.inclusive {
            score >= self.value
        } else {
            score > self.value
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.inclusive {
            score <= self.value
        } else {
            score < self.value
        }
    }
}

/// A validated (min, max) score range; `contains` tests both ends.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRange {
    /// Lower bound.
    pub min: ScoreBound,
    /// Upper bound.
    pub max: ScoreBound,
}

impl ScoreRange {
    /// Parse a `min max` token pair.
    pub fn parse(min: &str, max: &str) -> Result<Self> {
        Ok(ScoreRange {
            min: ScoreBound::parse(min)?,
            max: ScoreBound::parse(max)?,
        })
    }

    /// Whether `score` falls within this range.
    pub fn contains(&self, score: f64) -> bool {
        self.min.admits_from_below(score) && self.max.admits_from_above(score)
    }
}

/// One end of a lexicographic range, over members that all share a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    /// `-`: lexicographic minimum, unbounded below.
    NegInfinity,
    /// `+`: lexicographic maximum, unbounded above.
    PosInfinity,
    /// `[member`: inclusive of `member`.
    Inclusive(Vec<u8>),
    /// `(member`: exclusive of `member`.
    Exclusive(Vec<u8>),
}

impl LexBound {
    /// Parse a lex bound token.
    pub fn parse(token: &[u8]) -> Result<Self> {
        match token.first() {
            Some(b'-') if token.len() == 1 => Ok(LexBound::NegInfinity),
            Some(b'+') if token.len() == 1 => Ok(LexBound::PosInfinity),
            Some(b'[') => Ok(LexBound::Inclusive(token[1..].to_vec())),
            Some(b'(') => Ok(LexBound::Exclusive(token[1..].to_vec())),
            _ => Err(Error::validation(
                "min or max not valid string range item",
            )),
        }
    }

    fn admits_from_below(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInfinity => true,
            LexBound::PosInfinity => false,
            LexBound::Inclusive(b) => member >= b.as_slice(),
            LexBound::Exclusive(b) => member > b.as_slice(),
        }
    }

    fn admits_from_above(&self, member: &[u8]) -> bool {
        match self {
            LexBound::PosInfinity => true,
            LexBound::NegInfinity => false,
            LexBound::Inclusive(b) => member <= b.as_slice(),
            LexBound::Exclusive(b) => member < b.as_slice(),
        }
    }
}

/// A validated (min, max) lex range.
#[derive(Debug, Clone)]
pub struct LexRange {
    /// Lower bound.
    pub min: LexBound,
    /// Upper bound.
    pub max: LexBound,
}

impl LexRange {
    /// Parse a `min max` token pair.
    pub fn parse(min: &[u8], max: &[u8]) -> Result<Self> {
        Ok(LexRange {
            min: LexBound::parse(min)?,
            max: LexBound::parse(max)?,
        })
    }

    /// Whether `member` falls within this range.
    pub fn contains(&self, member: &[u8]) -> bool {
        self.min.admits_from_below(member) && self.max.admits_from_above(member)
    }
}

/// An offset/count pair from a `LIMIT` clause.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    /// Number of matching elements to skip.
    pub offset: i64,
    /// Number of elements to take after skipping; negative means "to end".
    pub count: i64,
}

impl Limit {
    /// The default, no-op limit: skip nothing, take everything.
    pub fn unbounded() -> Self {
        Limit { offset: 0, count: -1 }
    }

    /// Validate and construct a limit clause.
    pub fn new(offset: i64, count: i64) -> Result<Self> {
        if offset < 0 {
            return Err(Error::validation("LIMIT offset must be non-negative"));
        }
        Ok(Limit { offset, count })
    }

    /// Apply this limit to an already-ordered slice.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset as usize;
        if offset >= items.len() {
            return Vec::new();
        }
        let rest = items.into_iter().skip(offset);
        if self.count < 0 {
            rest.collect()
        } else {
            rest.take(self.count as usize).collect()
        }
    }
}
