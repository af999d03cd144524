//! Weighted, aggregated set algebra over sorted sets: `ZDIFF`, `ZINTER`,
//! `ZUNION`, and their `...STORE` variants share this implementation; the
//! command handlers differ only in whether they reply with the resulting
//! set or write it to a destination key.

use bramble_core::{Error, Result};
use rustc_hash::FxHashMap;

use crate::set::SortedSet;

/// How per-source score contributions combine into a member's final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Sum of contributions (the default).
    Sum,
    /// Minimum contribution.
    Min,
    /// Maximum contribution.
    Max,
}

impl Aggregate {
    /// Parse the `AGGREGATE` token, case-insensitively.
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_uppercase().as_str() {
            "SUM" => Ok(Aggregate::Sum),
            "MIN" => Ok(Aggregate::Min),
            "MAX" => Ok(Aggregate::Max),
            _ => Err(Error::validation("syntax error in AGGREGATE")),
        }
    }

    fn combine(&self, values: &[f64]) -> f64 {
        match self {
            Aggregate::Sum => values.iter().sum(),
            Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Validate that `weights`, if given, has exactly one entry per source, or
/// default every source to weight 1.
pub fn resolve_weights(num_sources: usize, weights: Option<Vec<f64>>) -> Result<Vec<f64>> {
    match weights {
        None => Ok(vec![1.0; num_sources]),
        Some(w) if w.len() == num_sources => Ok(w),
        Some(_) => Err(Error::validation(
            "number of weights does not match number of keys",
        )),
    }
}

/// `ZUNION`/`ZUNIONSTORE`: members present in at least one source.
pub fn union(sources: &[&SortedSet], weights: &[f64], aggregate: Aggregate) -> SortedSet {
    let mut contributions: FxHashMap<Vec<u8>, Vec<f64>> = FxHashMap::default();
    for (set, &weight) in sources.iter().zip(weights) {
        for (member, score) in set.iter() {
            contributions
                .entry(member.to_vec())
                .or_default()
                .push(score * weight);
        }
    }
    let mut result = SortedSet::new();
    for (member, values) in contributions {
        result.set_score(member, aggregate.combine(&values));
    }
    result
}

/// `ZINTER`/`ZINTERSTORE`: members present in every source.
pub fn inter(sources: &[&SortedSet], weights: &[f64], aggregate: Aggregate) -> SortedSet {
    let mut result = SortedSet::new();
    let Some((first, rest)) = sources.split_first() else {
        return result;
    };
    let (&first_weight, rest_weights) = weights.split_first().unwrap();
    'member: for (member, score) in first.iter() {
        let mut contributions = vec![score * first_weight];
        for (set, &weight) in rest.iter().zip(rest_weights) {
            match set.score(member) {
                Some(s) => contributions.push(s * weight),
                None => continue 'member,
            }
        }
        result.set_score(member.to_vec(), aggregate.combine(&contributions));
    }
    result
}

/// `ZDIFF`/`ZDIFFSTORE`: members present in the first source and absent
/// from every other; scores come from the first source alone.
pub fn diff(sources: &[&SortedSet], weights: &[f64]) -> SortedSet {
    let mut result = SortedSet::new();
    let Some((first, rest)) = sources.split_first() else {
        return result;
    };
    let (&first_weight, _) = weights.split_first().unwrap();
    'member: for (member, score) in first.iter() {
        for set in rest {
            if set.contains(member) {
                continue 'member;
            }
        }
        result.set_score(member.to_vec(), score * first_weight);
    }
    result
}
