//! The ordered member store backing the `SortedSet` typed value.
//!
//! A skip list keyed by `(score, member)` is the textbook structure here; we
//! use a `BTreeSet` over the same key instead (ordered the identical way)
//! paired with a hash index from member to score. Every range query still
//! costs `O(log n + k)` to locate the first matching element via the tree,
//! though rank-by-position (`ZRANK`, rank-addressed `ZRANGE`) walks from an
//! end to count position, which is `O(n)` rather than the `O(log n)` a
//! genuine skip list with embedded subtree sizes would give. Acceptable for
//! a from-scratch core; a production fork would want the subtree-size
//! augmentation.

use std::cmp::Ordering;

use bramble_core::{Error, Result};
use rustc_hash::FxHashMap;

use crate::bound::{LexRange, Limit, ScoreRange};

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoreKey(f64);

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Flags accepted by `ZADD`/`ZINCRBY`-style additions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddFlags {
    /// Insert only if the member is absent.
    pub nx: bool,
    /// Update only if the member is present.
    pub xx: bool,
    /// Update only if the new score is strictly greater.
    pub gt: bool,
    /// Update only if the new score is strictly less.
    pub lt: bool,
    /// Count score-changes, not just insertions, in the return value.
    pub ch: bool,
}

impl AddFlags {
    /// Reject flag combinations the protocol disallows.
    pub fn validate(&self) -> Result<()> {
        if self.nx && (self.gt || self.lt) {
            return Err(Error::validation(
                "GT, LT, and/or NX options at the same time are not compatible",
            ));
        }
        if self.gt && self.lt {
            return Err(Error::validation("GT and LT options at the same time are not compatible"));
        }
        if self.nx && self.xx {
            return Err(Error::validation("XX and NX options at the same time are not compatible"));
        }
        Ok(())
    }
}

/// Outcome of adding or updating a single member, used to tally `ZADD`
/// return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// An ordered `(score, member)` collection with unique members.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    by_score: std::collections::BTreeSet<(ScoreKey, Vec<u8>)>,
    scores: FxHashMap<Vec<u8>, f64>,
}

impl SortedSet {
    /// An empty sorted set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The score of `member`, if present.
    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Whether `member` is present.
    pub fn contains(&self, member: &[u8]) -> bool {
        self.scores.contains_key(member)
    }

    /// Directly install a member's score, overwriting any prior score and
    /// skipping flag checks. Used by set-algebra result construction and by
    /// durability restore.
    pub fn set_score(&mut self, member: Vec<u8>, score: f64) {
        if let Some(&old) = self.scores.get(&member) {
            self.by_score.remove(&(ScoreKey(old), member.clone()));
        }
        self.by_score.insert((ScoreKey(score), member.clone()));
        self.scores.insert(member, score);
    }

    /// Remove `member`, returning its score if it was present.
    pub fn remove(&mut self, member: &[u8]) -> Option<f64> {
        let score = self.scores.remove(member)?;
        self.by_score.remove(&(ScoreKey(score), member.to_vec()));
        Some(score)
    }

    fn add_one(&mut self, member: Vec<u8>, score: f64, flags: &AddFlags) -> MemberOutcome {
        match self.scores.get(&member).copied() {
            None => {
                if flags.xx {
                    return MemberOutcome::Unchanged;
                }
                self.set_score(member, score);
                MemberOutcome::Inserted
            }
            Some(old) => {
                if flags.nx {
                    return MemberOutcome::Unchanged;
                }
                if flags.gt && !(score > old) {
                    return MemberOutcome::Unchanged;
                }
                if flags.lt && !(score < old) {
                    return MemberOutcome::Unchanged;
                }
                if score == old {
                    return MemberOutcome::Unchanged;
                }
                self.set_score(member, score);
                MemberOutcome::Updated
            }
        }
    }

    /// Add or update `items`, returning the count `ZADD` should reply with:
    /// insertions only, unless `flags.ch` requests insertions-plus-updates.
    pub fn add_many(&mut self, items: Vec<(f64, Vec<u8>)>, flags: &AddFlags) -> Result<usize> {
        flags.validate()?;
        let mut inserted = 0usize;
        let mut changed = 0usize;
        for (score, member) in items {
            if score.is_nan() {
                return Err(Error::validation("value is not a valid float"));
            }
            match self.add_one(member, score, flags) {
                MemberOutcome::Inserted => {
                    inserted += 1;
                    changed += 1;
                }
                MemberOutcome::Updated => changed += 1,
                MemberOutcome::Unchanged => {}
            }
        }
        Ok(if flags.ch { changed } else { inserted })
    }

    /// `ZADD ... INCR`: increment a single member's score by `delta`.
    /// Returns `None` when the update was aborted by `NX`/`XX`/`GT`/`LT`.
    pub fn incr(&mut self, member: Vec<u8>, delta: f64, flags: &AddFlags) -> Result<Option<f64>> {
        flags.validate()?;
        let existing = self.scores.get(&member).copied();
        if flags.nx && existing.is_some() {
            return Ok(None);
        }
        if flags.xx && existing.is_none() {
            return Ok(None);
        }
        let old = existing.unwrap_or(0.0);
        if old.is_infinite() {
            return Err(Error::validation("resulting score is not a number (NaN)"));
        }
        let new_score = old + delta;
        if new_score.is_nan() {
            return Err(Error::validation("resulting score is not a number (NaN)"));
        }
        if existing.is_some() {
            if flags.gt && !(new_score > old) {
                return Ok(None);
            }
            if flags.lt && !(new_score < old) {
                return Ok(None);
            }
        }
        self.set_score(member, new_score);
        Ok(Some(new_score))
    }

    /// Iterate `(member, score)` pairs in unspecified order. Used by set
    /// algebra, which re-derives its own ordering via `set_score`.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], f64)> {
        self.scores.iter().map(|(m, &s)| (m.as_slice(), s))
    }

    /// All members in ascending `(score, member)` order.
    fn ascending(&self) -> Vec<(&[u8], f64)> {
        self.by_score
            .iter()
            .map(|(ScoreKey(s), m)| (m.as_slice(), *s))
            .collect()
    }

    fn resolve_rank(idx: i64, len: usize) -> i64 {
        if idx < 0 {
            idx + len as i64
        } else {
            idx
        }
    }

    /// Rank of `member`, zero-based from the low (ascending) end, or from
    /// the high end when `rev` is set.
    pub fn rank(&self, member: &[u8], rev: bool) -> Option<usize> {
        let score = self.score(member)?;
        let pos = self
            .by_score
            .iter()
            .position(|(ScoreKey(s), m)| *s == score && m.as_slice() == member)?;
        Some(if rev { self.len() - 1 - pos } else { pos })
    }

    /// Range by rank, inclusive on both ends, Redis-style negative indices
    /// counting from the end and out-of-range bounds clamped (not an
    /// error) to the addressable span.
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(Vec<u8>, f64)> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        let start = Self::resolve_rank(start, len).max(0);
        let stop = Self::resolve_rank(stop, len).min(len as i64 - 1);
        if start > stop || start >= len as i64 {
            return Vec::new();
        }
        let mut items = self.ascending();
        if rev {
            items.reverse();
        }
        items[start as usize..=stop as usize]
            .iter()
            .map(|(m, s)| (m.to_vec(), *s))
            .collect()
    }

    /// Strict rank range used by `ZREMRANGEBYRANK`: out-of-bounds indices
    /// are a validation error rather than silently clamped.
    pub fn strict_rank_range(&self, start: i64, stop: i64) -> Result<(usize, usize)> {
        let len = self.len() as i64;
        let start = Self::resolve_rank(start, self.len());
        let stop = Self::resolve_rank(stop, self.len());
        if start < 0 || stop < 0 || start >= len || stop >= len || start > stop {
            return Err(Error::OutOfBounds("rank range outside sorted set".into()));
        }
        Ok((start as usize, stop as usize))
    }

    /// Range by score, optionally reversed, with an offset/count limit.
    pub fn range_by_score(
        &self,
        range: &ScoreRange,
        rev: bool,
        limit: Limit,
    ) -> Vec<(Vec<u8>, f64)> {
        let mut items: Vec<(Vec<u8>, f64)> = self
            .ascending()
            .into_iter()
            .filter(|(_, s)| range.contains(*s))
            .map(|(m, s)| (m.to_vec(), s))
            .collect();
        if rev {
            items.reverse();
        }
        limit.apply(items)
    }

    /// Whether every member currently shares the same score (a
    /// precondition for meaningful `BYLEX` range queries).
    fn all_scores_equal(&self) -> bool {
        let mut scores = self.scores.values();
        match scores.next() {
            None => true,
            Some(first) => scores.all(|s| s == first),
        }
    }

    /// Range by lexicographic bound. Per contract, if members do not all
    /// share one score the result is empty.
    pub fn range_by_lex(&self, range: &LexRange, rev: bool, limit: Limit) -> Vec<Vec<u8>> {
        if !self.all_scores_equal() {
            return Vec::new();
        }
        let mut items: Vec<Vec<u8>> = self
            .ascending()
            .into_iter()
            .filter(|(m, _)| range.contains(m))
            .map(|(m, _)| m.to_vec())
            .collect();
        if rev {
            items.reverse();
        }
        limit.apply(items)
    }

    /// Count of members within a score range (`ZCOUNT`).
    pub fn count_by_score(&self, range: &ScoreRange) -> usize {
        self.scores.values().filter(|&&s| range.contains(s)).count()
    }

    /// Count of members within a lex range (`ZLEXCOUNT`), subject to the
    /// same same-score precondition as `range_by_lex`.
    pub fn count_by_lex(&self, range: &LexRange) -> usize {
        if !self.all_scores_equal() {
            return 0;
        }
        self.scores
            .keys()
            .filter(|m| range.contains(m))
            .count()
    }

    /// Remove and return members by rank range (`ZREMRANGEBYRANK`).
    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> Result<Vec<(Vec<u8>, f64)>> {
        let (lo, hi) = self.strict_rank_range(start, stop)?;
        let victims: Vec<(Vec<u8>, f64)> = self
            .ascending()
            .into_iter()
            .skip(lo)
            .take(hi - lo + 1)
            .map(|(m, s)| (m.to_vec(), s))
            .collect();
        for (m, _) in &victims {
            self.remove(m);
        }
        Ok(victims)
    }

    /// Remove and return members by score range (`ZREMRANGEBYSCORE`).
    pub fn remove_range_by_score(&mut self, range: &ScoreRange) -> Vec<(Vec<u8>, f64)> {
        let victims: Vec<(Vec<u8>, f64)> = self
            .scores
            .iter()
            .filter(|(_, &s)| range.contains(s))
            .map(|(m, &s)| (m.clone(), s))
            .collect();
        for (m, _) in &victims {
            self.remove(m);
        }
        victims
    }

    /// Remove and return members by lex range (`ZREMRANGEBYLEX`).
    pub fn remove_range_by_lex(&mut self, range: &LexRange) -> Vec<(Vec<u8>, f64)> {
        if !self.all_scores_equal() {
            return Vec::new();
        }
        let victims: Vec<(Vec<u8>, f64)> = self
            .scores
            .iter()
            .filter(|(m, _)| range.contains(m))
            .map(|(m, &s)| (m.clone(), s))
            .collect();
        for (m, _) in &victims {
            self.remove(m);
        }
        victims
    }

    /// Pop up to `count` members from the low-score end.
    pub fn pop_min(&mut self, count: usize) -> Vec<(Vec<u8>, f64)> {
        let mut out = Vec::with_capacity(count.min(self.len()));
        for _ in 0..count {
            let Some((ScoreKey(score), member)) = self.by_score.iter().next().cloned() else {
                break;
            };
            self.remove(&member);
            out.push((member, score));
        }
        out
    }

    /// Pop up to `count` members from the high-score end.
    pub fn pop_max(&mut self, count: usize) -> Vec<(Vec<u8>, f64)> {
        let mut out = Vec::with_capacity(count.min(self.len()));
        for _ in 0..count {
            let Some((ScoreKey(score), member)) = self.by_score.iter().next_back().cloned() else {
                break;
            };
            self.remove(&member);
            out.push((member, score));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SortedSet {
        let mut s = SortedSet::new();
        s.add_many(
            vec![
                (1.0, b"a".to_vec()),
                (2.0, b"b".to_vec()),
                (3.0, b"c".to_vec()),
                (4.0, b"d".to_vec()),
                (5.0, b"e".to_vec()),
            ],
            &AddFlags::default(),
        )
        .unwrap();
        s
    }

    #[test]
    fn add_many_counts_insertions_by_default() {
        let mut s = SortedSet::new();
        let n = s
            .add_many(vec![(1.0, b"a".to_vec()), (2.0, b"b".to_vec())], &AddFlags::default())
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn ch_flag_counts_updates_too() {
        let mut s = sample();
        let flags = AddFlags {
            ch: true,
            ..Default::default()
        };
        let n = s.add_many(vec![(10.0, b"a".to_vec()), (99.0, b"z".to_vec())], &flags).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn nx_and_gt_together_is_invalid() {
        let flags = AddFlags {
            nx: true,
            gt: true,
            ..Default::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn gt_rejects_non_increasing_update() {
        let mut s = sample();
        let flags = AddFlags {
            gt: true,
            ..Default::default()
        };
        s.add_many(vec![(0.5, b"a".to_vec())], &flags).unwrap();
        assert_eq!(s.score(b"a"), Some(1.0));
    }

    #[test]
    fn incr_on_infinite_member_fails() {
        let mut s = SortedSet::new();
        s.set_score(b"a".to_vec(), f64::INFINITY);
        assert!(s.incr(b"a".to_vec(), 1.0, &AddFlags::default()).is_err());
    }

    #[test]
    fn range_by_rank_matches_spec_scenario_s2() {
        let s = sample();
        let range = ScoreRange::parse("2", "4").unwrap();
        let got = s.range_by_score(&range, false, Limit::unbounded());
        assert_eq!(
            got,
            vec![(b"b".to_vec(), 2.0), (b"c".to_vec(), 3.0), (b"d".to_vec(), 4.0)]
        );
    }

    #[test]
    fn rank_is_zero_based_ascending() {
        let s = sample();
        assert_eq!(s.rank(b"a", false), Some(0));
        assert_eq!(s.rank(b"e", false), Some(4));
        assert_eq!(s.rank(b"a", true), Some(4));
    }

    #[test]
    fn remove_range_by_rank_rejects_out_of_bounds() {
        let mut s = sample();
        assert!(s.remove_range_by_rank(0, 100).is_err());
    }

    #[test]
    fn remove_range_by_rank_negative_counts_from_end() {
        let mut s = sample();
        let victims = s.remove_range_by_rank(-2, -1).unwrap();
        assert_eq!(victims.len(), 2);
        assert_eq!(s.len(), 3);
        assert!(!s.contains(b"e"));
        assert!(!s.contains(b"d"));
    }

    #[test]
    fn pop_min_and_max_respect_order() {
        let mut s = sample();
        assert_eq!(s.pop_min(1), vec![(b"a".to_vec(), 1.0)]);
        assert_eq!(s.pop_max(1), vec![(b"e".to_vec(), 5.0)]);
    }

    #[test]
    fn bylex_empty_when_scores_diverge() {
        let s = sample();
        let range = LexRange::parse(b"-", b"+").unwrap();
        assert!(s.range_by_lex(&range, false, Limit::unbounded()).is_empty());
    }

    #[test]
    fn bylex_returns_members_when_scores_match() {
        let mut s = SortedSet::new();
        s.add_many(
            vec![(0.0, b"a".to_vec()), (0.0, b"b".to_vec()), (0.0, b"c".to_vec())],
            &AddFlags::default(),
        )
        .unwrap();
        let range = LexRange::parse(b"[b", b"+").unwrap();
        assert_eq!(
            s.range_by_lex(&range, false, Limit::unbounded()),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
    }

    use proptest::prelude::*;

    proptest! {
        /// Rank-order iteration always yields (score ascending, member lex
        /// ascending) order with no duplicate members, regardless of insertion
        /// order or score collisions.
        #[test]
        fn prop_rank_order_is_score_then_member_ascending_without_duplicates(
            members in prop::collection::vec(
                ("[a-z]{1,6}", -1000.0f64..1000.0),
                0..40,
            ),
        ) {
            let mut s = SortedSet::new();
            let mut last_by_member: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();
            for (member, score) in &members {
                last_by_member.insert(member.as_str(), *score);
            }
            let items: Vec<(f64, Vec<u8>)> = members
                .iter()
                .map(|(m, s)| (*s, m.as_bytes().to_vec()))
                .collect();
            s.add_many(items, &AddFlags::default()).unwrap();

            let ordered = s.range_by_rank(0, -1, false);

            prop_assert_eq!(ordered.len(), last_by_member.len());

            let mut seen = std::collections::HashSet::new();
            for (member, _) in &ordered {
                prop_assert!(seen.insert(member.clone()), "duplicate member in rank order: {:?}", member);
            }

            for window in ordered.windows(2) {
                let (ref m1, s1) = window[0];
                let (ref m2, s2) = window[1];
                let in_order = s1 < s2 || (s1 == s2 && m1 <= m2);
                prop_assert!(
                    in_order,
                    "rank order violated: ({:?}, {}) before ({:?}, {})",
                    m1, s1, m2, s2
                );
            }

            for (member, score) in &ordered {
                prop_assert_eq!(*score, last_by_member[std::str::from_utf8(member).unwrap()]);
            }
        }
    }
}
