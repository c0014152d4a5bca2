//! # Sorted Set
//!
//! Purpose: the `zset` container type and every operation that touches it —
//! membership, range selection by score/rank/lex, and the multi-set algebra
//! (ZDIFF/ZINTER/ZUNION) that combines several sorted sets into one result.
//!
//! ## Design Principles
//! 1. **Score Order Is The Invariant**: members are always kept ordered by
//!    `(score, lex-compare(member))`; every mutation restores this before
//!    returning.
//! 2. **Two Indexes, One Truth**: a `BTreeSet` gives ordered scans, a
//!    `HashMap` gives O(1) score lookup by member; both are updated together
//!    so they never disagree about what's a member.
//! 3. **Rank By Counting**: `ZRANK`/`ZREVRANK` count entries below the
//!    target in the ordered index. That's O(n) rather than the O(log n) a
//!    skip-list would give, a deliberate simplicity trade-off for a
//!    reference-grade engine rather than a latency-critical one.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;

use rkv_common::{HkvError, HkvResult};

use crate::value::Bin;

/// Total-ordering wrapper around `f64` so scores can live in a `BTreeSet`.
/// Uses `f64::total_cmp`, which orders every bit pattern including the
/// infinities; `+inf`/`-inf` scores are allowed, only a NaN result from
/// ZINCRBY is rejected (see `NonFiniteResult`).
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for Score {}
impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Byte-string ordering used for same-score tie-breaks and for
/// ZRANGEBYLEX/ZLEXCOUNT selection. See the glossary definition:
///
/// lex-compare(a, b):
///   0 if a == b;
///   else +1 if b is a substring of a;
///   else -1 if a is a substring of b;
///   else the ordinary byte-wise comparison of their common prefix.
pub fn lex_compare(a: &[u8], b: &[u8]) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if contains_subslice(a, b) {
        return Ordering::Greater;
    }
    if contains_subslice(b, a) {
        return Ordering::Less;
    }
    let n = a.len().min(b.len());
    match a[..n].cmp(&b[..n]) {
        Ordering::Equal => a.len().cmp(&b.len()),
        other => other,
    }
}

fn contains_subslice(hay: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > hay.len() {
        return false;
    }
    hay.windows(needle.len()).any(|w| w == needle)
}

/// Member wrapper ordering by `lex_compare` so it can sit in the second slot
/// of the `(Score, Member)` tuple key.
#[derive(Debug, Clone, Eq)]
struct Member(Bin);

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl PartialOrd for Member {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Member {
    fn cmp(&self, other: &Self) -> Ordering {
        lex_compare(&self.0, &other.0)
    }
}

/// How ZADD should react to an already-present member.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZaddFlags {
    pub nx: bool,
    pub xx: bool,
    pub gt: bool,
    pub lt: bool,
    pub ch: bool,
    pub incr: bool,
}

impl ZaddFlags {
    /// Validates the mutually-exclusive combinations the command table
    /// forbids: NX with XX, NX with GT/LT, GT with LT.
    pub fn validate(&self) -> HkvResult<()> {
        if self.nx && self.xx {
            return Err(HkvError::bad_options("NX and XX options at the same time are not compatible"));
        }
        if self.nx && (self.gt || self.lt) {
            return Err(HkvError::bad_options("GT, LT, and/or NX options at the same time are not compatible"));
        }
        if self.gt && self.lt {
            return Err(HkvError::bad_options("GT, LT, and/or NX options at the same time are not compatible"));
        }
        Ok(())
    }
}

/// Aggregation function for ZINTERSTORE/ZUNIONSTORE/ZDIFFSTORE-family ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn combine(&self, a: f64, b: f64) -> f64 {
        match self {
            Aggregate::Sum => a + b,
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

/// A sorted set: members with scores, kept in `(score, member)` order.
#[derive(Debug, Clone, Default)]
pub struct SortedSetValue {
    ordered: BTreeSet<(Score, Member)>,
    scores: HashMap<Bin, f64>,
}

impl SortedSetValue {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    pub fn mscore(&self, members: &[Bin]) -> Vec<Option<f64>> {
        members.iter().map(|m| self.score(m)).collect()
    }

    pub fn approx_size(&self) -> usize {
        self.scores.keys().map(|k| k.len() + 16).sum()
    }

    fn insert_raw(&mut self, member: Bin, new_score: f64) {
        if let Some(&old) = self.scores.get(&member) {
            self.ordered.remove(&(Score(old), Member(member.clone())));
        }
        self.ordered.insert((Score(new_score), Member(member.clone())));
        self.scores.insert(member, new_score);
    }

    fn remove_raw(&mut self, member: &[u8]) -> Option<f64> {
        let old = self.scores.remove(member)?;
        self.ordered.remove(&(Score(old), Member(member.to_vec())));
        Some(old)
    }

    /// ZADD. `members` is `(score, member)` pairs in command order. Returns
    /// `(added, changed, incr_result)`: `added` counts brand-new members,
    /// `changed` additionally counts score updates (used when CH is set),
    /// `incr_result` carries the post-update score when `flags.incr` is set
    /// and exactly one pair was given (per the command's own arity rule).
    pub fn zadd(
        &mut self,
        flags: ZaddFlags,
        members: Vec<(f64, Bin)>,
    ) -> HkvResult<(i64, i64, Option<f64>)> {
        flags.validate()?;

        if flags.incr && members.len() != 1 {
            return Err(HkvError::bad_options("INCR option supports a single increment-element pair"));
        }

        let mut added = 0i64;
        let mut changed = 0i64;
        let mut incr_result = None;

        for (score, member) in members {
            let existing = self.scores.get(&member).copied();

            if flags.incr {
                let base = existing.unwrap_or(0.0);
                let next = base + score;
                if !next.is_finite() {
                    return Err(HkvError::NonFiniteResult);
                }
                if flags.nx && existing.is_some() {
                    incr_result = None;
                    continue;
                }
                if flags.xx && existing.is_none() {
                    incr_result = None;
                    continue;
                }
                if flags.gt && existing.map(|e| next <= e).unwrap_or(false) {
                    incr_result = None;
                    continue;
                }
                if flags.lt && existing.map(|e| next >= e).unwrap_or(false) {
                    incr_result = None;
                    continue;
                }
                self.insert_raw(member, next);
                if existing.is_none() {
                    added += 1;
                }
                incr_result = Some(next);
                continue;
            }

            match existing {
                None => {
                    if flags.xx {
                        continue;
                    }
                    self.insert_raw(member, score);
                    added += 1;
                    changed += 1;
                }
                Some(old) => {
                    if flags.nx {
                        continue;
                    }
                    if flags.gt && score <= old {
                        continue;
                    }
                    if flags.lt && score >= old {
                        continue;
                    }
                    if score != old {
                        self.insert_raw(member, score);
                        changed += 1;
                    }
                }
            }
        }

        Ok((added, changed, incr_result))
    }

    pub fn zrem(&mut self, members: &[Bin]) -> usize {
        members.iter().filter(|m| self.remove_raw(m).is_some()).count()
    }

    /// ZRANK/ZREVRANK: O(n) count of entries strictly below the target in
    /// the requested direction.
    pub fn rank(&self, member: &[u8], reverse: bool) -> Option<(usize, f64)> {
        let score = *self.scores.get(member)?;
        let key = (Score(score), Member(member.to_vec()));
        let below = self.ordered.range(..key.clone()).count();
        let rank = if reverse { self.ordered.len() - 1 - below } else { below };
        Some((rank, score))
    }

    pub fn count_by_score(&self, min: RangeBound, max: RangeBound) -> usize {
        self.iter_by_score(min, max).count()
    }

    /// ZRANGEBYSCORE-family selection, ascending order.
    pub fn iter_by_score(&self, min: RangeBound, max: RangeBound) -> impl Iterator<Item = (&Bin, f64)> + '_ {
        self.ordered.iter().filter_map(move |(Score(s), Member(m))| {
            if min.satisfied_below(*s) && max.satisfied_above(*s) {
                Some((m, *s))
            } else {
                None
            }
        })
    }

    pub fn range_by_score(&self, min: RangeBound, max: RangeBound, rev: bool, offset: usize, count: Option<usize>) -> Vec<(Bin, f64)> {
        let mut out: Vec<(Bin, f64)> = self
            .iter_by_score(min, max)
            .map(|(m, s)| (m.clone(), s))
            .collect();
        if rev {
            out.reverse();
        }
        apply_offset_count(out, offset, count)
    }

    /// True when every member shares the same score, the precondition
    /// lex-range selection requires to give a well-defined ordering.
    fn single_score(&self) -> bool {
        match (self.ordered.iter().next(), self.ordered.iter().next_back()) {
            (Some((first, _)), Some((last, _))) => first == last,
            _ => true,
        }
    }

    /// ZRANGEBYLEX-family selection. Only meaningful when every member
    /// shares the same score; returns empty otherwise.
    pub fn range_by_lex(&self, min: &LexBound, max: &LexBound, rev: bool, offset: usize, count: Option<usize>) -> Vec<Bin> {
        if !self.single_score() {
            return Vec::new();
        }
        let mut out: Vec<Bin> = self
            .ordered
            .iter()
            .filter_map(|(_, Member(m))| {
                if min.satisfied_below(m) && max.satisfied_above(m) {
                    Some(m.clone())
                } else {
                    None
                }
            })
            .collect();
        if rev {
            out.reverse();
        }
        apply_offset_count(out, offset, count)
    }

    /// ZLEXCOUNT. Only meaningful when every member shares the same score;
    /// returns zero otherwise.
    pub fn lexcount(&self, min: &LexBound, max: &LexBound) -> usize {
        if !self.single_score() {
            return 0;
        }
        self.ordered
            .iter()
            .filter(|(_, Member(m))| min.satisfied_below(m) && max.satisfied_above(m))
            .count()
    }

    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(Bin, f64)> {
        let len = self.ordered.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
        let start = norm(start).max(0);
        let stop = norm(stop).min(len - 1);
        if start > stop {
            return Vec::new();
        }

        let items: Vec<(Bin, f64)> = if rev {
            self.ordered.iter().rev().map(|(Score(s), Member(m))| (m.clone(), *s)).collect()
        } else {
            self.ordered.iter().map(|(Score(s), Member(m))| (m.clone(), *s)).collect()
        };
        items
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .collect()
    }

    /// ZPOPMIN/ZPOPMAX: removes and returns up to `count` extreme entries.
    pub fn pop_extreme(&mut self, count: usize, max: bool) -> Vec<(Bin, f64)> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let next = if max {
                self.ordered.iter().next_back().cloned()
            } else {
                self.ordered.iter().next().cloned()
            };
            match next {
                Some((Score(s), Member(m))) => {
                    self.remove_raw(&m);
                    out.push((m, s));
                }
                None => break,
            }
        }
        out
    }

    pub fn remove_range_by_score(&mut self, min: RangeBound, max: RangeBound) -> usize {
        let victims: Vec<Bin> = self.iter_by_score(min, max).map(|(m, _)| m.clone()).collect();
        for m in &victims {
            self.remove_raw(m);
        }
        victims.len()
    }

    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let victims: Vec<Bin> = self.range_by_rank(start, stop, false).into_iter().map(|(m, _)| m).collect();
        for m in &victims {
            self.remove_raw(m);
        }
        victims.len()
    }

    /// ZRANDMEMBER: positive count samples distinct members (capped at
    /// cardinality), negative count samples with replacement.
    pub fn random(&self, count: i64, with_scores: bool) -> Vec<(Bin, Option<f64>)> {
        if self.scores.is_empty() {
            return Vec::new();
        }
        let entries: Vec<(&Bin, &f64)> = self.scores.iter().collect();
        let mut rng = rand::thread_rng();

        if count < 0 {
            let n = count.unsigned_abs() as usize;
            (0..n)
                .map(|_| {
                    let (m, s) = entries[rng.gen_range(0..entries.len())];
                    (m.clone(), with_scores.then_some(*s))
                })
                .collect()
        } else {
            let n = (count as usize).min(entries.len());
            let mut idx: Vec<usize> = (0..entries.len()).collect();
            idx.shuffle(&mut rng);
            idx.into_iter()
                .take(n)
                .map(|i| {
                    let (m, s) = entries[i];
                    (m.clone(), with_scores.then_some(*s))
                })
                .collect()
        }
    }

    fn iter_pairs(&self) -> impl Iterator<Item = (&Bin, f64)> + '_ {
        self.scores.iter().map(|(m, s)| (m, *s))
    }

    /// ZDIFF: members of `self` absent from every set in `rest`, scores
    /// taken from `self`.
    pub fn diff(&self, rest: &[&SortedSetValue]) -> Vec<(Bin, f64)> {
        let mut out: Vec<(Bin, f64)> = self
            .iter_pairs()
            .filter(|(m, _)| !rest.iter().any(|s| s.scores.contains_key(m.as_slice())))
            .map(|(m, s)| (m.clone(), s))
            .collect();
        out.sort_by(|a, b| Score(a.1).cmp(&Score(b.1)).then_with(|| lex_compare(&a.0, &b.0)));
        out
    }

    /// ZINTER: members present in every input set, score combined via
    /// `agg` across `weights` (parallel to `sets`, `self` is `sets[0]`
    /// conceptually but kept out-of-band by the caller for symmetry).
    pub fn inter(sets: &[&SortedSetValue], weights: &[f64], agg: Aggregate) -> Vec<(Bin, f64)> {
        let mut result: Vec<(Bin, f64)> = match sets.split_first() {
            None => return Vec::new(),
            Some((first, rest)) => first
                .iter_pairs()
                .filter_map(|(m, s)| {
                    let mut acc = s * weights[0];
                    for (i, other) in rest.iter().enumerate() {
                        match other.score(m) {
                            Some(os) => acc = agg.combine(acc, os * weights[i + 1]),
                            None => return None,
                        }
                    }
                    Some((m.clone(), acc))
                })
                .collect(),
        };
        result.sort_by(|a, b| Score(a.1).cmp(&Score(b.1)).then_with(|| lex_compare(&a.0, &b.0)));
        result
    }

    /// ZUNION: members present in any input set, score combined via `agg`.
    pub fn union(sets: &[&SortedSetValue], weights: &[f64], agg: Aggregate) -> Vec<(Bin, f64)> {
        let mut acc: HashMap<Bin, f64> = HashMap::new();
        for (i, set) in sets.iter().enumerate() {
            for (m, s) in set.iter_pairs() {
                let weighted = s * weights[i];
                acc.entry(m.clone())
                    .and_modify(|v| *v = agg.combine(*v, weighted))
                    .or_insert(weighted);
            }
        }
        let mut out: Vec<(Bin, f64)> = acc.into_iter().collect();
        out.sort_by(|a, b| Score(a.1).cmp(&Score(b.1)).then_with(|| lex_compare(&a.0, &b.0)));
        out
    }
}

fn apply_offset_count<T>(items: Vec<T>, offset: usize, count: Option<usize>) -> Vec<T> {
    let skipped = items.into_iter().skip(offset);
    match count {
        Some(c) => skipped.take(c).collect(),
        None => skipped.collect(),
    }
}

/// One side of a ZRANGEBYSCORE-family bound: a value plus whether it's
/// exclusive, or an unbounded end.
#[derive(Debug, Clone, Copy)]
pub enum RangeBound {
    Inclusive(f64),
    Exclusive(f64),
    UnboundedLow,
    UnboundedHigh,
}

impl RangeBound {
    fn satisfied_below(&self, score: f64) -> bool {
        match self {
            RangeBound::Inclusive(v) => score >= *v,
            RangeBound::Exclusive(v) => score > *v,
            RangeBound::UnboundedLow => true,
            RangeBound::UnboundedHigh => false,
        }
    }

    fn satisfied_above(&self, score: f64) -> bool {
        match self {
            RangeBound::Inclusive(v) => score <= *v,
            RangeBound::Exclusive(v) => score < *v,
            RangeBound::UnboundedHigh => true,
            RangeBound::UnboundedLow => false,
        }
    }
}

/// One side of a ZRANGEBYLEX-family bound.
#[derive(Debug, Clone)]
pub enum LexBound {
    Inclusive(Bin),
    Exclusive(Bin),
    UnboundedLow,
    UnboundedHigh,
}

impl LexBound {
    fn satisfied_below(&self, member: &[u8]) -> bool {
        match self {
            LexBound::Inclusive(v) => lex_compare(member, v) != Ordering::Less,
            LexBound::Exclusive(v) => lex_compare(member, v) == Ordering::Greater,
            LexBound::UnboundedLow => true,
            LexBound::UnboundedHigh => false,
        }
    }

    fn satisfied_above(&self, member: &[u8]) -> bool {
        match self {
            LexBound::Inclusive(v) => lex_compare(member, v) != Ordering::Greater,
            LexBound::Exclusive(v) => lex_compare(member, v) == Ordering::Less,
            LexBound::UnboundedHigh => true,
            LexBound::UnboundedLow => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(pairs: &[(&str, f64)]) -> SortedSetValue {
        let mut z = SortedSetValue::default();
        z.zadd(
            ZaddFlags::default(),
            pairs.iter().map(|(m, s)| (*s, m.as_bytes().to_vec())).collect(),
        )
        .unwrap();
        z
    }

    #[test]
    fn zadd_gt_rejects_lower_and_equal_scores() {
        let mut z = zset(&[("a", 5.0)]);
        let flags = ZaddFlags { gt: true, ch: true, ..Default::default() };
        let (added, changed, _) = z.zadd(flags, vec![(3.0, b"a".to_vec())]).unwrap();
        assert_eq!((added, changed), (0, 0));
        assert_eq!(z.score(b"a"), Some(5.0));

        let (added, changed, _) = z.zadd(flags, vec![(9.0, b"a".to_vec())]).unwrap();
        assert_eq!((added, changed), (0, 1));
        assert_eq!(z.score(b"a"), Some(9.0));
    }

    #[test]
    fn zadd_nx_xx_mutually_exclusive() {
        let mut z = SortedSetValue::default();
        let flags = ZaddFlags { nx: true, xx: true, ..Default::default() };
        assert!(z.zadd(flags, vec![(1.0, b"a".to_vec())]).is_err());
    }

    #[test]
    fn rank_ties_break_by_lex_compare() {
        let z = zset(&[("b", 1.0), ("a", 1.0), ("c", 1.0)]);
        assert_eq!(z.rank(b"a", false).unwrap().0, 0);
        assert_eq!(z.rank(b"b", false).unwrap().0, 1);
        assert_eq!(z.rank(b"c", false).unwrap().0, 2);
    }

    #[test]
    fn lex_compare_substring_rule() {
        assert_eq!(lex_compare(b"ab", b"ab"), Ordering::Equal);
        assert_eq!(lex_compare(b"aaa", b"aa"), Ordering::Greater);
        assert_eq!(lex_compare(b"aa", b"aaa"), Ordering::Less);
    }

    #[test]
    fn inter_with_weights_and_max_aggregate() {
        let a = zset(&[("x", 1.0), ("y", 2.0)]);
        let b = zset(&[("x", 10.0)]);
        let result = SortedSetValue::inter(&[&a, &b], &[1.0, 2.0], Aggregate::Max);
        assert_eq!(result, vec![(b"x".to_vec(), 20.0)]);
    }

    #[test]
    fn pop_extreme_min_then_max() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(z.pop_extreme(1, false), vec![(b"a".to_vec(), 1.0)]);
        assert_eq!(z.pop_extreme(1, true), vec![(b"c".to_vec(), 3.0)]);
        assert_eq!(z.len(), 1);
    }

    #[test]
    fn range_by_score_respects_exclusive_bounds() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let out = z.range_by_score(RangeBound::Exclusive(1.0), RangeBound::Inclusive(3.0), false, 0, None);
        assert_eq!(out, vec![(b"b".to_vec(), 2.0), (b"c".to_vec(), 3.0)]);
    }

    #[test]
    fn zadd_accepts_infinite_scores() {
        let mut z = SortedSetValue::default();
        let (added, _, _) = z.zadd(ZaddFlags::default(), vec![(f64::INFINITY, b"a".to_vec())]).unwrap();
        assert_eq!(added, 1);
        assert_eq!(z.score(b"a"), Some(f64::INFINITY));
    }

    #[test]
    fn zincrby_producing_nan_is_rejected() {
        let mut z = zset(&[("a", f64::INFINITY)]);
        let flags = ZaddFlags { incr: true, ..Default::default() };
        assert!(z.zadd(flags, vec![(f64::NEG_INFINITY, b"a".to_vec())]).is_err());
    }

    #[test]
    fn lex_queries_return_empty_unless_scores_are_uniform() {
        let z = zset(&[("a", 1.0), ("b", 2.0)]);
        let min = LexBound::UnboundedLow;
        let max = LexBound::UnboundedHigh;
        assert_eq!(z.lexcount(&min, &max), 0);
        assert!(z.range_by_lex(&min, &max, false, 0, None).is_empty());

        let uniform = zset(&[("a", 1.0), ("b", 1.0), ("c", 1.0)]);
        assert_eq!(uniform.lexcount(&min, &max), 3);
        assert_eq!(uniform.range_by_lex(&min, &max, false, 0, None), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
