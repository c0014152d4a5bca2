//! # Typed Value Containers
//!
//! Purpose: Hold the per-key payload the keyspace stores — one of five
//! container kinds — and the single-key algorithms each kind needs. Multi-key
//! algebra (set/sorted-set union, diff, intersect across several keys) lives
//! in `sets.rs` and `sorted_set.rs` since it needs more than one container at
//! a time.
//!
//! ## Design Principles
//! 1. **Binary-Safe**: keys, members, and field names are `Vec<u8>` (Redis
//!    semantics), never assumed UTF-8.
//! 2. **One Enum, Five Kinds**: `Value` is the thing the keyspace actually
//!    stores; handlers match on it and return `WrongType` on a mismatch.
//! 3. **Container Logic Stays Container-Local**: each `*Value` type owns its
//!    own operations so a handler is a thin translation from RESP args to a
//!    method call plus error mapping.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;

use rkv_common::{HkvError, HkvResult};

use crate::sorted_set::SortedSetValue;

/// A binary-safe key or member name.
pub type Bin = Vec<u8>;

/// The kind of container held at a key, used for `TYPE` and `WrongType`
/// error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
    Set,
    Hash,
    SortedSet,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::Hash => "hash",
            ValueKind::SortedSet => "zset",
        }
    }
}

/// The typed payload stored for one key.
#[derive(Debug, Clone)]
pub enum Value {
    Str(StringValue),
    List(ListValue),
    Set(SetValue),
    Hash(HashValue),
    ZSet(SortedSetValue),
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(StringValue::default())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Hash(_) => ValueKind::Hash,
            Value::ZSet(_) => ValueKind::SortedSet,
        }
    }

    pub fn as_string(&self) -> HkvResult<&StringValue> {
        match self {
            Value::Str(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_string_mut(&mut self) -> HkvResult<&mut StringValue> {
        match self {
            Value::Str(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_list(&self) -> HkvResult<&ListValue> {
        match self {
            Value::List(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> HkvResult<&mut ListValue> {
        match self {
            Value::List(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_set(&self) -> HkvResult<&SetValue> {
        match self {
            Value::Set(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> HkvResult<&mut SetValue> {
        match self {
            Value::Set(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_hash(&self) -> HkvResult<&HashValue> {
        match self {
            Value::Hash(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> HkvResult<&mut HashValue> {
        match self {
            Value::Hash(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_zset(&self) -> HkvResult<&SortedSetValue> {
        match self {
            Value::ZSet(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> HkvResult<&mut SortedSetValue> {
        match self {
            Value::ZSet(v) => Ok(v),
            _ => Err(HkvError::WrongType),
        }
    }

    /// Approximate heap footprint in bytes, used by the eviction driver's
    /// memory accounting when a richer allocator hook is unavailable.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Str(v) => v.0.len(),
            Value::List(v) => v.0.iter().map(|e| e.len()).sum(),
            Value::Set(v) => v.0.iter().map(|e| e.len()).sum(),
            Value::Hash(v) => v.0.iter().map(|(k, val)| k.len() + val.len()).sum(),
            Value::ZSet(v) => v.approx_size(),
        }
    }
}

/// String container: a bare byte sequence.
#[derive(Debug, Clone, Default)]
pub struct StringValue(pub Bin);

impl StringValue {
    pub fn new(data: Bin) -> Self {
        StringValue(data)
    }

    pub fn strlen(&self) -> usize {
        self.0.len()
    }

    pub fn append(&mut self, data: &[u8]) -> usize {
        self.0.extend_from_slice(data);
        self.0.len()
    }

    /// GETRANGE with Redis-style negative indices (count from the end,
    /// clamped to the string bounds).
    pub fn getrange(&self, start: i64, end: i64) -> Bin {
        let len = self.0.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i
            }
        };
        let start = norm(start).min(len - 1).max(0);
        let end = norm(end).min(len - 1);
        if end < start {
            return Vec::new();
        }
        self.0[start as usize..=end as usize].to_vec()
    }

    /// SETRANGE: writes `value` at `offset`, zero-padding any gap.
    pub fn setrange(&mut self, offset: usize, value: &[u8]) -> usize {
        if value.is_empty() {
            return self.0.len();
        }
        let needed = offset + value.len();
        if self.0.len() < needed {
            self.0.resize(needed, 0);
        }
        self.0[offset..offset + value.len()].copy_from_slice(value);
        self.0.len()
    }

    /// Parses the stored bytes as a base-10 integer for INCR/DECR family
    /// commands. An empty string is treated as zero.
    pub fn parse_i64(&self) -> HkvResult<i64> {
        if self.0.is_empty() {
            return Ok(0);
        }
        std::str::from_utf8(&self.0)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| HkvError::bad_options("value is not an integer or out of range"))
    }

    pub fn parse_f64(&self) -> HkvResult<f64> {
        if self.0.is_empty() {
            return Ok(0.0);
        }
        std::str::from_utf8(&self.0)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| HkvError::bad_options("value is not a valid float"))
    }
}

/// List container: an ordered sequence of byte strings.
#[derive(Debug, Clone, Default)]
pub struct ListValue(pub VecDeque<Bin>);

impl ListValue {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lpush(&mut self, values: impl IntoIterator<Item = Bin>) -> usize {
        for v in values {
            self.0.push_front(v);
        }
        self.0.len()
    }

    pub fn rpush(&mut self, values: impl IntoIterator<Item = Bin>) -> usize {
        for v in values {
            self.0.push_back(v);
        }
        self.0.len()
    }

    pub fn lpop(&mut self, count: usize) -> Vec<Bin> {
        (0..count).filter_map(|_| self.0.pop_front()).collect()
    }

    pub fn rpop(&mut self, count: usize) -> Vec<Bin> {
        (0..count).filter_map(|_| self.0.pop_back()).collect()
    }

    fn normalize(&self, index: i64) -> Option<usize> {
        let len = self.0.len() as i64;
        let idx = if index < 0 { len + index } else { index };
        if idx < 0 || idx >= len {
            None
        } else {
            Some(idx as usize)
        }
    }

    pub fn lindex(&self, index: i64) -> Option<&Bin> {
        self.normalize(index).and_then(|i| self.0.get(i))
    }

    pub fn lset(&mut self, index: i64, value: Bin) -> HkvResult<()> {
        match self.normalize(index) {
            Some(i) => {
                self.0[i] = value;
                Ok(())
            }
            None => Err(HkvError::bad_options("index out of range")),
        }
    }

    /// LRANGE with Redis-style clamped, inclusive, negative-aware indices.
    pub fn lrange(&self, start: i64, stop: i64) -> Vec<Bin> {
        let len = self.0.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
        let start = norm(start).max(0);
        let stop = norm(stop).min(len - 1);
        if start > stop {
            return Vec::new();
        }
        self.0
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }

    pub fn ltrim(&mut self, start: i64, stop: i64) {
        let kept = self.lrange(start, stop);
        self.0 = kept.into_iter().collect();
    }

    /// LREM: removes up to `count` occurrences of `value`.
    /// `count > 0` removes from the head, `count < 0` from the tail,
    /// `count == 0` removes all occurrences.
    pub fn lrem(&mut self, count: i64, value: &[u8]) -> usize {
        if count == 0 {
            let before = self.0.len();
            self.0.retain(|v| v.as_slice() != value);
            return before - self.0.len();
        }

        let limit = count.unsigned_abs() as usize;
        let mut removed = 0usize;
        if count > 0 {
            let mut kept = VecDeque::with_capacity(self.0.len());
            for item in self.0.drain(..) {
                if removed < limit && item.as_slice() == value {
                    removed += 1;
                } else {
                    kept.push_back(item);
                }
            }
            self.0 = kept;
        } else {
            let mut kept: VecDeque<Bin> = VecDeque::with_capacity(self.0.len());
            for item in self.0.drain(..).rev() {
                if removed < limit && item.as_slice() == value {
                    removed += 1;
                } else {
                    kept.push_front(item);
                }
            }
            self.0 = kept;
        }
        removed
    }
}

/// Unordered collection of unique byte strings.
#[derive(Debug, Clone, Default)]
pub struct SetValue(pub HashSet<Bin>);

impl SetValue {
    pub fn cardinality(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.0.contains(member)
    }

    /// Returns the count of genuinely-new members inserted.
    pub fn add(&mut self, members: impl IntoIterator<Item = Bin>) -> usize {
        let mut added = 0;
        for m in members {
            if self.0.insert(m) {
                added += 1;
            }
        }
        added
    }

    pub fn remove(&mut self, members: &[Bin]) -> usize {
        members.iter().filter(|m| self.0.remove(*m)).count()
    }

    /// SRANDMEMBER: positive count samples distinct members (capped at
    /// cardinality); negative count samples with replacement.
    pub fn random(&self, count: i64) -> Vec<Bin> {
        if self.0.is_empty() {
            return Vec::new();
        }
        let members: Vec<&Bin> = self.0.iter().collect();
        let mut rng = rand::thread_rng();

        if count < 0 {
            let n = count.unsigned_abs() as usize;
            (0..n)
                .map(|_| members[rng.gen_range(0..members.len())].clone())
                .collect()
        } else {
            let n = (count as usize).min(members.len());
            let mut indices: Vec<usize> = (0..members.len()).collect();
            indices.shuffle(&mut rng);
            indices.into_iter().take(n).map(|i| members[i].clone()).collect()
        }
    }

    /// SPOP: removes and returns up to `count` random distinct members.
    pub fn pop(&mut self, count: usize) -> Vec<Bin> {
        let chosen: Vec<Bin> = {
            let mut members: Vec<&Bin> = self.0.iter().collect();
            let mut rng = rand::thread_rng();
            members.shuffle(&mut rng);
            members.into_iter().take(count).cloned().collect()
        };
        for m in &chosen {
            self.0.remove(m);
        }
        chosen
    }

    pub fn diff(base: &SetValue, rest: &[&SetValue]) -> HashSet<Bin> {
        base.0
            .iter()
            .filter(|m| !rest.iter().any(|s| s.0.contains(*m)))
            .cloned()
            .collect()
    }

    pub fn inter(sets: &[&SetValue]) -> HashSet<Bin> {
        match sets.split_first() {
            None => HashSet::new(),
            Some((first, rest)) => first
                .0
                .iter()
                .filter(|m| rest.iter().all(|s| s.0.contains(*m)))
                .cloned()
                .collect(),
        }
    }

    pub fn union(sets: &[&SetValue]) -> HashSet<Bin> {
        let mut out = HashSet::new();
        for s in sets {
            out.extend(s.0.iter().cloned());
        }
        out
    }
}

/// Mapping field -> value.
#[derive(Debug, Clone, Default)]
pub struct HashValue(pub HashMap<Bin, Bin>);

impl HashValue {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// HSET: returns the number of fields that were newly created.
    pub fn set(&mut self, pairs: impl IntoIterator<Item = (Bin, Bin)>) -> usize {
        let mut created = 0;
        for (f, v) in pairs {
            if self.0.insert(f, v).is_none() {
                created += 1;
            }
        }
        created
    }

    /// HSETNX: sets only if the field is absent. Returns true if set.
    pub fn setnx(&mut self, field: Bin, value: Bin) -> bool {
        if self.0.contains_key(&field) {
            false
        } else {
            self.0.insert(field, value);
            true
        }
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bin> {
        self.0.get(field)
    }

    pub fn del(&mut self, fields: &[Bin]) -> usize {
        fields.iter().filter(|f| self.0.remove(*f).is_some()).count()
    }

    pub fn strlen(&self, field: &[u8]) -> usize {
        self.0.get(field).map(|v| v.len()).unwrap_or(0)
    }

    /// HINCRBY: creates the field at 0 if absent.
    pub fn incr_by(&mut self, field: &[u8], delta: i64) -> HkvResult<i64> {
        let current = match self.0.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| HkvError::bad_options("hash value is not an integer"))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| HkvError::bad_options("increment or decrement would overflow"))?;
        self.0.insert(field.to_vec(), next.to_string().into_bytes());
        Ok(next)
    }

    pub fn incr_by_float(&mut self, field: &[u8], delta: f64) -> HkvResult<f64> {
        let current = match self.0.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| HkvError::bad_options("hash value is not a float"))?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(HkvError::NonFiniteResult);
        }
        self.0
            .insert(field.to_vec(), rkv_common::resp::format_double(next).into_bytes());
        Ok(next)
    }

    pub fn random_fields(&self, count: i64, with_values: bool) -> Vec<Bin> {
        if self.0.is_empty() {
            return Vec::new();
        }
        let fields: Vec<(&Bin, &Bin)> = self.0.iter().collect();
        let mut rng = rand::thread_rng();
        let mut out = Vec::new();

        if count < 0 {
            let n = count.unsigned_abs() as usize;
            for _ in 0..n {
                let (f, v) = fields[rng.gen_range(0..fields.len())];
                out.push(f.clone());
                if with_values {
                    out.push(v.clone());
                }
            }
        } else {
            let n = (count as usize).min(fields.len());
            let mut indices: Vec<usize> = (0..fields.len()).collect();
            indices.shuffle(&mut rng);
            for i in indices.into_iter().take(n) {
                let (f, v) = fields[i];
                out.push(f.clone());
                if with_values {
                    out.push(v.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_getrange_handles_negative_indices() {
        let s = StringValue::new(b"Hello World".to_vec());
        assert_eq!(s.getrange(0, -1), b"Hello World".to_vec());
        assert_eq!(s.getrange(-5, -1), b"World".to_vec());
        assert_eq!(s.getrange(0, 4), b"Hello".to_vec());
    }

    #[test]
    fn string_setrange_pads_with_zeros() {
        let mut s = StringValue::new(b"Hello".to_vec());
        s.setrange(6, b"World");
        assert_eq!(&s.0, b"Hello\0World");
    }

    #[test]
    fn list_lrem_positive_and_negative() {
        let mut l = ListValue::default();
        l.rpush(vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"a".to_vec()]);
        assert_eq!(l.lrem(2, b"a"), 2);
        assert_eq!(l.lrange(0, -1), vec![b"b".to_vec(), b"a".to_vec()]);

        let mut l = ListValue::default();
        l.rpush(vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"a".to_vec()]);
        assert_eq!(l.lrem(-1, b"a"), 1);
        assert_eq!(
            l.lrange(0, -1),
            vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
    }

    #[test]
    fn list_ltrim_keeps_range() {
        let mut l = ListValue::default();
        l.rpush((0..5).map(|i| i.to_string().into_bytes()));
        l.ltrim(1, 3);
        assert_eq!(
            l.lrange(0, -1),
            vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]
        );
    }

    #[test]
    fn set_diff_inter_union() {
        let mut a = SetValue::default();
        a.add(vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]);
        let mut b = SetValue::default();
        b.add(vec![b"y".to_vec()]);

        let diff = SetValue::diff(&a, &[&b]);
        assert_eq!(diff, vec![b"x".to_vec(), b"z".to_vec()].into_iter().collect());

        let inter = SetValue::inter(&[&a, &b]);
        assert_eq!(inter, vec![b"y".to_vec()].into_iter().collect());

        let union = SetValue::union(&[&a, &b]);
        assert_eq!(union, a.0.clone());
    }

    #[test]
    fn hash_incr_by_creates_field() {
        let mut h = HashValue::default();
        assert_eq!(h.incr_by(b"count", 5).unwrap(), 5);
        assert_eq!(h.incr_by(b"count", -2).unwrap(), 3);
    }

    #[test]
    fn hash_incr_by_float_rejects_non_finite() {
        let mut h = HashValue::default();
        h.set(vec![(b"f".to_vec(), b"inf".to_vec())]);
        assert!(matches!(
            h.incr_by_float(b"f", f64::NEG_INFINITY),
            Err(HkvError::NonFiniteResult)
        ));
    }
}
