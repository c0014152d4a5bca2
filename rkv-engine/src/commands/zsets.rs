//! Sorted-set commands: ZADD's full flag matrix, range selection by score,
//! rank, and lex, and the multi-key algebra family.

use rkv_common::{resp::format_double, HkvError, HkvResult, Reply};

use super::{read_value, with_write};
use crate::keyspace::Keyspace;
use crate::sorted_set::{Aggregate, RangeBound, SortedSetValue, ZaddFlags};
use crate::value::Value;

fn reply_of_bins(items: impl IntoIterator<Item = Vec<u8>>) -> Reply {
    Reply::Array(Some(items.into_iter().map(Reply::bulk).collect()))
}

fn reply_of_pairs(pairs: Vec<(Vec<u8>, f64)>, with_scores: bool) -> Reply {
    if !with_scores {
        return reply_of_bins(pairs.into_iter().map(|(m, _)| m));
    }
    let mut out = Vec::with_capacity(pairs.len() * 2);
    for (m, s) in pairs {
        out.push(Reply::bulk(m));
        out.push(Reply::bulk(format_double(s)));
    }
    Reply::Array(Some(out))
}

fn load_zsets(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Vec<SortedSetValue>> {
    keys.iter()
        .map(|k| Ok(read_value(ks, k, |v| Ok(v.as_zset()?.clone()))?.unwrap_or_default()))
        .collect()
}

/// ZADD key [NX|XX] [GT|LT] [CH] [INCR] score member [score member ...].
/// Returns either the added/changed count or, under INCR, the new score (or
/// nil if the update was suppressed by a flag).
pub fn zadd(ks: &Keyspace, key: &[u8], flags: ZaddFlags, members: Vec<(f64, Vec<u8>)>) -> HkvResult<Reply> {
    let (added, changed, incr_result) = with_write(ks, key, |slot| {
        let z = match slot {
            Some(Value::ZSet(z)) => z,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::ZSet(SortedSetValue::default()));
                slot.as_mut().unwrap().as_zset_mut()?
            }
        };
        z.zadd(flags, members)
    })?;

    if flags.incr {
        return Ok(incr_result.map(|s| Reply::bulk(format_double(s))).unwrap_or_else(Reply::nil));
    }
    Ok(Reply::Integer(if flags.ch { changed } else { added }))
}

pub fn zcard(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let n = read_value(ks, key, |v| Ok(v.as_zset()?.len()))?.unwrap_or(0);
    Ok(Reply::Integer(n as i64))
}

pub fn zcount(ks: &Keyspace, key: &[u8], min: RangeBound, max: RangeBound) -> HkvResult<Reply> {
    let n = read_value(ks, key, |v| Ok(v.as_zset()?.count_by_score(min, max)))?.unwrap_or(0);
    Ok(Reply::Integer(n as i64))
}

pub fn zscore(ks: &Keyspace, key: &[u8], member: &[u8]) -> HkvResult<Reply> {
    let score = read_value(ks, key, |v| Ok(v.as_zset()?.score(member)))?.flatten();
    Ok(score.map(|s| Reply::bulk(format_double(s))).unwrap_or_else(Reply::nil))
}

pub fn zmscore(ks: &Keyspace, key: &[u8], members: &[Vec<u8>]) -> HkvResult<Reply> {
    let scores = read_value(ks, key, |v| Ok(v.as_zset()?.mscore(members)))?.unwrap_or_else(|| vec![None; members.len()]);
    Ok(Reply::Array(Some(
        scores.into_iter().map(|s| s.map(|v| Reply::bulk(format_double(v))).unwrap_or_else(Reply::nil)).collect(),
    )))
}

pub fn zincrby(ks: &Keyspace, key: &[u8], delta: f64, member: Vec<u8>) -> HkvResult<Reply> {
    let flags = ZaddFlags { incr: true, ..Default::default() };
    let (_, _, incr_result) = with_write(ks, key, |slot| {
        let z = match slot {
            Some(Value::ZSet(z)) => z,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::ZSet(SortedSetValue::default()));
                slot.as_mut().unwrap().as_zset_mut()?
            }
        };
        z.zadd(flags, vec![(delta, member)])
    })?;
    let score = incr_result.ok_or(HkvError::NonFiniteResult)?;
    Ok(Reply::bulk(format_double(score)))
}

pub fn zrank(ks: &Keyspace, key: &[u8], member: &[u8], reverse: bool, with_score: bool) -> HkvResult<Reply> {
    let found = read_value(ks, key, |v| Ok(v.as_zset()?.rank(member, reverse)))?.flatten();
    Ok(match found {
        None => {
            if with_score {
                Reply::nil_array()
            } else {
                Reply::nil()
            }
        }
        Some((rank, score)) => {
            if with_score {
                Reply::Array(Some(vec![Reply::Integer(rank as i64), Reply::bulk(format_double(score))]))
            } else {
                Reply::Integer(rank as i64)
            }
        }
    })
}

pub fn zrem(ks: &Keyspace, key: &[u8], members: Vec<Vec<u8>>) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let removed = with_write(ks, key, |slot| {
        let z = match slot {
            Some(Value::ZSet(z)) => z,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(0),
        };
        Ok(z.zrem(&members))
    })?;
    Ok(Reply::Integer(removed as i64))
}

pub fn zremrangebyscore(ks: &Keyspace, key: &[u8], min: RangeBound, max: RangeBound) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let removed = with_write(ks, key, |slot| {
        let z = match slot {
            Some(Value::ZSet(z)) => z,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(0),
        };
        Ok(z.remove_range_by_score(min, max))
    })?;
    Ok(Reply::Integer(removed as i64))
}

pub fn zremrangebyrank(ks: &Keyspace, key: &[u8], start: i64, stop: i64) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let removed = with_write(ks, key, |slot| {
        let z = match slot {
            Some(Value::ZSet(z)) => z,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(0),
        };
        Ok(z.remove_range_by_rank(start, stop))
    })?;
    Ok(Reply::Integer(removed as i64))
}

pub fn zlexcount(ks: &Keyspace, key: &[u8], min: crate::sorted_set::LexBound, max: crate::sorted_set::LexBound) -> HkvResult<Reply> {
    let n = read_value(ks, key, |v| Ok(v.as_zset()?.lexcount(&min, &max)))?.unwrap_or(0);
    Ok(Reply::Integer(n as i64))
}

pub fn zrangebylex(
    ks: &Keyspace,
    key: &[u8],
    min: crate::sorted_set::LexBound,
    max: crate::sorted_set::LexBound,
    rev: bool,
    offset: usize,
    count: Option<usize>,
) -> HkvResult<Reply> {
    let out = read_value(ks, key, |v| Ok(v.as_zset()?.range_by_lex(&min, &max, rev, offset, count)))?.unwrap_or_default();
    Ok(reply_of_bins(out))
}

pub fn zrangebyscore(
    ks: &Keyspace,
    key: &[u8],
    min: RangeBound,
    max: RangeBound,
    rev: bool,
    offset: usize,
    count: Option<usize>,
    with_scores: bool,
) -> HkvResult<Reply> {
    let out = read_value(ks, key, |v| Ok(v.as_zset()?.range_by_score(min, max, rev, offset, count)))?.unwrap_or_default();
    Ok(reply_of_pairs(out, with_scores))
}

pub fn zrange(ks: &Keyspace, key: &[u8], start: i64, stop: i64, rev: bool, with_scores: bool) -> HkvResult<Reply> {
    let out = read_value(ks, key, |v| Ok(v.as_zset()?.range_by_rank(start, stop, rev)))?.unwrap_or_default();
    Ok(reply_of_pairs(out, with_scores))
}

pub fn zrangestore(ks: &Keyspace, destination: &[u8], source: &[u8], start: i64, stop: i64, rev: bool) -> HkvResult<Reply> {
    let out = read_value(ks, source, |v| Ok(v.as_zset()?.range_by_rank(start, stop, rev)))?.unwrap_or_default();
    store_zset(ks, destination, out)
}

pub fn zpopmin(ks: &Keyspace, key: &[u8], count: usize) -> HkvResult<Reply> {
    pop_extreme(ks, key, count, false)
}

pub fn zpopmax(ks: &Keyspace, key: &[u8], count: usize) -> HkvResult<Reply> {
    pop_extreme(ks, key, count, true)
}

fn pop_extreme(ks: &Keyspace, key: &[u8], count: usize, max: bool) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(reply_of_pairs(Vec::new(), true));
    }
    let popped = with_write(ks, key, |slot| {
        let z = match slot {
            Some(Value::ZSet(z)) => z,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(Vec::new()),
        };
        Ok(z.pop_extreme(count, max))
    })?;
    Ok(reply_of_pairs(popped, true))
}

/// ZMPOP numkeys key [key ...] MIN|MAX [COUNT count]: pops from the first
/// key in the list that holds a non-empty sorted set.
pub fn zmpop(ks: &Keyspace, keys: &[Vec<u8>], count: usize, max: bool) -> HkvResult<Reply> {
    for key in keys {
        if !ks.key_exists(key)? {
            continue;
        }
        let popped = with_write(ks, key, |slot| {
            let z = match slot {
                Some(Value::ZSet(z)) => z,
                Some(_) => return Ok(None),
                None => return Ok(None),
            };
            Ok(Some(z.pop_extreme(count, max)))
        })?;
        match popped {
            Some(pairs) if !pairs.is_empty() => {
                return Ok(Reply::Array(Some(vec![Reply::bulk(key.clone()), reply_of_pairs(pairs, true)])));
            }
            _ => continue,
        }
    }
    Ok(Reply::nil_array())
}

pub fn zrandmember(ks: &Keyspace, key: &[u8], count: Option<i64>, with_scores: bool) -> HkvResult<Reply> {
    match count {
        None => {
            let one = read_value(ks, key, |v| Ok(v.as_zset()?.random(1, false).into_iter().next()))?.flatten();
            Ok(one.map(|(m, _)| Reply::bulk(m)).unwrap_or_else(Reply::nil))
        }
        Some(n) => {
            let picked = read_value(ks, key, |v| Ok(v.as_zset()?.random(n, with_scores)))?.unwrap_or_default();
            if with_scores {
                let mut out = Vec::with_capacity(picked.len() * 2);
                for (m, s) in picked {
                    out.push(Reply::bulk(m));
                    out.push(Reply::bulk(format_double(s.unwrap_or(0.0))));
                }
                Ok(Reply::Array(Some(out)))
            } else {
                Ok(reply_of_bins(picked.into_iter().map(|(m, _)| m)))
            }
        }
    }
}

pub fn zdiff(ks: &Keyspace, keys: &[Vec<u8>], with_scores: bool) -> HkvResult<Reply> {
    let sets = load_zsets(ks, keys)?;
    let refs: Vec<&SortedSetValue> = sets.iter().collect();
    let (base, rest) = refs.split_first().ok_or_else(|| HkvError::bad_options("wrong number of keys"))?;
    Ok(reply_of_pairs(base.diff(rest), with_scores))
}

pub fn zdiffstore(ks: &Keyspace, destination: &[u8], keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let sets = load_zsets(ks, keys)?;
    let refs: Vec<&SortedSetValue> = sets.iter().collect();
    let (base, rest) = refs.split_first().ok_or_else(|| HkvError::bad_options("wrong number of keys"))?;
    store_zset(ks, destination, base.diff(rest))
}

pub fn zinter(ks: &Keyspace, keys: &[Vec<u8>], weights: &[f64], agg: Aggregate, with_scores: bool) -> HkvResult<Reply> {
    let sets = load_zsets(ks, keys)?;
    let refs: Vec<&SortedSetValue> = sets.iter().collect();
    Ok(reply_of_pairs(SortedSetValue::inter(&refs, weights, agg), with_scores))
}

pub fn zinterstore(ks: &Keyspace, destination: &[u8], keys: &[Vec<u8>], weights: &[f64], agg: Aggregate) -> HkvResult<Reply> {
    let sets = load_zsets(ks, keys)?;
    let refs: Vec<&SortedSetValue> = sets.iter().collect();
    store_zset(ks, destination, SortedSetValue::inter(&refs, weights, agg))
}

pub fn zunion(ks: &Keyspace, keys: &[Vec<u8>], weights: &[f64], agg: Aggregate, with_scores: bool) -> HkvResult<Reply> {
    let sets = load_zsets(ks, keys)?;
    let refs: Vec<&SortedSetValue> = sets.iter().collect();
    Ok(reply_of_pairs(SortedSetValue::union(&refs, weights, agg), with_scores))
}

pub fn zunionstore(ks: &Keyspace, destination: &[u8], keys: &[Vec<u8>], weights: &[f64], agg: Aggregate) -> HkvResult<Reply> {
    let sets = load_zsets(ks, keys)?;
    let refs: Vec<&SortedSetValue> = sets.iter().collect();
    store_zset(ks, destination, SortedSetValue::union(&refs, weights, agg))
}

fn store_zset(ks: &Keyspace, destination: &[u8], pairs: Vec<(Vec<u8>, f64)>) -> HkvResult<Reply> {
    let len = pairs.len();
    if len == 0 {
        ks.delete_key(destination)?;
        return Ok(Reply::Integer(0));
    }
    let mut z = SortedSetValue::default();
    z.zadd(ZaddFlags::default(), pairs.into_iter().map(|(m, s)| (s, m)).collect())?;
    let mut guard = ks.create_key_and_lock(destination)?;
    ks.set_value(destination, &mut guard, Value::ZSet(z))?;
    drop(guard);
    ks.adjust_memory_usage();
    Ok(Reply::Integer(len as i64))
}

#[cfg(test)]
mod tests {
    use rkv_common::config::EvictionPolicy;

    use super::*;
    use crate::keyspace::DEFAULT_LOCK_TIMEOUT;

    fn ks() -> Keyspace {
        Keyspace::new(0, EvictionPolicy::NoEviction, DEFAULT_LOCK_TIMEOUT)
    }

    #[test]
    fn zadd_reports_added_count_by_default() {
        let ks = ks();
        let flags = ZaddFlags::default();
        assert_eq!(zadd(&ks, b"z", flags, vec![(1.0, b"a".to_vec()), (2.0, b"b".to_vec())]).unwrap(), Reply::Integer(2));
        assert_eq!(zadd(&ks, b"z", flags, vec![(9.0, b"a".to_vec())]).unwrap(), Reply::Integer(0));
        assert_eq!(zscore(&ks, b"z", b"a").unwrap(), Reply::bulk(format_double(9.0)));
    }

    #[test]
    fn zadd_ch_reports_changed_count_instead() {
        let ks = ks();
        let base = ZaddFlags::default();
        zadd(&ks, b"z", base, vec![(1.0, b"a".to_vec())]).unwrap();
        let ch = ZaddFlags { ch: true, ..Default::default() };
        assert_eq!(zadd(&ks, b"z", ch, vec![(5.0, b"a".to_vec()), (1.0, b"b".to_vec())]).unwrap(), Reply::Integer(2));
    }

    #[test]
    fn zcard_and_zscore_on_missing_key() {
        let ks = ks();
        assert_eq!(zcard(&ks, b"missing").unwrap(), Reply::Integer(0));
        assert_eq!(zscore(&ks, b"missing", b"a").unwrap(), Reply::nil());
    }

    #[test]
    fn zincrby_accumulates_score() {
        let ks = ks();
        zadd(&ks, b"z", ZaddFlags::default(), vec![(1.0, b"a".to_vec())]).unwrap();
        zincrby(&ks, b"z", 4.5, b"a".to_vec()).unwrap();
        assert_eq!(zscore(&ks, b"z", b"a").unwrap(), Reply::bulk(format_double(5.5)));
    }

    #[test]
    fn zrange_orders_by_score_ascending() {
        let ks = ks();
        zadd(
            &ks,
            b"z",
            ZaddFlags::default(),
            vec![(3.0, b"c".to_vec()), (1.0, b"a".to_vec()), (2.0, b"b".to_vec())],
        )
        .unwrap();
        assert_eq!(
            zrange(&ks, b"z", 0, -1, false, false).unwrap(),
            reply_of_bins(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        );
    }

    #[test]
    fn zunionstore_sums_scores_by_default() {
        let ks = ks();
        zadd(&ks, b"a", ZaddFlags::default(), vec![(1.0, b"x".to_vec())]).unwrap();
        zadd(&ks, b"b", ZaddFlags::default(), vec![(2.0, b"x".to_vec())]).unwrap();
        let weights = vec![1.0, 1.0];
        assert_eq!(
            zunionstore(&ks, b"dst", &[b"a".to_vec(), b"b".to_vec()], &weights, Aggregate::Sum).unwrap(),
            Reply::Integer(1)
        );
        assert_eq!(zscore(&ks, b"dst", b"x").unwrap(), Reply::bulk(format_double(3.0)));
    }
}
