//! Set commands: membership, the diff/inter/union family (direct and
//! store-to-key variants), and random sampling.

use rkv_common::{HkvError, HkvResult, Reply};

use super::{read_value, with_write};
use crate::keyspace::Keyspace;
use crate::value::{SetValue, Value};

fn reply_of_bins(items: impl IntoIterator<Item = Vec<u8>>) -> Reply {
    Reply::Array(Some(items.into_iter().map(Reply::bulk).collect()))
}

/// Reads every key as a `SetValue`, treating a missing key as empty and
/// erroring `WrongType` on a type mismatch. Used by SINTER/SUNION (and
/// their STORE variants), where any non-set key anywhere in `keys` is an
/// error.
fn load_sets(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Vec<SetValue>> {
    keys.iter()
        .map(|k| Ok(read_value(ks, k, |v| Ok(v.as_set()?.clone()))?.unwrap_or_default()))
        .collect()
}

/// Reads `keys` for SDIFF/SDIFFSTORE: the base key (`keys[0]`) errors on a
/// type mismatch same as `load_sets`, but every `rest` key is read
/// leniently, treating a non-set key as an empty set instead of erroring.
fn load_sets_for_diff(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Vec<SetValue>> {
    let mut out = Vec::with_capacity(keys.len());
    out.push(read_value(ks, &keys[0], |v| Ok(v.as_set()?.clone()))?.unwrap_or_default());
    for key in &keys[1..] {
        let set = read_value(ks, key, |v| match v.as_set() {
            Ok(s) => Ok(Some(s.clone())),
            Err(HkvError::WrongType) => Ok(None),
            Err(e) => Err(e),
        })?
        .flatten()
        .unwrap_or_default();
        out.push(set);
    }
    Ok(out)
}

pub fn sadd(ks: &Keyspace, key: &[u8], members: Vec<Vec<u8>>) -> HkvResult<Reply> {
    let added = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Set(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Set(SetValue::default()));
                slot.as_mut().unwrap().as_set_mut()?
            }
        };
        Ok(s.add(members))
    })?;
    Ok(Reply::Integer(added as i64))
}

pub fn srem(ks: &Keyspace, key: &[u8], members: Vec<Vec<u8>>) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let removed = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Set(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(0),
        };
        Ok(s.remove(&members))
    })?;
    Ok(Reply::Integer(removed as i64))
}

pub fn scard(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let n = read_value(ks, key, |v| Ok(v.as_set()?.cardinality()))?.unwrap_or(0);
    Ok(Reply::Integer(n as i64))
}

pub fn smembers(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let members = read_value(ks, key, |v| Ok(v.as_set()?.0.iter().cloned().collect::<Vec<_>>()))?.unwrap_or_default();
    Ok(reply_of_bins(members))
}

pub fn sismember(ks: &Keyspace, key: &[u8], member: &[u8]) -> HkvResult<Reply> {
    let is_member = read_value(ks, key, |v| Ok(v.as_set()?.contains(member)))?.unwrap_or(false);
    Ok(Reply::Integer(is_member as i64))
}

pub fn smismember(ks: &Keyspace, key: &[u8], members: &[Vec<u8>]) -> HkvResult<Reply> {
    let set = read_value(ks, key, |v| Ok(v.as_set()?.clone()))?;
    let flags: Vec<Reply> = members
        .iter()
        .map(|m| Reply::Integer(set.as_ref().map(|s| s.contains(m)).unwrap_or(false) as i64))
        .collect();
    Ok(Reply::Array(Some(flags)))
}

pub fn smove(ks: &Keyspace, source: &[u8], destination: &[u8], member: Vec<u8>) -> HkvResult<Reply> {
    let removed = {
        let mut guard = match ks.key_lock(source)? {
            Some(g) => g,
            None => return Ok(Reply::Integer(0)),
        };
        let s = guard
            .value
            .as_mut()
            .ok_or(HkvError::WrongType)?
            .as_set_mut()?;
        s.remove(std::slice::from_ref(&member)) == 1
    };
    if !removed {
        return Ok(Reply::Integer(0));
    }
    if ks
        .key_rlock(source)?
        .map(|g| matches!(g.value.as_ref(), Some(Value::Set(s)) if s.cardinality() == 0))
        .unwrap_or(false)
    {
        ks.delete_key(source)?;
    }
    with_write(ks, destination, |slot| {
        let s = match slot {
            Some(Value::Set(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Set(SetValue::default()));
                slot.as_mut().unwrap().as_set_mut()?
            }
        };
        s.add(std::iter::once(member));
        Ok(())
    })?;
    Ok(Reply::Integer(1))
}

pub fn spop(ks: &Keyspace, key: &[u8], count: Option<usize>) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(match count {
            Some(_) => reply_of_bins(Vec::new()),
            None => Reply::nil(),
        });
    }
    let popped = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Set(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(Vec::new()),
        };
        Ok(s.pop(count.unwrap_or(1)))
    })?;
    match count {
        Some(_) => Ok(reply_of_bins(popped)),
        None => Ok(popped.into_iter().next().map(Reply::bulk).unwrap_or_else(Reply::nil)),
    }
}

pub fn srandmember(ks: &Keyspace, key: &[u8], count: Option<i64>) -> HkvResult<Reply> {
    match count {
        None => {
            let one = read_value(ks, key, |v| Ok(v.as_set()?.random(1).into_iter().next()))?.flatten();
            Ok(one.map(Reply::bulk).unwrap_or_else(Reply::nil))
        }
        Some(n) => {
            let members = read_value(ks, key, |v| Ok(v.as_set()?.random(n)))?.unwrap_or_default();
            Ok(reply_of_bins(members))
        }
    }
}

pub fn sdiff(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Reply> {
    if !ks.key_exists(&keys[0])? {
        return Err(HkvError::BaseSetMissing);
    }
    let sets = load_sets_for_diff(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    let (base, rest) = refs.split_first().unwrap();
    let result = SetValue::diff(base, rest);
    Ok(reply_of_bins(result))
}

pub fn sdiffstore(ks: &Keyspace, destination: &[u8], keys: &[Vec<u8>]) -> HkvResult<Reply> {
    if !ks.key_exists(&keys[0])? {
        return Err(HkvError::BaseSetMissing);
    }
    let sets = load_sets_for_diff(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    let (base, rest) = refs.split_first().unwrap();
    let result = SetValue::diff(base, rest);
    store_set(ks, destination, result)
}

pub fn sinter(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let sets = load_sets(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    Ok(reply_of_bins(SetValue::inter(&refs)))
}

pub fn sinterstore(ks: &Keyspace, destination: &[u8], keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let sets = load_sets(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    store_set(ks, destination, SetValue::inter(&refs))
}

pub fn sintercard(ks: &Keyspace, keys: &[Vec<u8>], limit: Option<usize>) -> HkvResult<Reply> {
    let sets = load_sets(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    let result = SetValue::inter(&refs);
    let n = match limit {
        Some(l) if l > 0 => result.len().min(l),
        _ => result.len(),
    };
    Ok(Reply::Integer(n as i64))
}

pub fn sunion(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let sets = load_sets(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    Ok(reply_of_bins(SetValue::union(&refs)))
}

pub fn sunionstore(ks: &Keyspace, destination: &[u8], keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let sets = load_sets(ks, keys)?;
    let refs: Vec<&SetValue> = sets.iter().collect();
    store_set(ks, destination, SetValue::union(&refs))
}

fn store_set(ks: &Keyspace, destination: &[u8], result: std::collections::HashSet<Vec<u8>>) -> HkvResult<Reply> {
    let len = result.len();
    if len == 0 {
        ks.delete_key(destination)?;
        return Ok(Reply::Integer(0));
    }
    let mut guard = ks.create_key_and_lock(destination)?;
    ks.set_value(destination, &mut guard, Value::Set(SetValue(result)))?;
    drop(guard);
    ks.adjust_memory_usage();
    Ok(Reply::Integer(len as i64))
}

#[cfg(test)]
mod tests {
    use rkv_common::config::EvictionPolicy;

    use super::*;
    use crate::keyspace::{Keyspace, DEFAULT_LOCK_TIMEOUT};

    fn ks() -> Keyspace {
        Keyspace::new(0, EvictionPolicy::NoEviction, DEFAULT_LOCK_TIMEOUT)
    }

    #[test]
    fn sadd_dedupes_and_reports_new_count() {
        let ks = ks();
        assert_eq!(sadd(&ks, b"s", vec![b"a".to_vec(), b"a".to_vec(), b"b".to_vec()]).unwrap(), Reply::Integer(2));
        assert_eq!(scard(&ks, b"s").unwrap(), Reply::Integer(2));
        assert_eq!(sismember(&ks, b"s", b"a").unwrap(), Reply::Integer(1));
        assert_eq!(sismember(&ks, b"s", b"z").unwrap(), Reply::Integer(0));
    }

    #[test]
    fn srem_removes_existing_members_only() {
        let ks = ks();
        sadd(&ks, b"s", vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
        assert_eq!(srem(&ks, b"s", vec![b"a".to_vec(), b"missing".to_vec()]).unwrap(), Reply::Integer(1));
        assert_eq!(scard(&ks, b"s").unwrap(), Reply::Integer(1));
    }

    #[test]
    fn sinterstore_keeps_only_common_members() {
        let ks = ks();
        sadd(&ks, b"a", vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]).unwrap();
        sadd(&ks, b"b", vec![b"y".to_vec(), b"z".to_vec(), b"w".to_vec()]).unwrap();
        let count = sinterstore(&ks, b"dst", &[b"a".to_vec(), b"b".to_vec()]).unwrap();
        assert_eq!(count, Reply::Integer(2));
        assert_eq!(sismember(&ks, b"dst", b"y").unwrap(), Reply::Integer(1));
        assert_eq!(sismember(&ks, b"dst", b"x").unwrap(), Reply::Integer(0));
    }

    #[test]
    fn sdiffstore_with_empty_result_deletes_destination() {
        let ks = ks();
        sadd(&ks, b"dst", vec![b"stale".to_vec()]).unwrap();
        sadd(&ks, b"a", vec![b"x".to_vec()]).unwrap();
        sadd(&ks, b"b", vec![b"x".to_vec()]).unwrap();
        assert_eq!(sdiffstore(&ks, b"dst", &[b"a".to_vec(), b"b".to_vec()]).unwrap(), Reply::Integer(0));
        assert_eq!(scard(&ks, b"dst").unwrap(), Reply::Integer(0));
    }

    #[test]
    fn sdiff_treats_a_non_set_rest_key_as_empty() {
        let ks = ks();
        sadd(&ks, b"a", vec![b"x".to_vec(), b"y".to_vec()]).unwrap();
        crate::commands::strings::set(&ks, b"b", b"not a set".to_vec()).unwrap();
        let reply = sdiff(&ks, &[b"a".to_vec(), b"b".to_vec()]).unwrap();
        let Reply::Array(Some(items)) = reply else { panic!("expected array reply") };
        let mut members: Vec<Vec<u8>> = items
            .into_iter()
            .map(|r| match r {
                Reply::Bulk(Some(b)) => b,
                _ => panic!("expected bulk entries"),
            })
            .collect();
        members.sort();
        assert_eq!(members, vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[test]
    fn sdiff_errors_when_the_base_key_is_not_a_set() {
        let ks = ks();
        crate::commands::strings::set(&ks, b"a", b"not a set".to_vec()).unwrap();
        sadd(&ks, b"b", vec![b"x".to_vec()]).unwrap();
        assert!(sdiff(&ks, &[b"a".to_vec(), b"b".to_vec()]).is_err());
    }
}
