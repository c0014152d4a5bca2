//! List commands: push/pop from both ends, range/index/trim/rem, and the
//! two-key LMOVE.

use rkv_common::{HkvError, HkvResult, Reply};

use super::{read_value, with_write};
use crate::keyspace::Keyspace;
use crate::value::{ListValue, Value};

fn reply_of_bins(items: Vec<Vec<u8>>) -> Reply {
    Reply::Array(Some(items.into_iter().map(Reply::bulk).collect()))
}

fn push(ks: &Keyspace, key: &[u8], values: Vec<Vec<u8>>, left: bool, require_existing: bool) -> HkvResult<Reply> {
    if require_existing && !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let len = with_write(ks, key, |slot| {
        let l = match slot {
            Some(Value::List(l)) => l,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::List(ListValue::default()));
                slot.as_mut().unwrap().as_list_mut()?
            }
        };
        Ok(if left { l.lpush(values) } else { l.rpush(values) })
    })?;
    Ok(Reply::Integer(len as i64))
}

pub fn lpush(ks: &Keyspace, key: &[u8], values: Vec<Vec<u8>>) -> HkvResult<Reply> {
    push(ks, key, values, true, false)
}

pub fn rpush(ks: &Keyspace, key: &[u8], values: Vec<Vec<u8>>) -> HkvResult<Reply> {
    push(ks, key, values, false, false)
}

pub fn lpushx(ks: &Keyspace, key: &[u8], values: Vec<Vec<u8>>) -> HkvResult<Reply> {
    push(ks, key, values, true, true)
}

pub fn rpushx(ks: &Keyspace, key: &[u8], values: Vec<Vec<u8>>) -> HkvResult<Reply> {
    push(ks, key, values, false, true)
}

fn pop(ks: &Keyspace, key: &[u8], count: Option<usize>, left: bool) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(match count {
            Some(_) => Reply::nil_array(),
            None => Reply::nil(),
        });
    }
    let popped = with_write(ks, key, |slot| {
        let l = match slot {
            Some(Value::List(l)) => l,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(Vec::new()),
        };
        let n = count.unwrap_or(1);
        Ok(if left { l.lpop(n) } else { l.rpop(n) })
    })?;

    match count {
        Some(_) => {
            if popped.is_empty() {
                Ok(Reply::nil_array())
            } else {
                Ok(reply_of_bins(popped))
            }
        }
        None => Ok(popped.into_iter().next().map(Reply::bulk).unwrap_or_else(Reply::nil)),
    }
}

pub fn lpop(ks: &Keyspace, key: &[u8], count: Option<usize>) -> HkvResult<Reply> {
    pop(ks, key, count, true)
}

pub fn rpop(ks: &Keyspace, key: &[u8], count: Option<usize>) -> HkvResult<Reply> {
    pop(ks, key, count, false)
}

pub fn llen(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let len = read_value(ks, key, |v| Ok(v.as_list()?.len()))?.unwrap_or(0);
    Ok(Reply::Integer(len as i64))
}

pub fn lrange(ks: &Keyspace, key: &[u8], start: i64, stop: i64) -> HkvResult<Reply> {
    let items = read_value(ks, key, |v| Ok(v.as_list()?.lrange(start, stop)))?.unwrap_or_default();
    Ok(reply_of_bins(items))
}

pub fn lindex(ks: &Keyspace, key: &[u8], index: i64) -> HkvResult<Reply> {
    let found = read_value(ks, key, |v| Ok(v.as_list()?.lindex(index).cloned()))?.flatten();
    Ok(found.map(Reply::bulk).unwrap_or_else(Reply::nil))
}

pub fn lset(ks: &Keyspace, key: &[u8], index: i64, value: Vec<u8>) -> HkvResult<Reply> {
    let mut guard = ks
        .key_lock(key)?
        .ok_or_else(|| HkvError::bad_options("no such key"))?;
    let l = guard
        .value
        .as_mut()
        .ok_or_else(|| HkvError::bad_options("no such key"))?
        .as_list_mut()?;
    l.lset(index, value)?;
    Ok(Reply::ok())
}

pub fn ltrim(ks: &Keyspace, key: &[u8], start: i64, stop: i64) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::ok());
    }
    with_write(ks, key, |slot| {
        let l = match slot {
            Some(Value::List(l)) => l,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(()),
        };
        l.ltrim(start, stop);
        Ok(())
    })?;
    Ok(Reply::ok())
}

pub fn lrem(ks: &Keyspace, key: &[u8], count: i64, value: &[u8]) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let removed = with_write(ks, key, |slot| {
        let l = match slot {
            Some(Value::List(l)) => l,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(0),
        };
        Ok(l.lrem(count, value))
    })?;
    Ok(Reply::Integer(removed as i64))
}

/// LMOVE source destination LEFT|RIGHT LEFT|RIGHT. Operates on two distinct
/// keys, so it takes both locks directly rather than through `with_write`.
pub fn lmove(ks: &Keyspace, source: &[u8], destination: &[u8], from_left: bool, to_left: bool) -> HkvResult<Reply> {
    let moved = {
        let mut src_guard = match ks.key_lock(source)? {
            Some(g) => g,
            None => return Ok(Reply::nil()),
        };
        let src_list = src_guard
            .value
            .as_mut()
            .ok_or_else(|| HkvError::bad_options("no such key"))?
            .as_list_mut()?;
        let item = if from_left { src_list.lpop(1) } else { src_list.rpop(1) };
        match item.into_iter().next() {
            Some(v) => v,
            None => return Ok(Reply::nil()),
        }
    };

    // Re-delete the source if emptied: `with_write`'s auto-delete only
    // applies to mutations made through it, and this function mutated the
    // source directly above.
    if ks
        .key_rlock(source)?
        .map(|g| matches!(g.value.as_ref(), Some(Value::List(l)) if l.is_empty()))
        .unwrap_or(false)
    {
        ks.delete_key(source)?;
    }

    with_write(ks, destination, |slot| {
        let l = match slot {
            Some(Value::List(l)) => l,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::List(ListValue::default()));
                slot.as_mut().unwrap().as_list_mut()?
            }
        };
        if to_left {
            l.lpush(std::iter::once(moved.clone()));
        } else {
            l.rpush(std::iter::once(moved.clone()));
        }
        Ok(())
    })?;

    Ok(Reply::bulk(moved))
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
    fn lpush_rpush_build_expected_order() {
        let ks = ks();
        lpush(&ks, b"l", vec![b"b".to_vec(), b"a".to_vec()]).unwrap();
        rpush(&ks, b"l", vec![b"c".to_vec()]).unwrap();
        assert_eq!(
            lrange(&ks, b"l", 0, -1).unwrap(),
            reply_of_bins(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        );
    }

    #[test]
    fn lpushx_is_noop_on_missing_key() {
        let ks = ks();
        assert_eq!(lpushx(&ks, b"l", vec![b"x".to_vec()]).unwrap(), Reply::Integer(0));
        assert_eq!(llen(&ks, b"l").unwrap(), Reply::Integer(0));
    }

    #[test]
    fn lpop_removes_from_the_front() {
        let ks = ks();
        rpush(&ks, b"l", vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]).unwrap();
        assert_eq!(lpop(&ks, b"l", None).unwrap(), Reply::bulk(b"a".to_vec()));
        assert_eq!(llen(&ks, b"l").unwrap(), Reply::Integer(2));
    }

    #[test]
    fn lmove_moves_between_keys_and_deletes_emptied_source() {
        let ks = ks();
        rpush(&ks, b"src", vec![b"only".to_vec()]).unwrap();
        let moved = lmove(&ks, b"src", b"dst", true, true).unwrap();
        assert_eq!(moved, Reply::bulk(b"only".to_vec()));
        assert_eq!(llen(&ks, b"src").unwrap(), Reply::Integer(0));
        assert_eq!(llen(&ks, b"dst").unwrap(), Reply::Integer(1));
    }

    #[test]
    fn lrem_counts_from_the_given_direction() {
        let ks = ks();
        rpush(&ks, b"l", vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"a".to_vec()]).unwrap();
        assert_eq!(lrem(&ks, b"l", 2, b"a").unwrap(), Reply::Integer(2));
        assert_eq!(
            lrange(&ks, b"l", 0, -1).unwrap(),
            reply_of_bins(vec![b"b".to_vec(), b"a".to_vec()])
        );
    }
}
