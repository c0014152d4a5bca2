//! Hash commands: field get/set/del, bulk reads, and the counter family.

use rkv_common::{resp::format_double, HkvError, HkvResult, Reply};

use super::{read_value, with_write};
use crate::keyspace::Keyspace;
use crate::value::{HashValue, Value};

fn reply_of_bins(items: Vec<Vec<u8>>) -> Reply {
    Reply::Array(Some(items.into_iter().map(Reply::bulk).collect()))
}

/// HSET key field value [field value ...]. Returns the count of fields
/// newly created (not overwritten).
pub fn hset(ks: &Keyspace, key: &[u8], pairs: Vec<(Vec<u8>, Vec<u8>)>) -> HkvResult<Reply> {
    let created = with_write(ks, key, |slot| {
        let h = match slot {
            Some(Value::Hash(h)) => h,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Hash(HashValue::default()));
                slot.as_mut().unwrap().as_hash_mut()?
            }
        };
        Ok(h.set(pairs))
    })?;
    Ok(Reply::Integer(created as i64))
}

pub fn hsetnx(ks: &Keyspace, key: &[u8], field: Vec<u8>, value: Vec<u8>) -> HkvResult<Reply> {
    let set = with_write(ks, key, |slot| {
        let h = match slot {
            Some(Value::Hash(h)) => h,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Hash(HashValue::default()));
                slot.as_mut().unwrap().as_hash_mut()?
            }
        };
        Ok(h.setnx(field, value))
    })?;
    Ok(Reply::Integer(set as i64))
}

pub fn hget(ks: &Keyspace, key: &[u8], field: &[u8]) -> HkvResult<Reply> {
    let found = read_value(ks, key, |v| Ok(v.as_hash()?.get(field).cloned()))?.flatten();
    Ok(found.map(Reply::bulk).unwrap_or_else(Reply::nil))
}

pub fn hmget(ks: &Keyspace, key: &[u8], fields: &[Vec<u8>]) -> HkvResult<Reply> {
    let values = read_value(ks, key, |v| {
        let h = v.as_hash()?;
        Ok(fields.iter().map(|f| h.get(f).cloned()).collect::<Vec<_>>())
    })?
    .unwrap_or_else(|| vec![None; fields.len()]);
    Ok(Reply::Array(Some(
        values.into_iter().map(|v| v.map(Reply::bulk).unwrap_or_else(Reply::nil)).collect(),
    )))
}

pub fn hdel(ks: &Keyspace, key: &[u8], fields: &[Vec<u8>]) -> HkvResult<Reply> {
    if !ks.key_exists(key)? {
        return Ok(Reply::Integer(0));
    }
    let removed = with_write(ks, key, |slot| {
        let h = match slot {
            Some(Value::Hash(h)) => h,
            Some(_) => return Err(HkvError::WrongType),
            None => return Ok(0),
        };
        Ok(h.del(fields))
    })?;
    Ok(Reply::Integer(removed as i64))
}

pub fn hgetall(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let pairs = read_value(ks, key, |v| {
        Ok(v.as_hash()?.0.iter().flat_map(|(f, val)| [f.clone(), val.clone()]).collect::<Vec<_>>())
    })?
    .unwrap_or_default();
    Ok(reply_of_bins(pairs))
}

pub fn hkeys(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let keys = read_value(ks, key, |v| Ok(v.as_hash()?.0.keys().cloned().collect::<Vec<_>>()))?.unwrap_or_default();
    Ok(reply_of_bins(keys))
}

pub fn hvals(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let vals = read_value(ks, key, |v| Ok(v.as_hash()?.0.values().cloned().collect::<Vec<_>>()))?.unwrap_or_default();
    Ok(reply_of_bins(vals))
}

pub fn hlen(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let len = read_value(ks, key, |v| Ok(v.as_hash()?.len()))?.unwrap_or(0);
    Ok(Reply::Integer(len as i64))
}

pub fn hexists(ks: &Keyspace, key: &[u8], field: &[u8]) -> HkvResult<Reply> {
    let exists = read_value(ks, key, |v| Ok(v.as_hash()?.get(field).is_some()))?.unwrap_or(false);
    Ok(Reply::Integer(exists as i64))
}

pub fn hstrlen(ks: &Keyspace, key: &[u8], field: &[u8]) -> HkvResult<Reply> {
    let len = read_value(ks, key, |v| Ok(v.as_hash()?.strlen(field)))?.unwrap_or(0);
    Ok(Reply::Integer(len as i64))
}

pub fn hincrby(ks: &Keyspace, key: &[u8], field: &[u8], delta: i64) -> HkvResult<Reply> {
    let next = with_write(ks, key, |slot| {
        let h = match slot {
            Some(Value::Hash(h)) => h,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Hash(HashValue::default()));
                slot.as_mut().unwrap().as_hash_mut()?
            }
        };
        h.incr_by(field, delta)
    })?;
    Ok(Reply::Integer(next))
}

pub fn hincrbyfloat(ks: &Keyspace, key: &[u8], field: &[u8], delta: f64) -> HkvResult<Reply> {
    let next = with_write(ks, key, |slot| {
        let h = match slot {
            Some(Value::Hash(h)) => h,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Hash(HashValue::default()));
                slot.as_mut().unwrap().as_hash_mut()?
            }
        };
        h.incr_by_float(field, delta)
    })?;
    Ok(Reply::bulk(format_double(next)))
}

pub fn hrandfield(ks: &Keyspace, key: &[u8], count: Option<i64>, with_values: bool) -> HkvResult<Reply> {
    match count {
        None => {
            let field = read_value(ks, key, |v| {
                Ok(v.as_hash()?.random_fields(1, false).into_iter().next())
            })?
            .flatten();
            Ok(field.map(Reply::bulk).unwrap_or_else(Reply::nil))
        }
        Some(n) => {
            let fields = read_value(ks, key, |v| Ok(v.as_hash()?.random_fields(n, with_values)))?.unwrap_or_default();
            Ok(reply_of_bins(fields))
        }
    }
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
    fn hset_reports_only_newly_created_fields() {
        let ks = ks();
        assert_eq!(hset(&ks, b"h", vec![(b"f1".to_vec(), b"v1".to_vec())]).unwrap(), Reply::Integer(1));
        assert_eq!(hset(&ks, b"h", vec![(b"f1".to_vec(), b"v2".to_vec())]).unwrap(), Reply::Integer(0));
        assert_eq!(hget(&ks, b"h", b"f1").unwrap(), Reply::bulk(b"v2".to_vec()));
    }

    #[test]
    fn hsetnx_only_sets_absent_fields() {
        let ks = ks();
        assert_eq!(hsetnx(&ks, b"h", b"f".to_vec(), b"v1".to_vec()).unwrap(), Reply::Integer(1));
        assert_eq!(hsetnx(&ks, b"h", b"f".to_vec(), b"v2".to_vec()).unwrap(), Reply::Integer(0));
        assert_eq!(hget(&ks, b"h", b"f").unwrap(), Reply::bulk(b"v1".to_vec()));
    }

    #[test]
    fn hdel_removes_fields_and_reports_count() {
        let ks = ks();
        hset(&ks, b"h", vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]).unwrap();
        assert_eq!(hdel(&ks, b"h", &[b"a".to_vec(), b"missing".to_vec()]).unwrap(), Reply::Integer(1));
        assert_eq!(hlen(&ks, b"h").unwrap(), Reply::Integer(1));
    }

    #[test]
    fn hincrby_accumulates_and_rejects_wrong_type() {
        let ks = ks();
        assert_eq!(hincrby(&ks, b"h", b"count", 5).unwrap(), Reply::Integer(5));
        assert_eq!(hincrby(&ks, b"h", b"count", -2).unwrap(), Reply::Integer(3));
        hset(&ks, b"h", vec![(b"text".to_vec(), b"abc".to_vec())]).unwrap();
        assert!(hincrby(&ks, b"h", b"text", 1).is_err());
    }
}
