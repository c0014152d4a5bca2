//! String commands: GET/SET and the append/range/counter family.

use rkv_common::{resp::format_double, HkvError, HkvResult, Reply};

use super::{parse_f64, parse_i64, read_value, with_write};
use crate::keyspace::Keyspace;
use crate::value::{StringValue, Value};

pub fn get(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let found = read_value(ks, key, |v| Ok(v.as_string()?.0.clone()))?;
    Ok(match found {
        Some(data) => Reply::bulk(data),
        None => Reply::nil(),
    })
}

/// SET key value. Clears any existing TTL, matching a bare `SET` with no
/// `KEEPTTL` option.
pub fn set(ks: &Keyspace, key: &[u8], value: Vec<u8>) -> HkvResult<Reply> {
    let mut guard = ks.create_key_and_lock(key)?;
    ks.set_value(key, &mut guard, Value::Str(StringValue::new(value)))?;
    ks.remove_expiry(key, &mut guard);
    drop(guard);
    ks.adjust_memory_usage();
    Ok(Reply::ok())
}

/// GETSET key value: SET that returns the prior value.
pub fn getset(ks: &Keyspace, key: &[u8], value: Vec<u8>) -> HkvResult<Reply> {
    let mut guard = ks.create_key_and_lock(key)?;
    let prior = match guard.value.as_ref() {
        Some(v) => Some(v.as_string()?.0.clone()),
        None => None,
    };
    ks.set_value(key, &mut guard, Value::Str(StringValue::new(value)))?;
    ks.remove_expiry(key, &mut guard);
    drop(guard);
    ks.adjust_memory_usage();
    Ok(match prior {
        Some(data) => Reply::bulk(data),
        None => Reply::nil(),
    })
}

pub fn append(ks: &Keyspace, key: &[u8], data: &[u8]) -> HkvResult<Reply> {
    let len = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Str(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Str(StringValue::default()));
                slot.as_mut().unwrap().as_string_mut()?
            }
        };
        Ok(s.append(data))
    })?;
    Ok(Reply::Integer(len as i64))
}

pub fn strlen(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let len = read_value(ks, key, |v| Ok(v.as_string()?.strlen()))?.unwrap_or(0);
    Ok(Reply::Integer(len as i64))
}

pub fn getrange(ks: &Keyspace, key: &[u8], start: i64, end: i64) -> HkvResult<Reply> {
    let out = read_value(ks, key, |v| Ok(v.as_string()?.getrange(start, end)))?.unwrap_or_default();
    Ok(Reply::bulk(out))
}

pub fn setrange(ks: &Keyspace, key: &[u8], offset: i64, data: &[u8]) -> HkvResult<Reply> {
    if offset < 0 {
        return Err(HkvError::bad_options("offset is out of range"));
    }
    let len = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Str(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Str(StringValue::default()));
                slot.as_mut().unwrap().as_string_mut()?
            }
        };
        Ok(s.setrange(offset as usize, data))
    })?;
    Ok(Reply::Integer(len as i64))
}

fn incr_decr(ks: &Keyspace, key: &[u8], delta: i64) -> HkvResult<Reply> {
    let next = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Str(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Str(StringValue::default()));
                slot.as_mut().unwrap().as_string_mut()?
            }
        };
        let current = s.parse_i64()?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| HkvError::bad_options("increment or decrement would overflow"))?;
        s.0 = next.to_string().into_bytes();
        Ok(next)
    })?;
    Ok(Reply::Integer(next))
}

pub fn incr(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    incr_decr(ks, key, 1)
}

pub fn decr(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    incr_decr(ks, key, -1)
}

pub fn incrby(ks: &Keyspace, key: &[u8], arg: &[u8]) -> HkvResult<Reply> {
    incr_decr(ks, key, parse_i64(arg)?)
}

pub fn decrby(ks: &Keyspace, key: &[u8], arg: &[u8]) -> HkvResult<Reply> {
    let delta = parse_i64(arg)?;
    let negated = delta
        .checked_neg()
        .ok_or_else(|| HkvError::bad_options("increment or decrement would overflow"))?;
    incr_decr(ks, key, negated)
}

pub fn incrbyfloat(ks: &Keyspace, key: &[u8], arg: &[u8]) -> HkvResult<Reply> {
    let delta = parse_f64(arg)?;
    let next = with_write(ks, key, |slot| {
        let s = match slot {
            Some(Value::Str(s)) => s,
            Some(_) => return Err(HkvError::WrongType),
            None => {
                *slot = Some(Value::Str(StringValue::default()));
                slot.as_mut().unwrap().as_string_mut()?
            }
        };
        let current = s.parse_f64()?;
        let next = current + delta;
        if !next.is_finite() {
            return Err(HkvError::NonFiniteResult);
        }
        s.0 = format_double(next).into_bytes();
        Ok(next)
    })?;
    Ok(Reply::bulk(format_double(next)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rkv_common::config::EvictionPolicy;

    use super::*;
    use crate::keyspace::{Keyspace, DEFAULT_LOCK_TIMEOUT};

    fn ks() -> Keyspace {
        Keyspace::new(0, EvictionPolicy::NoEviction, DEFAULT_LOCK_TIMEOUT)
    }

    #[test]
    fn get_on_missing_key_is_nil() {
        let ks = ks();
        assert_eq!(get(&ks, b"missing").unwrap(), Reply::nil());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let ks = ks();
        assert_eq!(set(&ks, b"k", b"v".to_vec()).unwrap(), Reply::ok());
        assert_eq!(get(&ks, b"k").unwrap(), Reply::bulk(b"v".to_vec()));
    }

    #[test]
    fn getset_returns_prior_value() {
        let ks = ks();
        set(&ks, b"k", b"old".to_vec()).unwrap();
        assert_eq!(getset(&ks, b"k", b"new".to_vec()).unwrap(), Reply::bulk(b"old".to_vec()));
        assert_eq!(get(&ks, b"k").unwrap(), Reply::bulk(b"new".to_vec()));
    }

    #[test]
    fn append_creates_key_when_missing() {
        let ks = ks();
        assert_eq!(append(&ks, b"k", b"ab").unwrap(), Reply::Integer(2));
        assert_eq!(append(&ks, b"k", b"cd").unwrap(), Reply::Integer(4));
        assert_eq!(get(&ks, b"k").unwrap(), Reply::bulk(b"abcd".to_vec()));
    }

    #[test]
    fn set_clears_existing_ttl() {
        let ks = ks();
        set(&ks, b"k", b"v".to_vec()).unwrap();
        let mut guard = ks.create_key_and_lock(b"k").unwrap();
        ks.set_expiry(b"k", &mut guard, crate::clock::now_ms() + Duration::from_secs(60).as_millis() as i64, true);
        drop(guard);
        set(&ks, b"k", b"v2".to_vec()).unwrap();
        assert_eq!(crate::commands::keys::ttl(&ks, b"k", false).unwrap(), Reply::Integer(-1));
    }
}
