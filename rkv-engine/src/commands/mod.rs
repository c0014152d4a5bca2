//! # Command Handlers
//!
//! Purpose: translate a decoded RESP argument vector into a keyspace
//! operation and a `Reply`, one module per container type. The dispatcher
//! (`crate::dispatcher`) owns command lookup, arity/ACL checking, and
//! write serialization; everything here assumes that's already done and
//! just does the work.

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod sets;
pub mod strings;
pub mod zsets;

use rkv_common::{HkvError, HkvResult};

use crate::clock::now_ms;
use crate::keyspace::Keyspace;
use crate::value::Value;

pub fn parse_i64(arg: &[u8]) -> HkvResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| HkvError::bad_options("value is not an integer or out of range"))
}

pub fn parse_f64(arg: &[u8]) -> HkvResult<f64> {
    match arg {
        b"+inf" | b"inf" => Ok(f64::INFINITY),
        b"-inf" => Ok(f64::NEG_INFINITY),
        _ => std::str::from_utf8(arg)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| HkvError::bad_options("value is not a valid float")),
    }
}

pub fn parse_usize(arg: &[u8]) -> HkvResult<usize> {
    let v = parse_i64(arg)?;
    if v < 0 {
        return Err(HkvError::bad_options("value is out of range, must be positive"));
    }
    Ok(v as usize)
}

/// Reads an existing key's value under a read lock. A missing key, or one
/// found lazily-expired (and deleted on the spot), yields `None`.
pub fn read_value<T>(
    ks: &Keyspace,
    key: &[u8],
    f: impl FnOnce(&Value) -> HkvResult<T>,
) -> HkvResult<Option<T>> {
    let guard = match ks.key_rlock(key)? {
        Some(g) => g,
        None => return Ok(None),
    };
    if ks.get_expiry(&guard).map(|at| at <= now_ms()).unwrap_or(false) {
        drop(guard);
        ks.delete_key(key)?;
        return Ok(None);
    }
    match ks.get_value(&guard) {
        Some(v) => Ok(Some(f(v)?)),
        None => Ok(None),
    }
}

/// Creates the key if absent and mutates its typed value in place. `f`
/// receives the current `Option<Value>` (`None` for a brand-new key) and
/// must leave `*slot` holding the new contents, or `None` to request the
/// key be deleted outright (e.g. the container became empty). Whatever
/// `f` returns is this function's return value.
pub fn with_write<T>(
    ks: &Keyspace,
    key: &[u8],
    f: impl FnOnce(&mut Option<Value>) -> HkvResult<T>,
) -> HkvResult<T> {
    let mut guard = ks.create_key_and_lock(key)?;
    let mut slot = guard.value.take();
    let result = f(&mut slot)?;

    let delete_after = match &slot {
        None => true,
        Some(Value::List(l)) => l.is_empty(),
        Some(Value::Set(s)) => s.cardinality() == 0,
        Some(Value::Hash(h)) => h.is_empty(),
        Some(Value::ZSet(z)) => z.is_empty(),
        Some(Value::Str(_)) => false,
    };

    if delete_after {
        drop(guard);
        ks.delete_key(key)?;
    } else {
        ks.set_value(key, &mut guard, slot.unwrap())?;
        drop(guard);
    }
    ks.adjust_memory_usage();
    Ok(result)
}
