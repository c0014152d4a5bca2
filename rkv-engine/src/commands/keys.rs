//! Generic key commands (EXISTS/DEL/EXPIRE/TTL/TYPE/FLUSHALL) plus the
//! connection-level PING/AUTH pair.

use rkv_common::{HkvError, HkvResult, Reply};

use crate::acl::Acl;
use crate::clock::now_ms;
use crate::keyspace::Keyspace;

pub fn exists(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let mut n = 0i64;
    for key in keys {
        if ks.key_exists(key)? {
            n += 1;
        }
    }
    Ok(Reply::Integer(n))
}

pub fn del(ks: &Keyspace, keys: &[Vec<u8>]) -> HkvResult<Reply> {
    let mut n = 0i64;
    for key in keys {
        if ks.delete_key(key)? {
            n += 1;
        }
    }
    Ok(Reply::Integer(n))
}

/// EXPIRE/PEXPIRE/EXPIREAT/PEXPIREAT share this once the dispatcher has
/// converted the TTL argument to an absolute millisecond deadline.
pub fn expire_at(ks: &Keyspace, key: &[u8], at_ms: i64) -> HkvResult<Reply> {
    let mut guard = match ks.key_lock(key)? {
        Some(g) => g,
        None => return Ok(Reply::Integer(0)),
    };
    if at_ms <= now_ms() {
        drop(guard);
        ks.delete_key(key)?;
        return Ok(Reply::Integer(1));
    }
    ks.set_expiry(key, &mut guard, at_ms, true);
    Ok(Reply::Integer(1))
}

pub fn persist(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let mut guard = match ks.key_lock(key)? {
        Some(g) => g,
        None => return Ok(Reply::Integer(0)),
    };
    if ks.get_expiry(&guard).is_none() {
        return Ok(Reply::Integer(0));
    }
    ks.remove_expiry(key, &mut guard);
    Ok(Reply::Integer(1))
}

pub fn ttl(ks: &Keyspace, key: &[u8], millis: bool) -> HkvResult<Reply> {
    let guard = match ks.key_rlock(key)? {
        Some(g) => g,
        None => return Ok(Reply::Integer(-2)),
    };
    match ks.get_expiry(&guard) {
        None => Ok(Reply::Integer(-1)),
        Some(at) => {
            let remaining = (at - now_ms()).max(0);
            Ok(Reply::Integer(if millis { remaining } else { remaining / 1000 }))
        }
    }
}

pub fn key_type(ks: &Keyspace, key: &[u8]) -> HkvResult<Reply> {
    let guard = match ks.key_rlock(key)? {
        Some(g) => g,
        None => return Ok(Reply::Simple("none".to_string())),
    };
    match ks.get_value(&guard) {
        Some(v) => Ok(Reply::Simple(v.kind().as_str().to_string())),
        None => Ok(Reply::Simple("none".to_string())),
    }
}

pub fn flushall(ks: &Keyspace) -> HkvResult<Reply> {
    ks.flush();
    Ok(Reply::ok())
}

pub fn ping(message: Option<Vec<u8>>) -> HkvResult<Reply> {
    match message {
        Some(m) => Ok(Reply::bulk(m)),
        None => Ok(Reply::Simple("PONG".to_string())),
    }
}

/// AUTH [username] password. Without a username, authenticates as
/// `default` (the ACL convention every user store seeds).
pub fn auth(acl: &Acl, username: Option<&str>, password: &[u8]) -> HkvResult<Reply> {
    let name = username.unwrap_or("default");
    let password = std::str::from_utf8(password).map_err(|_| HkvError::Unauthorized)?;
    if acl.authenticate(name, password) {
        Ok(Reply::ok())
    } else {
        Err(HkvError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use rkv_common::config::EvictionPolicy;

    use super::*;
    use crate::acl::{Password, User};
    use crate::commands::strings::set;
    use crate::keyspace::DEFAULT_LOCK_TIMEOUT;

    fn ks() -> Keyspace {
        Keyspace::new(0, EvictionPolicy::NoEviction, DEFAULT_LOCK_TIMEOUT)
    }

    #[test]
    fn exists_and_del_count_only_present_keys() {
        let ks = ks();
        set(&ks, b"a", b"1".to_vec()).unwrap();
        set(&ks, b"b", b"2".to_vec()).unwrap();
        assert_eq!(exists(&ks, &[b"a".to_vec(), b"missing".to_vec(), b"b".to_vec()]).unwrap(), Reply::Integer(2));
        assert_eq!(del(&ks, &[b"a".to_vec(), b"missing".to_vec()]).unwrap(), Reply::Integer(1));
        assert_eq!(exists(&ks, &[b"a".to_vec()]).unwrap(), Reply::Integer(0));
    }

    #[test]
    fn expire_at_in_the_past_deletes_immediately() {
        let ks = ks();
        set(&ks, b"k", b"v".to_vec()).unwrap();
        assert_eq!(expire_at(&ks, b"k", now_ms() - 1000).unwrap(), Reply::Integer(1));
        assert_eq!(exists(&ks, &[b"k".to_vec()]).unwrap(), Reply::Integer(0));
    }

    #[test]
    fn persist_clears_a_future_expiry() {
        let ks = ks();
        set(&ks, b"k", b"v".to_vec()).unwrap();
        expire_at(&ks, b"k", now_ms() + 60_000).unwrap();
        assert!(matches!(ttl(&ks, b"k", false).unwrap(), Reply::Integer(n) if n > 0));
        assert_eq!(persist(&ks, b"k").unwrap(), Reply::Integer(1));
        assert_eq!(ttl(&ks, b"k", false).unwrap(), Reply::Integer(-1));
    }

    #[test]
    fn ttl_reports_missing_key_as_minus_two() {
        let ks = ks();
        assert_eq!(ttl(&ks, b"nope", false).unwrap(), Reply::Integer(-2));
    }

    #[test]
    fn key_type_reports_none_for_missing_key() {
        let ks = ks();
        assert_eq!(key_type(&ks, b"nope").unwrap(), Reply::Simple("none".to_string()));
    }

    #[test]
    fn ping_echoes_payload_or_pong() {
        assert_eq!(ping(None).unwrap(), Reply::Simple("PONG".to_string()));
        assert_eq!(ping(Some(b"hi".to_vec())).unwrap(), Reply::bulk(b"hi".to_vec()));
    }

    #[test]
    fn auth_rejects_wrong_password() {
        let acl = Acl::new(true);
        let mut user = User::new("alice");
        user.passwords.push(Password::Plaintext("secret".to_string()));
        acl.add_user(user);
        assert_eq!(auth(&acl, Some("alice"), b"secret").unwrap(), Reply::ok());
        assert!(auth(&acl, Some("alice"), b"wrong").is_err());
    }
}
