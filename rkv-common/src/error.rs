//! # Error Kinds
//!
//! Purpose: Give every collaborator (keyspace, eviction, dispatcher, ACL,
//! replication) a single typed error surface so the server can turn a
//! failure into a RESP error reply without guessing at the cause.
//!
//! ## Design Principles
//! 1. **One Error Enum**: All core-engine failures funnel through `HkvError`
//!    so handlers return `HkvResult<T>` uniformly.
//! 2. **No Silent Coercion**: I/O and collaborator failures are wrapped, not
//!    swallowed, so `Internal` always carries a cause.
//! 3. **Wire-Ready Messages**: `Display` text is written to read directly as
//!    a RESP error body (no leading `-ERR`, the server prepends that).

use std::fmt;

/// Result alias used throughout the keyspace engine.
pub type HkvResult<T> = Result<T, HkvError>;

/// Errors the keyspace engine and its collaborators can surface.
///
/// The dispatcher maps each variant to a RESP error reply.
#[derive(Debug, thiserror::Error)]
pub enum HkvError {
    /// Value at key is not of the expected container kind.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// SDIFF/SDIFFSTORE base key is absent.
    #[error("no such key")]
    BaseSetMissing,

    /// Operation on a missing key that must fail rather than treat as empty.
    #[error("no such key")]
    NoSuchKey,

    /// Mutually exclusive flags, weight/key count mismatch, zero keys, or a
    /// non-integer where an integer is required.
    #[error("ERR {0}")]
    BadOptions(String),

    /// A ZINCRBY (or ZADD INCR) would produce a non-finite score (e.g. the
    /// sum of +inf and -inf).
    #[error("resulting score is not a number (NaN)")]
    NonFiniteResult,

    /// Create/set refused because `maxmemory` is exceeded under `no-eviction`.
    #[error("OOM command not allowed when used memory > 'maxmemory'")]
    MaxMemoryExceeded,

    /// Per-key lock acquisition exceeded its deadline.
    #[error("timeout acquiring key lock")]
    Timeout,

    /// ACL rejected the call.
    #[error("NOPERM this user has no permissions to run this command")]
    Unauthorized,

    /// Write submitted to a follower with forwarding disabled.
    #[error("NOTLEADER this node is not the cluster leader")]
    NotLeader,

    /// Eviction was requested but no victim could be found (empty heap).
    #[error("no evictable key available")]
    CacheEmpty,

    /// A library or disk I/O failure not otherwise classified.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapped I/O failure (wire framing, disk, socket).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HkvError {
    /// Builds a `BadOptions` error from any displayable message.
    pub fn bad_options(msg: impl fmt::Display) -> Self {
        HkvError::BadOptions(msg.to_string())
    }

    /// Builds an `Internal` error from any displayable message.
    pub fn internal(msg: impl fmt::Display) -> Self {
        HkvError::Internal(msg.to_string())
    }

    /// Returns the RESP error-reply prefix conventionally used for this kind.
    ///
    /// Most kinds use the generic `ERR` prefix; a few map to the specific
    /// prefixes Redis-family clients pattern-match on (`WRONGTYPE`, `NOPERM`).
    pub fn resp_prefix(&self) -> &'static str {
        match self {
            HkvError::WrongType => "WRONGTYPE",
            HkvError::Unauthorized => "NOPERM",
            HkvError::NotLeader => "NOTLEADER",
            _ => "ERR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resp_prefix_matches_kind() {
        assert_eq!(HkvError::WrongType.resp_prefix(), "WRONGTYPE");
        assert_eq!(HkvError::Unauthorized.resp_prefix(), "NOPERM");
        assert_eq!(HkvError::Timeout.resp_prefix(), "ERR");
    }

    #[test]
    fn bad_options_carries_message() {
        let err = HkvError::bad_options("NX and GT/LT are mutually exclusive");
        match err {
            HkvError::BadOptions(msg) => assert!(msg.contains("mutually exclusive")),
            _ => panic!("wrong variant"),
        }
    }
}
