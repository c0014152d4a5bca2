//! Millisecond wall-clock helper shared by the keyspace, eviction heaps, and
//! reaper. A single function keeps the "now" source swappable (tests can't
//! easily fake `SystemTime`, but every caller goes through here rather than
//! calling `SystemTime::now()` directly, so that door stays open).

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
