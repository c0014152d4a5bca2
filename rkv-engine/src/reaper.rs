//! # TTL Reaper
//!
//! Purpose: a periodic sampler over the volatile-keys index that deletes
//! expired keys and re-runs within the same tick when the expired fraction
//! is high.
//!
//! ## Design Principles
//! 1. **Sample, Don't Scan**: a full scan of `volatileIndex` every tick
//!    doesn't scale; a uniform sample of distinct keys bounds the per-tick
//!    cost.
//! 2. **Recurse On A Hot Tick**: a ≥20% hit rate signals more expired keys
//!    are probably still sitting in the index, so the same tick keeps
//!    sampling instead of waiting for the next interval.

use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::clock::now_ms;
use crate::keyspace::Keyspace;

/// Runs one reaper tick against `keyspace`, recursing in-tick when the
/// expired-ratio threshold is met. Returns the total number of keys
/// deleted across every recursive round this tick.
pub fn run_tick(keyspace: &Keyspace, sample_size: usize) -> usize {
    let mut total_deleted = 0;
    loop {
        let deleted_this_round = sample_once(keyspace, sample_size);
        total_deleted += deleted_this_round.deleted;

        if deleted_this_round.sampled == 0 {
            break;
        }
        let ratio_pct = (deleted_this_round.deleted * 100) / deleted_this_round.sampled;
        if ratio_pct >= 20 {
            debug!(ratio_pct, "reaper hit rate high, recursing within tick");
            continue;
        }
        break;
    }
    if total_deleted > 0 {
        info!(total_deleted, "reaper tick complete");
    }
    total_deleted
}

struct RoundResult {
    sampled: usize,
    deleted: usize,
}

fn sample_once(keyspace: &Keyspace, sample_size: usize) -> RoundResult {
    let volatile = keyspace.volatile_keys();
    let n = sample_size.min(volatile.len());
    if n == 0 {
        return RoundResult { sampled: 0, deleted: 0 };
    }

    let mut candidates = volatile;
    let mut rng = rand::thread_rng();
    candidates.shuffle(&mut rng);
    candidates.truncate(n);

    let now = now_ms();
    let mut deleted = 0;
    for key in &candidates {
        let expired = match keyspace.key_rlock(key) {
            Ok(Some(guard)) => {
                let e = keyspace.get_expiry(&guard).map(|at| at <= now).unwrap_or(false);
                drop(guard);
                e
            }
            _ => false,
        };
        if expired {
            if keyspace.delete_key(key).unwrap_or(false) {
                deleted += 1;
            }
        }
    }

    RoundResult { sampled: n, deleted }
}

/// Background loop driving `run_tick` on an interval. Intended to be spawned
/// as a dedicated task by the server binary.
pub async fn run_loop(keyspace: std::sync::Arc<Keyspace>, interval: Duration, sample_size: usize) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        run_tick(&keyspace, sample_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_common::config::EvictionPolicy;
    use std::time::Duration as StdDuration;

    fn ks() -> Keyspace {
        Keyspace::new(0, EvictionPolicy::NoEviction, StdDuration::from_millis(250))
    }

    #[test]
    fn reaper_deletes_expired_sampled_keys() {
        let k = ks();
        for i in 0..200 {
            let mut guard = k.create_key_and_lock(i.to_string().as_bytes()).unwrap();
            let expire = if i % 2 == 0 { now_ms() - 1000 } else { now_ms() + 3_600_000 };
            k.set_expiry(i.to_string().as_bytes(), &mut guard, expire, false);
        }
        assert_eq!(k.volatile_len(), 200);

        let deleted = run_tick(&k, 20);
        assert!(deleted > 0);
        assert!(k.volatile_len() < 200);
    }

    #[test]
    fn reaper_noop_on_empty_index() {
        let k = ks();
        assert_eq!(run_tick(&k, 20), 0);
    }
}
