//! # Keyspace
//!
//! Purpose: the mapping `key -> (value, expireAt)` plus per-key read/write
//! locks, a key-creation gate, and a volatile-keys index.
//!
//! ## Design Principles
//! 1. **One Map, Not Two**: the source keeps `store` and `locks` as
//!    parallel maps and states the invariant `k in store iff k in locks`.
//!    Here a single `hashbrown::HashMap<key, Arc<RwLock<KeyData>>>` makes
//!    that invariant true by construction — there is no second map to ever
//!    drift out of sync with the first. This is the fused-map equivalent
//!    abstraction the design notes call out as acceptable.
//! 2. **RAII Locks, No Explicit Unlock**: `parking_lot`'s owned
//!    (`*_arc`) guards are returned directly from `create_key_and_lock`/
//!    `key_lock`/`key_rlock`; dropping the guard is the unlock, the same
//!    pattern `rkv-client`'s `PooledConnection` uses for pooled sockets.
//! 3. **Busy-Wait Coordination**: the snapshot-copy and mutation-in-progress
//!    flags are plain `AtomicBool`s spun on rather than parked; a
//!    condvar-based rewrite would change observable latency characteristics
//!    this spec doesn't ask for.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use hashbrown::{HashMap, HashSet};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use tracing::{debug, trace, warn};

use rkv_common::config::EvictionPolicy;
use rkv_common::{HkvError, HkvResult};

use crate::clock::now_ms;
use crate::eviction::{EvictionFailure, EvictionOutcome, LfuHeap, LruHeap};
use crate::value::{Bin, Value};

pub type KeyReadGuard = ArcRwLockReadGuard<RawRwLock, KeyData>;
pub type KeyWriteGuard = ArcRwLockWriteGuard<RawRwLock, KeyData>;

/// Default per-key lock acquisition deadline.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// A key's stored value plus its expiry. `expire_at_ms = None` means
/// "no expiry" (the volatile bit is off); `Some(ms)` is milliseconds since
/// the Unix epoch.
/// `value` is `None` between `createKeyAndLock` and the handler's first
/// `setValue` call — a freshly-created key has no type yet, distinct from
/// a key holding an empty string. No reader ever observes that window: the
/// creating handler holds the write lock across both calls.
#[derive(Debug, Clone)]
pub struct KeyData {
    pub value: Option<Value>,
    pub expire_at_ms: Option<i64>,
}

impl KeyData {
    pub fn fresh() -> Self {
        KeyData {
            value: None,
            expire_at_ms: None,
        }
    }

    pub fn is_volatile(&self) -> bool {
        self.expire_at_ms.is_some()
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        matches!(self.expire_at_ms, Some(at) if at <= now_ms)
    }
}

type Slot = Arc<RwLock<KeyData>>;

pub struct Keyspace {
    entries: RwLock<HashMap<Bin, Slot, RandomState>>,
    creation_gate: Mutex<()>,
    volatile_index: RwLock<HashSet<Bin, RandomState>>,
    lfu: Mutex<LfuHeap>,
    lru: Mutex<LruHeap>,
    policy: EvictionPolicy,
    max_memory: u64,
    lock_timeout: Duration,
    memory_used: AtomicU64,
    state_copy_in_progress: AtomicBool,
    state_mutation_in_progress: AtomicBool,
}

impl Keyspace {
    pub fn new(max_memory: u64, policy: EvictionPolicy, lock_timeout: Duration) -> Self {
        Keyspace {
            entries: RwLock::new(HashMap::default()),
            creation_gate: Mutex::new(()),
            volatile_index: RwLock::new(HashSet::default()),
            lfu: Mutex::new(LfuHeap::default()),
            lru: Mutex::new(LruHeap::default()),
            policy,
            max_memory,
            lock_timeout,
            memory_used: AtomicU64::new(0),
            state_copy_in_progress: AtomicBool::new(false),
            state_mutation_in_progress: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn slot(&self, key: &[u8]) -> Option<Slot> {
        self.entries.read().get(key).cloned()
    }

    /// `keyExists`: also triggers deletion of a lazily-discovered expired
    /// key (the caller's standalone/cluster context decides the deletion
    /// path at a higher layer; here we just perform the local delete).
    pub fn key_exists(&self, key: &[u8]) -> HkvResult<bool> {
        let Some(slot) = self.slot(key) else {
            return Ok(false);
        };
        let expired = {
            let guard = slot
                .try_read_for(self.lock_timeout)
                .ok_or(HkvError::Timeout)?;
            guard.is_expired_at(now_ms())
        };
        if expired {
            self.delete_key(key)?;
            return Ok(false);
        }
        Ok(true)
    }

    fn check_memory_budget(&self) -> HkvResult<()> {
        if self.max_memory == 0 {
            return Ok(());
        }
        if self.policy == EvictionPolicy::NoEviction
            && self.memory_used.load(AtomicOrdering::Relaxed) > self.max_memory
        {
            return Err(HkvError::MaxMemoryExceeded);
        }
        Ok(())
    }

    /// `createKeyAndLock`: returns the write lock already held, creating an
    /// empty entry first if absent.
    pub fn create_key_and_lock(&self, key: &[u8]) -> HkvResult<KeyWriteGuard> {
        self.check_memory_budget()?;
        let _gate = self.creation_gate.lock();

        if let Some(slot) = self.slot(key) {
            return slot
                .try_write_arc_for(self.lock_timeout)
                .ok_or(HkvError::Timeout);
        }

        let slot: Slot = Arc::new(RwLock::new(KeyData::fresh()));
        let guard = slot
            .try_write_arc_for(self.lock_timeout)
            .ok_or(HkvError::Timeout)?;
        self.entries.write().insert(key.to_vec(), slot);
        trace!(key = %String::from_utf8_lossy(key), "key created");
        Ok(guard)
    }

    /// `keyLock`: acquires the write lock of an existing key. `None` if the
    /// key is absent.
    pub fn key_lock(&self, key: &[u8]) -> HkvResult<Option<KeyWriteGuard>> {
        match self.slot(key) {
            None => Ok(None),
            Some(slot) => slot
                .try_write_arc_for(self.lock_timeout)
                .map(Some)
                .ok_or(HkvError::Timeout),
        }
    }

    /// `keyRLock`: acquires the read lock of an existing key.
    pub fn key_rlock(&self, key: &[u8]) -> HkvResult<Option<KeyReadGuard>> {
        match self.slot(key) {
            None => Ok(None),
            Some(slot) => slot
                .try_read_arc_for(self.lock_timeout)
                .map(Some)
                .ok_or(HkvError::Timeout),
        }
    }

    /// `setValue`: stores a new value in an already-locked key, subject to
    /// the same memory budget check as creation, then bumps the eviction
    /// cache stats.
    pub fn set_value(&self, key: &[u8], guard: &mut KeyWriteGuard, value: Value) -> HkvResult<()> {
        self.check_memory_budget()?;
        let old_size = guard.value.as_ref().map(Value::approx_size).unwrap_or(0) as u64;
        let new_size = value.approx_size() as u64;
        guard.value = Some(value);
        self.memory_used.fetch_add(new_size, AtomicOrdering::Relaxed);
        self.memory_used.fetch_sub(old_size.min(self.memory_used.load(AtomicOrdering::Relaxed)), AtomicOrdering::Relaxed);
        let volatile = guard.is_volatile();
        self.update_key_in_cache(key, volatile);
        Ok(())
    }

    pub fn get_value<'a>(&self, guard: &'a KeyReadGuard) -> Option<&'a Value> {
        guard.value.as_ref()
    }

    pub fn get_expiry(&self, guard: &KeyReadGuard) -> Option<i64> {
        guard.expire_at_ms
    }

    /// `setExpiry`. `touch` controls whether the eviction cache stats are
    /// bumped (mirrors the source's optional-touch parameter).
    pub fn set_expiry(&self, key: &[u8], guard: &mut KeyWriteGuard, expire_at_ms: i64, touch: bool) {
        guard.expire_at_ms = Some(expire_at_ms);
        self.volatile_index.write().insert(key.to_vec());
        if touch {
            self.update_key_in_cache(key, true);
        }
    }

    pub fn remove_expiry(&self, key: &[u8], guard: &mut KeyWriteGuard) {
        guard.expire_at_ms = None;
        self.volatile_index.write().remove(key);
    }

    fn update_key_in_cache(&self, key: &[u8], is_volatile: bool) {
        let now = now_ms();
        match self.policy {
            EvictionPolicy::AllKeysLfu => self.lfu.lock().update(key, now),
            EvictionPolicy::AllKeysLru => self.lru.lock().update(key, now),
            EvictionPolicy::VolatileLfu if is_volatile => self.lfu.lock().update(key, now),
            EvictionPolicy::VolatileLru if is_volatile => self.lru.lock().update(key, now),
            _ => {}
        }
    }

    /// `deleteKey`: removes the key from every map and from whichever
    /// eviction heap is active. Returns whether anything was removed.
    pub fn delete_key(&self, key: &[u8]) -> HkvResult<bool> {
        let slot = match self.slot(key) {
            Some(s) => s,
            None => return Ok(false),
        };
        let guard = slot
            .try_write_arc_for(self.lock_timeout)
            .ok_or(HkvError::Timeout)?;
        let size = guard.value.as_ref().map(Value::approx_size).unwrap_or(0) as u64;
        drop(guard);

        self.entries.write().remove(key);
        self.volatile_index.write().remove(key);
        self.lfu.lock().delete(key);
        self.lru.lock().delete(key);
        self.memory_used
            .fetch_sub(size.min(self.memory_used.load(AtomicOrdering::Relaxed)), AtomicOrdering::Relaxed);
        debug!(key = %String::from_utf8_lossy(key), "key deleted");
        Ok(true)
    }

    /// Clears the whole keyspace (FLUSHALL's underlying primitive).
    pub fn flush(&self) {
        let _gate = self.creation_gate.lock();
        self.entries.write().clear();
        self.volatile_index.write().clear();
        *self.lfu.lock() = LfuHeap::default();
        *self.lru.lock() = LruHeap::default();
        self.memory_used.store(0, AtomicOrdering::Relaxed);
    }

    pub fn all_keys(&self) -> Vec<Bin> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn volatile_keys(&self) -> Vec<Bin> {
        self.volatile_index.read().iter().cloned().collect()
    }

    pub fn volatile_len(&self) -> usize {
        self.volatile_index.read().len()
    }

    pub fn heap_in_use(&self) -> u64 {
        self.memory_used.load(AtomicOrdering::Relaxed)
    }

    /// `getState`: a shallow copy of `store`, coordinated with in-flight
    /// writers via the two busy-wait flags.
    pub fn get_state(&self) -> HashMap<Bin, KeyData, RandomState> {
        loop {
            if !self.state_copy_in_progress.load(AtomicOrdering::Acquire)
                && !self.state_mutation_in_progress.load(AtomicOrdering::Acquire)
            {
                if self
                    .state_copy_in_progress
                    .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
                    .is_ok()
                {
                    break;
                }
            }
            std::hint::spin_loop();
        }

        let snapshot: HashMap<Bin, KeyData, RandomState> = self
            .entries
            .read()
            .iter()
            .map(|(k, slot)| (k.clone(), slot.read().clone()))
            .collect();

        self.state_copy_in_progress.store(false, AtomicOrdering::Release);
        snapshot
    }

    /// Restores state from a snapshot, dropping already-expired keys. Used
    /// by the replication apply path's restore operation.
    pub fn restore_state(&self, state: HashMap<Bin, KeyData, RandomState>) -> HkvResult<()> {
        self.flush();
        let now = now_ms();
        for (key, data) in state {
            if data.is_expired_at(now) {
                continue;
            }
            let mut guard = self.create_key_and_lock(&key)?;
            let volatile = data.expire_at_ms.is_some();
            if let Some(value) = data.value {
                self.set_value(&key, &mut guard, value)?;
            }
            if let Some(at) = data.expire_at_ms {
                self.set_expiry(&key, &mut guard, at, false);
            }
            self.update_key_in_cache(&key, volatile);
        }
        Ok(())
    }

    /// Dispatcher write-serialization: busy-waits until no state-copy is in
    /// flight, then marks a mutation in progress. Paired with `end_write`.
    pub fn begin_write(&self) {
        loop {
            if !self.state_copy_in_progress.load(AtomicOrdering::Acquire) {
                if self
                    .state_mutation_in_progress
                    .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
                    .is_ok()
                {
                    return;
                }
            }
            std::hint::spin_loop();
        }
    }

    pub fn end_write(&self) {
        self.state_mutation_in_progress.store(false, AtomicOrdering::Release);
    }

    /// The memory-pressure driver, run after every write. There is no
    /// tracing GC to force in a Rust process before re-reading heap usage;
    /// the atomic counter this module maintains is always current, so that
    /// step collapses to a second load.
    pub fn adjust_memory_usage(&self) -> EvictionOutcome {
        if self.max_memory == 0 {
            return EvictionOutcome::NotNeeded;
        }
        if self.heap_in_use() <= self.max_memory {
            return EvictionOutcome::NotNeeded;
        }

        let mut evicted = Vec::new();
        let budget_iterations = self.len() + 1;
        for _ in 0..budget_iterations {
            if self.heap_in_use() <= self.max_memory {
                break;
            }
            let victim = match self.policy {
                EvictionPolicy::AllKeysLfu | EvictionPolicy::VolatileLfu => {
                    match self.lfu.lock().pop() {
                        Some(k) => k,
                        None => return EvictionOutcome::Failed(EvictionFailure::CacheEmpty),
                    }
                }
                EvictionPolicy::AllKeysLru | EvictionPolicy::VolatileLru => match self.lru.lock().pop() {
                    Some(k) => k,
                    None => break,
                },
                EvictionPolicy::AllKeysRandom => {
                    let keys = self.all_keys();
                    match random_choice(&keys) {
                        Some(k) => k,
                        None => break,
                    }
                }
                EvictionPolicy::VolatileRandom => {
                    let keys = self.volatile_keys();
                    match random_choice(&keys) {
                        Some(k) => k,
                        None => break,
                    }
                }
                EvictionPolicy::NoEviction => break,
            };

            match self.delete_key(&victim) {
                Ok(true) => {
                    warn!(key = %String::from_utf8_lossy(&victim), "evicted under memory pressure");
                    evicted.push(victim);
                }
                Ok(false) => continue,
                Err(_) => continue,
            }
        }

        if evicted.is_empty() {
            EvictionOutcome::NotNeeded
        } else {
            EvictionOutcome::Evicted(evicted)
        }
    }
}

fn random_choice(keys: &[Bin]) -> Option<Bin> {
    if keys.is_empty() {
        return None;
    }
    use rand::Rng;
    let i = rand::thread_rng().gen_range(0..keys.len());
    Some(keys[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StringValue;

    fn ks() -> Keyspace {
        Keyspace::new(0, EvictionPolicy::NoEviction, Duration::from_millis(250))
    }

    #[test]
    fn create_then_exists() {
        let k = ks();
        let guard = k.create_key_and_lock(b"a").unwrap();
        drop(guard);
        assert!(k.key_exists(b"a").unwrap());
        assert!(!k.key_exists(b"missing").unwrap());
    }

    #[test]
    fn set_then_get_value() {
        let k = ks();
        let mut guard = k.create_key_and_lock(b"a").unwrap();
        k.set_value(b"a", &mut guard, Value::Str(StringValue::new(b"hi".to_vec()))).unwrap();
        drop(guard);
        let rguard = k.key_rlock(b"a").unwrap().unwrap();
        assert_eq!(k.get_value(&rguard).unwrap().as_string().unwrap().0, b"hi".to_vec());
    }

    #[test]
    fn expired_key_is_lazily_deleted() {
        let k = ks();
        let mut guard = k.create_key_and_lock(b"a").unwrap();
        k.set_expiry(b"a", &mut guard, now_ms() - 1000, true);
        drop(guard);
        assert!(!k.key_exists(b"a").unwrap());
        assert_eq!(k.len(), 0);
    }

    #[test]
    fn delete_key_clears_volatile_index() {
        let k = ks();
        let mut guard = k.create_key_and_lock(b"a").unwrap();
        k.set_expiry(b"a", &mut guard, now_ms() + 100_000, true);
        drop(guard);
        assert_eq!(k.volatile_len(), 1);
        k.delete_key(b"a").unwrap();
        assert_eq!(k.volatile_len(), 0);
    }

    #[test]
    fn get_state_snapshots_values() {
        let k = ks();
        let mut guard = k.create_key_and_lock(b"a").unwrap();
        k.set_value(b"a", &mut guard, Value::Str(StringValue::new(b"x".to_vec()))).unwrap();
        drop(guard);
        let snap = k.get_state();
        assert_eq!(snap.len(), 1);
    }
}
