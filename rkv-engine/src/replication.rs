//! # Replication Apply Path
//!
//! Purpose: serializes a command as a log entry; on apply, runs it through
//! the same handler layer with replay semantics; on snapshot, copies state;
//! on restore, rebuilds state and drops expired keys.
//!
//! Raft (log, snapshots, transport) and the gossip membership library are
//! out-of-scope collaborators. This module defines the minimal trait
//! surface the dispatcher needs from them and ships one in-process
//! implementation, `StandaloneRaft`, that is always its own leader and
//! applies synchronously — enough for a single-node deployment to compile
//! and run without pulling in a real consensus crate. A clustered binary
//! would supply an `openraft`- or `raft`-crate-backed `RaftHandle` instead.
//!
//! ## Design Principles
//! 1. **Traits At The Collaborator Seam**: `RaftHandle`/`MembershipHandle`
//!    exist so the dispatcher compiles and is testable against a fake
//!    without a real consensus engine in the loop.
//! 2. **Replay Mode Skips The AOF**: replayed entries must not re-enqueue
//!    themselves, or restart would double every write forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use ahash::RandomState;
use async_trait::async_trait;

use rkv_common::HkvResult;

use crate::clock::now_ms;
use crate::keyspace::{KeyData, Keyspace};
use crate::value::Bin;

/// One entry in the replication log.
#[derive(Debug, Clone)]
pub enum LogEntry {
    DeleteKey { key: Bin },
    Command { argv: Vec<Bin> },
}

/// A snapshot payload: `{state, latest_snapshot_ms}` per the persisted
/// state contract.
pub struct Snapshot {
    pub state: HashMap<Bin, KeyData, RandomState>,
    pub latest_snapshot_ms: i64,
}

/// The minimal surface the dispatcher needs from a consensus
/// implementation.
#[async_trait]
pub trait RaftHandle: Send + Sync {
    /// Submits a log entry for cluster-wide application, returning the
    /// result bytes the local handler produced once applied.
    async fn submit(&self, entry: LogEntry) -> HkvResult<Vec<u8>>;
    fn is_leader(&self) -> bool;
    async fn snapshot(&self) -> HkvResult<()>;
    async fn restore(&self) -> HkvResult<()>;
}

/// The minimal surface the dispatcher needs from a gossip membership
/// library, for command forwarding from a follower.
#[async_trait]
pub trait MembershipHandle: Send + Sync {
    fn leader_addr(&self) -> Option<String>;
    async fn forward(&self, addr: &str, argv: &[Bin]) -> HkvResult<()>;
}

/// A handler function the apply path invokes for `Command` entries: the
/// same function the dispatcher calls directly in standalone mode, wired
/// in replay mode (no AOF enqueue).
pub type ApplyHandler = Arc<dyn Fn(&[Bin], bool) -> HkvResult<Vec<u8>> + Send + Sync>;

/// Always-leader, synchronous-apply `RaftHandle` for standalone
/// deployments. Every `submit` runs immediately against the local handler;
/// there is no log, no peers, and no leader election.
pub struct StandaloneRaft {
    keyspace: Arc<Keyspace>,
    handler: ApplyHandler,
    snapshot_in_progress: AtomicBool,
}

impl StandaloneRaft {
    pub fn new(keyspace: Arc<Keyspace>, handler: ApplyHandler) -> Self {
        StandaloneRaft {
            keyspace,
            handler,
            snapshot_in_progress: AtomicBool::new(false),
        }
    }

    pub fn take_snapshot(&self) -> Snapshot {
        self.snapshot_in_progress.store(true, AtomicOrdering::Release);
        let state = self.keyspace.get_state();
        self.snapshot_in_progress.store(false, AtomicOrdering::Release);
        Snapshot {
            state,
            latest_snapshot_ms: now_ms(),
        }
    }

    pub fn restore_snapshot(&self, snapshot: Snapshot) -> HkvResult<()> {
        self.keyspace.restore_state(snapshot.state)
    }
}

#[async_trait]
impl RaftHandle for StandaloneRaft {
    async fn submit(&self, entry: LogEntry) -> HkvResult<Vec<u8>> {
        match entry {
            LogEntry::DeleteKey { key } => {
                self.keyspace.delete_key(&key)?;
                Ok(Vec::new())
            }
            LogEntry::Command { argv } => (self.handler)(&argv, false),
        }
    }

    fn is_leader(&self) -> bool {
        true
    }

    async fn snapshot(&self) -> HkvResult<()> {
        let _ = self.take_snapshot();
        Ok(())
    }

    async fn restore(&self) -> HkvResult<()> {
        Ok(())
    }
}

/// Applies a replayed log entry directly against the keyspace/handler
/// layer, used when rebuilding state from an AOF stream on startup.
pub fn apply_replay(keyspace: &Keyspace, handler: &ApplyHandler, entry: LogEntry) -> HkvResult<Vec<u8>> {
    match entry {
        LogEntry::DeleteKey { key } => {
            keyspace.delete_key(&key)?;
            Ok(Vec::new())
        }
        LogEntry::Command { argv } => handler(&argv, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_common::config::EvictionPolicy;
    use std::time::Duration;

    fn noop_handler() -> ApplyHandler {
        Arc::new(|_argv, _replay| Ok(b"OK".to_vec()))
    }

    #[tokio::test]
    async fn standalone_raft_is_always_leader() {
        let ks = Arc::new(Keyspace::new(0, EvictionPolicy::NoEviction, Duration::from_millis(250)));
        let raft = StandaloneRaft::new(ks, noop_handler());
        assert!(raft.is_leader());
    }

    #[tokio::test]
    async fn submit_command_runs_handler_immediately() {
        let ks = Arc::new(Keyspace::new(0, EvictionPolicy::NoEviction, Duration::from_millis(250)));
        let raft = StandaloneRaft::new(ks, noop_handler());
        let result = raft.submit(LogEntry::Command { argv: vec![b"PING".to_vec()] }).await.unwrap();
        assert_eq!(result, b"OK".to_vec());
    }

    #[test]
    fn snapshot_then_restore_roundtrips_state() {
        let ks = Arc::new(Keyspace::new(0, EvictionPolicy::NoEviction, Duration::from_millis(250)));
        {
            let mut guard = ks.create_key_and_lock(b"a").unwrap();
            ks.set_value(b"a", &mut guard, crate::value::Value::Str(crate::value::StringValue::new(b"1".to_vec()))).unwrap();
        }
        let raft = StandaloneRaft::new(ks.clone(), noop_handler());
        let snap = raft.take_snapshot();
        ks.flush();
        assert_eq!(ks.len(), 0);
        raft.restore_snapshot(snap).unwrap();
        assert_eq!(ks.len(), 1);
    }
}
