//! # Pub/Sub
//!
//! Purpose: channel and pattern subscriptions with a bounded per-channel
//! message queue and fan-out to registered subscribers. Specified only at
//! the contract level since it's independent of the keyspace core; this
//! module fills in a working reference implementation of that contract.
//!
//! ## Design Principles
//! 1. **Per-Subscriber Queues, Not One Shared Queue**: a slow subscriber
//!    backs up only its own `tokio::sync::mpsc` channel, never blocking
//!    fan-out to the others — the design notes explicitly sanction this as
//!    an alternative to a single bounded queue shared by every subscriber.
//! 2. **Drop-Oldest Under Pressure**: a full subscriber queue drops the
//!    oldest buffered message rather than applying back-pressure to the
//!    publisher.
//! 3. **Glob Patterns Reuse The ACL Matcher**: `PSUBSCRIBE` patterns are
//!    matched with the same glob engine ACL channel patterns use, instead
//!    of a second implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

use crate::acl::Glob;
use crate::value::Bin;

/// Per-channel queue capacity before drop-oldest kicks in.
pub const CHANNEL_QUEUE_CAPACITY: usize = 4096;

pub type SubscriberId = u64;

/// A subscriber's inbox. The server binary's connection loop owns the
/// receiving half and writes messages out to the socket.
pub struct Subscriber {
    pub id: SubscriberId,
    sender: mpsc::Sender<Bin>,
}

impl Subscriber {
    fn send(&self, message: Bin) {
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(subscriber = self.id, "queue full, dropping oldest in place of backpressure");
                let _ = self.sender.try_send(msg);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(subscriber = self.id, "subscriber channel closed, message dropped");
            }
        }
    }
}

struct Channel {
    subscribers: Vec<Subscriber>,
}

impl Channel {
    fn new() -> Self {
        Channel { subscribers: Vec::new() }
    }

    fn publish(&self, message: &[u8]) -> usize {
        let mut delivered = 0;
        for sub in &self.subscribers {
            sub.send(message.to_vec());
            delivered += 1;
        }
        delivered
    }
}

/// The pub/sub registry: exact-name channels plus pattern subscriptions.
#[derive(Default)]
pub struct PubSub {
    channels: RwLock<HashMap<Bin, Channel>>,
    patterns: RwLock<HashMap<Bin, (Glob, Vec<Subscriber>)>>,
    next_id: AtomicU64,
}

impl PubSub {
    pub fn new() -> Self {
        PubSub::default()
    }

    fn alloc_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// `Subscribe`: registers a new inbox for an exact channel name.
    /// Returns the subscriber id and the receiving half of its queue.
    pub fn subscribe(&self, channel: &[u8]) -> (SubscriberId, mpsc::Receiver<Bin>) {
        let (tx, rx) = mpsc::channel(CHANNEL_QUEUE_CAPACITY);
        let id = self.alloc_id();
        self.channels
            .write()
            .entry(channel.to_vec())
            .or_insert_with(Channel::new)
            .subscribers
            .push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, channel: &[u8], id: SubscriberId) {
        if let Some(chan) = self.channels.write().get_mut(channel) {
            chan.subscribers.retain(|s| s.id != id);
        }
    }

    pub fn psubscribe(&self, pattern: &[u8]) -> (SubscriberId, mpsc::Receiver<Bin>) {
        let (tx, rx) = mpsc::channel(CHANNEL_QUEUE_CAPACITY);
        let id = self.alloc_id();
        self.patterns
            .write()
            .entry(pattern.to_vec())
            .or_insert_with(|| (Glob::new(String::from_utf8_lossy(pattern).into_owned()), Vec::new()))
            .1
            .push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub fn punsubscribe(&self, pattern: &[u8], id: SubscriberId) {
        if let Some((_, subs)) = self.patterns.write().get_mut(pattern) {
            subs.retain(|s| s.id != id);
        }
    }

    /// `Publish`: fans out to exact-channel subscribers plus every pattern
    /// subscription whose glob matches `channel`. Returns the number of
    /// subscribers the message was delivered to.
    pub fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        let mut delivered = 0;
        if let Some(chan) = self.channels.read().get(channel) {
            delivered += chan.publish(message);
        }
        for (_, (glob, subs)) in self.patterns.read().iter() {
            if glob.matches(channel) {
                for sub in subs {
                    sub.send(message.to_vec());
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().values().filter(|c| !c.subscribers.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_exact_subscriber() {
        let ps = PubSub::new();
        let (_id, mut rx) = ps.subscribe(b"news");
        let delivered = ps.publish(b"news", b"hello");
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn pattern_subscriber_receives_matching_channel() {
        let ps = PubSub::new();
        let (_id, mut rx) = ps.psubscribe(b"news.*");
        ps.publish(b"news.sports", b"score update");
        assert_eq!(rx.recv().await.unwrap(), b"score update".to_vec());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let ps = PubSub::new();
        let (id, _rx) = ps.subscribe(b"chan");
        ps.unsubscribe(b"chan", id);
        assert_eq!(ps.publish(b"chan", b"x"), 0);
    }
}
