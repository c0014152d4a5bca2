//! # TCP Server
//!
//! Accept RESP2 connections, parse commands, and dispatch them to the
//! command layer with minimal overhead. `SUBSCRIBE`/`PSUBSCRIBE`/
//! `UNSUBSCRIBE`/`PUNSUBSCRIBE` are handled here rather than in the
//! dispatcher: they're connection-stateful (they open a standing
//! message stream) instead of one-shot request/response calls.

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use rkv_common::{encode_reply, Reply, RequestParser, RespError};
use rkv_engine::pubsub::{PubSub, SubscriberId};
use rkv_engine::Dispatcher;

use crate::metrics::Metrics;

struct ActiveSubscription {
    name: Vec<u8>,
    id: SubscriberId,
    is_pattern: bool,
    task: JoinHandle<()>,
}

/// Handles a single TCP client connection until EOF or a protocol error.
pub async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    pubsub: Arc<PubSub>,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let (mut read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));

    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut parser = RequestParser::new();
    let mut authenticated_user: Option<String> = None;
    let mut subscriptions: Vec<ActiveSubscription> = Vec::new();

    loop {
        let bytes = {
            use tokio::io::AsyncReadExt;
            read_half.read_buf(&mut buffer).await?
        };
        if bytes == 0 {
            break;
        }

        loop {
            let argv = match parser.parse(&mut buffer) {
                Ok(Some(argv)) => argv,
                Ok(None) => break,
                Err(RespError::Protocol) => {
                    write_reply(&writer, &Reply::error("protocol error")).await?;
                    return Ok(());
                }
            };
            if argv.is_empty() {
                continue;
            }

            metrics.record_request_start();
            let start = Instant::now();
            let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();

            match name.as_str() {
                "SUBSCRIBE" | "PSUBSCRIBE" => {
                    let is_pattern = name == "PSUBSCRIBE";
                    handle_subscribe(is_pattern, &argv[1..], &pubsub, &writer, &mut subscriptions).await?;
                }
                "UNSUBSCRIBE" | "PUNSUBSCRIBE" => {
                    let is_pattern = name == "PUNSUBSCRIBE";
                    handle_unsubscribe(is_pattern, &argv[1..], &pubsub, &writer, &mut subscriptions).await?;
                }
                _ => {
                    let reply = dispatcher.execute(&argv, authenticated_user.as_deref(), false).await;
                    if name == "AUTH" && matches!(&reply, Reply::Simple(s) if s == "OK") {
                        authenticated_user = Some(auth_username(&argv));
                    }
                    if matches!(reply, Reply::Error { .. }) {
                        metrics.record_error();
                    }
                    write_reply(&writer, &reply).await?;
                }
            }

            metrics.record_request_end(start.elapsed());
        }
    }

    for sub in subscriptions {
        sub.task.abort();
        if sub.is_pattern {
            pubsub.punsubscribe(&sub.name, sub.id);
        } else {
            pubsub.unsubscribe(&sub.name, sub.id);
        }
    }
    Ok(())
}

fn auth_username(argv: &[Vec<u8>]) -> String {
    if argv.len() == 3 {
        String::from_utf8_lossy(&argv[1]).to_string()
    } else {
        "default".to_string()
    }
}

async fn write_reply(writer: &Arc<Mutex<OwnedWriteHalf>>, reply: &Reply) -> std::io::Result<()> {
    let mut buf = Vec::new();
    encode_reply(reply, &mut buf);
    let mut w = writer.lock().await;
    w.write_all(&buf).await
}

/// `SUBSCRIBE`/`PSUBSCRIBE`: registers one subscription per argument and
/// spawns a forwarding task that streams published messages to the
/// connection for as long as it stays open.
async fn handle_subscribe(
    is_pattern: bool,
    targets: &[Vec<u8>],
    pubsub: &Arc<PubSub>,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    subs: &mut Vec<ActiveSubscription>,
) -> std::io::Result<()> {
    for target in targets {
        let (id, mut rx) = if is_pattern {
            pubsub.psubscribe(target)
        } else {
            pubsub.subscribe(target)
        };

        let forward_writer = writer.clone();
        let forward_name = target.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let reply = if is_pattern {
                    // The per-subscriber queue only carries the payload, so the
                    // matched channel name is reported as the pattern itself.
                    Reply::Array(Some(vec![
                        Reply::bulk("pmessage"),
                        Reply::bulk(forward_name.clone()),
                        Reply::bulk(forward_name.clone()),
                        Reply::bulk(message),
                    ]))
                } else {
                    Reply::Array(Some(vec![Reply::bulk("message"), Reply::bulk(forward_name.clone()), Reply::bulk(message)]))
                };
                if write_reply(&forward_writer, &reply).await.is_err() {
                    break;
                }
            }
        });

        subs.push(ActiveSubscription {
            name: target.clone(),
            id,
            is_pattern,
            task,
        });

        let kind = if is_pattern { "psubscribe" } else { "subscribe" };
        let ack = Reply::Array(Some(vec![Reply::bulk(kind), Reply::bulk(target.clone()), Reply::Integer(subs.len() as i64)]));
        write_reply(writer, &ack).await?;
    }
    Ok(())
}

/// `UNSUBSCRIBE`/`PUNSUBSCRIBE`: with no arguments, drops every
/// subscription of the matching kind; otherwise drops only the named ones.
async fn handle_unsubscribe(
    is_pattern: bool,
    targets: &[Vec<u8>],
    pubsub: &Arc<PubSub>,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    subs: &mut Vec<ActiveSubscription>,
) -> std::io::Result<()> {
    let kind = if is_pattern { "punsubscribe" } else { "unsubscribe" };

    let names: Vec<Vec<u8>> = if targets.is_empty() {
        subs.iter().filter(|s| s.is_pattern == is_pattern).map(|s| s.name.clone()).collect()
    } else {
        targets.to_vec()
    };

    if names.is_empty() {
        let ack = Reply::Array(Some(vec![Reply::bulk(kind), Reply::nil(), Reply::Integer(subs.len() as i64)]));
        return write_reply(writer, &ack).await;
    }

    for name in names {
        if let Some(pos) = subs.iter().position(|s| s.is_pattern == is_pattern && s.name == name) {
            let sub = subs.remove(pos);
            sub.task.abort();
            if is_pattern {
                pubsub.punsubscribe(&sub.name, sub.id);
            } else {
                pubsub.unsubscribe(&sub.name, sub.id);
            }
        } else {
            debug!(?name, "unsubscribe from channel with no active subscription");
        }
        let ack = Reply::Array(Some(vec![Reply::bulk(kind), Reply::bulk(name), Reply::Integer(subs.len() as i64)]));
        write_reply(writer, &ack).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_username_defaults_without_explicit_user() {
        assert_eq!(auth_username(&[b"AUTH".to_vec(), b"secret".to_vec()]), "default");
        assert_eq!(auth_username(&[b"AUTH".to_vec(), b"alice".to_vec(), b"secret".to_vec()]), "alice");
    }
}
