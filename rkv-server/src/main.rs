//! # Server Entry Point
//!
//! Wires configuration, the keyspace, ACL, pub/sub, and the standalone
//! replication handle into a `Dispatcher`, then accepts RESP2 connections
//! on the configured address.

mod metrics;
mod server;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rkv_common::Config;
use rkv_engine::acl::{Acl, User};
use rkv_engine::keyspace::{Keyspace, DEFAULT_LOCK_TIMEOUT};
use rkv_engine::pubsub::PubSub;
use rkv_engine::reaper;
use rkv_engine::replication::{ApplyHandler, StandaloneRaft};
use rkv_engine::Dispatcher;

use crate::metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(std::path::Path::new(&path)).context("loading config file")?,
        None => Config::default(),
    };

    let keyspace = Arc::new(Keyspace::new(
        config.eviction.max_memory,
        config.eviction.policy,
        DEFAULT_LOCK_TIMEOUT,
    ));

    let acl = Acl::new(config.acl.require_pass);
    if let Some(path) = &config.acl.acl_config_path {
        acl.load_from_json(path).context("loading ACL config")?;
    } else if config.acl.require_pass {
        let mut default_user = User::new("default");
        if let Some(password) = &config.acl.password {
            default_user.passwords.push(rkv_engine::acl::Password::Plaintext(password.clone()));
        } else {
            default_user.no_password = true;
        }
        default_user.category_allow.push(rkv_engine::acl::Glob::new("*"));
        default_user.command_allow.push(rkv_engine::acl::Glob::new("*"));
        default_user.channel_allow.push(rkv_engine::acl::Glob::new("*"));
        default_user
            .key_patterns
            .push(rkv_engine::acl::KeyPattern { glob: rkv_engine::acl::Glob::new("*"), access: rkv_engine::acl::KeyAccess::ReadWrite });
        acl.add_user(default_user);
    }

    let pubsub = Arc::new(PubSub::new());

    let dispatcher = Arc::new_cyclic(|weak: &std::sync::Weak<Dispatcher>| {
        let weak = weak.clone();
        let handler: ApplyHandler = Arc::new(move |argv, _replay| {
            weak.upgrade().expect("dispatcher still alive during replay").apply_for_replay(argv)
        });
        let raft = Arc::new(StandaloneRaft::new(keyspace.clone(), handler));
        Dispatcher {
            keyspace: keyspace.clone(),
            acl,
            pubsub: pubsub.clone(),
            raft,
            membership: None,
        }
    });

    let metrics = Arc::new(Metrics::new());

    {
        let keyspace = keyspace.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(std::time::Duration::from_secs(1));
            loop {
                ticker.tick().await;
                reaper::run_tick(&keyspace, 20);
            }
        });
    }

    let bind_addr = format!("{}:{}", config.network.bind_addr, config.network.port);
    let listener = TcpListener::bind(&bind_addr).await.with_context(|| format!("binding {bind_addr}"))?;
    info!(addr = %bind_addr, "rkv-server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let dispatcher = dispatcher.clone();
        let pubsub = pubsub.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            debug_connection(peer);
            if let Err(err) = server::handle_connection(stream, dispatcher, pubsub, metrics).await {
                warn!(%err, %peer, "connection ended with error");
            }
        });
    }
}

fn debug_connection(peer: std::net::SocketAddr) {
    tracing::debug!(%peer, "accepted connection");
}
