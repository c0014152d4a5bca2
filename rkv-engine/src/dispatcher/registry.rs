//! # Command Registry
//!
//! Purpose: static metadata about every supported command — arity,
//! ACL categories, read/write/pub-sub classification, whether the cluster
//! must apply it through the replication log, and which argv positions are
//! keys (for ACL's per-key check).
//!
//! Grounded on the Redis `COMMAND` introspection table's shape, trimmed to
//! what this dispatcher actually needs to decide.

use crate::value::Bin;

/// How many arguments (including the command name itself) a call must have.
#[derive(Debug, Clone, Copy)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, argc: usize) -> bool {
        match self {
            Arity::Exact(n) => argc == *n,
            Arity::AtLeast(n) => argc >= *n,
        }
    }
}

/// Which argv positions (0-indexed, argv[0] is the command name) hold keys,
/// for the ACL per-key check.
#[derive(Debug, Clone, Copy)]
pub enum KeySpec {
    /// No keys (PING, AUTH, FLUSHALL).
    None,
    /// A single key at a fixed position.
    At(usize),
    /// Two distinct keys at fixed positions (LMOVE, SMOVE).
    Pair(usize, usize),
    /// Every argument from this position to the end is a key (DEL, EXISTS,
    /// SDIFF/SINTER/SUNION, ZDIFF/ZINTER/ZUNION).
    From(usize),
    /// One destination key at a fixed position, plus every argument from
    /// the second position onward (*STORE commands).
    DestinationAndFrom(usize, usize),
}

impl KeySpec {
    pub fn extract(&self, argv: &[Bin]) -> Vec<Bin> {
        match *self {
            KeySpec::None => Vec::new(),
            KeySpec::At(i) => argv.get(i).cloned().into_iter().collect(),
            KeySpec::Pair(a, b) => [a, b].iter().filter_map(|&i| argv.get(i).cloned()).collect(),
            KeySpec::From(i) => argv.get(i..).map(|s| s.to_vec()).unwrap_or_default(),
            KeySpec::DestinationAndFrom(dest, from) => {
                let mut keys: Vec<Bin> = argv.get(dest).cloned().into_iter().collect();
                keys.extend(argv.get(from..).map(|s| s.to_vec()).unwrap_or_default());
                keys
            }
        }
    }
}

pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub categories: &'static [&'static str],
    pub is_read: bool,
    pub is_write: bool,
    pub is_pubsub: bool,
    pub is_cluster_sync: bool,
    pub keys: KeySpec,
}

macro_rules! spec {
    ($name:expr, $arity:expr, $cats:expr, $read:expr, $write:expr, $pubsub:expr, $sync:expr, $keys:expr) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            categories: $cats,
            is_read: $read,
            is_write: $write,
            is_pubsub: $pubsub,
            is_cluster_sync: $sync,
            keys: $keys,
        }
    };
}

static TABLE: &[CommandSpec] = &[
    spec!("PING", Arity::AtLeast(1), &["connection"], false, false, false, false, KeySpec::None),
    spec!("AUTH", Arity::AtLeast(2), &["connection"], false, false, false, false, KeySpec::None),
    spec!("FLUSHALL", Arity::Exact(1), &["dangerous", "write"], false, true, false, true, KeySpec::None),
    spec!("EXISTS", Arity::AtLeast(2), &["read", "keyspace"], true, false, false, false, KeySpec::From(1)),
    spec!("DEL", Arity::AtLeast(2), &["write", "keyspace"], false, true, false, true, KeySpec::From(1)),
    spec!("TYPE", Arity::Exact(2), &["read", "keyspace"], true, false, false, false, KeySpec::At(1)),
    spec!("EXPIRE", Arity::Exact(3), &["write", "keyspace"], false, true, false, true, KeySpec::At(1)),
    spec!("PEXPIRE", Arity::Exact(3), &["write", "keyspace"], false, true, false, true, KeySpec::At(1)),
    spec!("EXPIREAT", Arity::Exact(3), &["write", "keyspace"], false, true, false, true, KeySpec::At(1)),
    spec!("PEXPIREAT", Arity::Exact(3), &["write", "keyspace"], false, true, false, true, KeySpec::At(1)),
    spec!("PERSIST", Arity::Exact(2), &["write", "keyspace"], false, true, false, true, KeySpec::At(1)),
    spec!("TTL", Arity::Exact(2), &["read", "keyspace"], true, false, false, false, KeySpec::At(1)),
    spec!("PTTL", Arity::Exact(2), &["read", "keyspace"], true, false, false, false, KeySpec::At(1)),
    // Strings
    spec!("GET", Arity::Exact(2), &["read", "string"], true, false, false, false, KeySpec::At(1)),
    spec!("SET", Arity::Exact(3), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("GETSET", Arity::Exact(3), &["write", "string"], true, true, false, true, KeySpec::At(1)),
    spec!("APPEND", Arity::Exact(3), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("STRLEN", Arity::Exact(2), &["read", "string"], true, false, false, false, KeySpec::At(1)),
    spec!("GETRANGE", Arity::Exact(4), &["read", "string"], true, false, false, false, KeySpec::At(1)),
    spec!("SETRANGE", Arity::Exact(4), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("INCR", Arity::Exact(2), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("DECR", Arity::Exact(2), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("INCRBY", Arity::Exact(3), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("DECRBY", Arity::Exact(3), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    spec!("INCRBYFLOAT", Arity::Exact(3), &["write", "string"], false, true, false, true, KeySpec::At(1)),
    // Lists
    spec!("LPUSH", Arity::AtLeast(3), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("RPUSH", Arity::AtLeast(3), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("LPUSHX", Arity::AtLeast(3), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("RPUSHX", Arity::AtLeast(3), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("LPOP", Arity::AtLeast(2), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("RPOP", Arity::AtLeast(2), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("LLEN", Arity::Exact(2), &["read", "list"], true, false, false, false, KeySpec::At(1)),
    spec!("LRANGE", Arity::Exact(4), &["read", "list"], true, false, false, false, KeySpec::At(1)),
    spec!("LINDEX", Arity::Exact(3), &["read", "list"], true, false, false, false, KeySpec::At(1)),
    spec!("LSET", Arity::Exact(4), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("LTRIM", Arity::Exact(4), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("LREM", Arity::Exact(4), &["write", "list"], false, true, false, true, KeySpec::At(1)),
    spec!("LMOVE", Arity::Exact(5), &["write", "list"], true, true, false, true, KeySpec::Pair(1, 2)),
    // Hashes
    spec!("HSET", Arity::AtLeast(4), &["write", "hash"], false, true, false, true, KeySpec::At(1)),
    spec!("HSETNX", Arity::Exact(4), &["write", "hash"], false, true, false, true, KeySpec::At(1)),
    spec!("HGET", Arity::Exact(3), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HMGET", Arity::AtLeast(3), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HDEL", Arity::AtLeast(3), &["write", "hash"], false, true, false, true, KeySpec::At(1)),
    spec!("HGETALL", Arity::Exact(2), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HKEYS", Arity::Exact(2), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HVALS", Arity::Exact(2), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HLEN", Arity::Exact(2), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HEXISTS", Arity::Exact(3), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HSTRLEN", Arity::Exact(3), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    spec!("HINCRBY", Arity::Exact(4), &["write", "hash"], false, true, false, true, KeySpec::At(1)),
    spec!("HINCRBYFLOAT", Arity::Exact(4), &["write", "hash"], false, true, false, true, KeySpec::At(1)),
    spec!("HRANDFIELD", Arity::AtLeast(2), &["read", "hash"], true, false, false, false, KeySpec::At(1)),
    // Sets
    spec!("SADD", Arity::AtLeast(3), &["write", "set"], false, true, false, true, KeySpec::At(1)),
    spec!("SREM", Arity::AtLeast(3), &["write", "set"], false, true, false, true, KeySpec::At(1)),
    spec!("SCARD", Arity::Exact(2), &["read", "set"], true, false, false, false, KeySpec::At(1)),
    spec!("SMEMBERS", Arity::Exact(2), &["read", "set"], true, false, false, false, KeySpec::At(1)),
    spec!("SISMEMBER", Arity::Exact(3), &["read", "set"], true, false, false, false, KeySpec::At(1)),
    spec!("SMISMEMBER", Arity::AtLeast(3), &["read", "set"], true, false, false, false, KeySpec::At(1)),
    spec!("SDIFF", Arity::AtLeast(2), &["read", "set"], true, false, false, false, KeySpec::From(1)),
    spec!("SDIFFSTORE", Arity::AtLeast(3), &["write", "set"], false, true, false, true, KeySpec::DestinationAndFrom(1, 2)),
    spec!("SINTER", Arity::AtLeast(2), &["read", "set"], true, false, false, false, KeySpec::From(1)),
    spec!("SINTERSTORE", Arity::AtLeast(3), &["write", "set"], false, true, false, true, KeySpec::DestinationAndFrom(1, 2)),
    spec!("SINTERCARD", Arity::AtLeast(3), &["read", "set"], true, false, false, false, KeySpec::None),
    spec!("SUNION", Arity::AtLeast(2), &["read", "set"], true, false, false, false, KeySpec::From(1)),
    spec!("SUNIONSTORE", Arity::AtLeast(3), &["write", "set"], false, true, false, true, KeySpec::DestinationAndFrom(1, 2)),
    spec!("SMOVE", Arity::Exact(4), &["write", "set"], true, true, false, true, KeySpec::Pair(1, 2)),
    spec!("SPOP", Arity::AtLeast(2), &["write", "set"], false, true, false, true, KeySpec::At(1)),
    spec!("SRANDMEMBER", Arity::AtLeast(2), &["read", "set"], true, false, false, false, KeySpec::At(1)),
    // Sorted sets
    spec!("ZADD", Arity::AtLeast(4), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZCARD", Arity::Exact(2), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZCOUNT", Arity::Exact(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZSCORE", Arity::Exact(3), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZMSCORE", Arity::AtLeast(3), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZINCRBY", Arity::Exact(4), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZRANK", Arity::AtLeast(3), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZREVRANK", Arity::AtLeast(3), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZPOPMIN", Arity::AtLeast(2), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZPOPMAX", Arity::AtLeast(2), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZMPOP", Arity::AtLeast(4), &["write", "zset"], false, true, false, true, KeySpec::None),
    spec!("ZRANDMEMBER", Arity::AtLeast(2), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZREM", Arity::AtLeast(3), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZREMRANGEBYSCORE", Arity::Exact(4), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZREMRANGEBYRANK", Arity::Exact(4), &["write", "zset"], false, true, false, true, KeySpec::At(1)),
    spec!("ZLEXCOUNT", Arity::Exact(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZRANGEBYLEX", Arity::AtLeast(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZREVRANGEBYLEX", Arity::AtLeast(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZRANGEBYSCORE", Arity::AtLeast(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZREVRANGEBYSCORE", Arity::AtLeast(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZRANGE", Arity::AtLeast(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZREVRANGE", Arity::AtLeast(4), &["read", "zset"], true, false, false, false, KeySpec::At(1)),
    spec!("ZRANGESTORE", Arity::AtLeast(5), &["write", "zset"], true, true, false, true, KeySpec::Pair(1, 2)),
    spec!("ZDIFF", Arity::AtLeast(3), &["read", "zset"], true, false, false, false, KeySpec::None),
    spec!("ZDIFFSTORE", Arity::AtLeast(4), &["write", "zset"], false, true, false, true, KeySpec::None),
    spec!("ZINTER", Arity::AtLeast(3), &["read", "zset"], true, false, false, false, KeySpec::None),
    spec!("ZINTERSTORE", Arity::AtLeast(4), &["write", "zset"], false, true, false, true, KeySpec::None),
    spec!("ZUNION", Arity::AtLeast(3), &["read", "zset"], true, false, false, false, KeySpec::None),
    spec!("ZUNIONSTORE", Arity::AtLeast(4), &["write", "zset"], false, true, false, true, KeySpec::None),
    // Pub/Sub
    spec!("PUBLISH", Arity::Exact(3), &["pubsub"], false, false, true, false, KeySpec::At(1)),
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    let upper = name.to_ascii_uppercase();
    TABLE.iter().find(|c| c.name == upper)
}
