//! # Command Dispatcher
//!
//! Purpose: receives a decoded command array, looks up its registry entry,
//! authorizes it against the ACL, serializes writes against the snapshot
//! busy-wait flags, gates cluster-synchronous commands on leadership, and
//! hands the parsed arguments to the matching `commands::*` handler.
//!
//! ## Design Principles
//! 1. **Registry Drives Policy, Match Drives Parsing**: `registry::lookup`
//!    decides arity/ACL/write/cluster-sync once; this module's big `match`
//!    is purely "turn argv into typed arguments."
//! 2. **Write Serialization Brackets The Handler, Not The Whole Call**: ACL
//!    and arity checks run outside `begin_write`/`end_write` so a rejected
//!    call never holds up a legitimate writer.

pub mod registry;

use std::sync::Arc;

use rkv_common::{encode_reply, HkvError, HkvResult, Reply};

use crate::acl::{Acl, CommandContext};
use crate::commands::{self, parse_f64, parse_i64, parse_usize};
use crate::keyspace::Keyspace;
use crate::pubsub::PubSub;
use crate::replication::{MembershipHandle, RaftHandle};
use crate::sorted_set::{Aggregate, LexBound, RangeBound, ZaddFlags};
use crate::value::Bin;

/// Ties the keyspace, ACL, pub/sub registry, and cluster collaborators
/// together behind one `execute` entry point.
pub struct Dispatcher {
    pub keyspace: Arc<Keyspace>,
    pub acl: Acl,
    pub pubsub: Arc<PubSub>,
    pub raft: Arc<dyn RaftHandle>,
    pub membership: Option<Arc<dyn MembershipHandle>>,
}

impl Dispatcher {
    pub fn new(keyspace: Arc<Keyspace>, acl: Acl, pubsub: Arc<PubSub>, raft: Arc<dyn RaftHandle>) -> Self {
        Dispatcher {
            keyspace,
            acl,
            pubsub,
            raft,
            membership: None,
        }
    }

    /// Runs one command. `authenticated_user` is `None` on an
    /// unauthenticated connection. `replay` is true when invoked from the
    /// AOF/replication apply path — such calls skip write serialization and
    /// cluster gating since they're already ordered by the log.
    pub async fn execute(&self, argv: &[Bin], authenticated_user: Option<&str>, replay: bool) -> Reply {
        match self.try_execute(argv, authenticated_user, replay).await {
            Ok(reply) => reply,
            Err(err) => Reply::from(err),
        }
    }

    async fn try_execute(&self, argv: &[Bin], authenticated_user: Option<&str>, replay: bool) -> HkvResult<Reply> {
        if argv.is_empty() {
            return Err(HkvError::bad_options("empty command"));
        }
        let name = String::from_utf8_lossy(&argv[0]).to_string();
        let spec = registry::lookup(&name).ok_or_else(|| HkvError::bad_options(format!("unknown command '{name}'")))?;

        if !spec.arity.accepts(argv.len()) {
            return Err(HkvError::bad_options(format!(
                "wrong number of arguments for '{}' command",
                name.to_ascii_lowercase()
            )));
        }

        let keys = spec.keys.extract(argv);
        let ctx = CommandContext {
            name: spec.name,
            subcommand: None,
            categories: spec.categories,
            is_read: spec.is_read,
            is_write: spec.is_write,
            is_pubsub: spec.is_pubsub,
            keys: &keys,
        };
        if !replay {
            self.acl.authorize(authenticated_user, &ctx)?;
        }

        if spec.is_cluster_sync && !replay {
            if !self.raft.is_leader() {
                match &self.membership {
                    Some(m) if m.leader_addr().is_some() => {
                        let addr = m.leader_addr().unwrap();
                        m.forward(&addr, argv).await?;
                        return Ok(Reply::ok());
                    }
                    _ => return Err(HkvError::NotLeader),
                }
            }
        }

        if spec.is_write && !replay {
            self.keyspace.begin_write();
            let result = self.dispatch(spec.name, argv);
            self.keyspace.end_write();
            let reply = result?;
            self.keyspace.adjust_memory_usage();
            Ok(reply)
        } else {
            self.dispatch(spec.name, argv)
        }
    }

    /// Re-executes a previously-accepted write directly against the
    /// handler layer, skipping ACL and cluster gating since replay already
    /// trusts the log. This is the `ApplyHandler` `StandaloneRaft` and AOF
    /// rebuild call into.
    pub fn apply_for_replay(&self, argv: &[Bin]) -> HkvResult<Vec<u8>> {
        let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();
        let reply = self.dispatch(&name, argv)?;
        let mut buf = Vec::new();
        encode_reply(&reply, &mut buf);
        Ok(buf)
    }

    /// Parses `argv` per the resolved command and calls its handler.
    fn dispatch(&self, name: &str, argv: &[Bin]) -> HkvResult<Reply> {
        let ks = self.keyspace.as_ref();
        match name {
            "PING" => commands::keys::ping(argv.get(1).cloned()),
            "AUTH" => {
                let (user, pass) = if argv.len() == 3 {
                    (Some(std::str::from_utf8(&argv[1]).unwrap_or_default()), &argv[2])
                } else {
                    (None, &argv[1])
                };
                commands::keys::auth(&self.acl, user, pass)
            }
            "FLUSHALL" => commands::keys::flushall(ks),
            "EXISTS" => commands::keys::exists(ks, &argv[1..]),
            "DEL" => commands::keys::del(ks, &argv[1..]),
            "TYPE" => commands::keys::key_type(ks, &argv[1]),
            "EXPIRE" | "PEXPIRE" | "EXPIREAT" | "PEXPIREAT" => {
                let ttl = parse_i64(&argv[2])?;
                let at_ms = ttl_to_deadline(name, ttl);
                commands::keys::expire_at(ks, &argv[1], at_ms)
            }
            "PERSIST" => commands::keys::persist(ks, &argv[1]),
            "TTL" => commands::keys::ttl(ks, &argv[1], false),
            "PTTL" => commands::keys::ttl(ks, &argv[1], true),

            "GET" => commands::strings::get(ks, &argv[1]),
            "SET" => commands::strings::set(ks, &argv[1], argv[2].clone()),
            "GETSET" => commands::strings::getset(ks, &argv[1], argv[2].clone()),
            "APPEND" => commands::strings::append(ks, &argv[1], &argv[2]),
            "STRLEN" => commands::strings::strlen(ks, &argv[1]),
            "GETRANGE" => commands::strings::getrange(ks, &argv[1], parse_i64(&argv[2])?, parse_i64(&argv[3])?),
            "SETRANGE" => commands::strings::setrange(ks, &argv[1], parse_i64(&argv[2])?, &argv[3]),
            "INCR" => commands::strings::incr(ks, &argv[1]),
            "DECR" => commands::strings::decr(ks, &argv[1]),
            "INCRBY" => commands::strings::incrby(ks, &argv[1], &argv[2]),
            "DECRBY" => commands::strings::decrby(ks, &argv[1], &argv[2]),
            "INCRBYFLOAT" => commands::strings::incrbyfloat(ks, &argv[1], &argv[2]),

            "LPUSH" => commands::lists::lpush(ks, &argv[1], argv[2..].to_vec()),
            "RPUSH" => commands::lists::rpush(ks, &argv[1], argv[2..].to_vec()),
            "LPUSHX" => commands::lists::lpushx(ks, &argv[1], argv[2..].to_vec()),
            "RPUSHX" => commands::lists::rpushx(ks, &argv[1], argv[2..].to_vec()),
            "LPOP" => commands::lists::lpop(ks, &argv[1], optional_count(argv, 2)?),
            "RPOP" => commands::lists::rpop(ks, &argv[1], optional_count(argv, 2)?),
            "LLEN" => commands::lists::llen(ks, &argv[1]),
            "LRANGE" => commands::lists::lrange(ks, &argv[1], parse_i64(&argv[2])?, parse_i64(&argv[3])?),
            "LINDEX" => commands::lists::lindex(ks, &argv[1], parse_i64(&argv[2])?),
            "LSET" => commands::lists::lset(ks, &argv[1], parse_i64(&argv[2])?, argv[3].clone()),
            "LTRIM" => commands::lists::ltrim(ks, &argv[1], parse_i64(&argv[2])?, parse_i64(&argv[3])?),
            "LREM" => commands::lists::lrem(ks, &argv[1], parse_i64(&argv[2])?, &argv[3]),
            "LMOVE" => {
                let from_left = parse_side(&argv[3])?;
                let to_left = parse_side(&argv[4])?;
                commands::lists::lmove(ks, &argv[1], &argv[2], from_left, to_left)
            }

            "HSET" => commands::hashes::hset(ks, &argv[1], pairs_from(&argv[2..])?),
            "HSETNX" => commands::hashes::hsetnx(ks, &argv[1], argv[2].clone(), argv[3].clone()),
            "HGET" => commands::hashes::hget(ks, &argv[1], &argv[2]),
            "HMGET" => commands::hashes::hmget(ks, &argv[1], &argv[2..]),
            "HDEL" => commands::hashes::hdel(ks, &argv[1], &argv[2..]),
            "HGETALL" => commands::hashes::hgetall(ks, &argv[1]),
            "HKEYS" => commands::hashes::hkeys(ks, &argv[1]),
            "HVALS" => commands::hashes::hvals(ks, &argv[1]),
            "HLEN" => commands::hashes::hlen(ks, &argv[1]),
            "HEXISTS" => commands::hashes::hexists(ks, &argv[1], &argv[2]),
            "HSTRLEN" => commands::hashes::hstrlen(ks, &argv[1], &argv[2]),
            "HINCRBY" => commands::hashes::hincrby(ks, &argv[1], &argv[2], parse_i64(&argv[3])?),
            "HINCRBYFLOAT" => commands::hashes::hincrbyfloat(ks, &argv[1], &argv[2], parse_f64(&argv[3])?),
            "HRANDFIELD" => {
                let count = argv.get(2).map(|a| parse_i64(a)).transpose()?;
                let with_values = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHVALUES")).unwrap_or(false);
                commands::hashes::hrandfield(ks, &argv[1], count, with_values)
            }

            "SADD" => commands::sets::sadd(ks, &argv[1], argv[2..].to_vec()),
            "SREM" => commands::sets::srem(ks, &argv[1], argv[2..].to_vec()),
            "SCARD" => commands::sets::scard(ks, &argv[1]),
            "SMEMBERS" => commands::sets::smembers(ks, &argv[1]),
            "SISMEMBER" => commands::sets::sismember(ks, &argv[1], &argv[2]),
            "SMISMEMBER" => commands::sets::smismember(ks, &argv[1], &argv[2..]),
            "SDIFF" => commands::sets::sdiff(ks, &argv[1..]),
            "SDIFFSTORE" => commands::sets::sdiffstore(ks, &argv[1], &argv[2..]),
            "SINTER" => commands::sets::sinter(ks, &argv[1..]),
            "SINTERSTORE" => commands::sets::sinterstore(ks, &argv[1], &argv[2..]),
            "SINTERCARD" => {
                let numkeys = parse_usize(&argv[1])?;
                let keys = argv[2..2 + numkeys].to_vec();
                let limit = parse_limit_option(&argv[2 + numkeys..])?;
                commands::sets::sintercard(ks, &keys, limit)
            }
            "SUNION" => commands::sets::sunion(ks, &argv[1..]),
            "SUNIONSTORE" => commands::sets::sunionstore(ks, &argv[1], &argv[2..]),
            "SMOVE" => commands::sets::smove(ks, &argv[1], &argv[2], argv[3].clone()),
            "SPOP" => commands::sets::spop(ks, &argv[1], optional_usize(argv, 2)?),
            "SRANDMEMBER" => {
                let count = argv.get(2).map(|a| parse_i64(a)).transpose()?;
                commands::sets::srandmember(ks, &argv[1], count)
            }

            "ZADD" => {
                let (flags, rest) = parse_zadd_flags(&argv[2..])?;
                let members = parse_score_member_pairs(rest)?;
                commands::zsets::zadd(ks, &argv[1], flags, members)
            }
            "ZCARD" => commands::zsets::zcard(ks, &argv[1]),
            "ZCOUNT" => {
                let min = parse_range_bound(&argv[2])?;
                let max = parse_range_bound(&argv[3])?;
                commands::zsets::zcount(ks, &argv[1], min, max)
            }
            "ZSCORE" => commands::zsets::zscore(ks, &argv[1], &argv[2]),
            "ZMSCORE" => commands::zsets::zmscore(ks, &argv[1], &argv[2..]),
            "ZINCRBY" => commands::zsets::zincrby(ks, &argv[1], parse_f64(&argv[2])?, argv[3].clone()),
            "ZRANK" => {
                let with_score = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHSCORE")).unwrap_or(false);
                commands::zsets::zrank(ks, &argv[1], &argv[2], false, with_score)
            }
            "ZREVRANK" => {
                let with_score = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHSCORE")).unwrap_or(false);
                commands::zsets::zrank(ks, &argv[1], &argv[2], true, with_score)
            }
            "ZPOPMIN" => commands::zsets::zpopmin(ks, &argv[1], optional_usize(argv, 2)?.unwrap_or(1)),
            "ZPOPMAX" => commands::zsets::zpopmax(ks, &argv[1], optional_usize(argv, 2)?.unwrap_or(1)),
            "ZMPOP" => {
                let numkeys = parse_usize(&argv[1])?;
                let keys = argv[2..2 + numkeys].to_vec();
                let mode_idx = 2 + numkeys;
                let max = parse_min_max(&argv[mode_idx])?;
                let count = parse_count_option(&argv[mode_idx + 1..])?.unwrap_or(1);
                commands::zsets::zmpop(ks, &keys, count, max)
            }
            "ZRANDMEMBER" => {
                let count = argv.get(2).map(|a| parse_i64(a)).transpose()?;
                let with_scores = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHSCORES")).unwrap_or(false);
                commands::zsets::zrandmember(ks, &argv[1], count, with_scores)
            }
            "ZREM" => commands::zsets::zrem(ks, &argv[1], argv[2..].to_vec()),
            "ZREMRANGEBYSCORE" => {
                let min = parse_range_bound(&argv[2])?;
                let max = parse_range_bound(&argv[3])?;
                commands::zsets::zremrangebyscore(ks, &argv[1], min, max)
            }
            "ZREMRANGEBYRANK" => commands::zsets::zremrangebyrank(ks, &argv[1], parse_i64(&argv[2])?, parse_i64(&argv[3])?),
            "ZLEXCOUNT" => {
                let min = parse_lex_bound(&argv[2])?;
                let max = parse_lex_bound(&argv[3])?;
                commands::zsets::zlexcount(ks, &argv[1], min, max)
            }
            "ZRANGEBYLEX" | "ZREVRANGEBYLEX" => {
                let rev = name == "ZREVRANGEBYLEX";
                let (lo, hi) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
                let min = parse_lex_bound(lo)?;
                let max = parse_lex_bound(hi)?;
                let (offset, count) = parse_limit(&argv[4..])?;
                commands::zsets::zrangebylex(ks, &argv[1], min, max, rev, offset, count)
            }
            "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" => {
                let rev = name == "ZREVRANGEBYSCORE";
                let (lo, hi) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
                let min = parse_range_bound(lo)?;
                let max = parse_range_bound(hi)?;
                let rest = &argv[4..];
                let with_scores = rest.iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
                let (offset, count) = parse_limit(rest)?;
                commands::zsets::zrangebyscore(ks, &argv[1], min, max, rev, offset, count, with_scores)
            }
            "ZRANGE" | "ZREVRANGE" => {
                let rev = name == "ZREVRANGE";
                let with_scores = argv[4..].iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
                commands::zsets::zrange(ks, &argv[1], parse_i64(&argv[2])?, parse_i64(&argv[3])?, rev, with_scores)
            }
            "ZRANGESTORE" => commands::zsets::zrangestore(ks, &argv[1], &argv[2], parse_i64(&argv[3])?, parse_i64(&argv[4])?, false),
            "ZDIFF" => {
                let numkeys = parse_usize(&argv[1])?;
                let keys = argv[2..2 + numkeys].to_vec();
                let with_scores = argv[2 + numkeys..].iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
                commands::zsets::zdiff(ks, &keys, with_scores)
            }
            "ZDIFFSTORE" => {
                let numkeys = parse_usize(&argv[2])?;
                let keys = argv[3..3 + numkeys].to_vec();
                commands::zsets::zdiffstore(ks, &argv[1], &keys)
            }
            "ZINTER" | "ZUNION" => {
                let numkeys = parse_usize(&argv[1])?;
                let keys = argv[2..2 + numkeys].to_vec();
                let (weights, agg) = parse_weights_aggregate(&argv[2 + numkeys..], numkeys)?;
                let with_scores = argv[2 + numkeys..].iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
                if name == "ZINTER" {
                    commands::zsets::zinter(ks, &keys, &weights, agg, with_scores)
                } else {
                    commands::zsets::zunion(ks, &keys, &weights, agg, with_scores)
                }
            }
            "ZINTERSTORE" | "ZUNIONSTORE" => {
                let numkeys = parse_usize(&argv[2])?;
                let keys = argv[3..3 + numkeys].to_vec();
                let (weights, agg) = parse_weights_aggregate(&argv[3 + numkeys..], numkeys)?;
                if name == "ZINTERSTORE" {
                    commands::zsets::zinterstore(ks, &argv[1], &keys, &weights, agg)
                } else {
                    commands::zsets::zunionstore(ks, &argv[1], &keys, &weights, agg)
                }
            }

            "PUBLISH" => Ok(Reply::Integer(self.pubsub.publish(&argv[1], &argv[2]) as i64)),

            _ => Err(HkvError::bad_options(format!("unknown command '{name}'"))),
        }
    }
}

fn ttl_to_deadline(name: &str, ttl: i64) -> i64 {
    let now = crate::clock::now_ms();
    match name {
        "EXPIRE" => now + ttl * 1000,
        "PEXPIRE" => now + ttl,
        "EXPIREAT" => ttl * 1000,
        "PEXPIREAT" => ttl,
        _ => unreachable!(),
    }
}

fn parse_side(arg: &[u8]) -> HkvResult<bool> {
    if arg.eq_ignore_ascii_case(b"LEFT") {
        Ok(true)
    } else if arg.eq_ignore_ascii_case(b"RIGHT") {
        Ok(false)
    } else {
        Err(HkvError::bad_options("syntax error"))
    }
}

fn optional_count(argv: &[Bin], idx: usize) -> HkvResult<Option<usize>> {
    argv.get(idx).map(|a| parse_usize(a)).transpose()
}

fn optional_usize(argv: &[Bin], idx: usize) -> HkvResult<Option<usize>> {
    argv.get(idx).map(|a| parse_usize(a)).transpose()
}

fn pairs_from(rest: &[Bin]) -> HkvResult<Vec<(Bin, Bin)>> {
    if rest.len() % 2 != 0 || rest.is_empty() {
        return Err(HkvError::bad_options("wrong number of arguments for 'hset' command"));
    }
    Ok(rest.chunks_exact(2).map(|c| (c[0].clone(), c[1].clone())).collect())
}

fn parse_zadd_flags(rest: &[Bin]) -> HkvResult<(ZaddFlags, &[Bin])> {
    let mut flags = ZaddFlags::default();
    let mut i = 0;
    while i < rest.len() {
        let token = &rest[i];
        if token.eq_ignore_ascii_case(b"NX") {
            flags.nx = true;
        } else if token.eq_ignore_ascii_case(b"XX") {
            flags.xx = true;
        } else if token.eq_ignore_ascii_case(b"GT") {
            flags.gt = true;
        } else if token.eq_ignore_ascii_case(b"LT") {
            flags.lt = true;
        } else if token.eq_ignore_ascii_case(b"CH") {
            flags.ch = true;
        } else if token.eq_ignore_ascii_case(b"INCR") {
            flags.incr = true;
        } else {
            break;
        }
        i += 1;
    }
    Ok((flags, &rest[i..]))
}

fn parse_score_member_pairs(rest: &[Bin]) -> HkvResult<Vec<(f64, Bin)>> {
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(HkvError::bad_options("wrong number of arguments for 'zadd' command"));
    }
    rest.chunks_exact(2).map(|c| Ok((parse_f64(&c[0])?, c[1].clone()))).collect()
}

fn parse_min_max(arg: &[u8]) -> HkvResult<bool> {
    if arg.eq_ignore_ascii_case(b"MAX") {
        Ok(true)
    } else if arg.eq_ignore_ascii_case(b"MIN") {
        Ok(false)
    } else {
        Err(HkvError::bad_options("syntax error"))
    }
}

fn parse_count_option(rest: &[Bin]) -> HkvResult<Option<usize>> {
    if rest.len() >= 2 && rest[0].eq_ignore_ascii_case(b"COUNT") {
        Ok(Some(parse_usize(&rest[1])?))
    } else {
        Ok(None)
    }
}

fn parse_limit_option(rest: &[Bin]) -> HkvResult<Option<usize>> {
    if rest.len() >= 2 && rest[0].eq_ignore_ascii_case(b"LIMIT") {
        Ok(Some(parse_usize(&rest[1])?))
    } else {
        Ok(None)
    }
}

/// Parses a ZRANGEBYSCORE-family bound: `-inf`/`+inf`, `(value` for
/// exclusive, or a bare value for inclusive.
fn parse_range_bound(arg: &[u8]) -> HkvResult<RangeBound> {
    if arg == b"-inf" {
        return Ok(RangeBound::UnboundedLow);
    }
    if arg == b"+inf" || arg == b"inf" {
        return Ok(RangeBound::UnboundedHigh);
    }
    if arg.first() == Some(&b'(') {
        Ok(RangeBound::Exclusive(parse_f64(&arg[1..])?))
    } else {
        Ok(RangeBound::Inclusive(parse_f64(arg)?))
    }
}

/// Parses a ZRANGEBYLEX-family bound: `-`/`+` for unbounded, `[value` for
/// inclusive, `(value` for exclusive.
fn parse_lex_bound(arg: &[u8]) -> HkvResult<LexBound> {
    match arg.first() {
        Some(&b'-') if arg.len() == 1 => Ok(LexBound::UnboundedLow),
        Some(&b'+') if arg.len() == 1 => Ok(LexBound::UnboundedHigh),
        Some(&b'[') => Ok(LexBound::Inclusive(arg[1..].to_vec())),
        Some(&b'(') => Ok(LexBound::Exclusive(arg[1..].to_vec())),
        _ => Err(HkvError::bad_options("min or max not valid string range item")),
    }
}

fn parse_limit(rest: &[Bin]) -> HkvResult<(usize, Option<usize>)> {
    for i in 0..rest.len() {
        if rest[i].eq_ignore_ascii_case(b"LIMIT") {
            let offset = parse_usize(rest.get(i + 1).ok_or_else(|| HkvError::bad_options("syntax error"))?)?;
            let count_raw = parse_i64(rest.get(i + 2).ok_or_else(|| HkvError::bad_options("syntax error"))?)?;
            let count = if count_raw < 0 { None } else { Some(count_raw as usize) };
            return Ok((offset, count));
        }
    }
    Ok((0, None))
}

fn parse_weights_aggregate(rest: &[Bin], numkeys: usize) -> HkvResult<(Vec<f64>, Aggregate)> {
    let mut weights = vec![1.0; numkeys];
    let mut agg = Aggregate::Sum;
    let mut i = 0;
    while i < rest.len() {
        if rest[i].eq_ignore_ascii_case(b"WEIGHTS") {
            for w in weights.iter_mut() {
                i += 1;
                *w = parse_f64(rest.get(i).ok_or_else(|| HkvError::bad_options("syntax error"))?)?;
            }
            i += 1;
        } else if rest[i].eq_ignore_ascii_case(b"AGGREGATE") {
            let kind = rest.get(i + 1).ok_or_else(|| HkvError::bad_options("syntax error"))?;
            agg = if kind.eq_ignore_ascii_case(b"MIN") {
                Aggregate::Min
            } else if kind.eq_ignore_ascii_case(b"MAX") {
                Aggregate::Max
            } else {
                Aggregate::Sum
            };
            i += 2;
        } else {
            i += 1;
        }
    }
    Ok((weights, agg))
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::time::Duration;

    use rkv_common::config::EvictionPolicy;

    use super::*;
    use crate::acl::Acl;
    use crate::keyspace::Keyspace;
    use crate::replication::StandaloneRaft;

    fn test_dispatcher() -> Arc<Dispatcher> {
        let keyspace = Arc::new(Keyspace::new(0, EvictionPolicy::NoEviction, Duration::from_millis(250)));
        let acl = Acl::new(false);
        let pubsub = Arc::new(PubSub::new());
        Arc::new_cyclic(|weak: &Weak<Dispatcher>| {
            let weak = weak.clone();
            let handler: crate::replication::ApplyHandler =
                Arc::new(move |argv, _replay| weak.upgrade().expect("dispatcher alive").apply_for_replay(argv));
            let raft = Arc::new(StandaloneRaft::new(keyspace.clone(), handler));
            Dispatcher {
                keyspace,
                acl,
                pubsub,
                raft,
                membership: None,
            }
        })
    }

    #[tokio::test]
    async fn set_then_get_through_execute() {
        let dispatcher = test_dispatcher();
        let set_argv = vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()];
        assert_eq!(dispatcher.execute(&set_argv, None, false).await, Reply::ok());

        let get_argv = vec![b"GET".to_vec(), b"k".to_vec()];
        assert_eq!(dispatcher.execute(&get_argv, None, false).await, Reply::bulk(b"v".to_vec()));
    }

    #[tokio::test]
    async fn unknown_command_is_an_error_reply() {
        let dispatcher = test_dispatcher();
        let argv = vec![b"NOSUCHCOMMAND".to_vec()];
        assert!(matches!(dispatcher.execute(&argv, None, false).await, Reply::Error { .. }));
    }

    #[tokio::test]
    async fn wrong_arity_is_rejected_before_dispatch() {
        let dispatcher = test_dispatcher();
        let argv = vec![b"GET".to_vec()];
        assert!(matches!(dispatcher.execute(&argv, None, false).await, Reply::Error { .. }));
    }

    #[tokio::test]
    async fn apply_for_replay_encodes_the_same_reply_as_execute() {
        let dispatcher = test_dispatcher();
        let set_argv = vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()];
        dispatcher.execute(&set_argv, None, false).await;

        let get_argv = vec![b"GET".to_vec(), b"k".to_vec()];
        let encoded = dispatcher.apply_for_replay(&get_argv).unwrap();
        let mut expected = Vec::new();
        encode_reply(&Reply::bulk(b"v".to_vec()), &mut expected);
        assert_eq!(encoded, expected);
    }
}
