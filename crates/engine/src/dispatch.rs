//! The command registry (component C7): a static table mapping canonical
//! command names to a descriptor pairing key extraction with a handler,
//! built once at first use via [`once_cell::sync::Lazy`] rather than any
//! runtime registration step.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use bramble_concurrency::LockContext;
use bramble_core::{DbIndex, Error, Result};
use bramble_storage::Keyspace;
use bramble_wire::Reply;

use crate::commands::{generic, hashes, lists, sets, strings, zsets};

/// The keys a command's argument list resolves to, split by whether the
/// command only reads them or may create/mutate/delete them. Computed
/// before any lock is taken so the caller knows exactly what to lock.
#[derive(Debug, Default, Clone)]
pub struct KeySpec {
    /// Keys this invocation only reads.
    pub read_keys: Vec<Vec<u8>>,
    /// Keys this invocation may create, mutate, or delete.
    pub write_keys: Vec<Vec<u8>>,
}

impl KeySpec {
    /// No keys at all (`PING`, `DBSIZE`, `FLUSHDB`, ...).
    pub fn none() -> Self {
        KeySpec::default()
    }

    /// A single read-only key.
    pub fn read(key: impl Into<Vec<u8>>) -> Self {
        KeySpec {
            read_keys: vec![key.into()],
            write_keys: Vec::new(),
        }
    }

    /// A single write key.
    pub fn write(key: impl Into<Vec<u8>>) -> Self {
        KeySpec {
            read_keys: Vec::new(),
            write_keys: vec![key.into()],
        }
    }

    /// Several read-only keys.
    pub fn reads(keys: impl IntoIterator<Item = Vec<u8>>) -> Self {
        KeySpec {
            read_keys: keys.into_iter().collect(),
            write_keys: Vec::new(),
        }
    }

    /// Several write keys.
    pub fn writes(keys: impl IntoIterator<Item = Vec<u8>>) -> Self {
        KeySpec {
            read_keys: Vec::new(),
            write_keys: keys.into_iter().collect(),
        }
    }
}

/// Per-invocation state handed to a handler: which database it targets,
/// the keyspace to operate against, and the lock context the dispatcher
/// already populated per this command's [`KeySpec`].
pub struct HandlerContext<'a> {
    /// The database this command targets.
    pub db: DbIndex,
    /// The keyspace engine.
    pub keyspace: &'a Keyspace,
    /// The already-acquired lock scope for this command's keys.
    pub locks: &'a mut LockContext<'a>,
}

type KeyExtractFn = fn(&[Vec<u8>]) -> Result<KeySpec>;
type HandlerFn = fn(&mut HandlerContext<'_>, &[Vec<u8>]) -> Result<Reply>;

/// A registered command: its canonical name, its key-extraction function,
/// and its handler.
pub struct Command {
    /// Canonical uppercase name (`"GET"`, `"ZADD"`, ...).
    pub name: &'static str,
    /// Computes which keys this invocation reads/writes, before locking.
    pub key_extraction_fn: KeyExtractFn,
    /// Executes the command against an already-locked [`HandlerContext`].
    pub handler_fn: HandlerFn,
}

macro_rules! command {
    ($name:literal, $keys:path, $handler:path) => {
        Command {
            name: $name,
            key_extraction_fn: $keys,
            handler_fn: $handler,
        }
    };
}

static REGISTRY: Lazy<HashMap<&'static str, Command>> = Lazy::new(|| {
    let commands = vec![
        command!("PING", generic::keys_none, generic::ping),
        command!("ECHO", generic::keys_none, generic::echo),
        command!("DEL", generic::keys_del, generic::del),
        command!("EXISTS", generic::keys_read_all, generic::exists),
        command!("TYPE", generic::keys_read_one, generic::type_cmd),
        command!("OBJECT", generic::keys_read_one_skip_subcommand, generic::object),
        command!("EXPIRE", generic::keys_write_one, generic::expire),
        command!("PEXPIRE", generic::keys_write_one, generic::pexpire),
        command!("EXPIREAT", generic::keys_write_one, generic::expireat),
        command!("PEXPIREAT", generic::keys_write_one, generic::pexpireat),
        command!("TTL", generic::keys_read_one, generic::ttl),
        command!("PTTL", generic::keys_read_one, generic::pttl),
        command!("EXPIRETIME", generic::keys_read_one, generic::expiretime),
        command!("PEXPIRETIME", generic::keys_read_one, generic::pexpiretime),
        command!("PERSIST", generic::keys_write_one, generic::persist),
        command!("DBSIZE", generic::keys_none, generic::dbsize),
        command!("FLUSHDB", generic::keys_none, generic::flushdb),
        command!("RANDOMKEY", generic::keys_none, generic::randomkey),
        command!("SELECT", generic::keys_none, generic::select),
        command!("SET", strings::keys_write_one, strings::set),
        command!("GET", strings::keys_read_one, strings::get),
        command!("GETSET", strings::keys_write_one, strings::getset),
        command!("APPEND", strings::keys_write_one, strings::append),
        command!("STRLEN", strings::keys_read_one, strings::strlen),
        command!("INCR", strings::keys_write_one, strings::incr),
        command!("DECR", strings::keys_write_one, strings::decr),
        command!("INCRBY", strings::keys_write_one, strings::incrby),
        command!("DECRBY", strings::keys_write_one, strings::decrby),
        command!("INCRBYFLOAT", strings::keys_write_one, strings::incrbyfloat),
        command!("LPUSH", lists::keys_write_one, lists::lpush),
        command!("RPUSH", lists::keys_write_one, lists::rpush),
        command!("LPOP", lists::keys_write_one, lists::lpop),
        command!("RPOP", lists::keys_write_one, lists::rpop),
        command!("LRANGE", lists::keys_read_one, lists::lrange),
        command!("LLEN", lists::keys_read_one, lists::llen),
        command!("LINDEX", lists::keys_read_one, lists::lindex),
        command!("LSET", lists::keys_write_one, lists::lset),
        command!("LTRIM", lists::keys_write_one, lists::ltrim),
        command!("LREM", lists::keys_write_one, lists::lrem),
        command!("SADD", sets::keys_write_one, sets::sadd),
        command!("SREM", sets::keys_write_one, sets::srem),
        command!("SMEMBERS", sets::keys_read_one, sets::smembers),
        command!("SCARD", sets::keys_read_one, sets::scard),
        command!("SISMEMBER", sets::keys_read_one, sets::sismember),
        command!("HSET", hashes::keys_write_one, hashes::hset),
        command!("HGET", hashes::keys_read_one, hashes::hget),
        command!("HDEL", hashes::keys_write_one, hashes::hdel),
        command!("HGETALL", hashes::keys_read_one, hashes::hgetall),
        command!("HEXISTS", hashes::keys_read_one, hashes::hexists),
        command!("HLEN", hashes::keys_read_one, hashes::hlen),
        command!("ZADD", zsets::keys_write_one, zsets::zadd),
        command!("ZINCRBY", zsets::keys_write_one, zsets::zincrby),
        command!("ZSCORE", zsets::keys_read_one, zsets::zscore),
        command!("ZMSCORE", zsets::keys_read_one, zsets::zmscore),
        command!("ZRANK", zsets::keys_read_one, zsets::zrank),
        command!("ZREVRANK", zsets::keys_read_one, zsets::zrevrank),
        command!("ZCARD", zsets::keys_read_one, zsets::zcard),
        command!("ZCOUNT", zsets::keys_read_one, zsets::zcount),
        command!("ZLEXCOUNT", zsets::keys_read_one, zsets::zlexcount),
        command!("ZRANGE", zsets::keys_read_one, zsets::zrange),
        command!("ZREVRANGE", zsets::keys_read_one, zsets::zrevrange),
        command!("ZRANGEBYSCORE", zsets::keys_read_one, zsets::zrangebyscore),
        command!("ZREVRANGEBYSCORE", zsets::keys_read_one, zsets::zrevrangebyscore),
        command!("ZRANGEBYLEX", zsets::keys_read_one, zsets::zrangebylex),
        command!("ZREVRANGEBYLEX", zsets::keys_read_one, zsets::zrevrangebylex),
        command!("ZPOPMIN", zsets::keys_write_one, zsets::zpopmin),
        command!("ZPOPMAX", zsets::keys_write_one, zsets::zpopmax),
        command!("ZMPOP", zsets::keys_zmpop, zsets::zmpop),
        command!("ZREMRANGEBYRANK", zsets::keys_write_one, zsets::zremrangebyrank),
        command!("ZREMRANGEBYSCORE", zsets::keys_write_one, zsets::zremrangebyscore),
        command!("ZREMRANGEBYLEX", zsets::keys_write_one, zsets::zremrangebylex),
        command!("ZDIFF", zsets::keys_zset_algebra_read, zsets::zdiff),
        command!("ZINTER", zsets::keys_zset_algebra_read, zsets::zinter),
        command!("ZUNION", zsets::keys_zset_algebra_read, zsets::zunion),
        command!("ZDIFFSTORE", zsets::keys_zset_algebra_store, zsets::zdiffstore),
        command!("ZINTERSTORE", zsets::keys_zset_algebra_store, zsets::zinterstore),
        command!("ZUNIONSTORE", zsets::keys_zset_algebra_store, zsets::zunionstore),
    ];
    commands.into_iter().map(|c| (c.name, c)).collect()
});

/// Look up a command by its (case-insensitive) name. Returns `None` for an
/// unknown command; the caller turns that into the conventional "unknown
/// command" RESP error.
pub fn lookup(name: &[u8]) -> Option<&'static Command> {
    let upper = String::from_utf8_lossy(name).to_ascii_uppercase();
    REGISTRY.get(upper.as_str())
}

/// The canonical "unknown command" validation error.
pub fn unknown_command_error(argv: &[Vec<u8>]) -> Error {
    Error::validation(format!(
        "unknown command '{}'",
        String::from_utf8_lossy(&argv[0])
    ))
}
