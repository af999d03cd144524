//! Generic keyspace introspection and expiry commands: `DEL`, `EXISTS`,
//! `TYPE`, `OBJECT ENCODING`, the `EXPIRE` family, the `TTL` family,
//! `PERSIST`, and the database-wide `DBSIZE`/`FLUSHDB`/`RANDOMKEY`/`PING`/
//! `ECHO` commands a complete dispatch table carries alongside them.

use std::time::{Duration, Instant};

use bramble_core::{Error, Result};
use bramble_storage::ExpiryFlags;
use bramble_wire::Reply;

use crate::dispatch::{HandlerContext, KeySpec};

use super::util::{parse_i64, require_arity, token_is};

pub fn keys_none(_argv: &[Vec<u8>]) -> Result<KeySpec> {
    Ok(KeySpec::none())
}

pub fn keys_read_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::read(argv[1].clone()))
}

pub fn keys_write_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::write(argv[1].clone()))
}

pub fn keys_del(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::writes(argv[1..].iter().cloned()))
}

pub fn keys_read_all(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::reads(argv[1..].iter().cloned()))
}

/// `OBJECT <subcommand> key`: the key sits one position later than a plain
/// single-key command because of the subcommand token.
pub fn keys_read_one_skip_subcommand(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 3)?;
    Ok(KeySpec::read(argv[2].clone()))
}

pub fn ping(_ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    match argv.len() {
        1 => Ok(Reply::Simple("PONG".to_string())),
        2 => Ok(Reply::Bulk(Some(argv[1].clone()))),
        _ => Err(Error::validation("wrong number of arguments for 'ping' command")),
    }
}

pub fn echo(_ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    Ok(Reply::Bulk(Some(argv[1].clone())))
}

pub fn del(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    let mut deleted = 0i64;
    for key in &argv[1..] {
        if ctx.keyspace.delete_key(ctx.db, key) {
            deleted += 1;
        }
    }
    Ok(Reply::Int(deleted))
}

pub fn exists(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    let mut count = 0i64;
    for key in &argv[1..] {
        if ctx.keyspace.key_exists(ctx.db, key) {
            count += 1;
        }
    }
    Ok(Reply::Int(count))
}

pub fn type_cmd(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Simple(v.type_name().to_string())),
        None => Ok(Reply::Simple("none".to_string())),
    }
}

/// `OBJECT ENCODING key`: a simplified mapping from `TypedValue` tag (and,
/// for strings, content) to the encoding name Redis clients expect. Not a
/// full internal-encoding-transition model (listpack/intset promotion
/// thresholds, etc.) — just enough for clients that branch on the reply.
pub fn object(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    if !token_is(&argv[1], "ENCODING") {
        return Err(Error::validation("syntax error"));
    }
    let Some(value) = ctx.keyspace.get_value(ctx.db, &argv[2]) else {
        return Err(Error::NotFound("no such key".into()));
    };
    let encoding = match &value {
        bramble_storage::TypedValue::Str(b) => {
            if std::str::from_utf8(b).ok().and_then(|s| s.parse::<i64>().ok()).is_some() {
                "int"
            } else if b.len() <= 44 {
                "embstr"
            } else {
                "raw"
            }
        }
        bramble_storage::TypedValue::List(_) => "listpack",
        bramble_storage::TypedValue::Set(_) => "hashtable",
        bramble_storage::TypedValue::Hash(_) => "hashtable",
        bramble_storage::TypedValue::SortedSet(_) => "skiplist",
    };
    Ok(Reply::Bulk(Some(encoding.as_bytes().to_vec())))
}

fn parse_expiry_flags(tokens: &[Vec<u8>]) -> Result<ExpiryFlags> {
    let mut flags = ExpiryFlags::default();
    for token in tokens {
        if token_is(token, "NX") {
            flags.nx = true;
        } else if token_is(token, "XX") {
            flags.xx = true;
        } else if token_is(token, "GT") {
            flags.gt = true;
        } else if token_is(token, "LT") {
            flags.lt = true;
        } else {
            return Err(Error::validation("Unsupported option"));
        }
    }
    flags.validate()?;
    Ok(flags)
}

/// Resolve a relative or absolute millisecond delta from `now` into an
/// absolute instant, clamping rather than underflowing when the target
/// would fall before the process's monotonic epoch.
fn offset_instant(now: Instant, delta_millis: i64) -> Instant {
    if delta_millis >= 0 {
        now + Duration::from_millis(delta_millis as u64)
    } else {
        now.checked_sub(Duration::from_millis((-delta_millis) as u64))
            .unwrap_or(now)
    }
}

fn do_expire(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], millis_per_unit: i64, absolute: bool) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let amount = parse_i64(&argv[2])?;
    let flags = parse_expiry_flags(&argv[3..])?;

    let now = ctx.keyspace.clock().now();
    let when = if absolute {
        let now_millis = ctx.keyspace.clock().now_millis();
        let target_millis = amount.saturating_mul(millis_per_unit);
        offset_instant(now, target_millis.saturating_sub(now_millis))
    } else {
        offset_instant(now, amount.saturating_mul(millis_per_unit))
    };

    let changed = ctx.keyspace.set_expiry(ctx.db, key, when, flags)?;
    Ok(Reply::Int(i64::from(changed)))
}

pub fn expire(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    do_expire(ctx, argv, 1000, false)
}

pub fn pexpire(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    do_expire(ctx, argv, 1, false)
}

pub fn expireat(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    do_expire(ctx, argv, 1000, true)
}

pub fn pexpireat(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    do_expire(ctx, argv, 1, true)
}

pub fn ttl(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    if !ctx.keyspace.key_exists(ctx.db, &argv[1]) {
        return Ok(Reply::Int(-2));
    }
    match ctx.keyspace.get_expiry(ctx.db, &argv[1]) {
        None => Ok(Reply::Int(-1)),
        Some(at) => {
            let now = ctx.keyspace.clock().now();
            Ok(Reply::Int(at.saturating_duration_since(now).as_secs() as i64))
        }
    }
}

pub fn pttl(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    if !ctx.keyspace.key_exists(ctx.db, &argv[1]) {
        return Ok(Reply::Int(-2));
    }
    match ctx.keyspace.get_expiry(ctx.db, &argv[1]) {
        None => Ok(Reply::Int(-1)),
        Some(at) => {
            let now = ctx.keyspace.clock().now();
            Ok(Reply::Int(at.saturating_duration_since(now).as_millis() as i64))
        }
    }
}

fn epoch_millis_of(ctx: &HandlerContext<'_>, at: Instant) -> i64 {
    let now = ctx.keyspace.clock().now();
    let now_millis = ctx.keyspace.clock().now_millis();
    now_millis + at.saturating_duration_since(now).as_millis() as i64
}

pub fn expiretime(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    if !ctx.keyspace.key_exists(ctx.db, &argv[1]) {
        return Ok(Reply::Int(-2));
    }
    match ctx.keyspace.get_expiry(ctx.db, &argv[1]) {
        None => Ok(Reply::Int(-1)),
        Some(at) => Ok(Reply::Int(epoch_millis_of(ctx, at) / 1000)),
    }
}

pub fn pexpiretime(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    if !ctx.keyspace.key_exists(ctx.db, &argv[1]) {
        return Ok(Reply::Int(-2));
    }
    match ctx.keyspace.get_expiry(ctx.db, &argv[1]) {
        None => Ok(Reply::Int(-1)),
        Some(at) => Ok(Reply::Int(epoch_millis_of(ctx, at))),
    }
}

pub fn persist(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    Ok(Reply::Int(i64::from(ctx.keyspace.persist(ctx.db, &argv[1]))))
}

pub fn dbsize(ctx: &mut HandlerContext<'_>, _argv: &[Vec<u8>]) -> Result<Reply> {
    Ok(Reply::Int(ctx.keyspace.dbsize(ctx.db) as i64))
}

pub fn flushdb(ctx: &mut HandlerContext<'_>, _argv: &[Vec<u8>]) -> Result<Reply> {
    ctx.keyspace.flushdb(ctx.db);
    Ok(Reply::ok())
}

pub fn randomkey(ctx: &mut HandlerContext<'_>, _argv: &[Vec<u8>]) -> Result<Reply> {
    Ok(Reply::Bulk(ctx.keyspace.randomkey(ctx.db)))
}

/// `SELECT index`: validates the requested database is in range. The
/// handler itself has no connection to switch — `ctx.db` is whatever the
/// caller already resolved for this invocation — so the actual "current
/// database" state is tracked by whoever drives the dispatcher one command
/// at a time (the per-connection loop, or the AOF replay cursor), which
/// reads this success and updates its own index afterward.
pub fn select(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    let index = parse_i64(&argv[1])?;
    if index < 0 || index >= i64::from(ctx.keyspace.num_databases()) {
        return Err(Error::validation("DB index is out of range"));
    }
    Ok(Reply::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_core::{DbIndex, SystemClock};
    use bramble_storage::{Keyspace, TypedValue};
    use std::sync::Arc;

    fn harness() -> Keyspace {
        Keyspace::new(4, Arc::new(SystemClock))
    }

    fn words(ws: &[&str]) -> Vec<Vec<u8>> {
        ws.iter().map(|w| w.as_bytes().to_vec()).collect()
    }

    #[test]
    fn del_counts_only_existing_keys() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"a", TypedValue::Str(b"1".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = del(&mut ctx, &words(&["DEL", "a", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Int(1)));
        assert!(!ks.key_exists(DbIndex(0), b"a"));
    }

    #[test]
    fn exists_counts_duplicates() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"a", TypedValue::Str(b"1".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = exists(&mut ctx, &words(&["EXISTS", "a", "a", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Int(2)));
    }

    #[test]
    fn type_cmd_reports_none_for_missing_key() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = type_cmd(&mut ctx, &words(&["TYPE", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Simple(ref s) if s == "none"));
    }

    #[test]
    fn object_encoding_reports_int_for_numeric_strings() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"n", TypedValue::Str(b"42".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = object(&mut ctx, &words(&["OBJECT", "ENCODING", "n"])).unwrap();
        assert!(matches!(reply, Reply::Bulk(Some(ref b)) if b == b"int"));
    }

    #[test]
    fn object_encoding_missing_key_is_not_found() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let err = object(&mut ctx, &words(&["OBJECT", "ENCODING", "missing"])).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn expire_then_ttl_reports_a_positive_countdown() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = expire(&mut ctx, &words(&["EXPIRE", "k", "100"])).unwrap();
        assert!(matches!(reply, Reply::Int(1)));
        let ttl_reply = ttl(&mut ctx, &words(&["TTL", "k"])).unwrap();
        match ttl_reply {
            Reply::Int(seconds) => assert!((0..=100).contains(&seconds)),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn ttl_on_a_key_with_no_expiry_is_negative_one() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = ttl(&mut ctx, &words(&["TTL", "k"])).unwrap();
        assert!(matches!(reply, Reply::Int(-1)));
    }

    #[test]
    fn ttl_on_a_missing_key_is_negative_two() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = ttl(&mut ctx, &words(&["TTL", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Int(-2)));
    }

    #[test]
    fn persist_clears_an_existing_expiry() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        expire(&mut ctx, &words(&["EXPIRE", "k", "100"])).unwrap();
        let reply = persist(&mut ctx, &words(&["PERSIST", "k"])).unwrap();
        assert!(matches!(reply, Reply::Int(1)));
        let ttl_reply = ttl(&mut ctx, &words(&["TTL", "k"])).unwrap();
        assert!(matches!(ttl_reply, Reply::Int(-1)));
    }

    #[test]
    fn flushdb_only_empties_the_targeted_database() {
        let ks = harness();
        ks.set_value(DbIndex(0), b"a", TypedValue::Str(b"1".to_vec()));
        ks.set_value(DbIndex(1), b"b", TypedValue::Str(b"2".to_vec()));
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        flushdb(&mut ctx, &words(&["FLUSHDB"])).unwrap();
        assert_eq!(ks.dbsize(DbIndex(0)), 0);
        assert_eq!(ks.dbsize(DbIndex(1)), 1);
    }

    #[test]
    fn select_rejects_an_out_of_range_index() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let err = select(&mut ctx, &words(&["SELECT", "99"])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let reply = select(&mut ctx, &words(&["SELECT", "1"])).unwrap();
        assert!(matches!(reply, Reply::Simple(ref s) if s == "OK"));
    }
}
