//! Set commands: `SADD`, `SREM`, `SMEMBERS`, `SCARD`, `SISMEMBER`.

use bramble_core::Result;
use bramble_storage::TypedValue;
use bramble_wire::Reply;

use crate::dispatch::{HandlerContext, KeySpec};

use super::util::require_arity;

pub fn keys_write_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::write(argv[1].clone()))
}

pub fn keys_read_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::read(argv[1].clone()))
}

pub fn sadd(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let members = &argv[2..];
    let added = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_set, |v| {
        let set = v.as_set_mut()?;
        let mut added = 0i64;
        for member in members {
            if set.insert(member.clone()) {
                added += 1;
            }
        }
        Ok(added)
    })?;
    Ok(Reply::Int(added))
}

pub fn srem(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let members = &argv[2..];
    let removed = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
        let Some(entry) = entry else {
            return Ok(0i64);
        };
        let set = entry.value.as_set_mut()?;
        let mut removed = 0i64;
        for member in members {
            if set.remove(member.as_slice()) {
                removed += 1;
            }
        }
        Ok(removed)
    })?;
    Ok(Reply::Int(removed))
}

pub fn smembers(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => {
            let set = v.as_set()?;
            Ok(Reply::Set(set.iter().map(|m| Reply::Bulk(Some(m.clone()))).collect()))
        }
        None => Ok(Reply::Set(Vec::new())),
    }
}

pub fn scard(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_set()?.len() as i64)),
        None => Ok(Reply::Int(0)),
    }
}

pub fn sismember(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Bool(v.as_set()?.contains(argv[2].as_slice()))),
        None => Ok(Reply::Bool(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_core::{DbIndex, SystemClock};
    use bramble_storage::Keyspace;
    use std::sync::Arc;

    fn harness() -> Keyspace {
        Keyspace::new(4, Arc::new(SystemClock))
    }

    fn words(ws: &[&str]) -> Vec<Vec<u8>> {
        ws.iter().map(|w| w.as_bytes().to_vec()).collect()
    }

    #[test]
    fn sadd_counts_only_newly_added_members() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = sadd(&mut ctx, &words(&["SADD", "s", "a", "b", "a"])).unwrap();
        assert!(matches!(reply, Reply::Int(2)));
        let reply = sadd(&mut ctx, &words(&["SADD", "s", "a", "c"])).unwrap();
        assert!(matches!(reply, Reply::Int(1)));
    }

    #[test]
    fn srem_counts_only_present_members() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        sadd(&mut ctx, &words(&["SADD", "s", "a", "b"])).unwrap();
        let reply = srem(&mut ctx, &words(&["SREM", "s", "a", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Int(1)));
        assert!(matches!(scard(&mut ctx, &words(&["SCARD", "s"])).unwrap(), Reply::Int(1)));
    }

    #[test]
    fn sismember_reflects_membership() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        sadd(&mut ctx, &words(&["SADD", "s", "a"])).unwrap();
        assert!(matches!(sismember(&mut ctx, &words(&["SISMEMBER", "s", "a"])).unwrap(), Reply::Bool(true)));
        assert!(matches!(sismember(&mut ctx, &words(&["SISMEMBER", "s", "z"])).unwrap(), Reply::Bool(false)));
    }

    #[test]
    fn smembers_on_a_missing_key_is_an_empty_set() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = smembers(&mut ctx, &words(&["SMEMBERS", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Set(ref items) if items.is_empty()));
    }
}
