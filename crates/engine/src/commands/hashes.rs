//! Hash commands: `HSET`, `HGET`, `HDEL`, `HGETALL`, `HEXISTS`, `HLEN`.

use bramble_core::{Error, Result};
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

pub fn hset(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    if (argv.len() - 2) % 2 != 0 {
        return Err(Error::validation("wrong number of arguments for 'hset' command"));
    }
    let key = &argv[1];
    let pairs = &argv[2..];
    let added = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_hash, |v| {
        let hash = v.as_hash_mut()?;
        let mut added = 0i64;
        for chunk in pairs.chunks_exact(2) {
            if hash.insert(chunk[0].clone(), chunk[1].clone()).is_none() {
                added += 1;
            }
        }
        Ok(added)
    })?;
    Ok(Reply::Int(added))
}

pub fn hget(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Bulk(v.as_hash()?.get(argv[2].as_slice()).cloned())),
        None => Ok(Reply::Null),
    }
}

pub fn hdel(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let fields = &argv[2..];
    let removed = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
        let Some(entry) = entry else {
            return Ok(0i64);
        };
        let hash = entry.value.as_hash_mut()?;
        let mut removed = 0i64;
        for field in fields {
            if hash.remove(field.as_slice()).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    })?;
    Ok(Reply::Int(removed))
}

pub fn hgetall(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => {
            let hash = v.as_hash()?;
            let pairs = hash
                .iter()
                .map(|(k, val)| (Reply::Bulk(Some(k.clone())), Reply::Bulk(Some(val.clone()))))
                .collect();
            Ok(Reply::Map(pairs))
        }
        None => Ok(Reply::Map(Vec::new())),
    }
}

pub fn hexists(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Bool(v.as_hash()?.contains_key(argv[2].as_slice()))),
        None => Ok(Reply::Bool(false)),
    }
}

pub fn hlen(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_hash()?.len() as i64)),
        None => Ok(Reply::Int(0)),
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
    fn hset_counts_only_newly_added_fields() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = hset(&mut ctx, &words(&["HSET", "h", "f1", "v1", "f2", "v2"])).unwrap();
        assert!(matches!(reply, Reply::Int(2)));
        let reply = hset(&mut ctx, &words(&["HSET", "h", "f1", "updated"])).unwrap();
        assert!(matches!(reply, Reply::Int(0)));
        let value = hget(&mut ctx, &words(&["HGET", "h", "f1"])).unwrap();
        assert!(matches!(value, Reply::Bulk(Some(ref b)) if b == b"updated"));
    }

    #[test]
    fn hset_rejects_an_unpaired_field() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let err = hset(&mut ctx, &words(&["HSET", "h", "f1", "v1", "f2"])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn hdel_counts_only_present_fields() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        hset(&mut ctx, &words(&["HSET", "h", "f1", "v1", "f2", "v2"])).unwrap();
        let reply = hdel(&mut ctx, &words(&["HDEL", "h", "f1", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Int(1)));
        assert!(matches!(hlen(&mut ctx, &words(&["HLEN", "h"])).unwrap(), Reply::Int(1)));
    }

    #[test]
    fn hgetall_on_a_missing_key_is_an_empty_map() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = hgetall(&mut ctx, &words(&["HGETALL", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Map(ref pairs) if pairs.is_empty()));
    }

    #[test]
    fn hexists_reflects_field_presence() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        hset(&mut ctx, &words(&["HSET", "h", "f1", "v1"])).unwrap();
        assert!(matches!(hexists(&mut ctx, &words(&["HEXISTS", "h", "f1"])).unwrap(), Reply::Bool(true)));
        assert!(matches!(hexists(&mut ctx, &words(&["HEXISTS", "h", "missing"])).unwrap(), Reply::Bool(false)));
    }
}
