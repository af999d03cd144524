//! List commands: `LPUSH`/`RPUSH`, `LPOP`/`RPOP`, `LRANGE`, `LLEN`,
//! `LINDEX`, `LSET`, `LTRIM`, and `LREM`.

use bramble_core::{Error, Result};
use bramble_storage::TypedValue;
use bramble_wire::Reply;

use crate::dispatch::{HandlerContext, KeySpec};

use super::util::{parse_i64, require_arity, resolve_index};

pub fn keys_write_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::write(argv[1].clone()))
}

pub fn keys_read_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::read(argv[1].clone()))
}

fn push(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], front: bool) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let values = &argv[2..];
    let len = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_list, |v| {
        let list = v.as_list_mut()?;
        for value in values {
            if front {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        Ok(list.len())
    })?;
    Ok(Reply::Int(len as i64))
}

pub fn lpush(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    push(ctx, argv, true)
}

pub fn rpush(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    push(ctx, argv, false)
}

fn pop(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], front: bool) -> Result<Reply> {
    require_arity(argv, 2)?;
    let key = &argv[1];
    let count = if argv.len() > 2 {
        let n = parse_i64(&argv[2])?;
        if n < 0 {
            return Err(Error::validation("value is out of range, must be positive"));
        }
        Some(n as usize)
    } else {
        None
    };

    let popped: Vec<Vec<u8>> = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
        let Some(entry) = entry else {
            return Ok(Vec::new());
        };
        let list = entry.value.as_list_mut()?;
        let n = count.unwrap_or(1).min(list.len());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let item = if front { list.pop_front() } else { list.pop_back() };
            match item {
                Some(v) => out.push(v),
                None => break,
            }
        }
        Ok(out)
    })?;

    match count {
        None => Ok(Reply::Bulk(popped.into_iter().next())),
        Some(_) => {
            if popped.is_empty() {
                Ok(Reply::Array(None))
            } else {
                Ok(Reply::Array(Some(popped.into_iter().map(|v| Reply::Bulk(Some(v))).collect())))
            }
        }
    }
}

pub fn lpop(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    pop(ctx, argv, true)
}

pub fn rpop(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    pop(ctx, argv, false)
}

pub fn lrange(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;

    let Some(list) = ctx.keyspace.get_value(ctx.db, key) else {
        return Ok(Reply::Array(Some(Vec::new())));
    };
    let list = list.as_list()?;
    let len = list.len() as i64;
    if len == 0 {
        return Ok(Reply::Array(Some(Vec::new())));
    }
    let norm = |i: i64| -> i64 { if i < 0 { (len + i).max(0) } else { i } };
    let lo = norm(start).max(0);
    let hi = norm(stop).min(len - 1);
    if lo > hi {
        return Ok(Reply::Array(Some(Vec::new())));
    }
    let items = list
        .iter()
        .skip(lo as usize)
        .take((hi - lo + 1) as usize)
        .map(|v| Reply::Bulk(Some(v.clone())))
        .collect();
    Ok(Reply::Array(Some(items)))
}

pub fn llen(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_list()?.len() as i64)),
        None => Ok(Reply::Int(0)),
    }
}

pub fn lindex(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let idx = parse_i64(&argv[2])?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => {
            let list = v.as_list()?;
            match resolve_index(idx, list.len()) {
                Some(i) => Ok(Reply::Bulk(Some(list[i].clone()))),
                None => Ok(Reply::Null),
            }
        }
        None => Ok(Reply::Null),
    }
}

pub fn lset(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let idx = parse_i64(&argv[2])?;
    let value = argv[3].clone();
    ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
        let Some(entry) = entry else {
            return Err(Error::NotFound("no such key".into()));
        };
        let list = entry.value.as_list_mut()?;
        match resolve_index(idx, list.len()) {
            Some(i) => {
                list[i] = value;
                Ok(Reply::ok())
            }
            None => Err(Error::OutOfBounds("index out of range".into())),
        }
    })
}

pub fn ltrim(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
        let Some(entry) = entry else {
            return Ok(Reply::ok());
        };
        let list = entry.value.as_list_mut()?;
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Reply::ok());
        }
        let norm = |i: i64| -> i64 { if i < 0 { (len + i).max(0) } else { i } };
        let lo = norm(start).max(0);
        let hi = norm(stop).min(len - 1);
        if lo > hi {
            list.clear();
        } else {
            let kept: std::collections::VecDeque<Vec<u8>> = list
                .iter()
                .skip(lo as usize)
                .take((hi - lo + 1) as usize)
                .cloned()
                .collect();
            *list = kept;
        }
        Ok(Reply::ok())
    })
}

/// Remove the first `count` matches scanning front-to-back for a positive
/// count, or the last `count` matches scanning back-to-front for a negative
/// one, preserving the relative order of the elements that remain. A count
/// of zero removes every match.
fn remove_matches(list: &mut std::collections::VecDeque<Vec<u8>>, count: i64, target: &[u8]) -> usize {
    if count >= 0 {
        let limit = if count == 0 { usize::MAX } else { count as usize };
        let mut removed = 0;
        let mut kept = std::collections::VecDeque::with_capacity(list.len());
        for item in list.drain(..) {
            if removed < limit && item == target {
                removed += 1;
            } else {
                kept.push_back(item);
            }
        }
        *list = kept;
        removed
    } else {
        let limit = (-count) as usize;
        let mut removed = 0;
        let mut kept = std::collections::VecDeque::with_capacity(list.len());
        for item in list.drain(..).rev() {
            if removed < limit && item == target {
                removed += 1;
            } else {
                kept.push_front(item);
            }
        }
        *list = kept;
        removed
    }
}

pub fn lrem(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let count = parse_i64(&argv[2])?;
    let target = argv[3].clone();
    let removed = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
        let Some(entry) = entry else {
            return Ok(0usize);
        };
        let list = entry.value.as_list_mut()?;
        Ok(remove_matches(list, count, &target))
    })?;
    Ok(Reply::Int(removed as i64))
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

    fn replies_as_strings(reply: Reply) -> Vec<String> {
        match reply {
            Reply::Array(Some(items)) => items
                .into_iter()
                .map(|r| match r {
                    Reply::Bulk(Some(b)) => String::from_utf8(b).unwrap(),
                    other => panic!("unexpected reply: {other:?}"),
                })
                .collect(),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn lpush_and_rpush_order_elements_correctly() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        lpush(&mut ctx, &words(&["LPUSH", "l", "b", "a"])).unwrap();
        rpush(&mut ctx, &words(&["RPUSH", "l", "c"])).unwrap();
        let reply = lrange(&mut ctx, &words(&["LRANGE", "l", "0", "-1"])).unwrap();
        assert_eq!(replies_as_strings(reply), vec!["a", "b", "c"]);
    }

    #[test]
    fn lpop_with_count_returns_multiple_and_leaves_the_rest() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(&mut ctx, &words(&["RPUSH", "l", "a", "b", "c", "d"])).unwrap();
        let reply = lpop(&mut ctx, &words(&["LPOP", "l", "2"])).unwrap();
        assert_eq!(replies_as_strings(reply), vec!["a", "b"]);
        assert!(matches!(llen(&mut ctx, &words(&["LLEN", "l"])).unwrap(), Reply::Int(2)));
    }

    #[test]
    fn lpop_without_count_returns_a_single_bulk() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(&mut ctx, &words(&["RPUSH", "l", "only"])).unwrap();
        let reply = lpop(&mut ctx, &words(&["LPOP", "l"])).unwrap();
        assert!(matches!(reply, Reply::Bulk(Some(ref b)) if b == b"only"));
    }

    #[test]
    fn lpop_on_a_missing_key_is_nil() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = lpop(&mut ctx, &words(&["LPOP", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Bulk(None)));
    }

    #[test]
    fn lindex_resolves_negative_indices() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(&mut ctx, &words(&["RPUSH", "l", "a", "b", "c"])).unwrap();
        let reply = lindex(&mut ctx, &words(&["LINDEX", "l", "-1"])).unwrap();
        assert!(matches!(reply, Reply::Bulk(Some(ref b)) if b == b"c"));
    }

    #[test]
    fn lset_out_of_range_is_an_error() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(&mut ctx, &words(&["RPUSH", "l", "a"])).unwrap();
        let err = lset(&mut ctx, &words(&["LSET", "l", "5", "z"])).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds(_)));
    }

    #[test]
    fn ltrim_keeps_only_the_requested_range() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(&mut ctx, &words(&["RPUSH", "l", "a", "b", "c", "d"])).unwrap();
        ltrim(&mut ctx, &words(&["LTRIM", "l", "1", "2"])).unwrap();
        let reply = lrange(&mut ctx, &words(&["LRANGE", "l", "0", "-1"])).unwrap();
        assert_eq!(replies_as_strings(reply), vec!["b", "c"]);
    }

    #[test]
    fn lrem_positive_count_removes_from_the_front_scenario_s6() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(
            &mut ctx,
            &words(&["RPUSH", "l", "1", "2", "4", "4", "5", "6", "7", "4", "8", "4", "9", "10", "5", "4"]),
        )
        .unwrap();
        let reply = lrem(&mut ctx, &words(&["LREM", "l", "3", "4"])).unwrap();
        assert!(matches!(reply, Reply::Int(3)));
        let remaining = lrange(&mut ctx, &words(&["LRANGE", "l", "0", "-1"])).unwrap();
        assert_eq!(
            replies_as_strings(remaining),
            vec!["1", "2", "5", "6", "7", "4", "8", "4", "9", "10", "5", "4"]
        );
    }

    #[test]
    fn lrem_negative_count_removes_from_the_back_scenario_s6() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        rpush(
            &mut ctx,
            &words(&["RPUSH", "l", "1", "2", "4", "4", "5", "6", "7", "4", "8", "4", "9", "10", "5", "4"]),
        )
        .unwrap();
        let reply = lrem(&mut ctx, &words(&["LREM", "l", "-3", "4"])).unwrap();
        assert!(matches!(reply, Reply::Int(3)));
        let remaining = lrange(&mut ctx, &words(&["LRANGE", "l", "0", "-1"])).unwrap();
        assert_eq!(
            replies_as_strings(remaining),
            vec!["1", "2", "4", "4", "5", "6", "7", "8", "9", "10", "5"]
        );
    }
}
