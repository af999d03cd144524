//! Sorted-set commands: `ZADD` through the `ZDIFF`/`ZINTER`/`ZUNION`
//! weighted-algebra family and their `...STORE` variants.

use bramble_core::{Error, Result};
use bramble_storage::TypedValue;
use bramble_wire::Reply;
use bramble_zset::{diff, inter, resolve_weights, union, AddFlags, Aggregate, LexRange, Limit, ScoreRange, SortedSet};

use crate::dispatch::{HandlerContext, KeySpec};

use super::util::{parse_f64, parse_i64, require_arity, token_is};

pub fn keys_write_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::write(argv[1].clone()))
}

pub fn keys_read_one(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 2)?;
    Ok(KeySpec::read(argv[1].clone()))
}

/// `ZMPOP numkeys key [key ...] MIN|MAX [COUNT count]`: every named key is a
/// write key, since whichever holds the winning member gets popped.
pub fn keys_zmpop(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 4)?;
    let numkeys = parse_i64(&argv[1])?;
    if numkeys <= 0 {
        return Err(Error::validation("numkeys should be greater than 0"));
    }
    let numkeys = numkeys as usize;
    require_arity(argv, 2 + numkeys + 1)?;
    Ok(KeySpec::writes(argv[2..2 + numkeys].iter().cloned()))
}

/// `Z{DIFF,INTER,UNION} numkeys key [key ...] ...`: all source keys are
/// read-only.
pub fn keys_zset_algebra_read(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 3)?;
    let numkeys = parse_i64(&argv[1])?;
    if numkeys <= 0 {
        return Err(Error::validation("numkeys should be greater than 0"));
    }
    let numkeys = numkeys as usize;
    require_arity(argv, 2 + numkeys)?;
    Ok(KeySpec::reads(argv[2..2 + numkeys].iter().cloned()))
}

/// `Z{DIFF,INTER,UNION}STORE dest numkeys key [key ...] ...`: `dest` is
/// written, the sources are only read.
pub fn keys_zset_algebra_store(argv: &[Vec<u8>]) -> Result<KeySpec> {
    require_arity(argv, 4)?;
    let numkeys = parse_i64(&argv[2])?;
    if numkeys <= 0 {
        return Err(Error::validation("numkeys should be greater than 0"));
    }
    let numkeys = numkeys as usize;
    require_arity(argv, 3 + numkeys)?;
    Ok(KeySpec {
        read_keys: argv[3..3 + numkeys].to_vec(),
        write_keys: vec![argv[1].clone()],
    })
}

fn score_token(token: &[u8]) -> Result<&str> {
    std::str::from_utf8(token).map_err(|_| Error::validation("value is not a valid float"))
}

fn member_reply(member: &[u8], score: f64, with_scores: bool) -> Vec<Reply> {
    if with_scores {
        vec![Reply::Bulk(Some(member.to_vec())), Reply::Double(score)]
    } else {
        vec![Reply::Bulk(Some(member.to_vec()))]
    }
}

fn flat_reply(pairs: Vec<(Vec<u8>, f64)>, with_scores: bool) -> Reply {
    let items = pairs
        .into_iter()
        .flat_map(|(m, s)| member_reply(&m, s, with_scores))
        .collect();
    Reply::Array(Some(items))
}

/// `ZADD key [NX|XX] [GT|LT] [CH] [INCR] score member [score member ...]`.
pub fn zadd(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let mut flags = AddFlags::default();
    let mut incr = false;
    let mut i = 2;
    while i < argv.len() {
        let tok = &argv[i];
        if token_is(tok, "NX") {
            flags.nx = true;
        } else if token_is(tok, "XX") {
            flags.xx = true;
        } else if token_is(tok, "GT") {
            flags.gt = true;
        } else if token_is(tok, "LT") {
            flags.lt = true;
        } else if token_is(tok, "CH") {
            flags.ch = true;
        } else if token_is(tok, "INCR") {
            incr = true;
        } else {
            break;
        }
        i += 1;
    }
    flags.validate()?;
    let rest = &argv[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(Error::validation("syntax error"));
    }
    if incr && rest.len() != 2 {
        return Err(Error::validation("INCR option supports a single increment-element pair"));
    }

    let mut items = Vec::with_capacity(rest.len() / 2);
    for chunk in rest.chunks_exact(2) {
        let score = parse_f64(&chunk[0])?;
        items.push((score, chunk[1].clone()));
    }

    if incr {
        let (delta, member) = items.into_iter().next().unwrap();
        let result = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_sorted_set, |v| {
            v.as_sorted_set_mut()?.incr(member, delta, &flags)
        })?;
        return Ok(match result {
            Some(score) => Reply::Double(score),
            None => Reply::Null,
        });
    }

    let n = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_sorted_set, |v| {
        v.as_sorted_set_mut()?.add_many(items, &flags)
    })?;
    Ok(Reply::Int(n as i64))
}

pub fn zincrby(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let delta = parse_f64(&argv[2])?;
    let member = argv[3].clone();
    let score = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_sorted_set, |v| {
        v.as_sorted_set_mut()?.incr(member, delta, &AddFlags::default())
    })?;
    Ok(Reply::Double(score.unwrap_or(0.0)))
}

pub fn zscore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => match v.as_sorted_set()?.score(&argv[2]) {
            Some(s) => Ok(Reply::Double(s)),
            None => Ok(Reply::Null),
        },
        None => Ok(Reply::Null),
    }
}

pub fn zmscore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let set = ctx.keyspace.get_value(ctx.db, &argv[1]);
    let items = match set {
        Some(v) => {
            let zset = v.as_sorted_set()?;
            argv[2..]
                .iter()
                .map(|m| match zset.score(m) {
                    Some(s) => Reply::Double(s),
                    None => Reply::Null,
                })
                .collect()
        }
        None => argv[2..].iter().map(|_| Reply::Null).collect(),
    };
    Ok(Reply::Array(Some(items)))
}

fn rank(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], rev: bool) -> Result<Reply> {
    require_arity(argv, 3)?;
    let with_score = argv.len() > 3 && token_is(&argv[3], "WITHSCORE");
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => {
            let zset = v.as_sorted_set()?;
            match zset.rank(&argv[2], rev) {
                Some(r) if with_score => {
                    let score = zset.score(&argv[2]).unwrap_or(0.0);
                    Ok(Reply::Array(Some(vec![Reply::Int(r as i64), Reply::Double(score)])))
                }
                Some(r) => Ok(Reply::Int(r as i64)),
                None => Ok(Reply::Null),
            }
        }
        None => Ok(Reply::Null),
    }
}

pub fn zrank(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    rank(ctx, argv, false)
}

pub fn zrevrank(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    rank(ctx, argv, true)
}

pub fn zcard(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_sorted_set()?.len() as i64)),
        None => Ok(Reply::Int(0)),
    }
}

pub fn zcount(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let range = ScoreRange::parse(score_token(&argv[2])?, score_token(&argv[3])?)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_sorted_set()?.count_by_score(&range) as i64)),
        None => Ok(Reply::Int(0)),
    }
}

pub fn zlexcount(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let range = LexRange::parse(&argv[2], &argv[3])?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_sorted_set()?.count_by_lex(&range) as i64)),
        None => Ok(Reply::Int(0)),
    }
}

fn parse_limit(argv: &[Vec<u8>], mut i: usize) -> Result<(Limit, usize)> {
    if i < argv.len() && token_is(&argv[i], "LIMIT") {
        if i + 2 >= argv.len() {
            return Err(Error::validation("syntax error"));
        }
        let offset = parse_i64(&argv[i + 1])?;
        let count = parse_i64(&argv[i + 2])?;
        i += 3;
        Ok((Limit::new(offset, count)?, i))
    } else {
        Ok((Limit::unbounded(), i))
    }
}

/// `ZRANGE key start stop [BYSCORE|BYLEX] [REV] [LIMIT offset count] [WITHSCORES]`.
pub fn zrange(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let key = &argv[1];
    let mut by_score = false;
    let mut by_lex = false;
    let mut rev = false;
    let mut with_scores = false;
    let mut i = 4;
    let mut limit = Limit::unbounded();
    while i < argv.len() {
        if token_is(&argv[i], "BYSCORE") {
            by_score = true;
            i += 1;
        } else if token_is(&argv[i], "BYLEX") {
            by_lex = true;
            i += 1;
        } else if token_is(&argv[i], "REV") {
            rev = true;
            i += 1;
        } else if token_is(&argv[i], "WITHSCORES") {
            with_scores = true;
            i += 1;
        } else if token_is(&argv[i], "LIMIT") {
            let (l, next) = parse_limit(argv, i)?;
            limit = l;
            i = next;
        } else {
            return Err(Error::validation("syntax error"));
        }
    }
    if by_score && by_lex {
        return Err(Error::validation("syntax error"));
    }

    let Some(value) = ctx.keyspace.get_value(ctx.db, key) else {
        return Ok(Reply::Array(Some(Vec::new())));
    };
    let zset = value.as_sorted_set()?;

    if by_lex {
        if with_scores {
            return Err(Error::validation("syntax error, WITHSCORES not supported in combination with BYLEX"));
        }
        let (min, max) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
        let range = LexRange::parse(min, max)?;
        let members = zset.range_by_lex(&range, rev, limit);
        return Ok(Reply::Array(Some(members.into_iter().map(|m| Reply::Bulk(Some(m))).collect())));
    }

    if by_score {
        let (min, max) = if rev {
            (score_token(&argv[3])?, score_token(&argv[2])?)
        } else {
            (score_token(&argv[2])?, score_token(&argv[3])?)
        };
        let range = ScoreRange::parse(min, max)?;
        let pairs = zset.range_by_score(&range, rev, limit);
        return Ok(flat_reply(pairs, with_scores));
    }

    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let pairs = zset.range_by_rank(start, stop, rev);
    Ok(flat_reply(pairs, with_scores))
}

fn legacy_range_by_rank(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], rev: bool) -> Result<Reply> {
    require_arity(argv, 4)?;
    let with_scores = argv.len() > 4 && token_is(&argv[4], "WITHSCORES");
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(flat_reply(v.as_sorted_set()?.range_by_rank(start, stop, rev), with_scores)),
        None => Ok(Reply::Array(Some(Vec::new()))),
    }
}

pub fn zrevrange(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    legacy_range_by_rank(ctx, argv, true)
}

fn legacy_range_by_score(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], rev: bool) -> Result<Reply> {
    require_arity(argv, 4)?;
    let (min_tok, max_tok) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
    let range = ScoreRange::parse(score_token(min_tok)?, score_token(max_tok)?)?;
    let mut with_scores = false;
    let (mut limit, mut i) = (Limit::unbounded(), 4);
    while i < argv.len() {
        if token_is(&argv[i], "WITHSCORES") {
            with_scores = true;
            i += 1;
        } else if token_is(&argv[i], "LIMIT") {
            let (l, next) = parse_limit(argv, i)?;
            limit = l;
            i = next;
        } else {
            return Err(Error::validation("syntax error"));
        }
    }
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(flat_reply(v.as_sorted_set()?.range_by_score(&range, rev, limit), with_scores)),
        None => Ok(Reply::Array(Some(Vec::new()))),
    }
}

pub fn zrangebyscore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    legacy_range_by_score(ctx, argv, false)
}

pub fn zrevrangebyscore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    legacy_range_by_score(ctx, argv, true)
}

fn legacy_range_by_lex(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], rev: bool) -> Result<Reply> {
    require_arity(argv, 4)?;
    let (min_tok, max_tok) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
    let range = LexRange::parse(min_tok, max_tok)?;
    let (limit, _) = parse_limit(argv, 4)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Array(Some(
            v.as_sorted_set()?.range_by_lex(&range, rev, limit).into_iter().map(|m| Reply::Bulk(Some(m))).collect(),
        ))),
        None => Ok(Reply::Array(Some(Vec::new()))),
    }
}

pub fn zrangebylex(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    legacy_range_by_lex(ctx, argv, false)
}

pub fn zrevrangebylex(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    legacy_range_by_lex(ctx, argv, true)
}

fn pop(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], max: bool) -> Result<Reply> {
    require_arity(argv, 2)?;
    let count = if argv.len() > 2 { parse_i64(&argv[2])? as usize } else { 1 };
    let popped = ctx.keyspace.with_entry_mut(ctx.db, &argv[1], |entry| {
        let Some(entry) = entry else {
            return Ok(Vec::new());
        };
        let zset = entry.value.as_sorted_set_mut()?;
        Ok(if max { zset.pop_max(count) } else { zset.pop_min(count) })
    })?;
    Ok(flat_reply(popped, true))
}

pub fn zpopmin(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    pop(ctx, argv, false)
}

pub fn zpopmax(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    pop(ctx, argv, true)
}

/// `ZMPOP numkeys key [key ...] MIN|MAX [COUNT count]`: pops from the first
/// named key that is non-empty.
pub fn zmpop(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let numkeys = parse_i64(&argv[1])? as usize;
    let keys = &argv[2..2 + numkeys];
    let mut i = 2 + numkeys;
    require_arity(argv, i + 1)?;
    let max = if token_is(&argv[i], "MAX") {
        true
    } else if token_is(&argv[i], "MIN") {
        false
    } else {
        return Err(Error::validation("syntax error"));
    };
    i += 1;
    let count = if i < argv.len() && token_is(&argv[i], "COUNT") {
        require_arity(argv, i + 2)?;
        parse_i64(&argv[i + 1])? as usize
    } else {
        1
    };

    for key in keys {
        let popped = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| {
            let Some(entry) = entry else {
                return Ok(Vec::new());
            };
            match entry.value.as_sorted_set_mut() {
                Ok(zset) => Ok(if max { zset.pop_max(count) } else { zset.pop_min(count) }),
                Err(Error::WrongType) => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        })?;
        if !popped.is_empty() {
            return Ok(Reply::Array(Some(vec![
                Reply::Bulk(Some(key.clone())),
                flat_reply(popped, true),
            ])));
        }
    }
    Ok(Reply::Null)
}

pub fn zremrangebyrank(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let key = &argv[1];
    let removed = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| -> Result<usize> {
        let Some(entry) = entry else {
            return Ok(0);
        };
        let zset = entry.value.as_sorted_set_mut()?;
        match zset.remove_range_by_rank(start, stop) {
            Ok(victims) => Ok(victims.len()),
            Err(_) => Ok(0),
        }
    })?;
    Ok(Reply::Int(removed as i64))
}

pub fn zremrangebyscore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let range = ScoreRange::parse(score_token(&argv[2])?, score_token(&argv[3])?)?;
    let key = &argv[1];
    let removed = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| -> Result<usize> {
        let Some(entry) = entry else {
            return Ok(0);
        };
        Ok(entry.value.as_sorted_set_mut()?.remove_range_by_score(&range).len())
    })?;
    Ok(Reply::Int(removed as i64))
}

pub fn zremrangebylex(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 4)?;
    let range = LexRange::parse(&argv[2], &argv[3])?;
    let key = &argv[1];
    let removed = ctx.keyspace.with_entry_mut(ctx.db, key, |entry| -> Result<usize> {
        let Some(entry) = entry else {
            return Ok(0);
        };
        Ok(entry.value.as_sorted_set_mut()?.remove_range_by_lex(&range).len())
    })?;
    Ok(Reply::Int(removed as i64))
}

enum AlgebraOp {
    Diff,
    Inter,
    Union,
}

fn parse_algebra_options(argv: &[Vec<u8>], start: usize, numkeys: usize) -> Result<(Option<Vec<f64>>, Aggregate, bool)> {
    let mut weights = None;
    let mut aggregate = Aggregate::Sum;
    let mut with_scores = false;
    let mut i = start;
    while i < argv.len() {
        if token_is(&argv[i], "WEIGHTS") {
            require_arity(argv, i + 1 + numkeys)?;
            let mut w = Vec::with_capacity(numkeys);
            for tok in &argv[i + 1..i + 1 + numkeys] {
                w.push(parse_f64(tok)?);
            }
            weights = Some(w);
            i += 1 + numkeys;
        } else if token_is(&argv[i], "AGGREGATE") {
            require_arity(argv, i + 2)?;
            aggregate = Aggregate::parse(score_token(&argv[i + 1])?)?;
            i += 2;
        } else if token_is(&argv[i], "WITHSCORES") {
            with_scores = true;
            i += 1;
        } else {
            return Err(Error::validation("syntax error"));
        }
    }
    Ok((weights, aggregate, with_scores))
}

fn run_algebra(ctx: &mut HandlerContext<'_>, keys: &[Vec<u8>], op: AlgebraOp, weights: Option<Vec<f64>>, aggregate: Aggregate) -> Result<SortedSet> {
    let weights = resolve_weights(keys.len(), weights)?;
    let values: Vec<TypedValue> = keys
        .iter()
        .map(|k| ctx.keyspace.get_value(ctx.db, k).unwrap_or_else(TypedValue::empty_sorted_set))
        .collect();
    let sets: Result<Vec<&SortedSet>> = values.iter().map(|v| v.as_sorted_set()).collect();
    let sets = sets?;
    Ok(match op {
        AlgebraOp::Diff => diff(&sets, &weights),
        AlgebraOp::Inter => inter(&sets, &weights, aggregate),
        AlgebraOp::Union => union(&sets, &weights, aggregate),
    })
}

fn algebra_reply(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], op: AlgebraOp) -> Result<Reply> {
    require_arity(argv, 3)?;
    let numkeys = parse_i64(&argv[1])? as usize;
    let keys = argv[2..2 + numkeys].to_vec();
    let (weights, aggregate, with_scores) = parse_algebra_options(argv, 2 + numkeys, numkeys)?;
    let result = run_algebra(ctx, &keys, op, weights, aggregate)?;
    let pairs: Vec<(Vec<u8>, f64)> = result.range_by_rank(0, -1, false);
    Ok(flat_reply(pairs, with_scores))
}

pub fn zdiff(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    algebra_reply(ctx, argv, AlgebraOp::Diff)
}

pub fn zinter(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    algebra_reply(ctx, argv, AlgebraOp::Inter)
}

pub fn zunion(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    algebra_reply(ctx, argv, AlgebraOp::Union)
}

fn algebra_store(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>], op: AlgebraOp) -> Result<Reply> {
    require_arity(argv, 4)?;
    let dest = argv[1].clone();
    let numkeys = parse_i64(&argv[2])? as usize;
    let keys = argv[3..3 + numkeys].to_vec();
    let (weights, aggregate, _) = parse_algebra_options(argv, 3 + numkeys, numkeys)?;
    let result = run_algebra(ctx, &keys, op, weights, aggregate)?;
    let len = result.len();
    if len == 0 {
        ctx.keyspace.delete_key(ctx.db, &dest);
    } else {
        ctx.keyspace.set_value(ctx.db, &dest, TypedValue::SortedSet(result));
    }
    Ok(Reply::Int(len as i64))
}

pub fn zdiffstore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    algebra_store(ctx, argv, AlgebraOp::Diff)
}

pub fn zinterstore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    algebra_store(ctx, argv, AlgebraOp::Inter)
}

pub fn zunionstore(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    algebra_store(ctx, argv, AlgebraOp::Union)
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

    fn member_score_pairs(reply: Reply) -> Vec<(String, f64)> {
        match reply {
            Reply::Array(Some(items)) => items
                .chunks(2)
                .map(|pair| match pair {
                    [Reply::Bulk(Some(m)), Reply::Double(s)] => (String::from_utf8(m.clone()).unwrap(), *s),
                    other => panic!("unexpected pair: {other:?}"),
                })
                .collect(),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn zadd_then_zrange_by_score_scenario_s2() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        zadd(&mut ctx, &words(&["ZADD", "z", "1", "a", "2", "b", "3", "c", "4", "d", "5", "e"])).unwrap();
        let reply = zrange(&mut ctx, &words(&["ZRANGE", "z", "2", "4", "BYSCORE", "WITHSCORES"])).unwrap();
        assert_eq!(
            member_score_pairs(reply),
            vec![("b".to_string(), 2.0), ("c".to_string(), 3.0), ("d".to_string(), 4.0)]
        );
    }

    #[test]
    fn zinter_weighted_aggregate_sum_scenario_s3() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        zadd(&mut ctx, &words(&["ZADD", "zA", "1", "one", "2", "two", "3", "three"])).unwrap();
        zadd(&mut ctx, &words(&["ZADD", "zB", "10", "one", "20", "two"])).unwrap();
        let reply = zinter(
            &mut ctx,
            &words(&["ZINTER", "2", "zA", "zB", "WEIGHTS", "1", "5", "AGGREGATE", "SUM", "WITHSCORES"]),
        )
        .unwrap();
        assert_eq!(
            member_score_pairs(reply),
            vec![("one".to_string(), 51.0), ("two".to_string(), 102.0)]
        );
    }

    #[test]
    fn zadd_gt_only_raises_the_score() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        zadd(&mut ctx, &words(&["ZADD", "z", "5", "m"])).unwrap();
        zadd(&mut ctx, &words(&["ZADD", "z", "GT", "3", "m"])).unwrap();
        assert!(matches!(zscore(&mut ctx, &words(&["ZSCORE", "z", "m"])).unwrap(), Reply::Double(s) if s == 5.0));
        zadd(&mut ctx, &words(&["ZADD", "z", "GT", "10", "m"])).unwrap();
        assert!(matches!(zscore(&mut ctx, &words(&["ZSCORE", "z", "m"])).unwrap(), Reply::Double(s) if s == 10.0));
    }

    #[test]
    fn zscore_on_a_missing_member_is_nil() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        zadd(&mut ctx, &words(&["ZADD", "z", "1", "a"])).unwrap();
        let reply = zscore(&mut ctx, &words(&["ZSCORE", "z", "missing"])).unwrap();
        assert!(matches!(reply, Reply::Null));
    }

    #[test]
    fn zmscore_on_a_missing_key_is_an_array_of_nils() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        let reply = zmscore(&mut ctx, &words(&["ZMSCORE", "missing", "a", "b"])).unwrap();
        assert!(matches!(reply, Reply::Array(Some(ref items)) if items.len() == 2
            && items.iter().all(|r| matches!(r, Reply::Null))));
    }

    #[test]
    fn zpopmin_removes_the_lowest_scoring_member() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        zadd(&mut ctx, &words(&["ZADD", "z", "1", "a", "2", "b"])).unwrap();
        let reply = zpopmin(&mut ctx, &words(&["ZPOPMIN", "z"])).unwrap();
        assert_eq!(member_score_pairs(reply), vec![("a".to_string(), 1.0)]);
        assert!(matches!(zcard(&mut ctx, &words(&["ZCARD", "z"])).unwrap(), Reply::Int(1)));
    }

    #[test]
    fn zinterstore_deletes_dest_when_the_result_is_empty() {
        let ks = harness();
        let mut locks = ks.lock_context();
        let mut ctx = HandlerContext { db: DbIndex(0), keyspace: &ks, locks: &mut locks };
        zadd(&mut ctx, &words(&["ZADD", "zA", "1", "a"])).unwrap();
        zadd(&mut ctx, &words(&["ZADD", "zB", "1", "b"])).unwrap();
        ctx.keyspace.set_value(ctx.db, b"dest", TypedValue::empty_sorted_set());
        let reply = zinterstore(&mut ctx, &words(&["ZINTERSTORE", "dest", "2", "zA", "zB"])).unwrap();
        assert!(matches!(reply, Reply::Int(0)));
        assert!(!ks.key_exists(DbIndex(0), b"dest"));
    }
}
