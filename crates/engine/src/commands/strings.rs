//! String commands: `SET`, `GET`, `GETSET`, `APPEND`, `STRLEN`, and the
//! `INCR`/`DECR` integer and float arithmetic family.

use bramble_core::{Error, Result};
use bramble_storage::{ExpiryFlags, TypedValue};
use bramble_wire::{format_double, Reply};

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

enum Expiry {
    Keep,
    Clear,
    At(i64),
}

/// `SET key value [EX s | PX ms | EXAT ts | PXAT ts-ms | KEEPTTL] [NX | XX] [GET]`.
pub fn set(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let value = argv[2].clone();

    let mut expiry = Expiry::Clear;
    let mut nx = false;
    let mut xx = false;
    let mut want_get = false;

    let mut i = 3;
    while i < argv.len() {
        let tok = &argv[i];
        if token_is(tok, "NX") {
            nx = true;
            i += 1;
        } else if token_is(tok, "XX") {
            xx = true;
            i += 1;
        } else if token_is(tok, "GET") {
            want_get = true;
            i += 1;
        } else if token_is(tok, "KEEPTTL") {
            expiry = Expiry::Keep;
            i += 1;
        } else if token_is(tok, "EX") || token_is(tok, "PX") || token_is(tok, "EXAT") || token_is(tok, "PXAT") {
            if i + 1 >= argv.len() {
                return Err(Error::validation("syntax error"));
            }
            let amount = parse_i64(&argv[i + 1])?;
            let now_millis = ctx.keyspace.clock().now_millis();
            let at_millis = if token_is(tok, "EX") {
                now_millis + amount.saturating_mul(1000)
            } else if token_is(tok, "PX") {
                now_millis + amount
            } else if token_is(tok, "EXAT") {
                amount.saturating_mul(1000)
            } else {
                amount
            };
            expiry = Expiry::At(at_millis);
            i += 2;
        } else {
            return Err(Error::validation("syntax error"));
        }
    }

    if nx && xx {
        return Err(Error::validation("syntax error"));
    }

    let exists = ctx.keyspace.key_exists(ctx.db, key);
    if nx && exists {
        return if want_get {
            Ok(Reply::Bulk(ctx.keyspace.get_value(ctx.db, key).and_then(|v| v.as_str().ok().map(|b| b.to_vec()))))
        } else {
            Ok(Reply::Null)
        };
    }
    if xx && !exists {
        return Ok(Reply::Null);
    }

    let previous = if want_get {
        match ctx.keyspace.get_value(ctx.db, key) {
            Some(v) => Some(v.as_str()?.to_vec()),
            None => None,
        }
    } else {
        None
    };

    ctx.keyspace.set_value(ctx.db, key, TypedValue::Str(value));

    match expiry {
        Expiry::Clear => {
            ctx.keyspace.persist(ctx.db, key);
        }
        Expiry::Keep => {}
        Expiry::At(at_millis) => {
            let now = ctx.keyspace.clock().now();
            let now_millis = ctx.keyspace.clock().now_millis();
            let delta = at_millis - now_millis;
            let when = if delta >= 0 {
                now + std::time::Duration::from_millis(delta as u64)
            } else {
                now
            };
            ctx.keyspace.set_expiry(ctx.db, key, when, ExpiryFlags::default())?;
        }
    }

    if want_get {
        Ok(Reply::Bulk(previous))
    } else {
        Ok(Reply::ok())
    }
}

pub fn get(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Bulk(Some(v.as_str()?.to_vec()))),
        None => Ok(Reply::Null),
    }
}

pub fn getset(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let previous = match ctx.keyspace.get_value(ctx.db, key) {
        Some(v) => Some(v.as_str()?.to_vec()),
        None => None,
    };
    ctx.keyspace.set_value(ctx.db, key, TypedValue::Str(argv[2].clone()));
    ctx.keyspace.persist(ctx.db, key);
    Ok(Reply::Bulk(previous))
}

pub fn append(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let suffix = argv[2].clone();
    let len = ctx.keyspace.get_or_create_mut(ctx.db, key, TypedValue::empty_str, |v| {
        let s = v.as_str_mut()?;
        s.extend_from_slice(&suffix);
        Ok(s.len())
    })?;
    Ok(Reply::Int(len as i64))
}

pub fn strlen(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    match ctx.keyspace.get_value(ctx.db, &argv[1]) {
        Some(v) => Ok(Reply::Int(v.as_str()?.len() as i64)),
        None => Ok(Reply::Int(0)),
    }
}

fn read_int(ctx: &HandlerContext<'_>, key: &[u8]) -> Result<i64> {
    match ctx.keyspace.get_value(ctx.db, key) {
        Some(v) => {
            let s = v.as_str()?;
            std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| Error::validation("value is not an integer or out of range"))
        }
        None => Ok(0),
    }
}

fn write_int(ctx: &mut HandlerContext<'_>, key: &[u8], value: i64) {
    ctx.keyspace.set_value(ctx.db, key, TypedValue::Str(value.to_string().into_bytes()));
}

fn incr_by(ctx: &mut HandlerContext<'_>, key: &[u8], delta: i64) -> Result<Reply> {
    let current = read_int(ctx, key)?;
    let next = current
        .checked_add(delta)
        .ok_or_else(|| Error::validation("increment or decrement would overflow"))?;
    write_int(ctx, key, next);
    Ok(Reply::Int(next))
}

pub fn incr(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    incr_by(ctx, &argv[1], 1)
}

pub fn decr(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 2)?;
    incr_by(ctx, &argv[1], -1)
}

pub fn incrby(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let delta = parse_i64(&argv[2])?;
    incr_by(ctx, &argv[1], delta)
}

pub fn decrby(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let delta = parse_i64(&argv[2])?;
    let neg = delta
        .checked_neg()
        .ok_or_else(|| Error::validation("increment or decrement would overflow"))?;
    incr_by(ctx, &argv[1], neg)
}

pub fn incrbyfloat(ctx: &mut HandlerContext<'_>, argv: &[Vec<u8>]) -> Result<Reply> {
    require_arity(argv, 3)?;
    let key = &argv[1];
    let delta = parse_f64(&argv[2])?;
    let current = match ctx.keyspace.get_value(ctx.db, key) {
        Some(v) => {
            let s = v.as_str()?;
            std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| Error::validation("value is not a valid float"))?
        }
        None => 0.0,
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(Error::validation("increment would produce NaN or Infinity"));
    }
    let rendered = format_double(next);
    ctx.keyspace
        .set_value(ctx.db, key, TypedValue::Str(rendered.clone().into_bytes()));
    Ok(Reply::Bulk(Some(rendered.into_bytes())))
}
