//! Small parsing and validation helpers shared across command handlers.

use bramble_core::{Error, Result};

/// Reject a command invocation with fewer than `min` total tokens
/// (`argv[0]` is the command name, so `min` includes it).
pub fn require_arity(argv: &[Vec<u8>], min: usize) -> Result<()> {
    if argv.len() < min {
        let name = String::from_utf8_lossy(&argv[0]).to_ascii_lowercase();
        return Err(Error::validation(format!(
            "wrong number of arguments for '{name}' command"
        )));
    }
    Ok(())
}

/// Parse a token as a base-10 `i64`, the format every integer-typed
/// argument (counts, indices, TTLs) arrives in.
pub fn parse_i64(token: &[u8]) -> Result<i64> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::validation("value is not an integer or out of range"))
}

/// Parse a token as a finite or `+inf`/`-inf` `f64` (used by `INCRBYFLOAT`
/// and `ZINCRBY`-adjacent paths outside the sorted-set crate itself, which
/// has its own bound parser).
pub fn parse_f64(token: &[u8]) -> Result<f64> {
    let s = std::str::from_utf8(token).map_err(|_| Error::validation("value is not a valid float"))?;
    let value = match s {
        "+inf" | "inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        other => other
            .parse::<f64>()
            .map_err(|_| Error::validation("value is not a valid float"))?,
    };
    if value.is_nan() {
        return Err(Error::validation("value is not a valid float"));
    }
    Ok(value)
}

/// Case-insensitive token comparison against a known option spelling.
pub fn token_is(token: &[u8], word: &str) -> bool {
    token.eq_ignore_ascii_case(word.as_bytes())
}

/// Resolve a Redis-style possibly-negative index against a length,
/// returning `None` when it still falls outside `[0, len)` after resolution.
pub fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved as usize >= len {
        None
    } else {
        Some(resolved as usize)
    }
}
