//! RESP request decoding: turns a byte buffer from the socket into an
//! ordered sequence of argument byte-strings, the shape every command
//! handler in `bramble-engine` expects (`argv[0]` is the command name).

use bramble_core::{Error, Result};

/// Attempt to decode one complete command from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` holds a prefix of a command but not all of
/// it yet — the caller should read more bytes and retry. Returns
/// `Ok(Some((argv, consumed)))` when a full command was parsed, where
/// `consumed` is the number of bytes to drain from the front of the
/// caller's buffer.
pub fn decode_command(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] == b'*' {
        decode_multibulk(buf)
    } else {
        decode_inline(buf)
    }
}

/// Encode `argv` as a RESP multibulk request — the same framing a client
/// sends on the wire. Used by the AOF command log, which stores each
/// mutating command verbatim so restore can replay it through the
/// dispatcher exactly as a client would have sent it.
pub fn encode_request(argv: &[Vec<u8>], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(argv.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in argv {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| from + p)
}

fn decode_multibulk(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>> {
    let Some(header_end) = find_crlf(buf, 0) else {
        return Ok(None);
    };
    let count_str = std::str::from_utf8(&buf[1..header_end])
        .map_err(|_| Error::validation("protocol error: invalid multibulk length"))?;
    let count: i64 = count_str
        .parse()
        .map_err(|_| Error::validation("protocol error: invalid multibulk length"))?;
    if count <= 0 {
        return Ok(Some((Vec::new(), header_end + 2)));
    }
    let mut pos = header_end + 2;
    let mut argv = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= buf.len() {
            return Ok(None);
        }
        if buf[pos] != b'$' {
            return Err(Error::validation(
                "protocol error: expected bulk string argument",
            ));
        }
        let Some(len_end) = find_crlf(buf, pos) else {
            return Ok(None);
        };
        let len_str = std::str::from_utf8(&buf[pos + 1..len_end])
            .map_err(|_| Error::validation("protocol error: invalid bulk length"))?;
        let len: i64 = len_str
            .parse()
            .map_err(|_| Error::validation("protocol error: invalid bulk length"))?;
        if len < 0 {
            return Err(Error::validation("protocol error: invalid bulk length"));
        }
        let len = len as usize;
        let data_start = len_end + 2;
        let data_end = data_start + len;
        if data_end + 2 > buf.len() {
            return Ok(None);
        }
        argv.push(buf[data_start..data_end].to_vec());
        pos = data_end + 2;
    }
    Ok(Some((argv, pos)))
}

fn decode_inline(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>> {
    let Some(line_end) = find_crlf(buf, 0) else {
        // Tolerate a bare `\n` terminator, as Redis does for inline commands.
        return match buf.iter().position(|&b| b == b'\n') {
            Some(p) => Ok(Some((split_inline(&buf[..p]), p + 1))),
            None => Ok(None),
        };
    };
    Ok(Some((split_inline(&buf[..line_end]), line_end + 2)))
}

fn split_inline(line: &[u8]) -> Vec<Vec<u8>> {
    line.split(|&b| b == b' ' || b == b'\t')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_vec())
        .collect()
}
