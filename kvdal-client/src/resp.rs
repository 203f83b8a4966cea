//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode typed requests and parse backend replies into the tagged
//! `Reply` variant, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.
//!
//! Error replies (`-ERR ...`) never become a `Reply`; they are surfaced as
//! `ClientError::Server` so decoders only see data shapes.

use std::io::{BufRead, Read};

use crate::command::Request;
use crate::error::{ClientError, ClientResult};

// Deepest array nesting accepted from the backend.
const MAX_DEPTH: usize = 32;

// Largest up-front buffer for a bulk string; longer payloads grow as bytes arrive.
const MAX_BULK_PREALLOC: usize = 64 * 1024;

/// Decoded backend reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `$-1` or `*-1`: the backend has no value.
    Nil,
    /// `+OK` style status line.
    Status(String),
    /// `:123` integer reply.
    Integer(i64),
    /// `$...` bulk string.
    Bulk(Vec<u8>),
    /// `*...` array reply.
    Array(Vec<Reply>),
}

/// Encodes a request as a RESP2 array of bulk strings into `out`.
pub fn encode_request(request: &Request, out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, request.args.len() + 1);
    out.extend_from_slice(b"\r\n");
    push_bulk(out, request.name.as_bytes());
    for arg in &request.args {
        push_bulk(out, arg);
    }
}

/// Reads one reply from the buffered reader.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Reply> {
    read_reply_at(reader, line_buf, 0)
}

fn read_reply_at<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> ClientResult<Reply> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(ClientError::Protocol);
    }

    match line_buf[0] {
        b'+' => Ok(Reply::Status(String::from_utf8_lossy(&line_buf[1..]).into_owned())),
        b'-' => Err(ClientError::Server(
            String::from_utf8_lossy(&line_buf[1..]).into_owned(),
        )),
        b':' => Ok(Reply::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf, depth)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn parse_bulk_len<R: BufRead>(reader: &mut R, len: i64, line_buf: &mut Vec<u8>) -> ClientResult<Reply> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    let len = usize::try_from(len).map_err(|_| ClientError::Protocol)?;
    // The length comes off the wire: grow with the bytes actually received.
    let mut data = Vec::with_capacity(len.min(MAX_BULK_PREALLOC));
    let read = reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if read != len {
        return Err(ClientError::Protocol);
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(ClientError::Protocol);
    }

    line_buf.clear();
    Ok(Reply::Bulk(data))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> ClientResult<Reply> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    if depth >= MAX_DEPTH {
        return Err(ClientError::Protocol);
    }

    let len = usize::try_from(len).map_err(|_| ClientError::Protocol)?;
    // Cap preallocation; the length comes off the wire.
    let mut items = Vec::with_capacity(len.min(1024));
    let mut nested_error = None;
    for _ in 0..len {
        // Keep draining after a nested error so the stream stays framed.
        match read_reply_at(reader, line_buf, depth + 1) {
            Ok(item) => items.push(item),
            Err(ClientError::Server(message)) => {
                nested_error.get_or_insert(message);
            }
            Err(err) => return Err(err),
        }
    }
    match nested_error {
        Some(message) => Err(ClientError::Server(message)),
        None => Ok(Reply::Array(items)),
    }
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ClientError::Protocol);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, data),
        None => return Err(ClientError::Protocol),
    };
    if digits.is_empty() {
        return Err(ClientError::Protocol);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    if negative {
        Ok(-value)
    } else {
        Ok(value)
    }
}

fn push_bulk(out: &mut Vec<u8>, arg: &[u8]) {
    out.push(b'$');
    push_usize(out, arg.len());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(arg);
    out.extend_from_slice(b"\r\n");
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
