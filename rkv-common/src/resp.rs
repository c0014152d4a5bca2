//! # RESP2 Wire Protocol
//!
//! Purpose: Parse incoming command arrays and encode outgoing replies for the
//! length-delimited array-of-bulk-strings protocol described in the external
//! interfaces section. Shared by `rkv-server` (parses requests, encodes
//! replies) and `rkv-client` (encodes requests, parses replies).
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: `RequestParser::parse` consumes complete frames
//!    from a growable buffer and leaves partial frames untouched for the
//!    next read.
//! 2. **Binary-Safe**: bulk strings are raw bytes; no UTF-8 assumption.
//! 3. **One Reply Type**: `Reply` is the engine-facing response value; only
//!    `encode_reply` knows about `+`/`-`/`:`/`$`/`*` framing.

use bytes::{Buf, BytesMut};

/// A decoded, engine-facing RESP reply.
///
/// The dispatcher and command handlers build `Reply` values; only the wire
/// layer (`encode_reply`) turns them into bytes on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+OK\r\n` style simple strings.
    Simple(String),
    /// `-ERR message\r\n` error replies. `prefix` is the RESP error word
    /// (`ERR`, `WRONGTYPE`, `NOPERM`, ...).
    Error { prefix: String, message: String },
    /// `:123\r\n` integer replies.
    Integer(i64),
    /// `$-1\r\n` (None) or `$n\r\n...\r\n` (Some) bulk strings.
    Bulk(Option<Vec<u8>>),
    /// `*-1\r\n` (None, "null array") or `*n\r\n...` (Some) arrays.
    Array(Option<Vec<Reply>>),
    /// Convenience for a `Double` reply encoded as a bulk string, matching
    /// RESP2 clients that expect float scores as bulk strings (ZSCORE etc).
    Double(f64),
}

impl Reply {
    /// Builds a bulk-string reply from any byte source.
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// The RESP null bulk string, used for "no such key"/"no such member".
    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    /// The RESP null array, used for e.g. `ZPOPMIN` on a missing key in
    /// some client conventions; most handlers prefer an empty array instead.
    pub fn nil_array() -> Self {
        Reply::Array(None)
    }

    /// `+OK`.
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// Builds an error reply with the generic `ERR` prefix.
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            prefix: "ERR".to_string(),
            message: message.into(),
        }
    }

    /// Builds an error reply with an explicit prefix word.
    pub fn error_with_prefix(prefix: impl Into<String>, message: impl Into<String>) -> Self {
        Reply::Error {
            prefix: prefix.into(),
            message: message.into(),
        }
    }
}

impl From<crate::error::HkvError> for Reply {
    fn from(err: crate::error::HkvError) -> Self {
        let prefix = err.resp_prefix().to_string();
        Reply::error_with_prefix(prefix, err.to_string())
    }
}

/// Encodes a reply into RESP2 wire bytes.
///
/// Per the external-interfaces contract, responses over 1024 bytes are sent
/// to the client in 1024-byte chunks; this function only builds the frame,
/// chunked writing is the transport's job (see `rkv-server`).
pub fn encode_reply(reply: &Reply, out: &mut Vec<u8>) {
    match reply {
        Reply::Simple(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Error { prefix, message } => {
            out.push(b'-');
            out.extend_from_slice(prefix.as_bytes());
            out.push(b' ');
            out.extend_from_slice(message.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Integer(value) => {
            out.push(b':');
            out.extend_from_slice(value.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Double(value) => {
            let text = format_double(*value);
            out.push(b'$');
            out.extend_from_slice(text.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
        Reply::Bulk(Some(data)) => {
            out.push(b'$');
            out.extend_from_slice(data.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        Reply::Array(None) => out.extend_from_slice(b"*-1\r\n"),
        Reply::Array(Some(items)) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_reply(item, out);
            }
        }
    }
}

/// Formats a float the way Redis-family servers do: integral scores print
/// without a trailing `.0`.
pub fn format_double(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if value == value.trunc() && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Parser error for malformed request framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespError {
    /// The buffer contains a frame that does not conform to RESP2 arrays.
    Protocol,
}

/// Incremental parser for inbound command arrays.
///
/// Callers feed bytes into a shared buffer and call `parse` in a loop until
/// it returns `Ok(None)` (need more bytes).
#[derive(Debug, Default)]
pub struct RequestParser;

impl RequestParser {
    /// Creates a new parser. Stateless between calls: all partial-frame
    /// state lives in the caller's buffer.
    pub fn new() -> Self {
        RequestParser
    }

    /// Attempts to parse one complete command array from `buf`.
    ///
    /// Returns `Ok(Some(args))` and advances `buf` past the consumed frame,
    /// `Ok(None)` if `buf` holds an incomplete frame, or `Err` on malformed
    /// input.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        let mut cursor = 0usize;
        match parse_array(buf, &mut cursor) {
            Ok(Some(args)) => {
                buf.advance(cursor);
                Ok(Some(args))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| from + p)
}

fn parse_line<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<Option<&'a [u8]>, RespError> {
    match find_crlf(buf, *cursor) {
        Some(end) => {
            let line = &buf[*cursor..end];
            *cursor = end + 2;
            Ok(Some(line))
        }
        None => Ok(None),
    }
}

fn parse_len(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(RespError::Protocol)
}

fn parse_array(buf: &[u8], cursor: &mut usize) -> Result<Option<Vec<Vec<u8>>>, RespError> {
    if buf.len() <= *cursor {
        return Ok(None);
    }
    if buf[*cursor] != b'*' {
        return Err(RespError::Protocol);
    }
    *cursor += 1;

    let header = match parse_line(buf, cursor)? {
        Some(line) => line,
        None => return Ok(None),
    };
    let count = parse_len(header)?;
    if count < 0 {
        return Ok(Some(Vec::new()));
    }

    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match parse_bulk(buf, cursor)? {
            Some(item) => args.push(item),
            None => return Ok(None),
        }
    }
    Ok(Some(args))
}

fn parse_bulk(buf: &[u8], cursor: &mut usize) -> Result<Option<Vec<u8>>, RespError> {
    if buf.len() <= *cursor {
        return Ok(None);
    }
    if buf[*cursor] != b'$' {
        return Err(RespError::Protocol);
    }
    *cursor += 1;

    let header = match parse_line(buf, cursor)? {
        Some(line) => line,
        None => return Ok(None),
    };
    let len = parse_len(header)?;
    if len < 0 {
        return Ok(Some(Vec::new()));
    }
    let len = len as usize;

    if buf.len() < *cursor + len + 2 {
        return Ok(None);
    }
    let data = buf[*cursor..*cursor + len].to_vec();
    *cursor += len;
    if &buf[*cursor..*cursor + 2] != b"\r\n" {
        return Err(RespError::Protocol);
    }
    *cursor += 2;
    Ok(Some(data))
}

/// Encodes a RESP2 command array, used by the client to issue requests.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_command() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"[..]);
        let mut parser = RequestParser::new();
        let args = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"foo".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_on_partial_frame() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nfo"[..]);
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn parses_two_frames_back_to_back() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n"[..]);
        let mut parser = RequestParser::new();
        let first = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(first, vec![b"PING".to_vec()]);
        let second = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(second, vec![b"PING".to_vec()]);
    }

    #[test]
    fn rejects_non_array_frame() {
        let mut buf = BytesMut::from(&b"+OK\r\n"[..]);
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buf), Err(RespError::Protocol));
    }

    #[test]
    fn encodes_simple_and_error_and_integer() {
        let mut out = Vec::new();
        encode_reply(&Reply::ok(), &mut out);
        assert_eq!(out, b"+OK\r\n");

        out.clear();
        encode_reply(&Reply::error("bad"), &mut out);
        assert_eq!(out, b"-ERR bad\r\n");

        out.clear();
        encode_reply(&Reply::Integer(-2), &mut out);
        assert_eq!(out, b":-2\r\n");
    }

    #[test]
    fn encodes_nested_array() {
        let reply = Reply::Array(Some(vec![Reply::bulk("a"), Reply::Integer(1)]));
        let mut out = Vec::new();
        encode_reply(&reply, &mut out);
        assert_eq!(out, b"*2\r\n$1\r\na\r\n:1\r\n");
    }

    #[test]
    fn formats_double_without_trailing_zero() {
        assert_eq!(format_double(5.0), "5");
        assert_eq!(format_double(5.5), "5.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }
}
