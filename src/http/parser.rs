use bytes::BytesMut;

use crate::http::request::is_http_version;
use crate::http::response::ResponseStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("malformed method token")]
    InvalidMethod,
    #[error("malformed status line")]
    InvalidStatusLine,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
}

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Bytes of `buf` up to, not including, the first CRLF.
pub fn request_line(buf: &[u8]) -> &[u8] {
    let end = buf
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(buf.len());
    &buf[..end]
}

/// Removes one line from the front of `buf`.
///
/// Lines end at `\n`, with an optional `\r` before it. The terminator is
/// consumed but not returned. Returns `None` while no full line is buffered.
pub fn take_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let nl = buf.iter().position(|&b| b == b'\n')?;
    let mut line = buf.split_to(nl + 1);
    line.truncate(nl);
    if line.last() == Some(&b'\r') {
        line.truncate(nl - 1);
    }
    Some(line)
}

/// Parses `HTTP/<ver> <code> <reason>`.
///
/// The code must be exactly three digits. The reason may be empty.
pub fn parse_status_line(line: &[u8]) -> Result<ResponseStatus, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidStatusLine)?;

    let (version, rest) = line.split_once(' ').ok_or(ParseError::InvalidStatusLine)?;
    if !is_http_version(version) {
        return Err(ParseError::InvalidStatusLine);
    }

    let rest = rest.trim_start_matches(' ');
    let (code, reason) = match rest.split_once(' ') {
        Some((code, reason)) => (code, reason.trim_start_matches(' ')),
        None => (rest, ""),
    };

    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidStatusLine);
    }

    Ok(ResponseStatus {
        code: code.parse().map_err(|_| ParseError::InvalidStatusLine)?,
        reason: reason.to_string(),
    })
}

/// Parses `Name: value`, returning the lowercased name and the value.
///
/// Names start with a letter and contain letters, digits and `-`.
pub fn parse_header_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidHeader)?;
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

    let valid_name = name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if !valid_name {
        return Err(ParseError::InvalidHeader);
    }

    Ok((name.to_ascii_lowercase(), value.trim().to_string()))
}

pub fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength)
}
