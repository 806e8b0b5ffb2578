//! Minimal HTTP/1.1 framing for the upload client and the trigger server.
//!
//! Only what the device needs: a `POST` request head with a known
//! `Content-Length`, status line parsing of the reply, request line parsing
//! on the server side and small plain-text responses. Every connection is
//! `Connection: close`, so nothing past the first line is ever interpreted.

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

use crate::transport::Transport;

/// Capacity of a request or response head.
pub const MAX_HEAD_LEN: usize = 512;

pub type Head = String<MAX_HEAD_LEN>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("head does not fit in the 512-byte buffer")]
    HeadTooLarge,
    #[error("malformed status line")]
    MalformedStatusLine,
    #[error("malformed request line")]
    MalformedRequestLine,
}

impl From<core::fmt::Error> for HttpError {
    fn from(_: core::fmt::Error) -> Self {
        Self::HeadTooLarge
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

impl Method {
    fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: Method,
    /// Request target without any query string.
    pub path: &'a str,
}

/// Build the head of a `POST` carrying `content_length` bytes of raw PCM.
pub fn post_head(
    host: &str,
    port: u16,
    path: &str,
    content_length: usize,
) -> Result<Head, HttpError> {
    let mut head = Head::new();
    write!(head, "POST {} HTTP/1.1\r\n", path)?;
    if port == 80 {
        write!(head, "Host: {}\r\n", host)?;
    } else {
        write!(head, "Host: {}:{}\r\n", host, port)?;
    }
    head.push_str("Content-Type: application/octet-stream\r\n")
        .map_err(|_| HttpError::HeadTooLarge)?;
    write!(head, "Content-Length: {}\r\n", content_length)?;
    head.push_str("Connection: close\r\n\r\n")
        .map_err(|_| HttpError::HeadTooLarge)?;
    Ok(head)
}

/// Parse `HTTP/1.x NNN reason` into the status code.
pub fn parse_status_line(line: &[u8]) -> Result<u16, HttpError> {
    let line = core::str::from_utf8(line).map_err(|_| HttpError::MalformedStatusLine)?;
    let mut parts = line.split(' ');
    let version = parts.next().ok_or(HttpError::MalformedStatusLine)?;
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::MalformedStatusLine);
    }
    let code = parts.next().ok_or(HttpError::MalformedStatusLine)?;
    if code.len() != 3 {
        return Err(HttpError::MalformedStatusLine);
    }
    code.parse().map_err(|_| HttpError::MalformedStatusLine)
}

/// Parse `METHOD target HTTP/1.x`.
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine<'_>, HttpError> {
    let line = core::str::from_utf8(line).map_err(|_| HttpError::MalformedRequestLine)?;
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::MalformedRequestLine);
    };
    if method.is_empty() || !target.starts_with('/') || !version.starts_with("HTTP/1.") {
        return Err(HttpError::MalformedRequestLine);
    }
    let path = target.split('?').next().unwrap_or(target);
    Ok(RequestLine {
        method: Method::parse(method),
        path,
    })
}

/// Reason phrase for the handful of statuses the trigger server sends.
pub const fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Unknown",
    }
}

/// Build a complete `text/plain` response.
pub fn response(status: u16, body: &str) -> Result<Head, HttpError> {
    let mut head = Head::new();
    write!(head, "HTTP/1.1 {} {}\r\n", status, reason_phrase(status))?;
    head.push_str("Content-Type: text/plain\r\n")
        .map_err(|_| HttpError::HeadTooLarge)?;
    write!(head, "Content-Length: {}\r\n", body.len())?;
    head.push_str("Connection: close\r\n\r\n")
        .map_err(|_| HttpError::HeadTooLarge)?;
    head.push_str(body).map_err(|_| HttpError::HeadTooLarge)?;
    Ok(head)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLineError<E: core::fmt::Debug> {
    #[error("transport error: {0:?}")]
    Io(E),
    #[error("connection closed before end of line")]
    Closed,
    #[error("line longer than the receive buffer")]
    TooLong,
}

/// Read from `transport` until the first CRLF and return the line without it.
///
/// Bytes after the line end are read into `buf` too and ignored.
pub async fn read_line<'b, T: Transport>(
    transport: &mut T,
    buf: &'b mut [u8],
) -> Result<&'b [u8], ReadLineError<T::Error>> {
    let mut filled = 0;
    loop {
        if let Some(end) = buf[..filled].windows(2).position(|w| w == b"\r\n") {
            return Ok(&buf[..end]);
        }
        if filled == buf.len() {
            return Err(ReadLineError::TooLong);
        }
        let n = transport
            .read(&mut buf[filled..])
            .await
            .map_err(ReadLineError::Io)?;
        if n == 0 {
            return Err(ReadLineError::Closed);
        }
        filled += n;
    }
}
