//! Per-connection HTTP/1.x state machine (spec.md §4.F): `REQUEST` ->
//! `HEADER` -> `BODY` -> callback -> `REQUEST` (keep-alive) or close. Reads
//! accumulate into a single growable line buffer; `Connection` is generic
//! over any `Read + Write` transport so TLS can be layered in later by
//! wrapping the stream rather than by swapping function pointers, as the
//! original's pluggable `recv_fn`/`send_fn` vtable did.

use super::request::{Method, Request};
use crate::error::HttpError;
use std::io::{Read, Write};

const MAX_CONTENT_LENGTH: i64 = 2_147_483_640;
const SEND_CHUNK_MAX: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum ParseState {
    Request,
    Header,
}

/// A single HTTP/1.x connection. `line_buffer_cap` bounds the accumulated
/// request-line/header buffer (default 32 KiB per spec.md §4.F);
/// `max_body` bounds request bodies (~2 GiB per spec.md §6.2).
pub struct Connection<S: Read + Write> {
    stream: S,
    line_buffer_cap: usize,
    max_body: i64,
    buf: Vec<u8>,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, line_buffer_cap: usize, max_body: i64) -> Connection<S> {
        Connection {
            stream,
            line_buffer_cap,
            max_body,
            buf: Vec::new(),
        }
    }

    /// Parses one full request off the connection, including its body.
    /// Returns `Ok(None)` when the peer closed the connection cleanly
    /// between requests (the normal end of a keep-alive loop).
    pub fn read_request(&mut self) -> Result<Option<Request>, HttpError> {
        let line = match self.read_line()? {
            Some(line) => line,
            None => return Ok(None),
        };

        let (method, uri, http_1_0) = parse_request_line(&line)?;
        let mut request = Request::new(method, uri.clone(), http_1_0);
        request
            .raw_headers
            .push_str(&format!("Request-Method: {}\n", method_token(method)));

        loop {
            let line = self
                .read_line()?
                .ok_or(HttpError::ConnectionClosed)?;
            if line.is_empty() {
                break;
            }
            apply_header(&mut request, &line);
            request.raw_headers.push_str(&line);
            request.raw_headers.push('\n');
        }

        if !request.http_1_0 && request.host_header.is_none() {
            return Err(HttpError::MissingHost);
        }

        if let Some(len) = request.content_length {
            if len < 0 || len > MAX_CONTENT_LENGTH {
                return Err(HttpError::TooLarge);
            }
        }

        let has_body = request_has_body(&request);

        if has_body {
            let len = request.content_length.unwrap() as usize;
            if len as i64 > self.max_body {
                return Err(HttpError::TooLarge);
            }
            let mut body = std::mem::take(&mut self.buf);
            while body.len() < len {
                let mut chunk = [0u8; 64 * 1024];
                let want = (len - body.len()).min(chunk.len());
                let n = self.stream.read(&mut chunk[..want])?;
                if n == 0 {
                    return Err(HttpError::ConnectionClosed);
                }
                body.extend_from_slice(&chunk[..n]);
            }
            let leftover = body.split_off(len);
            self.buf = leftover;
            request.body = body;
        }
        // Bodyless requests leave `self.buf` untouched: the original
        // (http.c:305-326) resets to PART_REQUEST preserving whatever
        // trails the blank line, rather than rejecting it — a second
        // request already buffered from the same `read()` is the normal
        // keep-alive case, not pipelining to refuse.

        Ok(Some(request))
    }

    /// Whether the connection should close after this request/response
    /// pair instead of looping back to `REQUEST`, per spec.md §4.F: HTTP/1.0,
    /// an explicit `Connection: close`, or — for requests with a body only,
    /// per the original's `http.c:512` — leftover bytes trailing the body,
    /// which this design refuses to treat as a pipelined next request.
    pub fn should_close(&self, request: &Request) -> bool {
        request.http_1_0
            || request.connection_close
            || (request_has_body(request) && !self.buf.is_empty())
    }

    /// Emits the status line, `Content-Type`/`Content-Length` headers, any
    /// extra raw header block, then the terminating blank line. `content_length
    /// == -1` omits the header (used with chunked transfer), per spec.md §4.F.
    pub fn respond(
        &mut self,
        code: u16,
        text: &str,
        content_type: Option<&str>,
        content_length: i64,
        extra_headers: Option<&str>,
    ) -> Result<(), HttpError> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", code, text);
        if let Some(ct) = content_type {
            out.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        if content_length >= 0 {
            out.push_str(&format!("Content-Length: {}\r\n", content_length));
        }
        if let Some(extra) = extra_headers {
            out.push_str(extra);
        }
        out.push_str("\r\n");
        self.stream.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Writes body bytes, chunked internally at 1 MiB per underlying write
    /// call, per spec.md §4.F.
    pub fn send(&mut self, mut data: &[u8]) -> Result<(), HttpError> {
        while !data.is_empty() {
            let take = data.len().min(SEND_CHUNK_MAX);
            self.stream.write_all(&data[..take])?;
            data = &data[take..];
        }
        Ok(())
    }

    /// Formats and writes one HTTP chunk: hex length, CRLF, payload, CRLF.
    /// `data.is_empty()` sends the terminating `0\r\n\r\n`.
    pub fn send_chunk(&mut self, data: &[u8]) -> Result<(), HttpError> {
        let header = format!("{:x}\r\n", data.len());
        self.stream.write_all(header.as_bytes())?;
        self.stream.write_all(data)?;
        self.stream.write_all(b"\r\n")?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads one line (terminated by `\n`, with an optional trailing `\r`
    /// stripped) out of the accumulated buffer, refilling from the socket as
    /// needed. Returns `Ok(None)` only on a clean EOF with no partial line
    /// pending.
    fn read_line(&mut self) -> Result<Option<String>, HttpError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop(); // trailing \n
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.buf.len() >= self.line_buffer_cap {
                return Err(HttpError::TooLarge);
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(HttpError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

}

/// Whether `request` carries a declared, nonzero-length body.
fn request_has_body(request: &Request) -> bool {
    matches!(request.method, Method::Put | Method::Post) && request.content_length.unwrap_or(0) > 0
}

fn method_token(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Put => "PUT",
        Method::Post => "POST",
        Method::Head => "HEAD",
        Method::Delete => "DELETE",
        Method::Other => "OTHER",
    }
}

/// Parses the request line. Must be at least 14 bytes and end with
/// ` HTTP/1.` followed by a single digit, per spec.md §4.F.
fn parse_request_line(line: &str) -> Result<(Method, String, bool), HttpError> {
    // A token with no space anywhere in the line is the "unrecognized
    // method" case spec.md §4.F calls out for 501, distinct from a
    // malformed-but-space-containing line.
    let space = line.find(' ').ok_or(HttpError::UnrecognizedMethod)?;

    if line.len() < 14 {
        return Err(HttpError::MalformedRequestLine);
    }
    let marker = " HTTP/1.";
    let marker_pos = line.rfind(marker).ok_or(HttpError::MalformedRequestLine)?;
    if marker_pos <= space {
        return Err(HttpError::MalformedRequestLine);
    }
    let version_digit = line[marker_pos + marker.len()..]
        .chars()
        .next()
        .ok_or(HttpError::MalformedRequestLine)?;
    if !version_digit.is_ascii_digit() {
        return Err(HttpError::MalformedRequestLine);
    }
    let http_1_0 = version_digit == '0';

    let method_token = &line[..space];
    let uri = Request::decode_uri(line[space + 1..marker_pos].trim());
    Ok((Method::parse(method_token), uri, http_1_0))
}

/// Applies one raw header line's effect to `request`'s attributes, per
/// spec.md §4.F's per-header rules.
fn apply_header(request: &mut Request, line: &str) {
    let colon = match line.find(':') {
        Some(pos) => pos,
        None => return,
    };
    let name = line[..colon].to_ascii_lowercase();
    let value = line[colon + 1..].trim();

    match name.as_str() {
        "content-length" => {
            if let Ok(parsed) = value.parse::<i64>() {
                request.content_length = Some(parsed);
            }
        }
        "content-type" => {
            let semi = value.find(';').unwrap_or(value.len());
            let lowered = format!(
                "{}{}",
                value[..semi].to_ascii_lowercase(),
                &value[semi..]
            );
            request.content_form_uenc =
                lowered.starts_with("application/x-www-form-urlencoded");
            request.content_type = Some(lowered);
        }
        "host" => request.host_header = Some(value.to_string()),
        "connection" => {
            if value.to_ascii_lowercase().starts_with("close") {
                request.connection_close = true;
            }
        }
        "upgrade" => {
            if value.eq_ignore_ascii_case("websocket") {
                request.ws_upgrade = true;
            }
        }
        "sec-websocket-key" => request.sec_websocket_key = Some(value.to_string()),
        "sec-websocket-version" => request.sec_websocket_version = Some(value.to_string()),
        "sec-websocket-protocol" => request.sec_websocket_protocol = Some(value.to_string()),
        _ => {}
    }
}
