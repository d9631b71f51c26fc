/*
 * parser.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client engine.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length,
//! chunked, or read-until-close).

use bytes::Buf;
use bytes::BytesMut;
use std::io;

use crate::protocol::http::response::HttpVersion;

/// Callback for HTTP/1.1 response events. The connection implements this and
/// turns them into transport events.
pub trait H1ResponseHandler {
    fn status(&mut self, version: HttpVersion, code: u16, reason: Option<&str>);
    fn header(&mut self, name: &str, value: &str);
    fn body_chunk(&mut self, data: &[u8]);
    fn trailer(&mut self, name: &str, value: &str);
    /// End of the body, after any trailers.
    fn end_body(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    StatusLine,
    Headers,
    /// Headers done; the connection must call `set_body_mode()`.
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
}

/// How the body following a header block is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body: HEAD, 204, 304, or Content-Length 0.
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

impl BodyMode {
    /// Body framing per RFC 9112 §6.3 for a final response.
    pub fn for_response(head_request: bool, code: u16, content_length: Option<u64>, chunked: bool) -> Self {
        if head_request || code == 204 || code == 304 {
            BodyMode::Empty
        } else if chunked {
            BodyMode::Chunked
        } else {
            match content_length {
                Some(0) => BodyMode::Empty,
                Some(n) => BodyMode::Length(n),
                None => BodyMode::UntilClose,
            }
        }
    }
}

/// Push parser for HTTP/1.1 responses. Feed bytes via `receive`; the handler is
/// invoked as complete tokens are parsed.
pub struct ResponseParser {
    state: ParseState,
    /// Content-Length when known (-1 for chunked or read-until-close).
    content_length: i64,
    bytes_received: i64,
    chunk_remaining: i64,
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            content_length: -1,
            bytes_received: 0,
            chunk_remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Ready for the next status line.
    pub fn reset(&mut self) {
        self.state = ParseState::StatusLine;
        self.content_length = -1;
        self.bytes_received = 0;
        self.chunk_remaining = 0;
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    fn split_header(line: &str) -> Option<(&str, &str)> {
        let colon = line.find(':')?;
        Some((line[..colon].trim(), line[colon + 1..].trim()))
    }

    fn parse_status_line<H: H1ResponseHandler>(line: &str, handler: &mut H) -> io::Result<()> {
        // HTTP/1.1 200 OK or HTTP/1.1 200
        let mut parts = line.splitn(3, ' ');
        let version = match parts.next() {
            Some("HTTP/1.0") => HttpVersion::Http1_0,
            Some(v) if v.starts_with("HTTP/") => HttpVersion::Http1_1,
            _ => return Err(invalid("invalid status line")),
        };
        let code = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .filter(|c| (100..1000).contains(c))
            .ok_or_else(|| invalid("invalid status code"))?;
        let reason = parts.next().map(str::trim).filter(|s| !s.is_empty());
        handler.status(version, code, reason);
        Ok(())
    }

    /// Consume and parse as much as possible from buf. Partial data remains in buf.
    /// Returns at `HeadersComplete` and at `Idle`.
    pub fn receive<H: H1ResponseHandler>(&mut self, buf: &mut BytesMut, handler: &mut H) -> io::Result<()> {
        while !buf.is_empty() {
            match self.state {
                ParseState::StatusLine => {
                    let Some(line_end) = Self::find_crlf(buf) else { return Ok(()) };
                    let line = buf.split_to(line_end + 2);
                    if line_end == 0 {
                        // stray CRLF between responses
                        continue;
                    }
                    let line_str =
                        std::str::from_utf8(&line[..line_end]).map_err(|_| invalid("invalid status line UTF-8"))?;
                    Self::parse_status_line(line_str, handler)?;
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line_end) = Self::find_crlf(buf) else { return Ok(()) };
                    if line_end == 0 {
                        buf.advance(2);
                        self.state = ParseState::HeadersComplete;
                        return Ok(());
                    }
                    let line = buf.split_to(line_end + 2);
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| invalid("invalid header UTF-8"))?;
                    if let Some((name, value)) = Self::split_header(line_str) {
                        handler.header(name, value);
                    }
                }
                ParseState::Body => {
                    if self.content_length >= 0 {
                        let remaining = (self.content_length - self.bytes_received) as usize;
                        let to_read = remaining.min(buf.len());
                        if to_read > 0 {
                            let chunk = buf.split_to(to_read);
                            handler.body_chunk(&chunk);
                            self.bytes_received += to_read as i64;
                        }
                        if self.bytes_received >= self.content_length {
                            handler.end_body();
                            self.state = ParseState::Idle;
                        }
                    } else {
                        let chunk = buf.split_to(buf.len());
                        handler.body_chunk(&chunk);
                        return Ok(());
                    }
                }
                ParseState::ChunkSize => {
                    let Some(line_end) = Self::find_crlf(buf) else { return Ok(()) };
                    let line = buf.split_to(line_end + 2);
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| invalid("invalid chunk size"))?;
                    let hex_part = line_str.split(';').next().unwrap_or(line_str).trim();
                    self.chunk_remaining = i64::from_str_radix(hex_part, 16).map_err(|_| invalid("invalid chunk size"))?;
                    self.state = if self.chunk_remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    let to_read = (self.chunk_remaining as usize).min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.chunk_remaining -= to_read as i64;
                    }
                    if self.chunk_remaining > 0 || buf.len() < 2 {
                        return Ok(());
                    }
                    // trailing CRLF of the chunk
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let Some(line_end) = Self::find_crlf(buf) else { return Ok(()) };
                    if line_end == 0 {
                        buf.advance(2);
                        handler.end_body();
                        self.state = ParseState::Idle;
                    } else {
                        let line = buf.split_to(line_end + 2);
                        let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| invalid("invalid trailer"))?;
                        if let Some((name, value)) = Self::split_header(line_str) {
                            handler.trailer(name, value);
                        }
                    }
                }
                ParseState::HeadersComplete | ParseState::Idle => return Ok(()),
            }
        }
        Ok(())
    }

    /// Called by the connection in state `HeadersComplete`. An empty body ends at once.
    pub fn set_body_mode<H: H1ResponseHandler>(&mut self, mode: BodyMode, handler: &mut H) {
        if self.state != ParseState::HeadersComplete {
            return;
        }
        self.bytes_received = 0;
        match mode {
            BodyMode::Empty => {
                handler.end_body();
                self.state = ParseState::Idle;
            }
            BodyMode::Length(n) => {
                self.content_length = n as i64;
                self.state = ParseState::Body;
            }
            BodyMode::Chunked => {
                self.content_length = -1;
                self.state = ParseState::ChunkSize;
            }
            BodyMode::UntilClose => {
                self.content_length = -1;
                self.state = ParseState::Body;
            }
        }
    }

    /// The peer closed the connection. Ends a read-until-close body and returns
    /// true; any other state is left alone.
    pub fn end_of_input<H: H1ResponseHandler>(&mut self, handler: &mut H) -> bool {
        if self.state == ParseState::Body && self.content_length < 0 {
            handler.end_body();
            self.state = ParseState::Idle;
            true
        } else {
            false
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}
