/*
 * response.rs
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

//! Response status, body parts, and the accumulated response an exchange resolves to.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use url::Url;

use crate::protocol::http::headers::Headers;

/// Protocol version of a response status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    Http1_0,
    #[default]
    Http1_1,
}

/// Status line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    pub version: HttpVersion,
    pub code: u16,
    pub reason: Option<String>,
    /// Peer address, when the transport knows it.
    pub remote_addr: Option<SocketAddr>,
}

impl ResponseStatus {
    pub fn new(code: u16) -> Self {
        Self {
            version: HttpVersion::Http1_1,
            code,
            reason: None,
            remote_addr: None,
        }
    }

    pub fn with_reason(code: u16, reason: impl Into<String>) -> Self {
        Self {
            version: HttpVersion::Http1_1,
            code,
            reason: Some(reason.into()),
            remote_addr: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 1xx other than 101 Switching Protocols.
    pub fn is_interim(&self) -> bool {
        (100..200).contains(&self.code) && self.code != 101
    }
}

/// One fragment of a response body. `last` marks the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    pub data: Bytes,
    pub last: bool,
}

impl BodyPart {
    pub fn new(data: impl Into<Bytes>, last: bool) -> Self {
        Self {
            data: data.into(),
            last,
        }
    }

    /// Empty terminal fragment.
    pub fn end() -> Self {
        Self {
            data: Bytes::new(),
            last: true,
        }
    }
}

/// Accumulated final response: status, headers, trailers, body.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: ResponseStatus,
    pub headers: Headers,
    pub trailers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status.code
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Body decoded as UTF-8, lossy.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builds a `Response` from the events of the final attempt.
#[derive(Debug)]
pub(crate) struct ResponseAccumulator {
    url: Url,
    status: Option<ResponseStatus>,
    headers: Headers,
    trailers: Headers,
    body: BytesMut,
}

impl ResponseAccumulator {
    pub(crate) fn new(url: Url) -> Self {
        Self {
            url,
            status: None,
            headers: Headers::new(),
            trailers: Headers::new(),
            body: BytesMut::new(),
        }
    }

    /// Start over for a new attempt against `url`.
    pub(crate) fn reset(&mut self, url: Url, status: ResponseStatus) {
        self.url = url;
        self.status = Some(status);
        self.headers = Headers::new();
        self.trailers = Headers::new();
        self.body.clear();
    }

    pub(crate) fn set_headers(&mut self, headers: &Headers) {
        self.headers = headers.clone();
    }

    pub(crate) fn add_trailers(&mut self, trailers: &Headers) {
        self.trailers.extend_from(trailers);
    }

    pub(crate) fn append(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// Snapshot of what has been received. `None` before any status was delivered.
    pub(crate) fn build(&self) -> Option<Response> {
        let status = self.status.clone()?;
        Some(Response {
            url: self.url.clone(),
            status,
            headers: self.headers.clone(),
            trailers: self.trailers.clone(),
            body: Bytes::copy_from_slice(&self.body),
        })
    }
}
