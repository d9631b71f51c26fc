/*
 * strategy.rs
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

//! Keep-alive decision for a finished request/response pair.

use crate::protocol::http::headers::{names, Headers};
use crate::protocol::http::response::{HttpVersion, ResponseStatus};

/// Decides whether the connection may be reused after a response.
pub trait ConnectionStrategy: Send + Sync {
    fn keep_alive(&self, request_headers: &Headers, status: &ResponseStatus, response_headers: &Headers) -> bool;
}

/// HTTP/1.1 persistent unless either side says `Connection: close`;
/// HTTP/1.0 persistent only with an explicit `Connection: keep-alive`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnectionStrategy;

impl ConnectionStrategy for DefaultConnectionStrategy {
    fn keep_alive(&self, request_headers: &Headers, status: &ResponseStatus, response_headers: &Headers) -> bool {
        if request_headers.contains_token(names::CONNECTION, "close")
            || response_headers.contains_token(names::CONNECTION, "close")
        {
            return false;
        }
        match status.version {
            HttpVersion::Http1_1 => true,
            HttpVersion::Http1_0 => response_headers.contains_token(names::CONNECTION, "keep-alive"),
        }
    }
}
