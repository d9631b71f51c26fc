/*
 * redirect.rs
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

//! Follow-up request for a 3xx response.

use url::Url;

use crate::cookie::Cookie;
use crate::error::ExchangeError;
use crate::protocol::http::headers::{names, Headers};
use crate::protocol::http::request::{Method, Request};
use crate::uri;

pub fn is_redirect(code: u16) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}

/// Method of the follow-up request and whether the body goes with it.
/// 303, and 302 unless strict, switch to GET (HEAD stays HEAD) and drop the body.
pub fn redirect_method(method: Method, code: u16, strict_302: bool) -> (Method, bool) {
    let downgrade = code == 303 || (code == 302 && !strict_302);
    if downgrade {
        let m = if method == Method::Head { Method::Head } else { Method::Get };
        (m, false)
    } else {
        (method, true)
    }
}

/// Request to send to `target` after a `code` response with `response_headers`.
pub fn next_request(
    request: &Request,
    code: u16,
    target: Url,
    response_headers: &Headers,
    strict_302: bool,
) -> Result<Request, ExchangeError> {
    let (method, keep_body) = redirect_method(request.method(), code, strict_302);

    let mut headers = request.headers().clone();
    headers.remove(names::HOST).remove(names::CONTENT_LENGTH).remove(names::CONTENT_TYPE);
    if !keep_body {
        headers.remove(names::EXPECT).remove(names::TRANSFER_ENCODING);
    }
    let connection_bound = request.realm().map(|r| r.scheme.is_connection_bound()).unwrap_or(false);
    if connection_bound {
        headers.remove(names::AUTHORIZATION).remove(names::PROXY_AUTHORIZATION);
    }

    let virtual_host = if uri::is_same_base(request.url(), &target) {
        request.virtual_host().map(str::to_string)
    } else {
        None
    };

    let mut builder = request
        .to_builder()
        .method(method)
        .url(target)
        .headers(headers)
        .virtual_host(virtual_host);
    if !keep_body {
        builder = builder.no_body();
    }
    for value in response_headers.get_all(names::SET_COOKIE) {
        if let Some(cookie) = Cookie::decode(value) {
            builder = builder.add_or_replace_cookie(cookie);
        }
    }
    builder.build()
}
