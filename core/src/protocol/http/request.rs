/*
 * request.rs
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

//! HTTP request descriptor: method, URL, headers, cookies, optional body, and the
//! per-request overrides (realm, proxy, virtual host, redirect policy, partition).
//!
//! Built via `RequestBuilder`; a built `Request` is immutable. Follow-up requests
//! (redirects, auth retries) are derived with `Request::to_builder`.

use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::auth::Realm;
use crate::cookie::Cookie;
use crate::error::ExchangeError;
use crate::protocol::http::headers::{names, Headers};
use crate::proxy::ProxyServer;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
    Other(&'static str),
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Other(s) => s,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable request descriptor consumed by the engine.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    cookies: Vec<Cookie>,
    body: Option<Bytes>,
    realm: Option<Realm>,
    proxy: Option<ProxyServer>,
    virtual_host: Option<String>,
    follow_redirect: Option<bool>,
    partition: Option<String>,
    request_timeout: Option<Duration>,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Realm for this request; overrides the client-wide realm.
    pub fn realm(&self) -> Option<&Realm> {
        self.realm.as_ref()
    }

    /// Proxy for this request; overrides the client-wide proxy.
    pub fn proxy(&self) -> Option<&ProxyServer> {
        self.proxy.as_ref()
    }

    /// Host to present in the `Host` header instead of the URL host.
    pub fn virtual_host(&self) -> Option<&str> {
        self.virtual_host.as_deref()
    }

    /// Per-request redirect policy; `None` defers to the client config.
    pub fn follow_redirect(&self) -> Option<bool> {
        self.follow_redirect
    }

    /// Extra pool partition discriminator.
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// True when the request asks the server to confirm before the body is sent.
    pub fn expects_continue(&self) -> bool {
        self.body.is_some() && self.headers.contains_token(names::EXPECT, "100-continue")
    }

    /// Builder pre-populated with every attribute of this request.
    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            method: self.method,
            url: Ok(self.url.clone()),
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
            body: self.body.clone(),
            realm: self.realm.clone(),
            proxy: self.proxy.clone(),
            virtual_host: self.virtual_host.clone(),
            follow_redirect: self.follow_redirect,
            partition: self.partition.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// Mutable request builder: method, URL, headers, body and overrides.
///
/// URL errors are deferred to `build()` so calls can be chained.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: Result<Url, String>,
    headers: Headers,
    cookies: Vec<Cookie>,
    body: Option<Bytes>,
    realm: Option<Realm>,
    proxy: Option<ProxyServer>,
    virtual_host: Option<String>,
    follow_redirect: Option<bool>,
    partition: Option<String>,
    request_timeout: Option<Duration>,
}

impl RequestBuilder {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: Url::parse(url).map_err(|e| format!("{}: {}", url, e)),
            headers: Headers::new(),
            cookies: Vec::new(),
            body: None,
            realm: None,
            proxy: None,
            virtual_host: None,
            follow_redirect: None,
            partition: None,
            request_timeout: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: &str) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn url(mut self, url: Url) -> Self {
        self.url = Ok(url);
        self
    }

    /// Add a header; an existing header with the same name is kept.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Replace the whole header list.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Add a cookie, replacing any cookie with the same name.
    pub fn add_or_replace_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
        self
    }

    pub fn body(mut self, data: impl Into<Bytes>) -> Self {
        self.body = Some(data.into());
        self
    }

    pub fn no_body(mut self) -> Self {
        self.body = None;
        self
    }

    pub fn realm(mut self, realm: Option<Realm>) -> Self {
        self.realm = realm;
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxyServer>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn virtual_host(mut self, host: Option<String>) -> Self {
        self.virtual_host = host;
        self
    }

    pub fn follow_redirect(mut self, follow: bool) -> Self {
        self.follow_redirect = Some(follow);
        self
    }

    pub fn partition(mut self, partition: Option<String>) -> Self {
        self.partition = partition;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Request, ExchangeError> {
        let url = self.url.map_err(ExchangeError::InvalidRequest)?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ExchangeError::InvalidRequest(format!(
                    "unsupported scheme {}",
                    other
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(ExchangeError::InvalidRequest(format!("no host in {}", url)));
        }
        Ok(Request {
            method: self.method,
            url,
            headers: self.headers,
            cookies: self.cookies,
            body: self.body,
            realm: self.realm,
            proxy: self.proxy,
            virtual_host: self.virtual_host,
            follow_redirect: self.follow_redirect,
            partition: self.partition,
            request_timeout: self.request_timeout,
        })
    }
}
