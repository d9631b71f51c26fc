/*
 * key.rs
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

//! Endpoint key: the immutable value a connection partition is bucketed by.

use std::fmt;

use url::Url;

use crate::protocol::http::request::Request;
use crate::proxy::ProxyServer;
use crate::uri;

/// Scheme, host, port, optional proxy address and optional partition discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    scheme: String,
    host: String,
    port: u16,
    proxy: Option<(String, u16)>,
    partition: Option<String>,
}

impl EndpointKey {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
            proxy: None,
            partition: None,
        }
    }

    /// Key for the origin of `url`.
    pub fn from_url(url: &Url) -> Self {
        Self::new(url.scheme(), url.host_str().unwrap_or(""), uri::explicit_port(url))
    }

    /// Key for `request` routed through `proxy` (already resolved against
    /// the non-proxy host list).
    pub fn for_request(request: &Request, proxy: Option<&ProxyServer>) -> Self {
        let mut key = Self::from_url(request.url());
        if let Some(p) = proxy {
            key.proxy = Some((p.host.to_ascii_lowercase(), p.port));
        }
        key.partition = request.partition().map(str::to_string);
        key
    }

    pub fn with_proxy(mut self, host: &str, port: u16) -> Self {
        self.proxy = Some((host.to_ascii_lowercase(), port));
        self
    }

    pub fn with_partition(mut self, partition: Option<String>) -> Self {
        self.partition = partition;
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn proxy(&self) -> Option<(&str, u16)> {
        self.proxy.as_ref().map(|(h, p)| (h.as_str(), *p))
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Address the transport dials: the proxy if any, else the target.
    pub fn connect_address(&self) -> (&str, u16) {
        self.proxy().unwrap_or((self.host.as_str(), self.port))
    }

    /// HTTPS through a proxy needs a CONNECT tunnel before the first request.
    pub fn tunneled(&self) -> bool {
        self.is_secure() && self.proxy.is_some()
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some((host, port)) = &self.proxy {
            write!(f, " via {}:{}", host, port)?;
        }
        if let Some(partition) = &self.partition {
            write!(f, " [{}]", partition)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::request::RequestBuilder;

    #[test]
    fn keys_normalise_host_and_default_port() {
        let a = EndpointKey::from_url(&Url::parse("http://Example.COM/a").unwrap());
        let b = EndpointKey::new("HTTP", "example.com", 80);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "http://example.com:80");
    }

    #[test]
    fn proxy_and_partition_split_buckets() {
        let r = RequestBuilder::get("https://h/").partition(Some("tenant".into())).build().unwrap();
        let proxy = ProxyServer::new("proxy", 3128);
        let direct = EndpointKey::for_request(&r, None);
        let proxied = EndpointKey::for_request(&r, Some(&proxy));
        assert_ne!(direct, proxied);
        assert_eq!(proxied.connect_address(), ("proxy", 3128));
        assert!(proxied.tunneled());
        assert!(!direct.tunneled());
        assert_eq!(direct.partition(), Some("tenant"));
        assert_eq!(direct.connect_address(), ("h", 443));
    }
}
