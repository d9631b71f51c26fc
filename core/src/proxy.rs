/*
 * proxy.rs
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

//! Proxy server description. Selection is static: a request uses its own proxy or the
//! client-wide one, unless the target host is listed in `non_proxy_hosts`.

use crate::auth::Realm;

/// HTTP proxy. HTTPS targets are reached through a CONNECT tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyServer {
    pub host: String,
    pub port: u16,
    /// Credentials answering `407` challenges.
    pub realm: Option<Realm>,
    /// Hosts reached directly. A leading `*.` or `.` matches any subdomain.
    pub non_proxy_hosts: Vec<String>,
}

impl ProxyServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            realm: None,
            non_proxy_hosts: Vec::new(),
        }
    }

    pub fn with_realm(mut self, realm: Realm) -> Self {
        self.realm = Some(realm);
        self
    }

    pub fn with_non_proxy_host(mut self, host: impl Into<String>) -> Self {
        self.non_proxy_hosts.push(host.into());
        self
    }

    /// True if `host` must bypass this proxy.
    pub fn ignores(&self, host: &str) -> bool {
        self.non_proxy_hosts.iter().any(|pattern| {
            let pattern = pattern.trim();
            if let Some(suffix) = pattern.strip_prefix('*') {
                host.len() > suffix.len() && ends_with_ignore_case(host, suffix)
            } else if pattern.starts_with('.') {
                ends_with_ignore_case(host, pattern)
            } else {
                host.eq_ignore_ascii_case(pattern)
            }
        })
    }
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
