/*
 * config.rs
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

//! Client configuration: limits, timeouts, redirect and auth policy, filters.
//!
//! Scalar options can be read from XML with quick_xml:
//! `<client><maxConnections>10</maxConnections><followRedirect>true</followRedirect>...</client>`.
//! Durations are in milliseconds. Unknown elements are ignored.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::auth::{NtlmEngine, Realm, SpnegoEngine};
use crate::engine::{IoExceptionFilter, ResponseFilter};
use crate::error::ConfigError;
use crate::pool::{ConnectionStrategy, DefaultConnectionStrategy, PoolConfig};
use crate::proxy::ProxyServer;

pub const DEFAULT_USER_AGENT: &str = concat!("Corriere/", env!("CARGO_PKG_VERSION"));

/// Everything the engine consults while sending and interpreting responses.
#[derive(Clone)]
pub struct ClientConfig {
    pub max_connections: Option<usize>,
    pub max_connections_per_host: Option<usize>,
    pub connect_timeout: Duration,
    /// Keep-alive timeout of idle pooled connections.
    pub pooled_connection_idle_timeout: Duration,
    pub connection_ttl: Option<Duration>,
    pub idle_eviction_interval: Duration,
    /// Abort an exchange with no activity for this long.
    pub read_timeout: Option<Duration>,
    /// Abort an exchange that has not completed after this long.
    pub request_timeout: Option<Duration>,
    pub allow_pooling_connections: bool,
    pub follow_redirect: bool,
    pub max_redirects: u32,
    /// Treat 302 like 307: keep method and body.
    pub strict_302_handling: bool,
    /// Skip certificate verification on TLS (including tunnel upgrades).
    pub accept_any_certificate: bool,
    pub user_agent: Option<String>,
    pub realm: Option<Realm>,
    pub proxy_server: Option<ProxyServer>,
    pub response_filters: Vec<Arc<dyn ResponseFilter>>,
    pub io_exception_filters: Vec<Arc<dyn IoExceptionFilter>>,
    pub connection_strategy: Arc<dyn ConnectionStrategy>,
    pub ntlm_engine: Option<Arc<dyn NtlmEngine>>,
    pub spnego_engine: Option<Arc<dyn SpnegoEngine>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_connections: None,
            max_connections_per_host: None,
            connect_timeout: Duration::from_secs(5),
            pooled_connection_idle_timeout: Duration::from_secs(60),
            connection_ttl: None,
            idle_eviction_interval: Duration::from_secs(1),
            read_timeout: None,
            request_timeout: None,
            allow_pooling_connections: true,
            follow_redirect: false,
            max_redirects: 5,
            strict_302_handling: false,
            accept_any_certificate: false,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            realm: None,
            proxy_server: None,
            response_filters: Vec::new(),
            io_exception_filters: Vec::new(),
            connection_strategy: Arc::new(DefaultConnectionStrategy),
            ntlm_engine: None,
            spnego_engine: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("max_connections", &self.max_connections)
            .field("max_connections_per_host", &self.max_connections_per_host)
            .field("connect_timeout", &self.connect_timeout)
            .field("pooled_connection_idle_timeout", &self.pooled_connection_idle_timeout)
            .field("follow_redirect", &self.follow_redirect)
            .field("max_redirects", &self.max_redirects)
            .field("strict_302_handling", &self.strict_302_handling)
            .field("response_filters", &self.response_filters.len())
            .field("io_exception_filters", &self.io_exception_filters.len())
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n);
        self
    }

    pub fn max_connections_per_host(mut self, n: usize) -> Self {
        self.max_connections_per_host = Some(n);
        self
    }

    pub fn connect_timeout(mut self, t: Duration) -> Self {
        self.connect_timeout = t;
        self
    }

    pub fn pooled_connection_idle_timeout(mut self, t: Duration) -> Self {
        self.pooled_connection_idle_timeout = t;
        self
    }

    pub fn connection_ttl(mut self, t: Duration) -> Self {
        self.connection_ttl = Some(t);
        self
    }

    pub fn idle_eviction_interval(mut self, t: Duration) -> Self {
        self.idle_eviction_interval = t;
        self
    }

    pub fn read_timeout(mut self, t: Duration) -> Self {
        self.read_timeout = Some(t);
        self
    }

    pub fn request_timeout(mut self, t: Duration) -> Self {
        self.request_timeout = Some(t);
        self
    }

    pub fn allow_pooling_connections(mut self, allow: bool) -> Self {
        self.allow_pooling_connections = allow;
        self
    }

    pub fn follow_redirect(mut self, follow: bool) -> Self {
        self.follow_redirect = follow;
        self
    }

    pub fn max_redirects(mut self, n: u32) -> Self {
        self.max_redirects = n;
        self
    }

    pub fn strict_302_handling(mut self, strict: bool) -> Self {
        self.strict_302_handling = strict;
        self
    }

    pub fn accept_any_certificate(mut self, accept: bool) -> Self {
        self.accept_any_certificate = accept;
        self
    }

    pub fn user_agent(mut self, ua: Option<String>) -> Self {
        self.user_agent = ua;
        self
    }

    pub fn realm(mut self, realm: Realm) -> Self {
        self.realm = Some(realm);
        self
    }

    pub fn proxy_server(mut self, proxy: ProxyServer) -> Self {
        self.proxy_server = Some(proxy);
        self
    }

    pub fn add_response_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.response_filters.push(filter);
        self
    }

    pub fn add_io_exception_filter(mut self, filter: Arc<dyn IoExceptionFilter>) -> Self {
        self.io_exception_filters.push(filter);
        self
    }

    pub fn connection_strategy(mut self, strategy: Arc<dyn ConnectionStrategy>) -> Self {
        self.connection_strategy = strategy;
        self
    }

    pub fn ntlm_engine(mut self, engine: Arc<dyn NtlmEngine>) -> Self {
        self.ntlm_engine = Some(engine);
        self
    }

    pub fn spnego_engine(mut self, engine: Arc<dyn SpnegoEngine>) -> Self {
        self.spnego_engine = Some(engine);
        self
    }

    /// Limits and timers handed to the connection pool.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            max_connections_per_host: self.max_connections_per_host,
            keep_alive_timeout: self.pooled_connection_idle_timeout,
            connection_ttl: self.connection_ttl,
            pooling_enabled: self.allow_pooling_connections,
        }
    }

    /// Read a config file; see `from_xml`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_xml(&content)
    }

    /// Defaults overridden by the scalar options found in `xml`.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut proxy_host: Option<String> = None;
        let mut proxy_port: u16 = 80;
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut element = String::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(ConfigError::Xml(e.to_string())),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                }
                Ok(Event::Text(e)) => {
                    if element.is_empty() {
                        continue;
                    }
                    let text = e.unescape().map_err(|e| ConfigError::Xml(e.to_string()))?.trim().to_string();
                    match element.as_str() {
                        "maxConnections" => config.max_connections = Some(parse(&element, &text)?),
                        "maxConnectionsPerHost" => config.max_connections_per_host = Some(parse(&element, &text)?),
                        "connectTimeout" => config.connect_timeout = millis(&element, &text)?,
                        "pooledConnectionIdleTimeout" => {
                            config.pooled_connection_idle_timeout = millis(&element, &text)?
                        }
                        "connectionTtl" => config.connection_ttl = Some(millis(&element, &text)?),
                        "idleEvictionInterval" => config.idle_eviction_interval = millis(&element, &text)?,
                        "readTimeout" => config.read_timeout = Some(millis(&element, &text)?),
                        "requestTimeout" => config.request_timeout = Some(millis(&element, &text)?),
                        "allowPoolingConnections" => config.allow_pooling_connections = parse(&element, &text)?,
                        "followRedirect" => config.follow_redirect = parse(&element, &text)?,
                        "maxRedirects" => config.max_redirects = parse(&element, &text)?,
                        "strict302Handling" => config.strict_302_handling = parse(&element, &text)?,
                        "acceptAnyCertificate" => config.accept_any_certificate = parse(&element, &text)?,
                        "userAgent" => config.user_agent = Some(text),
                        "proxyHost" => proxy_host = Some(text),
                        "proxyPort" => proxy_port = parse(&element, &text)?,
                        _ => {}
                    }
                    element.clear();
                }
                Ok(Event::End(_)) => element.clear(),
                _ => {}
            }
            buf.clear();
        }
        if let Some(host) = proxy_host {
            config.proxy_server = Some(ProxyServer::new(host, proxy_port));
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(option: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    })
}

fn millis(option: &str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(option, value).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.max_redirects, 5);
        assert!(!c.follow_redirect);
        assert!(c.allow_pooling_connections);
        assert_eq!(c.connect_timeout, Duration::from_secs(5));
        assert_eq!(c.pool_config().keep_alive_timeout, Duration::from_secs(60));
    }

    #[test]
    fn xml_overrides_scalars() {
        let xml = r#"<?xml version="1.0"?>
            <client>
              <maxConnections>1</maxConnections>
              <followRedirect>true</followRedirect>
              <maxRedirects>3</maxRedirects>
              <readTimeout>250</readTimeout>
              <proxyHost>proxy.local</proxyHost>
              <proxyPort>3128</proxyPort>
              <somethingElse>ignored</somethingElse>
            </client>"#;
        let c = ClientConfig::from_xml(xml).unwrap();
        assert_eq!(c.max_connections, Some(1));
        assert!(c.follow_redirect);
        assert_eq!(c.max_redirects, 3);
        assert_eq!(c.read_timeout, Some(Duration::from_millis(250)));
        let proxy = c.proxy_server.unwrap();
        assert_eq!((proxy.host.as_str(), proxy.port), ("proxy.local", 3128));
    }

    #[test]
    fn bad_value_names_option() {
        let err = ClientConfig::from_xml("<client><maxRedirects>many</maxRedirects></client>").unwrap_err();
        assert_eq!(err.to_string(), "invalid value for maxRedirects: many");
    }
}
