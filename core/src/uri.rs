/*
 * uri.rs
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

//! URL helpers: explicit ports, base comparison, request-target forms, Host header.

use url::Url;

/// Port of `url`, falling back to the scheme default (80/443).
pub fn explicit_port(url: &Url) -> u16 {
    url.port_or_known_default().unwrap_or(80)
}

pub fn is_secure(url: &Url) -> bool {
    url.scheme().eq_ignore_ascii_case("https") || url.scheme().eq_ignore_ascii_case("wss")
}

/// Same scheme, host and port.
pub fn is_same_base(a: &Url, b: &Url) -> bool {
    a.scheme().eq_ignore_ascii_case(b.scheme())
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && explicit_port(a) == explicit_port(b)
}

/// Origin-form target: path plus query.
pub fn origin_form(url: &Url) -> String {
    let path = if url.path().is_empty() { "/" } else { url.path() };
    match url.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    }
}

/// Path without query (Digest against a proxy realm).
pub fn path_only(url: &Url) -> String {
    if url.path().is_empty() {
        "/".to_string()
    } else {
        url.path().to_string()
    }
}

/// Absolute-form target for plain requests through a proxy (no fragment).
pub fn absolute_form(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);
    u.to_string()
}

/// Authority-form target for CONNECT: `host:port`.
pub fn authority_form(url: &Url) -> String {
    format!("{}:{}", url.host_str().unwrap_or(""), explicit_port(url))
}

/// `Host` header value; the port is omitted when it is the scheme default.
pub fn host_header(url: &Url, virtual_host: Option<&str>) -> String {
    if let Some(vh) = virtual_host {
        return vh.to_string();
    }
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Resolve a `Location` value against the current URL.
pub fn resolve(base: &Url, location: &str) -> Option<Url> {
    base.join(location.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_base_uses_default_ports() {
        assert!(is_same_base(&u("http://H/a"), &u("http://h:80/b?q")));
        assert!(!is_same_base(&u("http://h/a"), &u("https://h/a")));
        assert!(!is_same_base(&u("http://h:8080/"), &u("http://h/")));
    }

    #[test]
    fn request_target_forms() {
        let url = u("http://h:8080/p?q=1#frag");
        assert_eq!(origin_form(&url), "/p?q=1");
        assert_eq!(absolute_form(&url), "http://h:8080/p?q=1");
        assert_eq!(authority_form(&u("https://h/x")), "h:443");
        assert_eq!(host_header(&url, None), "h:8080");
        assert_eq!(host_header(&u("http://h/"), Some("v.example")), "v.example");
    }

    #[test]
    fn resolve_relative_location() {
        let base = u("http://h/a/b?x");
        assert_eq!(resolve(&base, "/c").unwrap().as_str(), "http://h/c");
        assert_eq!(resolve(&base, "d").unwrap().as_str(), "http://h/a/d");
        assert_eq!(resolve(&base, "https://o/").unwrap().as_str(), "https://o/");
    }
}
