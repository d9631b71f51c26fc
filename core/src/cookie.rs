/*
 * cookie.rs
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

//! Minimal cookie model: decode a `Set-Cookie` value, encode a `Cookie` request header.
//!
//! Attribute handling beyond what redirects need (expiry, matching against the
//! target) belongs to a cookie store, which this crate does not keep.

/// One cookie as received in `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    /// Decode a `Set-Cookie` header value. Returns `None` when there is no `name=value` pair.
    pub fn decode(header: &str) -> Option<Cookie> {
        let mut parts = header.split(';');
        let pair = parts.next()?.trim();
        let eq = pair.find('=')?;
        let name = pair[..eq].trim();
        if name.is_empty() {
            return None;
        }
        let value = unquote(pair[eq + 1..].trim());
        let mut cookie = Cookie::new(name, value);
        for attr in parts {
            let attr = attr.trim();
            let (key, val) = match attr.find('=') {
                Some(i) => (attr[..i].trim(), Some(attr[i + 1..].trim())),
                None => (attr, None),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = val.map(|v| v.trim_start_matches('.').to_string()),
                "path" => cookie.path = val.map(str::to_string),
                "max-age" => cookie.max_age = val.and_then(|v| v.parse().ok()),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }
        Some(cookie)
    }
}

fn unquote(v: &str) -> &str {
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

/// Encode cookies as a single `Cookie` header value (`a=1; b=2`).
pub fn encode(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_with_attributes() {
        let c = Cookie::decode("sid=\"abc\"; Path=/; Domain=.example.com; Max-Age=60; Secure; HttpOnly").unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc");
        assert_eq!(c.path.as_deref(), Some("/"));
        assert_eq!(c.domain.as_deref(), Some("example.com"));
        assert_eq!(c.max_age, Some(60));
        assert!(c.secure && c.http_only);
    }

    #[test]
    fn decode_rejects_missing_pair() {
        assert!(Cookie::decode("novalue").is_none());
        assert!(Cookie::decode("=x").is_none());
    }

    #[test]
    fn encode_joins_pairs() {
        let cookies = vec![Cookie::new("a", "1"), Cookie::new("b", "2")];
        assert_eq!(encode(&cookies).as_deref(), Some("a=1; b=2"));
        assert!(encode(&[]).is_none());
    }
}
