/*
 * challenge.rs
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

//! `WWW-Authenticate` / `Proxy-Authenticate` value parsing.
//!
//! Each header value is treated as one challenge: a scheme name followed either by
//! a token68 (`NTLM TlRMTVNT...`) or by comma-separated `name=value` parameters,
//! values optionally quoted.

/// One parsed challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    /// Opaque token following the scheme (NTLM type 2, Negotiate).
    pub token: Option<String>,
    pub params: Vec<(String, String)>,
}

impl Challenge {
    pub fn parse(value: &str) -> Option<Challenge> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let (scheme, rest) = match value.find(char::is_whitespace) {
            Some(i) => (&value[..i], value[i..].trim()),
            None => (value, ""),
        };
        let mut challenge = Challenge {
            scheme: scheme.to_string(),
            token: None,
            params: Vec::new(),
        };
        if rest.is_empty() {
            return Some(challenge);
        }
        if !rest.contains('=') || is_token68(rest) {
            challenge.token = Some(rest.to_string());
            return Some(challenge);
        }
        challenge.params = parse_params(rest);
        Some(challenge)
    }

    /// Scheme comparison, case-insensitive.
    pub fn is(&self, scheme: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
    }

    /// Parameter value by name, case-insensitive.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn realm(&self) -> Option<&str> {
        self.param("realm")
    }
}

/// token68 only ever has trailing '=' padding.
fn is_token68(s: &str) -> bool {
    let body = s.trim_end_matches('=');
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'/'))
}

fn parse_params(s: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i] == b',' || bytes[i].is_ascii_whitespace()) {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b',' {
            i += 1;
        }
        let name = s[name_start..i].trim().to_string();
        if i >= bytes.len() || bytes[i] == b',' {
            if !name.is_empty() {
                params.push((name, String::new()));
            }
            continue;
        }
        i += 1; // '='
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < bytes.len() && bytes[i] == b'"' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    i += 1;
                }
                let ch_len = utf8_len(bytes[i]);
                value.push_str(&s[i..i + ch_len]);
                i += ch_len;
            }
            i += 1; // closing quote
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            value.push_str(s[start..i].trim());
        }
        if !name.is_empty() {
            params.push((name, value));
        }
    }
    params
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_params() {
        let c = Challenge::parse(
            "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
             nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"",
        )
        .unwrap();
        assert!(c.is("digest"));
        assert_eq!(c.realm(), Some("testrealm@host.com"));
        assert_eq!(c.param("QOP"), Some("auth,auth-int"));
        assert_eq!(c.param("opaque"), Some("5ccc069c403ebaf9f0171e9517f40e41"));
        assert!(c.token.is_none());
    }

    #[test]
    fn ntlm_token_and_bare_scheme() {
        let c = Challenge::parse("NTLM TlRMTVNTUAACAAAADAAMADAAAAA=").unwrap();
        assert!(c.is("NTLM"));
        assert_eq!(c.token.as_deref(), Some("TlRMTVNTUAACAAAADAAMADAAAAA="));
        let bare = Challenge::parse("Negotiate").unwrap();
        assert!(bare.token.is_none() && bare.params.is_empty());
    }

    #[test]
    fn unquoted_and_escaped_values() {
        let c = Challenge::parse("Basic realm=\"a \\\"quoted\\\" realm\", charset=UTF-8").unwrap();
        assert_eq!(c.realm(), Some("a \"quoted\" realm"));
        assert_eq!(c.param("charset"), Some("UTF-8"));
    }
}
