/*
 * digest.rs
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

//! Digest authentication (RFC 7616): MD5, MD5-sess, SHA-256, SHA-256-sess, `qop=auth`.

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::auth::challenge::Challenge;

/// Fixed request counter: one response is computed per challenge.
const NONCE_COUNT: &str = "00000001";

/// Inputs for one digest response.
pub struct DigestInput<'a> {
    pub principal: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    /// Request-target as hashed (path and query, or authority for CONNECT).
    pub uri: &'a str,
    pub cnonce: &'a str,
}

/// Build the `Digest ...` credentials for `challenge`. Returns `None` when the
/// challenge lacks a nonce or names an unsupported algorithm.
pub fn authorization(challenge: &Challenge, input: &DigestInput<'_>) -> Option<String> {
    let nonce = challenge.param("nonce")?;
    let realm = challenge.realm().unwrap_or("");
    let algorithm = challenge.param("algorithm").unwrap_or("MD5");
    let (sha256, session) = match algorithm.to_ascii_uppercase().as_str() {
        "MD5" => (false, false),
        "MD5-SESS" => (false, true),
        "SHA-256" => (true, false),
        "SHA-256-SESS" => (true, true),
        _ => return None,
    };
    let hash = |s: &str| if sha256 { sha256_hex(s) } else { md5_hex(s) };
    let qop = challenge.param("qop").and_then(|q| {
        q.split(',')
            .map(str::trim)
            .find(|v| v.eq_ignore_ascii_case("auth"))
            .map(|_| "auth")
    });

    let mut ha1 = hash(&format!("{}:{}:{}", input.principal, realm, input.password));
    if session {
        ha1 = hash(&format!("{}:{}:{}", ha1, nonce, input.cnonce));
    }
    let ha2 = hash(&format!("{}:{}", input.method, input.uri));
    let response = match qop {
        Some(qop) => hash(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, nonce, NONCE_COUNT, input.cnonce, qop, ha2
        )),
        None => hash(&format!("{}:{}:{}", ha1, nonce, ha2)),
    };

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, response=\"{}\"",
        input.principal, realm, nonce, input.uri, algorithm, response
    );
    if let Some(opaque) = challenge.param("opaque") {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    if let Some(qop) = qop {
        header.push_str(&format!(", qop={}, nc={}, cnonce=\"{}\"", qop, NONCE_COUNT, input.cnonce));
    }
    Some(header)
}

/// Random client nonce (16 hex chars). Falls back to the clock if the OS source fails.
pub fn generate_cnonce() -> String {
    let mut buf = [0u8; 8];
    if getrandom::getrandom(&mut buf).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        buf = t.to_be_bytes();
    }
    hex(&buf)
}

fn md5_hex(s: &str) -> String {
    hex(&Md5::digest(s.as_bytes()))
}

fn sha256_hex(s: &str) -> String {
    hex(&Sha256::digest(s.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
