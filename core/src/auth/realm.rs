/*
 * realm.rs
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

//! Realm: the credential/scheme bundle used to answer an authentication challenge.

use crate::auth::challenge::Challenge;

/// Authentication schemes the engine can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    Basic,
    Digest,
    Ntlm,
    /// SPNEGO (`Negotiate`), usually Kerberos underneath.
    Spnego,
    Kerberos,
}

impl AuthScheme {
    pub fn name(&self) -> &'static str {
        match self {
            AuthScheme::Basic => "Basic",
            AuthScheme::Digest => "Digest",
            AuthScheme::Ntlm => "NTLM",
            AuthScheme::Spnego => "Negotiate",
            AuthScheme::Kerberos => "Kerberos",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(AuthScheme::Basic),
            "digest" => Some(AuthScheme::Digest),
            "ntlm" => Some(AuthScheme::Ntlm),
            "negotiate" => Some(AuthScheme::Spnego),
            "kerberos" => Some(AuthScheme::Kerberos),
            _ => None,
        }
    }

    /// Connection-oriented schemes whose credentials must not leak across a redirect.
    pub fn is_connection_bound(&self) -> bool {
        matches!(self, AuthScheme::Ntlm)
    }
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Credentials plus the state of the last challenge answered with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    pub principal: String,
    pub password: String,
    pub scheme: AuthScheme,
    pub ntlm_domain: String,
    pub ntlm_host: String,
    /// Send credentials with the first request instead of waiting for a challenge.
    pub use_preemptive_auth: bool,
    /// Digest: hash the path only (proxy realms).
    pub omit_query: bool,
    /// Parsed challenge the credentials were last computed against.
    pub challenge: Option<Challenge>,
}

impl Realm {
    pub fn new(principal: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            password: password.into(),
            scheme: AuthScheme::Basic,
            ntlm_domain: String::new(),
            ntlm_host: String::new(),
            use_preemptive_auth: false,
            omit_query: false,
            challenge: None,
        }
    }

    pub fn basic(principal: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(principal, password)
    }

    pub fn ntlm(
        principal: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            scheme: AuthScheme::Ntlm,
            ntlm_domain: domain.into(),
            ntlm_host: host.into(),
            ..Self::new(principal, password)
        }
    }

    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn preemptive(mut self, preemptive: bool) -> Self {
        self.use_preemptive_auth = preemptive;
        self
    }
}
