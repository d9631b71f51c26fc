/*
 * engine.rs
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

//! Token producers for connection-oriented schemes. The wire encoding of NTLM and
//! SPNEGO tokens lives outside this crate; the engine only sequences them.

use crate::auth::Realm;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct AuthEngineError(pub String);

/// NTLM message generator (type 1 negotiate, type 3 authenticate).
pub trait NtlmEngine: Send + Sync {
    /// Base64 type 1 message, sent when the server answers with a bare `NTLM`.
    fn type1_message(&self) -> Result<String, AuthEngineError>;

    /// Base64 type 3 message answering the server's type 2 `challenge`.
    fn type3_message(&self, realm: &Realm, challenge: &str) -> Result<String, AuthEngineError>;
}

/// SPNEGO/Kerberos token generator.
pub trait SpnegoEngine: Send + Sync {
    /// Base64 token for the service on `host`.
    fn generate_token(&self, host: &str) -> Result<String, AuthEngineError>;
}
