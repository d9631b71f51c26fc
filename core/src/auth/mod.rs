/*
 * mod.rs
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

//! HTTP authentication: realm, challenge parsing, and answering a 401/407.
//!
//! Scheme preference when a response offers several challenges:
//! - SPNEGO (`Negotiate`/`Kerberos`) when a `SpnegoEngine` is configured; on token failure
//!   fall back to NTLM if offered.
//! - NTLM when offered and an `NtlmEngine` is configured (bare `NTLM` → type 1, else type 3).
//! - Basic or Digest, first offered wins, computed locally.
//!
//! Anything else is unusable and the challenge response is delivered to the caller.

mod basic;
mod challenge;
mod digest;
mod engine;
mod realm;

pub use challenge::Challenge;
pub use digest::{generate_cnonce, DigestInput};
pub use engine::{AuthEngineError, NtlmEngine, SpnegoEngine};
pub use realm::{AuthScheme, Realm};

use tracing::debug;

/// Everything besides the realm needed to answer a challenge.
pub struct ChallengeContext<'a> {
    pub method: &'a str,
    /// Request-target hashed by Digest.
    pub uri: &'a str,
    /// Host the SPNEGO token is requested for (virtual host, proxy host, or URL host).
    pub host: &'a str,
    /// Authorization value the challenged request carried, if any.
    pub previous_authorization: Option<&'a str>,
    pub ntlm: Option<&'a dyn NtlmEngine>,
    pub spnego: Option<&'a dyn SpnegoEngine>,
}

/// Result of answering a set of challenges.
#[derive(Debug)]
pub enum ChallengeAnswer {
    /// Credentials to send. `rearm` permits one more challenge round of this family
    /// (NTLM negotiate → authenticate).
    Credentials {
        header: String,
        realm: Realm,
        rearm: bool,
    },
    /// No offered scheme can be answered.
    Unusable,
    /// A token engine failed and no fallback was offered.
    Failed(AuthEngineError),
}

/// Answer the challenges of one 401/407 response with `realm`.
pub fn answer_challenges<'a>(
    challenges: impl IntoIterator<Item = &'a str>,
    realm: &Realm,
    ctx: &ChallengeContext<'_>,
) -> ChallengeAnswer {
    let parsed: Vec<Challenge> = challenges.into_iter().filter_map(Challenge::parse).collect();
    let ntlm = parsed.iter().find(|c| c.is("NTLM"));
    let negotiate = parsed.iter().any(|c| c.is("Negotiate") || c.is("Kerberos"));

    if negotiate {
        if let Some(spnego) = ctx.spnego {
            match spnego.generate_token(ctx.host) {
                Ok(token) => {
                    return ChallengeAnswer::Credentials {
                        header: format!("Negotiate {}", token),
                        realm: realm.clone().with_scheme(AuthScheme::Kerberos),
                        rearm: false,
                    };
                }
                Err(e) if ntlm.is_none() || ctx.ntlm.is_none() => return ChallengeAnswer::Failed(e),
                Err(e) => debug!("SPNEGO token failed ({}), falling back to NTLM", e),
            }
        }
    }

    if let (Some(challenge), Some(engine)) = (ntlm, ctx.ntlm) {
        let realm = realm.clone().with_scheme(AuthScheme::Ntlm);
        return match &challenge.token {
            None => {
                let already_negotiating = ctx
                    .previous_authorization
                    .map(|v| v.starts_with("NTLM "))
                    .unwrap_or(false);
                if already_negotiating {
                    return ChallengeAnswer::Unusable;
                }
                match engine.type1_message() {
                    Ok(msg) => ChallengeAnswer::Credentials {
                        header: format!("NTLM {}", msg),
                        realm,
                        rearm: true,
                    },
                    Err(e) => ChallengeAnswer::Failed(e),
                }
            }
            Some(server_challenge) => match engine.type3_message(&realm, server_challenge) {
                Ok(msg) => ChallengeAnswer::Credentials {
                    header: format!("NTLM {}", msg),
                    realm,
                    rearm: false,
                },
                Err(e) => ChallengeAnswer::Failed(e),
            },
        };
    }

    for challenge in &parsed {
        if challenge.is("Basic") {
            let mut realm = realm.clone().with_scheme(AuthScheme::Basic).preemptive(true);
            realm.challenge = Some(challenge.clone());
            return ChallengeAnswer::Credentials {
                header: basic::authorization(&realm.principal, &realm.password),
                realm,
                rearm: false,
            };
        }
        if challenge.is("Digest") {
            let cnonce = generate_cnonce();
            let input = DigestInput {
                principal: &realm.principal,
                password: &realm.password,
                method: ctx.method,
                uri: ctx.uri,
                cnonce: &cnonce,
            };
            if let Some(header) = digest::authorization(challenge, &input) {
                let mut realm = realm.clone().with_scheme(AuthScheme::Digest).preemptive(true);
                realm.challenge = Some(challenge.clone());
                return ChallengeAnswer::Credentials {
                    header,
                    realm,
                    rearm: false,
                };
            }
        }
    }
    ChallengeAnswer::Unusable
}

/// Credentials to send before any challenge, for a preemptive Basic realm or a
/// Digest realm that already holds a challenge.
pub fn preemptive_authorization(realm: &Realm, method: &str, uri: &str) -> Option<String> {
    if !realm.use_preemptive_auth {
        return None;
    }
    match realm.scheme {
        AuthScheme::Basic => Some(basic::authorization(&realm.principal, &realm.password)),
        AuthScheme::Digest => {
            let challenge = realm.challenge.as_ref()?;
            let cnonce = generate_cnonce();
            digest::authorization(
                challenge,
                &DigestInput {
                    principal: &realm.principal,
                    password: &realm.password,
                    method,
                    uri,
                    cnonce: &cnonce,
                },
            )
        }
        _ => None,
    }
}
