/*
 * protocol.rs
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

//! Response protocol engine: interprets transport events against an exchange.
//!
//! Runs on the connection's delivery task and never blocks. Once the headers of a
//! response are in, a fixed chain of steps decides what happens to it; the first
//! step that handles the response stops the chain:
//!
//! 1. response filters (may replay)
//! 2. 401 with a realm and no previous attempt
//! 3. 407 with a proxy realm and no previous attempt
//! 4. interim 1xx (100 releases a withheld body)
//! 5. redirect, when followed
//! 6. CONNECT answer for a tunnel
//! 7. status delivered to the handler
//! 8. headers delivered to the handler
//!
//! Body fragments and trailers then go to the handler until the terminal event.

use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::auth::{self, ChallengeAnswer, ChallengeContext, Realm};
use crate::config::ClientConfig;
use crate::engine::filter::{self, FilterContext};
use crate::engine::redirect;
use crate::engine::sender::RequestSender;
use crate::engine::effective_proxy;
use crate::error::ExchangeError;
use crate::exchange::{AuthTarget, ExchangeFuture, Phase};
use crate::pool::{ConnectionPool, EndpointKey, PooledConnection};
use crate::protocol::http::handler::State;
use crate::protocol::http::headers::{names, Headers};
use crate::protocol::http::h1::BodyMode;
use crate::protocol::http::request::{Method, Request};
use crate::protocol::http::response::{BodyPart, ResponseStatus};
use crate::protocol::http::transport::{Transport, TransportEvent};
use crate::proxy::ProxyServer;
use crate::uri;

/// A final response whose body only ends when the peer closes the connection.
fn close_delimited(request: &Request, status: &ResponseStatus, headers: &Headers, tunneling: bool, chunked: bool) -> bool {
    if status.is_interim() || (tunneling && status.is_success()) {
        return false;
    }
    let head = !tunneling && request.method() == Method::Head;
    let content_length = headers
        .get(names::CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<u64>().ok());
    BodyMode::for_response(head, status.code, content_length, chunked) == BodyMode::UntilClose
}

/// What a leased connection is currently doing.
#[derive(Clone)]
pub(crate) enum Attachment {
    /// Carrying an attempt of this exchange.
    Exchange(Arc<ExchangeFuture>),
    /// Reading the rest of a response nobody wants; then send the follow-up on
    /// this connection, or offer it back to the pool.
    Draining(Option<(Arc<ExchangeFuture>, Request)>),
}

/// How a finished attempt hands back its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Offer,
    Drain,
    Discard,
}

/// Response of the current attempt, as seen by the decision steps.
struct ResponseContext<'a> {
    conn: &'a Arc<PooledConnection>,
    future: &'a Arc<ExchangeFuture>,
    request: Request,
    status: ResponseStatus,
    headers: Headers,
    keep_alive: bool,
    chunked: bool,
    tunneling: bool,
    awaiting_continue: bool,
}

type Step = fn(&ResponseProtocol, &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError>;

const STEPS: [Step; 8] = [
    ResponseProtocol::exit_after_filters,
    ResponseProtocol::exit_after_401,
    ResponseProtocol::exit_after_407,
    ResponseProtocol::exit_after_interim,
    ResponseProtocol::exit_after_redirect,
    ResponseProtocol::exit_after_connect,
    ResponseProtocol::exit_after_status,
    ResponseProtocol::exit_after_headers,
];

pub struct ResponseProtocol {
    config: Arc<ClientConfig>,
    pool: Arc<ConnectionPool>,
    sender: Arc<RequestSender>,
    attachments: DashMap<u64, Attachment>,
}

impl ResponseProtocol {
    /// Engine and its request sender, sharing `pool` and `transport`.
    pub fn new(
        config: Arc<ClientConfig>,
        pool: Arc<ConnectionPool>,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|protocol| {
            let sender = Arc::new(RequestSender::new(
                Arc::clone(&config),
                Arc::clone(&pool),
                transport,
                protocol.clone(),
                runtime,
            ));
            Self {
                config,
                pool,
                sender,
                attachments: DashMap::new(),
            }
        })
    }

    pub fn sender(&self) -> &Arc<RequestSender> {
        &self.sender
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub(crate) fn attach(&self, conn: &PooledConnection, future: &Arc<ExchangeFuture>) {
        self.attachments.insert(conn.id(), Attachment::Exchange(Arc::clone(future)));
    }

    pub(crate) fn detach(&self, conn: &PooledConnection) {
        self.attachments.remove(&conn.id());
    }

    /// Drop whatever still refers to exchange `id` after it failed or was cancelled.
    pub(crate) fn forget_exchange(&self, id: u64) {
        self.attachments.retain(|_, attachment| match attachment {
            Attachment::Exchange(future) => future.id() != id,
            Attachment::Draining(Some((future, _))) => future.id() != id,
            Attachment::Draining(None) => true,
        });
    }

    /// Connections currently carrying or draining a response.
    pub fn attached_connections(&self) -> usize {
        self.attachments.len()
    }

    /// Interpret one event from `conn`.
    pub fn handle(&self, conn: &Arc<PooledConnection>, event: TransportEvent) {
        conn.touch();
        let attachment = self.attachments.get(&conn.id()).map(|a| a.value().clone());
        match attachment {
            Some(Attachment::Exchange(future)) => {
                if future.is_done() {
                    self.attachments.remove(&conn.id());
                    return;
                }
                future.touch();
                if let Err(e) = self.on_event(conn, &future, event) {
                    self.on_failure(Some(conn), &future, e);
                }
            }
            Some(Attachment::Draining(next)) => self.drain(conn, next, event),
            None => trace!(id = conn.id(), "event on unattached connection: {:?}", event),
        }
    }

    /// The event stream of `conn` ended.
    pub fn connection_closed(&self, conn: &Arc<PooledConnection>) {
        match self.attachments.remove(&conn.id()).map(|(_, a)| a) {
            Some(Attachment::Exchange(future)) if !future.is_done() => {
                self.on_failure(Some(conn), &future, ExchangeError::RemotelyClosed)
            }
            Some(Attachment::Draining(next)) => self.drain(conn, next, TransportEvent::Closed),
            _ => self.pool.discard(conn),
        }
    }

    fn on_event(
        &self,
        conn: &Arc<PooledConnection>,
        future: &Arc<ExchangeFuture>,
        event: TransportEvent,
    ) -> Result<(), ExchangeError> {
        match event {
            TransportEvent::Status(mut status) => {
                if status.remote_addr.is_none() {
                    status.remote_addr = conn.channel().remote_addr();
                }
                let url = future.request().url().clone();
                {
                    let mut attempt = future.attempt.lock();
                    attempt.phase = Phase::StatusReceived;
                    attempt.status = Some(status.clone());
                }
                future.accumulator.lock().reset(url, status);
                Ok(())
            }
            TransportEvent::Headers(headers) => self.on_headers(conn, future, headers),
            TransportEvent::Body(part) => self.on_body(conn, future, part),
            TransportEvent::Trailers(trailers) => self.on_trailers(conn, future, trailers),
            TransportEvent::UpgradeFailed(e) => {
                self.detach(conn);
                self.sender.abort(Some(conn), future, ExchangeError::ProtocolUpgrade(e.to_string()));
                Ok(())
            }
            TransportEvent::Error(e) => Err(e.into()),
            TransportEvent::Closed => Err(ExchangeError::RemotelyClosed),
        }
    }

    fn on_headers(
        &self,
        conn: &Arc<PooledConnection>,
        future: &Arc<ExchangeFuture>,
        headers: Headers,
    ) -> Result<(), ExchangeError> {
        let request = future.request();
        let (status, tunneling, awaiting_continue) = {
            let attempt = future.attempt.lock();
            match (&attempt.phase, &attempt.status) {
                (Phase::StatusReceived, Some(status)) => {
                    (status.clone(), attempt.tunneling, attempt.awaiting_continue)
                }
                _ => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "headers without status line").into())
                }
            }
        };
        let chunked = headers.contains_token(names::TRANSFER_ENCODING, "chunked");
        let final_response = !status.is_interim();
        let keep_alive = self.config.connection_strategy.keep_alive(request.headers(), &status, &headers)
            && !(final_response && awaiting_continue)
            && !close_delimited(&request, &status, &headers, tunneling, chunked);
        if final_response && awaiting_continue {
            debug!(exchange = future.id(), "{} before 100 Continue, connection not reused", status.code);
        }
        {
            let mut attempt = future.attempt.lock();
            attempt.phase = Phase::HeadersReceived;
            attempt.keep_alive = keep_alive;
            attempt.chunked = chunked;
        }
        future.accumulator.lock().set_headers(&headers);

        let ctx = ResponseContext {
            conn,
            future,
            request,
            status,
            headers,
            keep_alive,
            chunked,
            tunneling,
            awaiting_continue,
        };
        for step in STEPS {
            if step(self, &ctx)?.is_break() {
                return Ok(());
            }
        }
        future.set_phase(Phase::ReceivingBody);
        Ok(())
    }

    fn exit_after_filters(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if self.config.response_filters.is_empty() {
            return Ok(ControlFlow::Continue(()));
        }
        let fc = FilterContext::new(ctx.request.clone()).with_response(ctx.status.clone(), ctx.headers.clone());
        let mut fc = filter::apply(&self.config.response_filters, fc, |f, c| f.filter(c))?;
        if let Some(handler) = fc.handler.take() {
            ctx.future.replace_handler(handler);
        }
        if fc.replay {
            debug!(exchange = ctx.future.id(), url = %fc.request.url(), "response filter replays request");
            self.follow_up(ctx, fc.request);
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    fn exit_after_401(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if ctx.status.code != 401 {
            return Ok(ControlFlow::Continue(()));
        }
        let Some(realm) = ctx.request.realm().or(self.config.realm.as_ref()).cloned() else {
            return Ok(ControlFlow::Continue(()));
        };
        if ctx.future.get_and_set_auth_attempted(AuthTarget::Server) {
            debug!(exchange = ctx.future.id(), "authentication already attempted, delivering 401");
            return Ok(ControlFlow::Continue(()));
        }
        self.answer_challenge(ctx, realm, None)
    }

    fn exit_after_407(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if ctx.status.code != 407 {
            return Ok(ControlFlow::Continue(()));
        }
        let Some(proxy) = effective_proxy(&self.config, &ctx.request) else {
            return Ok(ControlFlow::Continue(()));
        };
        let Some(realm) = proxy.realm.clone() else {
            return Ok(ControlFlow::Continue(()));
        };
        if ctx.future.get_and_set_auth_attempted(AuthTarget::Proxy) {
            debug!(exchange = ctx.future.id(), "proxy authentication already attempted, delivering 407");
            return Ok(ControlFlow::Continue(()));
        }
        self.answer_challenge(ctx, realm, Some(proxy))
    }

    /// Answer a 401 (`proxy` is `None`) or 407 challenge and re-send with credentials.
    fn answer_challenge(
        &self,
        ctx: &ResponseContext<'_>,
        realm: Realm,
        proxy: Option<ProxyServer>,
    ) -> Result<ControlFlow<()>, ExchangeError> {
        let (target, challenge_header, auth_header) = match proxy {
            None => (AuthTarget::Server, names::WWW_AUTHENTICATE, names::AUTHORIZATION),
            Some(_) => (AuthTarget::Proxy, names::PROXY_AUTHENTICATE, names::PROXY_AUTHORIZATION),
        };
        let challenges: Vec<&str> = ctx.headers.get_all(challenge_header).collect();
        if challenges.is_empty() {
            debug!(exchange = ctx.future.id(), "{} without {}", ctx.status.code, challenge_header);
            return Ok(ControlFlow::Continue(()));
        }

        let url = ctx.request.url();
        let digest_uri = if ctx.tunneling {
            uri::authority_form(url)
        } else if realm.omit_query {
            uri::path_only(url)
        } else {
            uri::origin_form(url)
        };
        let host = match &proxy {
            Some(p) => p.host.clone(),
            None => ctx
                .request
                .virtual_host()
                .or(url.host_str())
                .unwrap_or_default()
                .to_string(),
        };
        let method = if ctx.tunneling { "CONNECT" } else { ctx.request.method().as_str() };
        let challenge_ctx = ChallengeContext {
            method,
            uri: &digest_uri,
            host: &host,
            previous_authorization: ctx.request.headers().get(auth_header),
            ntlm: self.config.ntlm_engine.as_deref(),
            spnego: self.config.spnego_engine.as_deref(),
        };

        match auth::answer_challenges(challenges, &realm, &challenge_ctx) {
            ChallengeAnswer::Credentials { header, realm, rearm } => {
                if rearm {
                    ctx.future.rearm_auth(target);
                }
                debug!(exchange = ctx.future.id(), scheme = %realm.scheme, "answering {} challenge", ctx.status.code);
                let mut headers = ctx.request.headers().clone();
                headers.set(auth_header, header);
                let builder = ctx.request.to_builder().headers(headers);
                let builder = match proxy {
                    None => builder.realm(Some(realm)),
                    Some(p) => builder.proxy(Some(p.with_realm(realm))),
                };
                self.follow_up(ctx, builder.build()?);
                Ok(ControlFlow::Break(()))
            }
            ChallengeAnswer::Unusable => {
                debug!(exchange = ctx.future.id(), "no usable authentication scheme offered");
                Ok(ControlFlow::Continue(()))
            }
            ChallengeAnswer::Failed(e) => Err(ExchangeError::Auth(e.to_string())),
        }
    }

    fn exit_after_interim(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if !ctx.status.is_interim() {
            return Ok(ControlFlow::Continue(()));
        }
        if ctx.status.code == 100 && ctx.awaiting_continue {
            trace!(exchange = ctx.future.id(), "100 Continue, writing body");
            self.sender.write_body(ctx.conn, ctx.future)?;
        } else {
            trace!(exchange = ctx.future.id(), "skipping interim {}", ctx.status.code);
        }
        ctx.future.set_phase(Phase::AwaitingStatus);
        Ok(ControlFlow::Break(()))
    }

    fn exit_after_redirect(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if ctx.tunneling || !redirect::is_redirect(ctx.status.code) {
            return Ok(ControlFlow::Continue(()));
        }
        if !ctx.request.follow_redirect().unwrap_or(self.config.follow_redirect) {
            return Ok(ControlFlow::Continue(()));
        }
        let Some(location) = ctx.headers.get(names::LOCATION) else {
            return Ok(ControlFlow::Continue(()));
        };
        let Some(target) = uri::resolve(ctx.request.url(), location) else {
            debug!(exchange = ctx.future.id(), "unusable Location {}", location);
            return Ok(ControlFlow::Continue(()));
        };

        let count = ctx.future.increment_and_get_redirect_count();
        if count > self.config.max_redirects {
            self.detach(ctx.conn);
            self.sender.abort(
                Some(ctx.conn),
                ctx.future,
                ExchangeError::MaxRedirects(self.config.max_redirects),
            );
            return Ok(ControlFlow::Break(()));
        }
        ctx.future.rearm_auth(AuthTarget::Server);
        ctx.future.rearm_auth(AuthTarget::Proxy);

        let next = redirect::next_request(
            &ctx.request,
            ctx.status.code,
            target,
            &ctx.headers,
            self.config.strict_302_handling,
        )?;
        debug!(
            exchange = ctx.future.id(),
            from = %ctx.request.url(),
            to = %next.url(),
            "following {} redirect #{}",
            ctx.status.code,
            count
        );
        self.follow_up(ctx, next);
        Ok(ControlFlow::Break(()))
    }

    fn exit_after_connect(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if !ctx.tunneling {
            return Ok(ControlFlow::Continue(()));
        }
        let authority = uri::authority_form(ctx.request.url());
        if !ctx.status.is_success() {
            self.detach(ctx.conn);
            self.sender.abort(
                Some(ctx.conn),
                ctx.future,
                ExchangeError::ProtocolUpgrade(format!("CONNECT {} failed with {}", authority, ctx.status.code)),
            );
            return Ok(ControlFlow::Break(()));
        }
        ctx.conn.set_tunneled(true);
        if ctx.conn.key().is_secure() {
            let host = ctx.request.url().host_str().unwrap_or_default();
            if let Err(e) = ctx.conn.channel().upgrade_to_tls(host) {
                self.detach(ctx.conn);
                self.sender.abort(Some(ctx.conn), ctx.future, ExchangeError::ProtocolUpgrade(e.to_string()));
                return Ok(ControlFlow::Break(()));
            }
        }
        debug!(exchange = ctx.future.id(), id = ctx.conn.id(), "tunnel to {} established", authority);
        self.sender.send_next_request(ctx.request.clone(), ctx.future);
        Ok(ControlFlow::Break(()))
    }

    fn exit_after_status(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if ctx.future.with_handler(|h| h.on_status(&ctx.status)) == State::Abort {
            self.finish(ctx.conn, ctx.future, self.early_release(ctx));
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    fn exit_after_headers(&self, ctx: &ResponseContext<'_>) -> Result<ControlFlow<()>, ExchangeError> {
        if ctx.future.with_handler(|h| h.on_headers(&ctx.headers)) == State::Abort {
            self.finish(ctx.conn, ctx.future, self.early_release(ctx));
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    /// The body of an abandoned response is still coming.
    fn early_release(&self, ctx: &ResponseContext<'_>) -> Release {
        if ctx.keep_alive {
            Release::Drain
        } else {
            Release::Discard
        }
    }

    fn on_body(
        &self,
        conn: &Arc<PooledConnection>,
        future: &Arc<ExchangeFuture>,
        part: BodyPart,
    ) -> Result<(), ExchangeError> {
        let (phase, keep_alive) = {
            let attempt = future.attempt.lock();
            (attempt.phase, attempt.keep_alive)
        };
        if phase != Phase::ReceivingBody {
            trace!(exchange = future.id(), "body fragment in {:?}, ignored", phase);
            return Ok(());
        }
        future.accumulator.lock().append(&part.data);
        let state = if part.data.is_empty() {
            State::Continue
        } else {
            future.with_handler(|h| h.on_body_part(&part))
        };
        if part.last {
            let release = if keep_alive { Release::Offer } else { Release::Discard };
            self.finish(conn, future, release);
        } else if state == State::Abort {
            // rest of the body is still on the wire
            self.finish(conn, future, Release::Discard);
        }
        Ok(())
    }

    fn on_trailers(
        &self,
        conn: &Arc<PooledConnection>,
        future: &Arc<ExchangeFuture>,
        trailers: Headers,
    ) -> Result<(), ExchangeError> {
        let (phase, keep_alive) = {
            let attempt = future.attempt.lock();
            (attempt.phase, attempt.keep_alive)
        };
        if phase != Phase::ReceivingBody {
            return Ok(());
        }
        future.accumulator.lock().add_trailers(&trailers);
        if !trailers.is_empty() {
            future.with_handler(|h| h.on_headers(&trailers));
        }
        let release = if keep_alive { Release::Offer } else { Release::Discard };
        self.finish(conn, future, release);
        Ok(())
    }

    /// End the attempt and complete the exchange.
    fn finish(&self, conn: &Arc<PooledConnection>, future: &Arc<ExchangeFuture>, release: Release) {
        future.cancel_watchdog();
        future.set_phase(Phase::Complete);
        future.detach();
        match release {
            Release::Offer => {
                self.detach(conn);
                self.pool.release(conn, true);
            }
            Release::Drain => {
                self.attachments.insert(conn.id(), Attachment::Draining(None));
            }
            Release::Discard => {
                self.detach(conn);
                self.pool.discard(conn);
            }
        }
        if let Err(msg) = future.with_handler(|h| h.on_completed()) {
            debug!(exchange = future.id(), "completion handler failed: {}", msg);
        }
        future.done();
    }

    /// Send `next` for the same exchange after the current response. The
    /// connection is reused when the response is not chunked, keep-alive holds
    /// and `next` targets the same endpoint.
    fn follow_up(&self, ctx: &ResponseContext<'_>, next: Request) {
        let proxy = effective_proxy(&self.config, &next);
        let next_key = EndpointKey::for_request(&next, proxy.as_ref());
        let id = ctx.conn.id();
        ctx.future.set_phase(Phase::Complete);
        if ctx.keep_alive && !ctx.chunked {
            if &next_key == ctx.conn.key() {
                self.attachments
                    .insert(id, Attachment::Draining(Some((Arc::clone(ctx.future), next))));
                return;
            }
            self.attachments.insert(id, Attachment::Draining(None));
            ctx.future.detach();
        } else {
            self.detach(ctx.conn);
            ctx.future.detach();
            self.pool.discard(ctx.conn);
        }
        self.sender.send_next_request(next, ctx.future);
    }

    fn drain(
        &self,
        conn: &Arc<PooledConnection>,
        next: Option<(Arc<ExchangeFuture>, Request)>,
        event: TransportEvent,
    ) {
        match event {
            TransportEvent::Body(BodyPart { last: true, .. }) | TransportEvent::Trailers(_) => {
                self.detach(conn);
                match next {
                    Some((future, request)) if !future.is_done() => {
                        self.sender.send_next_request(request, &future)
                    }
                    _ => self.pool.release(conn, true),
                }
            }
            TransportEvent::Closed | TransportEvent::Error(_) | TransportEvent::UpgradeFailed(_) => {
                self.detach(conn);
                self.pool.discard(conn);
                if let Some((future, request)) = next {
                    future.detach();
                    if !future.is_done() {
                        self.sender.send_next_request(request, &future);
                    }
                }
            }
            _ => {}
        }
    }

    /// Offer `error` to the I/O-exception filters; replay if one asks for it,
    /// otherwise abort the exchange and close the connection.
    pub(crate) fn on_failure(
        &self,
        conn: Option<&Arc<PooledConnection>>,
        future: &Arc<ExchangeFuture>,
        error: ExchangeError,
    ) {
        if future.is_done() {
            return;
        }
        if !self.config.io_exception_filters.is_empty() {
            let fc = FilterContext::new(future.request()).with_error(error.clone());
            match filter::apply(&self.config.io_exception_filters, fc, |f, c| f.filter(c)) {
                Ok(mut fc) if fc.replay => {
                    if let Some(handler) = fc.handler.take() {
                        future.replace_handler(handler);
                    }
                    if let Some(c) = conn {
                        self.detach(c);
                        self.pool.discard(c);
                    }
                    if let Some(c) = future.detach() {
                        self.pool.discard(&c);
                    }
                    debug!(exchange = future.id(), "replaying after: {}", error);
                    self.sender.replay_request(fc.request, future);
                    return;
                }
                Ok(_) => {}
                Err(e) => debug!(exchange = future.id(), "I/O exception filter failed: {}", e),
            }
        }
        if let Some(c) = conn {
            self.detach(c);
        }
        self.sender.abort(conn, future, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::request::RequestBuilder;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        let mut h = Headers::new();
        for (k, v) in pairs {
            h.add(*k, *v);
        }
        h
    }

    #[test]
    fn unframed_final_response_is_close_delimited() {
        let get = RequestBuilder::get("http://h/").build().unwrap();
        let found = ResponseStatus::new(302);
        assert!(close_delimited(&get, &found, &Headers::new(), false, false));
        assert!(!close_delimited(&get, &found, &headers(&[("Content-Length", "0")]), false, false));
        assert!(!close_delimited(&get, &found, &Headers::new(), false, true));
    }

    #[test]
    fn bodiless_responses_are_not_close_delimited() {
        let get = RequestBuilder::get("http://h/").build().unwrap();
        let head = RequestBuilder::get("http://h/").method(Method::Head).build().unwrap();
        let none = Headers::new();
        assert!(!close_delimited(&get, &ResponseStatus::new(100), &none, false, false));
        assert!(!close_delimited(&get, &ResponseStatus::new(204), &none, false, false));
        assert!(!close_delimited(&get, &ResponseStatus::new(304), &none, false, false));
        assert!(!close_delimited(&head, &ResponseStatus::new(200), &none, false, false));
        // an established tunnel carries no response body
        assert!(!close_delimited(&get, &ResponseStatus::new(200), &none, true, false));
        assert!(close_delimited(&get, &ResponseStatus::new(407), &none, true, false));
    }
}
