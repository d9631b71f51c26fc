/*
 * sender.rs
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

//! Request sender: leases a connection, writes the request, and replays follow-ups.
//!
//! The sender never retries on its own. A request is sent again only when the
//! protocol engine asks for it (challenge, redirect, tunnel, filter replay).

use std::io;
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::auth;
use crate::config::ClientConfig;
use crate::cookie;
use crate::engine::effective_proxy;
use crate::engine::protocol::ResponseProtocol;
use crate::error::ExchangeError;
use crate::exchange::{spawn_watchdog, DirectExecutor, ExchangeFuture};
use crate::pool::{ConnectionPool, EndpointKey, Lease, PooledConnection, Reservation};
use crate::protocol::http::handler::AsyncHandler;
use crate::protocol::http::headers::{names, Headers};
use crate::protocol::http::request::{Method, Request};
use crate::protocol::http::transport::{OpenedChannel, Outbound, Transport, TransportEvent, WireRequest};
use crate::uri;

pub struct RequestSender {
    config: Arc<ClientConfig>,
    pool: Arc<ConnectionPool>,
    transport: Arc<dyn Transport>,
    protocol: Weak<ResponseProtocol>,
    runtime: Handle,
}

impl RequestSender {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        pool: Arc<ConnectionPool>,
        transport: Arc<dyn Transport>,
        protocol: Weak<ResponseProtocol>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            pool,
            transport,
            protocol,
            runtime,
        }
    }

    /// Start a new exchange for `request`. Capacity errors complete the returned
    /// future immediately.
    pub fn send_new_request(&self, request: Request, handler: Box<dyn AsyncHandler>) -> Arc<ExchangeFuture> {
        let future = ExchangeFuture::new(request.clone(), handler, Some(Arc::clone(&self.pool)));
        let protocol = self.protocol.clone();
        let id = future.id();
        future.add_listener(
            move || {
                if let Some(p) = protocol.upgrade() {
                    p.forget_exchange(id);
                }
            },
            Arc::new(DirectExecutor),
        );
        let request_timeout = request.request_timeout().or(self.config.request_timeout);
        future.set_watchdog(spawn_watchdog(
            &self.runtime,
            &future,
            self.config.read_timeout,
            request_timeout,
        ));
        self.dispatch(request, &future);
        future
    }

    /// Send a follow-up for `future`: on its attached connection when there is
    /// one, otherwise on a newly leased connection.
    pub fn send_next_request(&self, request: Request, future: &Arc<ExchangeFuture>) {
        if future.is_done() {
            return;
        }
        future.set_request(request.clone());
        match future.connection() {
            Some(conn) if conn.is_open() => self.write_request(&conn, future, request),
            Some(conn) => {
                future.detach();
                self.pool.discard(&conn);
                self.dispatch(request, future);
            }
            None => self.dispatch(request, future),
        }
    }

    /// Send `request` again on behalf of a filter. Redirect and auth state are untouched.
    pub fn replay_request(&self, request: Request, future: &Arc<ExchangeFuture>) {
        debug!(exchange = future.id(), url = %request.url(), "replaying request");
        self.send_next_request(request, future);
    }

    /// Close `conn`, free its slot and fail the exchange.
    pub fn abort(&self, conn: Option<&Arc<PooledConnection>>, future: &Arc<ExchangeFuture>, error: ExchangeError) {
        if let Some(c) = conn {
            self.pool.discard(c);
        }
        future.abort(error);
    }

    fn dispatch(&self, request: Request, future: &Arc<ExchangeFuture>) {
        future.set_request(request.clone());
        let proxy = effective_proxy(&self.config, &request);
        let key = EndpointKey::for_request(&request, proxy.as_ref());
        match self.pool.acquire(&key) {
            Err(e) => {
                debug!(exchange = future.id(), endpoint = %key, "{}", e);
                future.abort(e.into());
            }
            Ok(Lease::Pooled(conn)) => self.write_request(&conn, future, request),
            Ok(Lease::New(reservation)) => self.open(reservation, request, Arc::clone(future)),
        }
    }

    fn open(&self, reservation: Reservation, request: Request, future: Arc<ExchangeFuture>) {
        let transport = Arc::clone(&self.transport);
        let protocol = self.protocol.clone();
        let connect_timeout = self.config.connect_timeout;
        self.runtime.spawn(async move {
            let key = reservation.key().clone();
            let opened = match tokio::time::timeout(connect_timeout, transport.open(&key)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", key),
                )),
            };
            let Some(protocol) = protocol.upgrade() else { return };
            match opened {
                Err(e) => {
                    drop(reservation);
                    debug!(exchange = future.id(), endpoint = %key, "connect failed: {}", e);
                    protocol.on_failure(None, &future, e.into());
                }
                Ok(OpenedChannel { channel, events }) => match reservation.commit(channel) {
                    Err(e) => {
                        future.abort(e.into());
                    }
                    Ok(conn) => {
                        let sender = protocol.sender();
                        sender.spawn_delivery(Arc::clone(&conn), events);
                        sender.write_request(&conn, &future, request);
                    }
                },
            }
        });
    }

    /// One task per connection feeds its events to the engine, in order.
    fn spawn_delivery(&self, conn: Arc<PooledConnection>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let protocol = self.protocol.clone();
        self.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(p) = protocol.upgrade() else { return };
                p.handle(&conn, event);
            }
            if let Some(p) = protocol.upgrade() {
                p.connection_closed(&conn);
            }
        });
    }

    /// Write `request` on a leased `conn`, preceded by a CONNECT if the tunnel is not up yet.
    pub(crate) fn write_request(&self, conn: &Arc<PooledConnection>, future: &Arc<ExchangeFuture>, request: Request) {
        let Some(protocol) = self.protocol.upgrade() else { return };
        if future.is_done() {
            self.pool.release(conn, true);
            return;
        }
        future.attach(Arc::clone(conn));
        protocol.attach(conn, future);
        if future.is_done() {
            // cancelled while attaching
            future.detach();
            protocol.detach(conn);
            self.pool.discard(conn);
            return;
        }

        let tunnel = conn.key().tunneled() && !conn.is_tunneled();
        future.start_attempt(&request, tunnel);
        let wire = if tunnel {
            self.connect_request(&request)
        } else {
            self.wire_request(conn.key(), &request)
        };
        conn.touch();
        future.touch();
        trace!(exchange = future.id(), id = conn.id(), "{} {}", wire.method, wire.target);
        if let Err(e) = conn.channel().write(Outbound::Request(wire)) {
            protocol.on_failure(Some(conn), future, e.into());
        }
    }

    /// Release the body withheld for `100 Continue`.
    pub(crate) fn write_body(&self, conn: &Arc<PooledConnection>, future: &Arc<ExchangeFuture>) -> Result<(), ExchangeError> {
        future.attempt.lock().awaiting_continue = false;
        let request = future.request();
        let Some(body) = request.body().cloned() else {
            return Ok(());
        };
        conn.channel().write(Outbound::Body(body))?;
        Ok(())
    }

    fn wire_request(&self, key: &EndpointKey, request: &Request) -> WireRequest {
        let url = request.url();
        let method = request.method();
        let through_proxy = key.proxy().is_some() && !key.is_secure();
        let target = if through_proxy {
            uri::absolute_form(url)
        } else {
            uri::origin_form(url)
        };

        let mut headers = request.headers().clone();
        if !headers.contains(names::HOST) {
            headers.set(names::HOST, uri::host_header(url, request.virtual_host()));
        }
        self.set_user_agent(&mut headers);
        if let Some(value) = cookie::encode(request.cookies()) {
            headers.set(names::COOKIE, value);
        }
        if !headers.contains(names::AUTHORIZATION) {
            if let Some(realm) = request.realm().or(self.config.realm.as_ref()) {
                let digest_uri = if realm.omit_query { uri::path_only(url) } else { uri::origin_form(url) };
                if let Some(value) = auth::preemptive_authorization(realm, method.as_str(), &digest_uri) {
                    headers.set(names::AUTHORIZATION, value);
                }
            }
        }
        if through_proxy {
            if !headers.contains(names::PROXY_AUTHORIZATION) {
                if let Some(value) = self.proxy_preemptive(request, method.as_str(), &target) {
                    headers.set(names::PROXY_AUTHORIZATION, value);
                }
            }
        } else {
            headers.remove(names::PROXY_AUTHORIZATION);
        }
        if let Some(body) = request.body() {
            if !headers.contains(names::TRANSFER_ENCODING) {
                headers.set(names::CONTENT_LENGTH, body.len().to_string());
            }
        }
        let body = if request.expects_continue() {
            None
        } else {
            request.body().cloned()
        };
        WireRequest {
            method,
            target,
            headers,
            body,
        }
    }

    fn connect_request(&self, request: &Request) -> WireRequest {
        let authority = uri::authority_form(request.url());
        let mut headers = Headers::new();
        headers.set(names::HOST, authority.clone());
        headers.set(names::PROXY_CONNECTION, "keep-alive");
        self.set_user_agent(&mut headers);
        match request.headers().get(names::PROXY_AUTHORIZATION) {
            Some(value) => {
                headers.set(names::PROXY_AUTHORIZATION, value);
            }
            None => {
                if let Some(value) = self.proxy_preemptive(request, "CONNECT", &authority) {
                    headers.set(names::PROXY_AUTHORIZATION, value);
                }
            }
        }
        WireRequest {
            method: Method::Connect,
            target: authority,
            headers,
            body: None,
        }
    }

    fn proxy_preemptive(&self, request: &Request, method: &str, uri: &str) -> Option<String> {
        let proxy = effective_proxy(&self.config, request)?;
        let realm = proxy.realm.as_ref()?;
        auth::preemptive_authorization(realm, method, uri)
    }

    fn set_user_agent(&self, headers: &mut Headers) {
        if let Some(ua) = &self.config.user_agent {
            if !headers.contains(names::USER_AGENT) {
                headers.set(names::USER_AGENT, ua.as_str());
            }
        }
    }
}
