/*
 * transport.rs
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

//! Boundary to the per-connection byte transport and codec.
//!
//! A `Transport` opens channels; each channel comes with an ordered stream of
//! `TransportEvent`s drained by exactly one delivery task. Per response the codec
//! delivers `Status`, `Headers`, then for a final response zero or more
//! non-terminal `Body` parts closed by exactly one terminal event: `Body` with
//! `last` set (possibly empty) or `Trailers`. Interim 1xx responses and a 2xx
//! answer to CONNECT carry no body events. A close-delimited body ends with a
//! terminal `Body` followed by `Closed`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::pool::EndpointKey;
use crate::protocol::http::headers::Headers;
use crate::protocol::http::request::Method;
use crate::protocol::http::response::{BodyPart, ResponseStatus};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Event decoded from a connection.
#[derive(Debug)]
pub enum TransportEvent {
    Status(ResponseStatus),
    Headers(Headers),
    Body(BodyPart),
    /// Terminal chunk carrying trailing headers.
    Trailers(Headers),
    /// TLS upgrade of a tunnel failed; the channel is closed.
    UpgradeFailed(io::Error),
    /// Read or write failure; the channel is closed.
    Error(io::Error),
    /// Peer closed the connection.
    Closed,
}

/// Request head and body as written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    /// Origin-, absolute- or authority-form.
    pub target: String,
    pub headers: Headers,
    /// `None` when there is no body or it is withheld for `100 Continue`.
    pub body: Option<Bytes>,
}

/// Message queued on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Request(WireRequest),
    /// Body released after `100 Continue`.
    Body(Bytes),
}

/// One open transport connection. Calls never block: writes and upgrades are
/// queued to the connection's I/O task.
pub trait Channel: Send + Sync {
    /// Identity, unique per transport.
    fn id(&self) -> u64;

    fn write(&self, message: Outbound) -> io::Result<()>;

    /// Start TLS on a tunneled connection. Handshake failures arrive as
    /// `TransportEvent::UpgradeFailed`.
    fn upgrade_to_tls(&self, host: &str) -> io::Result<()>;

    fn close(&self);

    fn is_open(&self) -> bool;

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Freshly opened channel and its event stream.
pub struct OpenedChannel {
    pub channel: Arc<dyn Channel>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Connection factory. `open` connects to the proxy when the key names one,
/// otherwise to the target; HTTPS without proxy is TLS from the start.
pub trait Transport: Send + Sync {
    fn open(&self, key: &EndpointKey) -> BoxFuture<'static, io::Result<OpenedChannel>>;
}
