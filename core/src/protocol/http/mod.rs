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

//! HTTP/1.1 client protocol: request and response model, caller handlers, the
//! transport boundary and its TCP implementation.
//!
//! - Push model: `AsyncHandler` receives status, headers, body parts and completion
//!   as the connection's delivery task decodes them.
//! - Buffers: `bytes` crate (BytesMut for the parse buffer, Bytes for payload slices).
//! - HTTP/1.1 only: state-machine response parser; TLS via tokio-rustls with ALPN `http/1.1`.

pub mod client;
pub mod connection;
pub mod h1;
pub mod handler;
pub mod headers;
pub mod request;
pub mod response;
pub mod transport;

pub use client::AsyncHttpClient;
pub use connection::{HttpStream, TcpTransport};
pub use handler::{AsyncHandler, CompletionHandler, State};
pub use headers::Headers;
pub use request::{Method, Request, RequestBuilder};
pub use response::{BodyPart, HttpVersion, Response, ResponseStatus};
pub use transport::{Channel, OpenedChannel, Outbound, Transport, TransportEvent, WireRequest};
