/*
 * lib.rs
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

//! Corriere core: asynchronous HTTP/1.1 client engine.
//!
//! - `pool`: endpoint-keyed connection pool with global and per-host limits.
//! - `exchange`: the future an exchange resolves through, with listeners and watchdogs.
//! - `engine`: response protocol engine (auth, redirects, tunnels, filters) and request sender.
//! - `protocol::http`: request/response model, handlers, transport boundary and TCP transport.

pub mod auth;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod net;
pub mod pool;
pub mod protocol;
pub mod proxy;
pub mod uri;

pub use config::ClientConfig;
pub use error::{ConfigError, ExchangeError, PoolError, TimeoutKind};
pub use exchange::{ExchangeFuture, ResponseFuture};
pub use protocol::http::{AsyncHandler, AsyncHttpClient, Request, RequestBuilder, Response};
