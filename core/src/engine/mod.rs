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

//! Exchange engine: response protocol, request sender, filters, redirect rules.

pub mod filter;
mod protocol;
pub mod redirect;
mod sender;

pub use filter::{FilterContext, IoExceptionFilter, ResponseFilter};
pub use protocol::ResponseProtocol;
pub use sender::RequestSender;

use crate::config::ClientConfig;
use crate::protocol::http::request::Request;
use crate::proxy::ProxyServer;

/// Proxy `request` goes through: its own, else the client's, unless the target
/// host is exempt.
pub fn effective_proxy(config: &ClientConfig, request: &Request) -> Option<ProxyServer> {
    let host = request.url().host_str().unwrap_or_default();
    request
        .proxy()
        .or(config.proxy_server.as_ref())
        .filter(|p| !p.ignores(host))
        .cloned()
}
