/*
 * client.rs
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

//! Client facade: one pool, one engine, and the idle-eviction timer.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::ClientConfig;
use crate::engine::ResponseProtocol;
use crate::error::PoolError;
use crate::exchange::{ExchangeFuture, ResponseFuture};
use crate::pool::{ConnectionPool, PoolStats};
use crate::protocol::http::connection::TcpTransport;
use crate::protocol::http::handler::{AsyncHandler, CompletionHandler};
use crate::protocol::http::request::Request;
use crate::protocol::http::transport::Transport;

/// Asynchronous HTTP client. Create inside a tokio runtime with `AsyncHttpClient::new(config)`
/// and issue requests with `execute`; the returned future can be awaited, polled or blocked on.
pub struct AsyncHttpClient {
    config: Arc<ClientConfig>,
    engine: Arc<ResponseProtocol>,
    eviction: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AsyncHttpClient {
    /// Client over TCP/TLS on the current tokio runtime.
    pub fn new(config: ClientConfig) -> io::Result<Self> {
        let runtime = Handle::try_current().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let transport = Arc::new(TcpTransport::new(config.accept_any_certificate)?);
        Ok(Self::with_transport(config, transport, runtime))
    }

    /// Client over any transport; engine tasks run on `runtime`.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        let config = Arc::new(config);
        let pool = ConnectionPool::new(config.pool_config());
        let eviction = if config.allow_pooling_connections {
            let _guard = runtime.enter();
            Some(pool.start_eviction(config.idle_eviction_interval))
        } else {
            None
        };
        let engine = ResponseProtocol::new(Arc::clone(&config), pool, transport, runtime);
        Self {
            config,
            engine,
            eviction: Mutex::new(eviction),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start an exchange. Events go to `handler`; the future resolves to the accumulated response.
    pub fn execute(&self, request: Request, handler: impl AsyncHandler + 'static) -> ResponseFuture {
        let handler: Box<dyn AsyncHandler> = Box::new(handler);
        let exchange = if self.is_closed() {
            ExchangeFuture::completed_failure(request, handler, PoolError::Closed.into())
        } else {
            self.engine.sender().send_new_request(request, handler)
        };
        ResponseFuture::new(exchange)
    }

    /// Start an exchange whose only consumer is the returned future.
    pub fn execute_request(&self, request: Request) -> ResponseFuture {
        self.execute(request, CompletionHandler)
    }

    pub fn engine(&self) -> &Arc<ResponseProtocol> {
        &self.engine
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.engine.pool().stats()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop eviction and close every connection. Exchanges in flight fail.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.eviction.lock().take() {
            handle.abort();
        }
        self.engine.pool().close_all();
        debug!("client closed");
    }
}

impl Drop for AsyncHttpClient {
    fn drop(&mut self) {
        self.close();
    }
}
