/*
 * future.rs
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

//! Exchange future: the handle for one logical request, possibly spanning several
//! transport attempts (redirects, authentication retries, tunnels).
//!
//! Completion happens exactly once. `done`, `abort` and `cancel` race through a
//! single settle flag; the loser is a no-op. Once settled the outcome is published
//! to blocking getters, async waiters and listeners, in that order.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::error::ExchangeError;
use crate::exchange::executor::{Executor, Listener};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::protocol::http::handler::AsyncHandler;
use crate::protocol::http::request::Request;
use crate::protocol::http::response::{Response, ResponseAccumulator, ResponseStatus};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// What the exchange resolves to.
pub type Outcome = Result<Response, ExchangeError>;

/// Progress of the current transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingStatus,
    StatusReceived,
    HeadersReceived,
    ReceivingBody,
    Complete,
    Aborted,
}

/// Challenge family tracked by the auth-attempted flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTarget {
    Server,
    Proxy,
}

/// Per-attempt state, reset for every request written.
#[derive(Debug)]
pub(crate) struct Attempt {
    pub phase: Phase,
    pub status: Option<ResponseStatus>,
    pub keep_alive: bool,
    pub chunked: bool,
    /// Body withheld until `100 Continue`.
    pub awaiting_continue: bool,
    /// The request in flight is a CONNECT for this exchange's tunnel.
    pub tunneling: bool,
}

impl Attempt {
    fn new() -> Self {
        Self {
            phase: Phase::AwaitingStatus,
            status: None,
            keep_alive: true,
            chunked: false,
            awaiting_continue: false,
            tunneling: false,
        }
    }
}

/// One in-flight request/response cycle, observed concurrently by callers.
pub struct ExchangeFuture {
    id: u64,
    pool: Option<Arc<ConnectionPool>>,
    request: Mutex<Request>,
    handler: Mutex<Box<dyn AsyncHandler>>,
    handler_notified: AtomicBool,
    pub(crate) attempt: Mutex<Attempt>,
    pub(crate) accumulator: Mutex<ResponseAccumulator>,
    connection: Mutex<Option<Arc<PooledConnection>>>,
    redirect_count: AtomicU32,
    auth_attempted: AtomicBool,
    proxy_auth_attempted: AtomicBool,
    last_touch: Mutex<Instant>,
    watchdog: Mutex<Option<AbortHandle>>,
    settled: AtomicBool,
    outcome: Mutex<Option<Outcome>>,
    completed: Condvar,
    notify: Notify,
    listeners: Mutex<Vec<(Listener, Arc<dyn Executor>)>>,
}

impl ExchangeFuture {
    pub fn new(request: Request, handler: Box<dyn AsyncHandler>, pool: Option<Arc<ConnectionPool>>) -> Arc<Self> {
        let url = request.url().clone();
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            pool,
            request: Mutex::new(request),
            handler: Mutex::new(handler),
            handler_notified: AtomicBool::new(false),
            attempt: Mutex::new(Attempt::new()),
            accumulator: Mutex::new(ResponseAccumulator::new(url)),
            connection: Mutex::new(None),
            redirect_count: AtomicU32::new(0),
            auth_attempted: AtomicBool::new(false),
            proxy_auth_attempted: AtomicBool::new(false),
            last_touch: Mutex::new(Instant::now()),
            watchdog: Mutex::new(None),
            settled: AtomicBool::new(false),
            outcome: Mutex::new(None),
            completed: Condvar::new(),
            notify: Notify::new(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// A future already failed with `error`. The handler is told immediately.
    pub fn completed_failure(request: Request, handler: Box<dyn AsyncHandler>, error: ExchangeError) -> Arc<Self> {
        let future = Self::new(request, handler, None);
        future.abort(error);
        future
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request currently being sent (changes on redirects and retries).
    pub fn request(&self) -> Request {
        self.request.lock().clone()
    }

    pub(crate) fn set_request(&self, request: Request) {
        *self.request.lock() = request;
    }

    pub fn phase(&self) -> Phase {
        self.attempt.lock().phase
    }

    /// Reset per-attempt state before writing `request`.
    pub(crate) fn start_attempt(&self, request: &Request, tunneling: bool) {
        let mut attempt = self.attempt.lock();
        *attempt = Attempt::new();
        attempt.tunneling = tunneling;
        attempt.awaiting_continue = !tunneling && request.expects_continue();
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.attempt.lock().phase = phase;
    }

    /// Run `f` with the caller's handler. A cancellation that arrived while the
    /// handler was busy is reported to it afterwards.
    pub(crate) fn with_handler<R>(&self, f: impl FnOnce(&mut dyn AsyncHandler) -> R) -> R {
        let result = {
            let mut handler = self.handler.lock();
            f(&mut **handler)
        };
        self.notify_handler_error();
        result
    }

    pub(crate) fn replace_handler(&self, handler: Box<dyn AsyncHandler>) {
        *self.handler.lock() = handler;
    }

    fn notify_handler_error(&self) {
        if !self.settled.load(Ordering::Acquire) || self.handler_notified.load(Ordering::Acquire) {
            return;
        }
        let error = match self.outcome.lock().as_ref() {
            Some(Err(e)) => e.clone(),
            _ => return,
        };
        if let Some(mut handler) = self.handler.try_lock() {
            if !self.handler_notified.swap(true, Ordering::AcqRel) {
                handler.on_error(&error);
            }
        }
    }

    pub fn connection(&self) -> Option<Arc<PooledConnection>> {
        self.connection.lock().clone()
    }

    pub(crate) fn attach(&self, conn: Arc<PooledConnection>) {
        *self.connection.lock() = Some(conn);
    }

    pub(crate) fn detach(&self) -> Option<Arc<PooledConnection>> {
        self.connection.lock().take()
    }

    /// Reset the activity timestamp watched by the read timeout.
    pub fn touch(&self) {
        *self.last_touch.lock() = Instant::now();
    }

    pub fn last_touch(&self) -> Instant {
        *self.last_touch.lock()
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count.load(Ordering::Acquire)
    }

    pub(crate) fn increment_and_get_redirect_count(&self) -> u32 {
        self.redirect_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn auth_flag(&self, target: AuthTarget) -> &AtomicBool {
        match target {
            AuthTarget::Server => &self.auth_attempted,
            AuthTarget::Proxy => &self.proxy_auth_attempted,
        }
    }

    /// Atomic test-and-set of the auth-attempted flag. Returns the previous value.
    pub fn get_and_set_auth_attempted(&self, target: AuthTarget) -> bool {
        self.auth_flag(target).swap(true, Ordering::AcqRel)
    }

    /// Permit one more challenge round for `target`.
    pub(crate) fn rearm_auth(&self, target: AuthTarget) {
        self.auth_flag(target).store(false, Ordering::Release);
    }

    pub(crate) fn set_watchdog(&self, handle: Option<AbortHandle>) {
        *self.watchdog.lock() = handle;
    }

    pub(crate) fn cancel_watchdog(&self) {
        if let Some(handle) = self.watchdog.lock().take() {
            handle.abort();
        }
    }

    /// True once an outcome has been decided.
    pub fn is_done(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome.lock().as_ref(), Some(Err(ExchangeError::Cancelled)))
    }

    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    fn publish(&self, outcome: Outcome) {
        self.cancel_watchdog();
        *self.outcome.lock() = Some(outcome);
        self.completed.notify_all();
        self.notify.notify_waiters();
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for (listener, executor) in listeners {
            executor.execute(listener);
        }
    }

    /// Complete successfully with the accumulated response. Idempotent.
    pub fn done(&self) -> bool {
        if !self.settle() {
            return false;
        }
        self.set_phase(Phase::Complete);
        let outcome = self.accumulator.lock().build().ok_or(ExchangeError::RemotelyClosed);
        trace!(exchange = self.id, "exchange done");
        self.publish(outcome);
        true
    }

    /// Fail with `error`, closing any attached connection. No-op once done.
    pub fn abort(&self, error: ExchangeError) -> bool {
        if !self.settle() {
            return false;
        }
        self.set_phase(Phase::Aborted);
        if let Some(conn) = self.detach() {
            match &self.pool {
                Some(pool) => pool.discard(&conn),
                None => conn.close(),
            }
        }
        debug!(exchange = self.id, "exchange aborted: {}", error);
        self.publish(Err(error));
        self.notify_handler_error();
        true
    }

    /// Cancel the exchange. Returns false if it was already done.
    pub fn cancel(&self) -> bool {
        self.abort(ExchangeError::Cancelled)
    }

    /// Run `listener` on `executor` once the exchange is done; immediately if it already is.
    pub fn add_listener(&self, listener: impl FnOnce() + Send + 'static, executor: Arc<dyn Executor>) {
        let listener: Listener = Box::new(listener);
        let mut listeners = self.listeners.lock();
        if self.outcome.lock().is_some() {
            drop(listeners);
            executor.execute(listener);
        } else {
            listeners.push((listener, executor));
        }
    }

    /// Outcome if done, without blocking.
    pub fn try_get(&self) -> Option<Outcome> {
        self.outcome.lock().clone()
    }

    /// Block the calling thread until the exchange is done.
    pub fn get(&self) -> Outcome {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(o) = outcome.as_ref() {
                return o.clone();
            }
            self.completed.wait(&mut outcome);
        }
    }

    /// Block for at most `timeout`. `None` if the exchange is still running.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(o) = outcome.as_ref() {
                return Some(o.clone());
            }
            if self.completed.wait_until(&mut outcome, deadline).timed_out() {
                return outcome.clone();
            }
        }
    }

    /// Wait asynchronously until the exchange is done.
    pub async fn wait(&self) -> Outcome {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(o) = self.try_get() {
                return o;
            }
            notified.await;
        }
    }
}

/// Caller-facing handle; `.await` resolves to the exchange's outcome.
#[derive(Clone)]
pub struct ResponseFuture {
    inner: Arc<ExchangeFuture>,
}

impl ResponseFuture {
    pub(crate) fn new(inner: Arc<ExchangeFuture>) -> Self {
        Self { inner }
    }

    pub fn exchange(&self) -> &Arc<ExchangeFuture> {
        &self.inner
    }

    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    pub fn get(&self) -> Outcome {
        self.inner.get()
    }

    pub fn get_timeout(&self, timeout: Duration) -> Option<Outcome> {
        self.inner.get_timeout(timeout)
    }

    pub fn add_listener(&self, listener: impl FnOnce() + Send + 'static, executor: Arc<dyn Executor>) {
        self.inner.add_listener(listener, executor)
    }
}

impl IntoFuture for ResponseFuture {
    type Output = Outcome;
    type IntoFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.inner.wait().await })
    }
}
