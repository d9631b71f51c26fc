/*
 * connection.rs
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

//! Pooled connection: one transport channel plus its pool bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::pool::EndpointKey;
use crate::protocol::http::transport::Channel;

/// Where a connection currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Leased,
    Idle,
    Closed,
}

/// Connection owned by the pool while idle and by exactly one exchange while leased.
pub struct PooledConnection {
    key: EndpointKey,
    channel: Arc<dyn Channel>,
    created: Instant,
    last_activity: Mutex<Instant>,
    tunneled: AtomicBool,
    state: Mutex<LeaseState>,
}

impl PooledConnection {
    pub(crate) fn new(key: EndpointKey, channel: Arc<dyn Channel>) -> Self {
        let now = Instant::now();
        Self {
            key,
            channel,
            created: now,
            last_activity: Mutex::new(now),
            tunneled: AtomicBool::new(false),
            state: Mutex::new(LeaseState::Leased),
        }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Channel identity; stable for the connection's lifetime.
    pub fn id(&self) -> u64 {
        self.channel.id()
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// True once a CONNECT tunnel (and TLS upgrade) has been established.
    pub fn is_tunneled(&self) -> bool {
        self.tunneled.load(Ordering::Acquire)
    }

    pub fn set_tunneled(&self, tunneled: bool) {
        self.tunneled.store(tunneled, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        *self.state.lock() != LeaseState::Closed && self.channel.is_open()
    }

    pub fn state(&self) -> LeaseState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: LeaseState) {
        *self.state.lock() = state;
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state != LeaseState::Closed {
            *state = LeaseState::Closed;
            self.channel.close();
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("key", &self.key)
            .field("state", &self.state())
            .field("tunneled", &self.is_tunneled())
            .finish()
    }
}
