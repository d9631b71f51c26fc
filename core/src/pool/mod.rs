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

//! Endpoint pool: bounded, per-endpoint cache of reusable connections.
//!
//! Capacity is reserved at `acquire` time, before the connection exists, so
//! concurrent acquirers cannot race past either limit. A `Reservation` that is
//! dropped without being committed (connect failed) gives its slot back.
//! The per-endpoint limit is checked before the pool-wide limit, and a sub-pool
//! is only created when pool-wide capacity is left. A sub-pool left with no
//! connections is retired and removed; acquirers that find a retired one retry.

mod connection;
mod key;
mod strategy;

pub use connection::{LeaseState, PooledConnection};
pub use key::EndpointKey;
pub use strategy::{ConnectionStrategy, DefaultConnectionStrategy};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::PoolError;
use crate::protocol::http::transport::Channel;

/// Limits and timers of a `ConnectionPool`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool-wide limit on open plus reserved connections. `None` is unbounded.
    pub max_connections: Option<usize>,
    pub max_connections_per_host: Option<usize>,
    /// Idle connections older than this are evicted.
    pub keep_alive_timeout: Duration,
    /// Connections older than this are closed instead of being pooled again.
    pub connection_ttl: Option<Duration>,
    /// When false every released connection is closed.
    pub pooling_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: None,
            max_connections_per_host: None,
            keep_alive_timeout: Duration::from_secs(60),
            connection_ttl: None,
            pooling_enabled: true,
        }
    }
}

#[derive(Default)]
struct SubPool {
    /// Most recently released last.
    idle: Vec<Arc<PooledConnection>>,
    leased: Vec<Arc<PooledConnection>>,
    reserved: usize,
    /// Removed from the pool map; must not take new reservations.
    retired: bool,
}

impl SubPool {
    fn count(&self) -> usize {
        self.idle.len() + self.leased.len() + self.reserved
    }
}

/// Outcome of a successful `acquire`.
#[derive(Debug)]
pub enum Lease {
    /// A warm idle connection, now leased.
    Pooled(Arc<PooledConnection>),
    /// A reserved slot; open a channel and `commit` it.
    New(Reservation),
}

/// Capacity reserved for a connection that is not open yet.
pub struct Reservation {
    pool: Arc<ConnectionPool>,
    sub: Arc<Mutex<SubPool>>,
    key: EndpointKey,
    active: bool,
}

impl Reservation {
    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    /// Turn the reservation into a leased connection over `channel`.
    /// Fails with `Closed` (and closes the channel) if the pool was closed meanwhile.
    pub fn commit(mut self, channel: Arc<dyn Channel>) -> Result<Arc<PooledConnection>, PoolError> {
        self.active = false;
        let mut sub = self.sub.lock();
        sub.reserved -= 1;
        if self.pool.is_closed() {
            drop(sub);
            channel.close();
            self.pool.total.fetch_sub(1, Ordering::AcqRel);
            return Err(PoolError::Closed);
        }
        let conn = Arc::new(PooledConnection::new(self.key.clone(), channel));
        sub.leased.push(Arc::clone(&conn));
        debug!(endpoint = %self.key, id = conn.id(), "connection opened");
        Ok(conn)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.active {
            let mut guard = self.sub.lock();
            guard.reserved -= 1;
            self.pool.total.fetch_sub(1, Ordering::AcqRel);
            trace!(endpoint = %self.key, "reservation released");
            self.pool.prune(&self.key, &self.sub, guard);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation").field("key", &self.key).finish()
    }
}

/// Connection counts of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub idle: usize,
    pub leased: usize,
    pub reserved: usize,
}

/// Snapshot of the pool's bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Global counter: open plus reserved connections.
    pub total: usize,
    pub idle: usize,
    pub leased: usize,
    pub endpoints: HashMap<EndpointKey, EndpointStats>,
}

/// Bounded multi-endpoint connection cache.
pub struct ConnectionPool {
    config: PoolConfig,
    sub_pools: DashMap<EndpointKey, Arc<Mutex<SubPool>>>,
    total: AtomicUsize,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sub_pools: DashMap::new(),
            total: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Lease an idle connection for `key`, or reserve capacity for a new one.
    pub fn acquire(self: &Arc<Self>, key: &EndpointKey) -> Result<Lease, PoolError> {
        loop {
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
            let sub = match self.sub_pools.get(key) {
                Some(entry) => Arc::clone(entry.value()),
                None => {
                    if let Some(max) = self.config.max_connections {
                        if self.total.load(Ordering::Acquire) >= max {
                            return Err(PoolError::TooManyConnections(max));
                        }
                    }
                    Arc::clone(self.sub_pools.entry(key.clone()).or_insert_with(Default::default).value())
                }
            };
            if let Some(result) = self.acquire_from(key, &sub) {
                return result;
            }
            self.sub_pools.remove_if(key, |_, s| Arc::ptr_eq(s, &sub));
        }
    }

    /// `None` when `sub` was retired before it could be locked.
    fn acquire_from(self: &Arc<Self>, key: &EndpointKey, sub: &Arc<Mutex<SubPool>>) -> Option<Result<Lease, PoolError>> {
        let mut guard = sub.lock();
        if guard.retired {
            return None;
        }
        if self.is_closed() {
            return Some(Err(PoolError::Closed));
        }
        while let Some(conn) = guard.idle.pop() {
            if conn.is_open() && !self.is_stale(&conn) {
                conn.set_state(LeaseState::Leased);
                conn.touch();
                guard.leased.push(Arc::clone(&conn));
                trace!(endpoint = %key, id = conn.id(), "reusing pooled connection");
                return Some(Ok(Lease::Pooled(conn)));
            }
            debug!(endpoint = %key, id = conn.id(), "discarding stale idle connection");
            conn.close();
            self.total.fetch_sub(1, Ordering::AcqRel);
        }

        if let Some(max) = self.config.max_connections_per_host {
            if guard.count() >= max {
                return Some(Err(PoolError::TooManyConnectionsPerHost(max)));
            }
        }
        if let Err(e) = self.reserve_global() {
            self.prune(key, sub, guard);
            return Some(Err(e));
        }
        guard.reserved += 1;
        drop(guard);
        Some(Ok(Lease::New(Reservation {
            pool: Arc::clone(self),
            sub: Arc::clone(sub),
            key: key.clone(),
            active: true,
        })))
    }

    fn reserve_global(&self) -> Result<(), PoolError> {
        match self.config.max_connections {
            None => {
                self.total.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Some(max) => self
                .total
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
                .map(|_| ())
                .map_err(|_| PoolError::TooManyConnections(max)),
        }
    }

    /// Retire `sub` and remove it from the map if it holds nothing.
    fn prune(&self, key: &EndpointKey, sub: &Arc<Mutex<SubPool>>, mut guard: MutexGuard<'_, SubPool>) {
        if guard.count() > 0 || guard.retired {
            return;
        }
        guard.retired = true;
        drop(guard);
        self.sub_pools.remove_if(key, |_, s| Arc::ptr_eq(s, sub));
        trace!(endpoint = %key, "empty sub-pool removed");
    }

    fn is_stale(&self, conn: &PooledConnection) -> bool {
        conn.idle_for() >= self.config.keep_alive_timeout || self.is_expired(conn)
    }

    fn is_expired(&self, conn: &PooledConnection) -> bool {
        self.config.connection_ttl.map(|ttl| conn.age() >= ttl).unwrap_or(false)
    }

    /// Return a leased connection. It is pooled when `keep_alive` holds and the
    /// pool accepts it, otherwise closed and its slot freed. Releasing a
    /// connection that is not leased is a no-op.
    pub fn release(&self, conn: &Arc<PooledConnection>, keep_alive: bool) {
        let sub = match self.sub_pools.get(conn.key()) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                conn.close();
                return;
            }
        };
        let mut guard = sub.lock();
        let Some(pos) = guard.leased.iter().position(|c| Arc::ptr_eq(c, conn)) else {
            return;
        };
        guard.leased.swap_remove(pos);
        let reusable = keep_alive
            && self.config.pooling_enabled
            && !self.is_closed()
            && conn.is_open()
            && !self.is_expired(conn);
        if reusable {
            conn.set_state(LeaseState::Idle);
            conn.touch();
            guard.idle.push(Arc::clone(conn));
            trace!(endpoint = %conn.key(), id = conn.id(), "connection pooled");
        } else {
            conn.close();
            self.total.fetch_sub(1, Ordering::AcqRel);
            debug!(endpoint = %conn.key(), id = conn.id(), "connection closed");
            self.prune(conn.key(), &sub, guard);
        }
    }

    /// Close a leased connection whose state is unknown.
    pub fn discard(&self, conn: &Arc<PooledConnection>) {
        self.release(conn, false);
    }

    /// Close idle connections past the keep-alive timeout or TTL. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        let subs: Vec<(EndpointKey, Arc<Mutex<SubPool>>)> = self
            .sub_pools
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut evicted = 0;
        for (key, sub) in subs {
            let mut guard = sub.lock();
            let (stale, keep): (Vec<_>, Vec<_>) = guard
                .idle
                .drain(..)
                .partition(|c| !c.is_open() || self.is_stale(c));
            guard.idle = keep;
            self.prune(&key, &sub, guard);
            for conn in stale {
                debug!(endpoint = %conn.key(), id = conn.id(), "evicting idle connection");
                conn.close();
                self.total.fetch_sub(1, Ordering::AcqRel);
                evicted += 1;
            }
        }
        evicted
    }

    /// Close every connection, idle and leased. Later `acquire` calls fail with `Closed`.
    pub fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subs: Vec<Arc<Mutex<SubPool>>> = self.sub_pools.iter().map(|e| Arc::clone(e.value())).collect();
        for sub in subs {
            let mut guard = sub.lock();
            let g = &mut *guard;
            let conns: Vec<_> = g.idle.drain(..).chain(g.leased.drain(..)).collect();
            drop(guard);
            for conn in conns {
                conn.close();
                self.total.fetch_sub(1, Ordering::AcqRel);
            }
        }
        self.sub_pools.clear();
        debug!("connection pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            total: self.total.load(Ordering::Acquire),
            ..PoolStats::default()
        };
        for entry in self.sub_pools.iter() {
            let guard = entry.value().lock();
            let s = EndpointStats {
                idle: guard.idle.len(),
                leased: guard.leased.len(),
                reserved: guard.reserved,
            };
            stats.idle += s.idle;
            stats.leased += s.leased;
            stats.endpoints.insert(entry.key().clone(), s);
        }
        stats
    }

    /// Run `evict_idle` every `interval` until the pool is closed or dropped.
    pub fn start_eviction(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.is_closed() {
                    break;
                }
                let n = pool.evict_idle();
                if n > 0 {
                    trace!(evicted = n, "idle eviction");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::AtomicU64;

    use crate::protocol::http::transport::Outbound;

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    struct TestChannel {
        id: u64,
        open: AtomicBool,
    }

    impl TestChannel {
        fn fresh() -> Arc<dyn Channel> {
            Arc::new(TestChannel {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                open: AtomicBool::new(true),
            })
        }
    }

    impl Channel for TestChannel {
        fn id(&self) -> u64 {
            self.id
        }
        fn write(&self, _message: Outbound) -> io::Result<()> {
            Ok(())
        }
        fn upgrade_to_tls(&self, _host: &str) -> io::Result<()> {
            Ok(())
        }
        fn close(&self) {
            self.open.store(false, Ordering::Release);
        }
        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }
    }

    fn key(host: &str) -> EndpointKey {
        EndpointKey::new("http", host, 80)
    }

    fn open_new(pool: &Arc<ConnectionPool>, k: &EndpointKey) -> Arc<PooledConnection> {
        match pool.acquire(k).unwrap() {
            Lease::New(r) => r.commit(TestChannel::fresh()).unwrap(),
            Lease::Pooled(_) => panic!("expected a new connection"),
        }
    }

    fn bounded(total: Option<usize>, per_host: Option<usize>) -> Arc<ConnectionPool> {
        ConnectionPool::new(PoolConfig {
            max_connections: total,
            max_connections_per_host: per_host,
            ..PoolConfig::default()
        })
    }

    #[test]
    fn reuses_most_recently_released_first() {
        let pool = bounded(None, None);
        let k = key("h");
        let a = open_new(&pool, &k);
        let b = open_new(&pool, &k);
        pool.release(&a, true);
        pool.release(&b, true);
        match pool.acquire(&k).unwrap() {
            Lease::Pooled(c) => assert_eq!(c.id(), b.id()),
            Lease::New(_) => panic!("expected reuse"),
        }
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.leased, 1);
    }

    #[test]
    fn global_limit_names_capacity() {
        let pool = bounded(Some(1), None);
        let _held = open_new(&pool, &key("h"));
        let err = pool.acquire(&key("h")).unwrap_err();
        assert_eq!(err.to_string(), "Too many connections 1");
        let err = pool.acquire(&key("other")).unwrap_err();
        assert_eq!(err, PoolError::TooManyConnections(1));
        assert!(!pool.stats().endpoints.contains_key(&key("other")));
    }

    #[test]
    fn per_host_limit_checked_first() {
        let pool = bounded(Some(1), Some(1));
        let _held = open_new(&pool, &key("h"));
        assert_eq!(pool.acquire(&key("h")).unwrap_err(), PoolError::TooManyConnectionsPerHost(1));
    }

    #[test]
    fn dropped_reservation_frees_slot() {
        let pool = bounded(Some(1), None);
        let lease = pool.acquire(&key("h")).unwrap();
        assert_eq!(pool.stats().total, 1);
        drop(lease);
        assert_eq!(pool.stats().total, 0);
        assert!(matches!(pool.acquire(&key("h")), Ok(Lease::New(_))));
    }

    #[test]
    fn release_without_keep_alive_closes() {
        let pool = bounded(Some(2), None);
        let k = key("h");
        let c = open_new(&pool, &k);
        pool.release(&c, false);
        assert!(!c.is_open());
        assert_eq!(pool.stats().total, 0);
        pool.release(&c, true);
        assert_eq!(pool.stats().total, 0);
        assert!(matches!(pool.acquire(&k), Ok(Lease::New(_))));
    }

    #[test]
    fn release_is_idempotent() {
        let pool = bounded(None, None);
        let c = open_new(&pool, &key("h"));
        pool.release(&c, true);
        pool.release(&c, true);
        pool.release(&c, false);
        let stats = pool.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.idle, 1);
        assert!(c.is_open());
    }

    #[test]
    fn closed_channel_is_not_reused() {
        let pool = bounded(None, None);
        let k = key("h");
        let c = open_new(&pool, &k);
        pool.release(&c, true);
        c.channel().close();
        assert!(matches!(pool.acquire(&k), Ok(Lease::New(_))));
    }

    #[test]
    fn eviction_closes_expired_idle() {
        let pool = ConnectionPool::new(PoolConfig {
            keep_alive_timeout: Duration::ZERO,
            ..PoolConfig::default()
        });
        let k = key("h");
        let a = open_new(&pool, &k);
        let b = open_new(&pool, &k);
        pool.release(&a, true);
        assert_eq!(pool.evict_idle(), 1);
        assert!(!a.is_open());
        assert!(b.is_open());
        assert_eq!(pool.stats().total, 1);
    }

    #[test]
    fn close_all_rejects_later_work() {
        let pool = bounded(None, None);
        let k = key("h");
        let idle = open_new(&pool, &k);
        let leased = open_new(&pool, &k);
        pool.release(&idle, true);
        let pending = pool.acquire(&key("late")).unwrap();
        pool.close_all();
        assert!(!idle.is_open());
        assert!(!leased.is_open());
        assert_eq!(pool.acquire(&k).unwrap_err(), PoolError::Closed);
        match pending {
            Lease::New(r) => assert_eq!(r.commit(TestChannel::fresh()).unwrap_err(), PoolError::Closed),
            Lease::Pooled(_) => panic!("expected a reservation"),
        }
        pool.release(&leased, true);
        assert_eq!(pool.stats().total, 0);
    }

    #[test]
    fn empty_sub_pools_are_removed() {
        let pool = ConnectionPool::new(PoolConfig {
            max_connections: Some(2),
            keep_alive_timeout: Duration::ZERO,
            ..PoolConfig::default()
        });
        let k = key("h");

        drop(pool.acquire(&k).unwrap());
        assert!(pool.stats().endpoints.is_empty());

        let c = open_new(&pool, &k);
        pool.discard(&c);
        assert!(pool.stats().endpoints.is_empty());

        let c = open_new(&pool, &k);
        pool.release(&c, true);
        assert_eq!(pool.stats().endpoints[&k].idle, 1);
        assert_eq!(pool.evict_idle(), 1);
        assert!(pool.stats().endpoints.is_empty());
        assert_eq!(pool.stats().total, 0);

        // a removed endpoint comes back on demand
        let c = open_new(&pool, &k);
        assert_eq!(pool.stats().endpoints[&k].leased, 1);
        pool.release(&c, true);
    }

    #[test]
    fn busy_sub_pool_is_kept() {
        let pool = bounded(None, None);
        let k = key("h");
        let a = open_new(&pool, &k);
        let b = open_new(&pool, &k);
        pool.discard(&a);
        let stats = pool.stats();
        assert_eq!(stats.endpoints[&k].leased, 1);
        pool.release(&b, true);
        assert_eq!(pool.stats().endpoints[&k].idle, 1);
    }

    #[test]
    fn capacity_holds_under_churn() {
        let pool = bounded(Some(3), Some(2));
        let keys = [key("a"), key("b")];
        let mut held = Vec::new();
        for round in 0..20 {
            let k = &keys[round % 2];
            if let Ok(lease) = pool.acquire(k) {
                let conn = match lease {
                    Lease::New(r) => r.commit(TestChannel::fresh()).unwrap(),
                    Lease::Pooled(c) => c,
                };
                held.push(conn);
            }
            if round % 3 == 0 {
                if let Some(c) = held.pop() {
                    pool.release(&c, round % 2 == 0);
                }
            }
            let stats = pool.stats();
            assert!(stats.total <= 3);
            for s in stats.endpoints.values() {
                assert!(s.idle + s.leased + s.reserved <= 2);
            }
        }
    }
}
