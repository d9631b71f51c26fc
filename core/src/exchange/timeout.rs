/*
 * timeout.rs
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

//! Per-exchange watchdog: read (idle) timeout reset by `touch`, and an absolute
//! request timeout. One task per exchange, aborted when the exchange completes.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ExchangeError, TimeoutKind};
use crate::exchange::ExchangeFuture;

/// Start the watchdog for `future` on `runtime`. Returns `None` when neither
/// timeout is set.
pub fn spawn_watchdog(
    runtime: &Handle,
    future: &Arc<ExchangeFuture>,
    read_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
) -> Option<AbortHandle> {
    if read_timeout.is_none() && request_timeout.is_none() {
        return None;
    }
    let weak: Weak<ExchangeFuture> = Arc::downgrade(future);
    let request_deadline = request_timeout.map(|t| Instant::now() + t);
    let task = runtime.spawn(async move {
        loop {
            let Some(future) = weak.upgrade() else { return };
            if future.is_done() {
                return;
            }
            let read_deadline = read_timeout.map(|t| Instant::from_std(future.last_touch()) + t);
            drop(future);
            let wake = match (read_deadline, request_deadline) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => return,
            };
            tokio::time::sleep_until(wake).await;

            let Some(future) = weak.upgrade() else { return };
            let now = Instant::now();
            let kind = if request_deadline.map(|d| now >= d).unwrap_or(false) {
                Some(TimeoutKind::Request)
            } else {
                read_timeout
                    .filter(|t| now >= Instant::from_std(future.last_touch()) + *t)
                    .map(|_| TimeoutKind::Read)
            };
            if let Some(kind) = kind {
                debug!(exchange = future.id(), "{} timeout", kind);
                future.abort(ExchangeError::Timeout(kind));
                return;
            }
        }
    });
    Some(task.abort_handle())
}
