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

//! Exchange future, listener executors and the per-exchange watchdog.

mod executor;
mod future;
mod timeout;

pub use executor::{DirectExecutor, Executor, Listener, ThreadExecutor};
pub use future::{AuthTarget, ExchangeFuture, Outcome, Phase, ResponseFuture};
pub(crate) use future::Attempt;
pub use timeout::spawn_watchdog;
