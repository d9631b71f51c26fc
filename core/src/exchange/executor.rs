/*
 * executor.rs
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

//! Executors that run future listeners off the connection's delivery task.

use tokio::runtime::Handle;

/// Deferred listener callback.
pub type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener callbacks.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Listener);
}

/// Listeners run as blocking tasks on a tokio runtime.
impl Executor for Handle {
    fn execute(&self, task: Listener) {
        self.spawn_blocking(task);
    }
}

/// Runs each listener on a new OS thread. For callers without a runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, task: Listener) {
        std::thread::spawn(task);
    }
}

/// Runs each listener on the thread that completed the exchange. Listeners
/// must be short and must not block.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Listener) {
        task();
    }
}
