/*
 * handler.rs
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

//! Caller-supplied response handler (push model).
//!
//! Events: status → headers → body part (×n) → [trailers as headers] → completed / error.

use crate::error::ExchangeError;
use crate::protocol::http::headers::Headers;
use crate::protocol::http::response::{BodyPart, ResponseStatus};

/// Returned by the event callbacks to continue or stop the exchange early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Continue,
    Abort,
}

/// Handler for HTTP response events. The engine drives this as events arrive on
/// the connection's delivery task; callbacks must not block.
///
/// Flow for a response with body:
/// 1. `on_status(status)`
/// 2. `on_headers(headers)`
/// 3. `on_body_part(part)` for each non-empty fragment
/// 4. `on_headers(trailers)` if the terminal chunk carried trailers
/// 5. `on_completed()`
///
/// Returning `State::Abort` from 1–3 finishes the exchange successfully with what
/// was received so far. On any failure only `on_error` is called.
///
/// Only the final attempt is delivered: responses consumed by redirects,
/// authentication retries, tunnels and `100 Continue` never reach the handler.
pub trait AsyncHandler: Send {
    fn on_status(&mut self, _status: &ResponseStatus) -> State {
        State::Continue
    }

    fn on_headers(&mut self, _headers: &Headers) -> State {
        State::Continue
    }

    fn on_body_part(&mut self, _part: &BodyPart) -> State {
        State::Continue
    }

    /// Called once when the exchange completes. An error is logged; the outcome
    /// is already decided.
    fn on_completed(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Called at most once when the exchange fails or is cancelled.
    fn on_error(&mut self, _error: &ExchangeError) {}
}

/// Handler that only relies on the exchange's own response accumulator.
#[derive(Debug, Default)]
pub struct CompletionHandler;

impl AsyncHandler for CompletionHandler {}
