/*
 * filter.rs
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

//! Response and I/O-exception filters.
//!
//! Filters run in registration order, each receiving the context the previous one
//! returned. A filter may swap the handler for the rest of the exchange or ask
//! for the request in the context to be replayed.

use crate::error::ExchangeError;
use crate::protocol::http::handler::AsyncHandler;
use crate::protocol::http::headers::Headers;
use crate::protocol::http::request::Request;
use crate::protocol::http::response::ResponseStatus;

/// What a filter sees and may change.
pub struct FilterContext {
    pub request: Request,
    pub status: Option<ResponseStatus>,
    pub headers: Option<Headers>,
    /// The failure, for I/O-exception filters.
    pub error: Option<ExchangeError>,
    /// Replacement handler for the rest of the exchange.
    pub handler: Option<Box<dyn AsyncHandler>>,
    /// Re-send `request` and discard the current attempt.
    pub replay: bool,
}

impl FilterContext {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            status: None,
            headers: None,
            error: None,
            handler: None,
            replay: false,
        }
    }

    pub fn with_response(mut self, status: ResponseStatus, headers: Headers) -> Self {
        self.status = Some(status);
        self.headers = Some(headers);
        self
    }

    pub fn with_error(mut self, error: ExchangeError) -> Self {
        self.error = Some(error);
        self
    }

    /// Ask for `request` to be sent again.
    pub fn replay_with(mut self, request: Request) -> Self {
        self.request = request;
        self.replay = true;
        self
    }
}

impl std::fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("url", &self.request.url().as_str())
            .field("status", &self.status.as_ref().map(|s| s.code))
            .field("error", &self.error)
            .field("replay", &self.replay)
            .finish()
    }
}

/// Inspects every response once its headers arrive.
pub trait ResponseFilter: Send + Sync {
    fn filter(&self, ctx: FilterContext) -> Result<FilterContext, ExchangeError>;
}

/// Offered every failure of an attempt before the exchange is aborted.
pub trait IoExceptionFilter: Send + Sync {
    fn filter(&self, ctx: FilterContext) -> Result<FilterContext, ExchangeError>;
}

/// Runs `ctx` through `filters` in order.
pub(crate) fn apply<F, T>(filters: &[T], mut ctx: FilterContext, f: F) -> Result<FilterContext, ExchangeError>
where
    F: Fn(&T, FilterContext) -> Result<FilterContext, ExchangeError>,
{
    for filter in filters {
        ctx = f(filter, ctx).map_err(|e| match e {
            ExchangeError::Filter(_) => e,
            other => ExchangeError::Filter(other.to_string()),
        })?;
    }
    Ok(ctx)
}
