/*
 * error.rs
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

//! Pool, exchange and configuration errors.
//!
//! `ExchangeError` is the single value a failed exchange resolves to. It is `Clone`
//! so the blocking getter, the async waiter and every listener observe the same
//! outcome; I/O errors are shared behind an `Arc` for that reason.

use std::io;
use std::sync::Arc;

/// Errors from the endpoint pool. Raised synchronously by `acquire`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Pool-wide capacity reached.
    #[error("Too many connections {0}")]
    TooManyConnections(usize),

    /// Per-endpoint capacity reached.
    #[error("Too many connections per host {0}")]
    TooManyConnectionsPerHost(usize),

    /// `close_all` has been called.
    #[error("pool closed")]
    Closed,
}

/// Which watchdog fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// No activity on the exchange within the read timeout.
    Read,
    /// The exchange as a whole exceeded the request timeout.
    Request,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::Read => write!(f, "read"),
            TimeoutKind::Request => write!(f, "request"),
        }
    }
}

/// Terminal failure of an exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// Connection could not be leased.
    #[error(transparent)]
    Capacity(#[from] PoolError),

    /// Redirect limit exceeded.
    #[error("Maximum redirect reached: {0}")]
    MaxRedirects(u32),

    /// Transport failure (connect, read, write).
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    /// Tunnel establishment or TLS upgrade failed.
    #[error("protocol upgrade failed: {0}")]
    ProtocolUpgrade(String),

    /// The caller cancelled the exchange.
    #[error("exchange cancelled")]
    Cancelled,

    /// A watchdog fired.
    #[error("{0} timeout")]
    Timeout(TimeoutKind),

    /// A response filter rejected the response.
    #[error("filter error: {0}")]
    Filter(String),

    /// An authentication step could not produce credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request descriptor cannot be sent (bad URL, unsupported scheme).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The remote peer closed the connection before the response completed.
    #[error("remotely closed")]
    RemotelyClosed,
}

impl ExchangeError {
    /// True when the exchange ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExchangeError::Cancelled)
    }

    /// True for transport-level failures that I/O-exception filters may claim.
    pub fn is_io(&self) -> bool {
        matches!(self, ExchangeError::Io(_) | ExchangeError::RemotelyClosed)
    }

    /// The underlying I/O error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            ExchangeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExchangeError {
    fn from(e: io::Error) -> Self {
        ExchangeError::Io(Arc::new(e))
    }
}

/// Errors loading a `ClientConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("xml error: {0}")]
    Xml(String),

    /// Element value could not be parsed for the named option.
    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },
}
