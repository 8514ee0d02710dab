//! HTTP transport with a header-wait allowance that can be read and rewritten
//! while requests are in flight.

use crate::error::{FireError, Result};
use parking_lot::RwLock;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Signed time allowance for the header-wait phase.
///
/// Negative or zero once connection setup has used up the whole budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeaderTimeout {
    nanos: i64,
}

impl HeaderTimeout {
    pub const ZERO: HeaderTimeout = HeaderTimeout { nanos: 0 };

    pub fn from_duration(duration: Duration) -> Self {
        HeaderTimeout {
            nanos: saturating_nanos(duration),
        }
    }

    /// `budget - elapsed`, going negative when `elapsed` exceeds `budget`.
    pub fn remaining(budget: Duration, elapsed: Duration) -> Self {
        HeaderTimeout {
            nanos: saturating_nanos(budget).saturating_sub(saturating_nanos(elapsed)),
        }
    }

    #[inline]
    pub fn as_nanos(&self) -> i64 {
        self.nanos
    }

    /// The allowance as a duration, or `None` when nothing is left.
    pub fn as_duration(&self) -> Option<Duration> {
        u64::try_from(self.nanos)
            .ok()
            .filter(|n| *n > 0)
            .map(Duration::from_nanos)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.nanos <= 0
    }
}

impl fmt::Display for HeaderTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = Duration::from_nanos(self.nanos.unsigned_abs());
        if self.nanos < 0 {
            write!(f, "-{:?}", magnitude)
        } else {
            write!(f, "{:?}", magnitude)
        }
    }
}

fn saturating_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// The user-facing timeout budget, read by every request when it is issued.
///
/// Cloned handles share the same value.
#[derive(Clone, Debug)]
pub struct TimeoutBudget(Arc<RwLock<Duration>>);

impl TimeoutBudget {
    pub fn new(budget: Duration) -> Self {
        TimeoutBudget(Arc::new(RwLock::new(budget)))
    }

    pub fn get(&self) -> Duration {
        *self.0.read()
    }

    pub fn set(&self, budget: Duration) {
        *self.0.write() = budget;
    }
}

/// Shared slot holding the current header-wait allowance.
#[derive(Clone, Debug)]
pub(crate) struct HeaderTimeoutCell(Arc<RwLock<HeaderTimeout>>);

impl HeaderTimeoutCell {
    pub(crate) fn new(initial: HeaderTimeout) -> Self {
        HeaderTimeoutCell(Arc::new(RwLock::new(initial)))
    }

    pub(crate) fn get(&self) -> HeaderTimeout {
        *self.0.read()
    }

    pub(crate) fn set(&self, timeout: HeaderTimeout) {
        *self.0.write() = timeout;
    }
}

/// Wraps a [`reqwest::Client`] so the header-wait allowance can be rewritten
/// concurrently with request execution.
///
/// Writers take the exclusive lock, readers the shared one; neither is held
/// across an await point.
#[derive(Clone, Debug)]
pub struct LockingTransport {
    client: Client,
    header_timeout: HeaderTimeoutCell,
}

impl LockingTransport {
    pub(crate) fn new(client: Client, header_timeout: HeaderTimeoutCell) -> Self {
        Self {
            client,
            header_timeout,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Store a new header-wait allowance. Requests already past the header
    /// phase are unaffected.
    pub fn set(&self, timeout: HeaderTimeout) {
        self.header_timeout.set(timeout);
    }

    pub fn get(&self) -> HeaderTimeout {
        self.header_timeout.get()
    }

    /// Execute `request`, failing with a timeout if response headers have not
    /// arrived by `deadline`. The body is not time-limited.
    pub async fn round_trip(
        &self,
        request: reqwest::Request,
        deadline: Instant,
    ) -> Result<reqwest::Response> {
        match tokio::time::timeout_at(deadline, self.client.execute(request)).await {
            Ok(result) => result.map_err(FireError::from),
            Err(elapsed) => Err(FireError::timeout(elapsed)),
        }
    }
}
