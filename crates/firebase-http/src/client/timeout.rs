//! Splits one timeout budget between connection setup and the wait for
//! response headers.
//!
//! Connection setup is wrapped by [`DialTimer`], a connector layer that gives
//! the dial the whole budget and then records what is left as the header-wait
//! allowance on the [`LockingTransport`]. Each request also carries its own
//! deadline (`issue time + budget`), so concurrent requests cannot stretch
//! or shrink each other's header wait through the shared field.

use crate::client::config::ClientConfig;
use crate::client::transport::{HeaderTimeout, HeaderTimeoutCell, LockingTransport, TimeoutBudget};
use crate::error::{BoxError, DialTimeout, FireError, Result};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service};

/// Connector layer installing [`DialTimer`] around reqwest's connector.
#[derive(Clone, Debug)]
pub(crate) struct DialTimerLayer {
    budget: TimeoutBudget,
    header_timeout: HeaderTimeoutCell,
}

impl DialTimerLayer {
    pub(crate) fn new(budget: TimeoutBudget, header_timeout: HeaderTimeoutCell) -> Self {
        Self {
            budget,
            header_timeout,
        }
    }
}

impl<S> Layer<S> for DialTimerLayer {
    type Service = DialTimer<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DialTimer {
            inner,
            budget: self.budget.clone(),
            header_timeout: self.header_timeout.clone(),
        }
    }
}

/// Bounds a connection attempt by the budget and records the remainder.
#[derive(Clone, Debug)]
pub(crate) struct DialTimer<S> {
    inner: S,
    budget: TimeoutBudget,
    header_timeout: HeaderTimeoutCell,
}

impl<S, R> Service<R> for DialTimer<S>
where
    S: Service<R, Error = BoxError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, std::result::Result<S::Response, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), BoxError>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, target: R) -> Self::Future {
        let budget = self.budget.get();
        let clock = DialClock::start(budget, self.header_timeout.clone());
        let connecting = self.inner.call(target);

        Box::pin(async move {
            let result = tokio::time::timeout(budget, connecting).await;
            let remaining = clock.finish();
            match result {
                Err(_) => Err(Box::new(DialTimeout { budget }) as BoxError),
                Ok(Err(e)) => Err(e),
                Ok(Ok(_)) if remaining.is_expired() => {
                    tracing::debug!("[transport] dial consumed the budget ({})", remaining);
                    Err(Box::new(DialTimeout { budget }) as BoxError)
                }
                Ok(Ok(conn)) => Ok(conn),
            }
        })
    }
}

/// Records `budget - elapsed` when the dial finishes or is abandoned.
struct DialClock {
    started: Instant,
    budget: Duration,
    header_timeout: HeaderTimeoutCell,
    recorded: bool,
}

impl DialClock {
    fn start(budget: Duration, header_timeout: HeaderTimeoutCell) -> Self {
        DialClock {
            started: Instant::now(),
            budget,
            header_timeout,
            recorded: false,
        }
    }

    fn finish(mut self) -> HeaderTimeout {
        self.record()
    }

    fn record(&mut self) -> HeaderTimeout {
        let remaining = HeaderTimeout::remaining(self.budget, self.started.elapsed());
        self.header_timeout.set(remaining);
        self.recorded = true;
        remaining
    }
}

impl Drop for DialClock {
    fn drop(&mut self) {
        if !self.recorded {
            self.record();
        }
    }
}

/// Issues requests under the timeout budget and classifies failures.
#[derive(Debug)]
pub struct TimeoutCoordinator {
    transport: LockingTransport,
    budget: TimeoutBudget,
}

impl TimeoutCoordinator {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let budget = TimeoutBudget::new(config.timeout);
        let header_timeout = HeaderTimeoutCell::new(HeaderTimeout::from_duration(config.timeout));

        let mut builder = reqwest::Client::builder()
            .connector_layer(DialTimerLayer::new(budget.clone(), header_timeout.clone()))
            .tcp_keepalive(config.tcp_keepalive)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(config.user_agent.clone());

        if !config.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy_url)
                .map_err(|e| FireError::Config(format!("invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FireError::Config(e.to_string()))?;

        Ok(TimeoutCoordinator {
            transport: LockingTransport::new(client, header_timeout),
            budget,
        })
    }

    pub fn transport(&self) -> &LockingTransport {
        &self.transport
    }

    pub fn budget(&self) -> &TimeoutBudget {
        &self.budget
    }

    /// Send `request`. Returns the response once headers arrived with a 2xx
    /// status; the body is left unread.
    pub async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let budget = self.budget.get();
        let deadline = Instant::now() + budget;
        tracing::debug!(
            "[firebase] {} {} (budget {:?})",
            request.method(),
            request.url(),
            budget
        );

        let response = self.transport.round_trip(request, deadline).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.map_err(FireError::from)?;
        tracing::debug!("[firebase] remote error {}: {}", status, body);
        Err(FireError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    /// Connector stand-in that takes `delay` to "dial".
    #[derive(Clone)]
    struct SlowDial {
        delay: Duration,
    }

    impl Service<()> for SlowDial {
        type Response = &'static str;
        type Error = BoxError;
        type Future = Pin<Box<dyn Future<Output = std::result::Result<&'static str, BoxError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), BoxError>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _target: ()) -> Self::Future {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok("conn")
            })
        }
    }

    fn timer(delay: Duration, budget: Duration) -> (DialTimer<SlowDial>, HeaderTimeoutCell) {
        let cell = HeaderTimeoutCell::new(HeaderTimeout::from_duration(budget));
        let layer = DialTimerLayer::new(TimeoutBudget::new(budget), cell.clone());
        (layer.layer(SlowDial { delay }), cell)
    }

    #[tokio::test]
    async fn test_fast_dial_leaves_positive_allowance() {
        let (mut service, cell) = timer(Duration::from_millis(5), Duration::from_secs(2));
        let conn = service.call(()).await.unwrap();
        assert_eq!(conn, "conn");

        let left = cell.get();
        assert!(left > HeaderTimeout::ZERO);
        assert!(left < HeaderTimeout::from_duration(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_slow_dial_times_out_with_negative_allowance() {
        let (mut service, cell) = timer(Duration::from_millis(200), Duration::from_millis(5));
        let err = service.call(()).await.unwrap_err();
        assert!(err.is::<DialTimeout>());
        assert!(cell.get() <= HeaderTimeout::ZERO);
    }

    #[tokio::test]
    async fn test_zero_budget_fails_immediately() {
        let (mut service, cell) = timer(Duration::ZERO, Duration::ZERO);
        let err = service.call(()).await.unwrap_err();
        assert!(err.is::<DialTimeout>());
        assert!(cell.get().is_expired());
    }

    #[tokio::test]
    async fn test_abandoned_dial_still_records() {
        let (mut service, cell) = timer(Duration::from_secs(10), Duration::from_millis(1));
        let pending = service.call(());
        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(pending);
        assert!(cell.get().is_expired());
    }

    #[tokio::test]
    async fn test_budget_read_at_issue_time() {
        let cell = HeaderTimeoutCell::new(HeaderTimeout::ZERO);
        let budget = TimeoutBudget::new(Duration::from_millis(1));
        let mut service = DialTimerLayer::new(budget.clone(), cell.clone()).layer(SlowDial {
            delay: Duration::from_millis(20),
        });

        budget.set(Duration::from_secs(5));
        assert!(service.call(()).await.is_ok());
        assert!(cell.get() > HeaderTimeout::from_duration(Duration::from_secs(4)));
    }
}
