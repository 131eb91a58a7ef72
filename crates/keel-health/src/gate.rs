//! Health gate — poll until healthy or out of time.
//!
//! Transport errors and degraded reports are retried the same way: a
//! service that is still starting and one that is broken look identical
//! until the timeout decides.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::checker::{HealthEndpoint, HealthError, ProbeResult, http_probe};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(50);

/// Something the orchestrator can wait on after a swap.
#[allow(async_fn_in_trait)]
pub trait HealthGate {
    /// `true` once healthy, `false` when the budget runs out.
    async fn await_healthy(&self) -> bool;
}

/// HTTP health gate with a fixed overall timeout and poll interval.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    endpoint: HealthEndpoint,
    timeout: Duration,
    interval: Duration,
    request_timeout: Duration,
}

impl HealthProbe {
    pub fn new(url: &str, timeout: Duration, interval: Duration) -> Result<Self, HealthError> {
        Ok(Self {
            endpoint: HealthEndpoint::parse(url)?,
            timeout,
            interval,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn endpoint(&self) -> &HealthEndpoint {
        &self.endpoint
    }

    /// Poll until every check reports `working` or `timeout` elapses.
    pub async fn poll(&self) -> bool {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let remaining = self.timeout.saturating_sub(started.elapsed());
            let budget = self.request_timeout.min(remaining).max(MIN_REQUEST_TIMEOUT);

            match http_probe(&self.endpoint, budget).await {
                ProbeResult::Healthy => {
                    info!(
                        url = %self.endpoint.url(),
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "service healthy"
                    );
                    return true;
                }
                ProbeResult::Degraded { failing } => {
                    debug!(attempt, ?failing, "service not healthy yet");
                }
                ProbeResult::Failed { reason } => {
                    debug!(attempt, %reason, "health probe failed");
                }
            }

            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(
                    url = %self.endpoint.url(),
                    attempts = attempt,
                    timeout = ?self.timeout,
                    "health check timed out"
                );
                return false;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }
    }
}

impl HealthGate for HealthProbe {
    async fn await_healthy(&self) -> bool {
        self.poll().await
    }
}

/// One-shot form: build a probe for `url` and poll it.
pub async fn await_healthy(
    url: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool, HealthError> {
    Ok(HealthProbe::new(url, timeout, poll_interval)?.poll().await)
}
