//! Network-layer connectivity.
//!
//! The agent only asks the provider to bring the network up once at startup
//! and waits for it. How association happens is the provider's business.

use std::future::Future;
use std::time::Duration;

use tokio::net::lookup_host;
use tracing::{info, warn};

/// Default pause between readiness probes.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Brings the network layer up.
#[allow(async_fn_in_trait)]
pub trait ConnectivityProvider {
    /// Block until the network is usable. Retries are the provider's concern.
    async fn connect(&mut self);
}

/// Provider for hosted builds where the operating system owns the link.
///
/// The network counts as ready once the ingestion host resolves.
#[derive(Debug, Clone)]
pub struct ResolverConnectivity {
    host: String,
    port: u16,
    retry_interval: Duration,
}

impl ResolverConnectivity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

impl ConnectivityProvider for ResolverConnectivity {
    async fn connect(&mut self) {
        let host = self.host.as_str();
        let port = self.port;

        let attempts = wait_until_ready(self.retry_interval, || async move {
            match lookup_host((host, port)).await {
                Ok(mut addrs) => match addrs.next() {
                    Some(_) => Ok(()),
                    None => Err("host resolved to no addresses".to_string()),
                },
                Err(e) => Err(e.to_string()),
            }
        })
        .await;

        info!(host = %self.host, attempts = attempts, "Network ready");
    }
}

/// Run `check` until it succeeds, sleeping `retry_interval` between attempts.
///
/// Never gives up. Returns the number of attempts made.
async fn wait_until_ready<F, Fut>(retry_interval: Duration, mut check: F) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match check().await {
            Ok(()) => return attempt,
            Err(e) => warn!(attempt = attempt, error = %e, "Network not ready"),
        }

        tokio::time::sleep(retry_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[test]
    fn test_default_retry_interval() {
        let provider = ResolverConnectivity::new("localhost", 80);
        assert_eq!(provider.retry_interval(), DEFAULT_RETRY_INTERVAL);

        let provider = provider.with_retry_interval(Duration::from_millis(10));
        assert_eq!(provider.retry_interval(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_connect_returns_for_ip_literal() {
        let mut provider = ResolverConnectivity::new("127.0.0.1", 8080);
        tokio::time::timeout(Duration::from_secs(5), provider.connect())
            .await
            .expect("IP literals resolve without a network");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_keeps_retrying_while_not_ready() {
        let calls = Cell::new(0u32);
        let check = || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>("resolver unavailable".to_string()) }
        };

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            wait_until_ready(Duration::from_secs(5), check),
        )
        .await;

        assert!(result.is_err(), "readiness wait must not give up");
        assert!(calls.get() >= 12, "only {} attempts", calls.get());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_once_ready() {
        let calls = Cell::new(0u32);
        let check = || {
            calls.set(calls.get() + 1);
            let ready = calls.get() >= 3;
            async move {
                if ready {
                    Ok(())
                } else {
                    Err("no route".to_string())
                }
            }
        };

        let start = Instant::now();
        let attempts = wait_until_ready(Duration::from_secs(5), check).await;

        assert_eq!(attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
