use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use columbus_core::host::BrowserHost;

/// Periodic host heartbeat for the lifetime of a scan.
pub struct Keepalive {
    cancel: CancellationToken,
}

impl Keepalive {
    pub fn start(host: Arc<dyn BrowserHost>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = host.heartbeat().await {
                            debug!(error = %e, "keepalive heartbeat failed");
                        }
                    }
                }
            }
        });
        Self { cancel }
    }

    pub fn stop(self) {
        self.cancel.cancel();
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBrowser;

    #[tokio::test(start_paused = true)]
    async fn heartbeats_until_stopped() {
        let browser = Arc::new(MockBrowser::new());
        let keepalive = Keepalive::start(browser.clone(), Duration::from_secs(24));

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(browser.heartbeats(), 2);

        keepalive.stop();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(browser.heartbeats(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_heartbeat_before_first_interval_or_after_drop() {
        let browser = Arc::new(MockBrowser::new());
        let keepalive = Keepalive::start(browser.clone(), Duration::from_secs(24));
        tokio::time::sleep(Duration::from_secs(23)).await;
        assert_eq!(browser.heartbeats(), 0);
        drop(keepalive);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(browser.heartbeats(), 0);
    }
}
