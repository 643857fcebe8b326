use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use columbus_core::errors::MessagingError;
use columbus_core::executor::ExecutorRequest;
use columbus_core::host::{BrowserHost, ExecutorChannel};
use columbus_core::ids::TabId;
use columbus_core::platform::Platform;

/// Executor request/response with retry and on-demand re-attach.
pub struct MessagingGateway {
    host: Arc<dyn BrowserHost>,
    channel: Arc<dyn ExecutorChannel>,
    retries: u32,
    reattach_delay: Duration,
}

impl MessagingGateway {
    pub fn new(
        host: Arc<dyn BrowserHost>,
        channel: Arc<dyn ExecutorChannel>,
        retries: u32,
        reattach_delay: Duration,
    ) -> Self {
        Self {
            host,
            channel,
            retries: retries.max(1),
            reattach_delay,
        }
    }

    /// Send `request`, re-attaching the executor between failed attempts.
    #[instrument(skip_all, fields(tab_id = %tab_id, request = request.kind()))]
    pub async fn send_to_tab(&self, tab_id: &TabId, request: &ExecutorRequest) -> Result<Value, MessagingError> {
        let mut attempt = 1;
        loop {
            match self.channel.send(tab_id, request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt < self.retries => {
                    debug!(attempt, error = %e, "executor request failed");
                    self.reattach(tab_id).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(MessagingError::Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
            }
        }
    }

    /// [`send_to_tab`](Self::send_to_tab) and decode the reply.
    pub async fn request<T: DeserializeOwned>(
        &self,
        tab_id: &TabId,
        request: &ExecutorRequest,
    ) -> Result<T, MessagingError> {
        let reply = self.send_to_tab(tab_id, request).await?;
        serde_json::from_value(reply)
            .map_err(|e| MessagingError::InvalidResponse(format!("{}: {e}", request.kind())))
    }

    /// Load the destination's executor into the tab, keyed by the tab's URL.
    async fn reattach(&self, tab_id: &TabId) {
        let platform = match self.host.get_tab(tab_id).await {
            Ok(tab) => Platform::from_url(&tab.url),
            Err(e) => {
                debug!(error = %e, "cannot inspect tab for re-attach");
                return;
            }
        };
        let Some(platform) = platform else {
            debug!("tab is not on a known destination");
            return;
        };

        match self.channel.attach(tab_id, platform).await {
            Ok(()) => {
                debug!(platform = %platform, "executor re-attached");
                tokio::time::sleep(self.reattach_delay).await;
            }
            Err(e) => debug!(platform = %platform, error = %e, "re-attach failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use columbus_core::errors::ChannelError;
    use columbus_core::executor::LoginStatus;
    use columbus_core::host::WindowSpec;

    use crate::mock::MockBrowser;

    async fn setup(browser: MockBrowser, url: &str) -> (Arc<MockBrowser>, MessagingGateway, TabId) {
        let browser = Arc::new(browser);
        let window = browser
            .create_window(WindowSpec {
                url: "about:blank".into(),
                width: 800,
                height: 600,
                focused: true,
            })
            .await
            .unwrap();
        let tab = browser.open_tab(window.window_id, url);
        let gateway = MessagingGateway::new(browser.clone(), browser.clone(), 3, Duration::from_secs(1));
        (browser, gateway, tab)
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_needs_no_attach() {
        let (browser, gateway, tab) = setup(MockBrowser::new(), "https://claude.ai/new").await;
        let status: LoginStatus = gateway.request(&tab, &ExecutorRequest::CheckLogin).await.unwrap();
        assert!(status.logged_in);
        assert!(browser.attach_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_executor_is_reattached_by_hostname() {
        let (browser, gateway, tab) =
            setup(MockBrowser::new().requiring_attach(), "https://www.perplexity.ai/search").await;

        let start = tokio::time::Instant::now();
        let status: LoginStatus = gateway.request(&tab, &ExecutorRequest::CheckLogin).await.unwrap();
        assert!(status.logged_in);
        assert_eq!(browser.attach_calls(), vec![(tab, Platform::Perplexity)]);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_configured_attempts() {
        let (browser, gateway, tab) =
            setup(MockBrowser::new().requiring_attach(), "https://example.com/").await;

        let err = gateway
            .send_to_tab(&tab, &ExecutorRequest::CheckLogin)
            .await
            .unwrap_err();
        match err {
            MessagingError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, ChannelError::ReceiverMissing(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(browser.attach_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_tab_exhausts_retries() {
        let (_browser, gateway, _tab) = setup(MockBrowser::new(), "https://claude.ai/new").await;
        let err = gateway
            .send_to_tab(&TabId::from_raw("closed"), &ExecutorRequest::CheckLogin)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tab not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_reply_is_invalid_response() {
        let (_browser, gateway, tab) = setup(MockBrowser::new(), "https://claude.ai/new").await;
        let err = gateway
            .request::<Vec<String>>(&tab, &ExecutorRequest::CheckLogin)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::InvalidResponse(_)));
    }
}
