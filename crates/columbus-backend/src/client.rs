use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use columbus_core::backend::{PromptBundle, PromptSource, ResultSink, ScanResultPayload};
use columbus_core::errors::BackendError;
use columbus_core::ids::{ProductId, ScanSessionId};

const PROMPTS_PATH: &str = "/functions/v1/extension-prompts";
const SCAN_RESULTS_PATH: &str = "/functions/v1/extension-scan-results";
const FINALIZE_PATH: &str = "/functions/v1/extension-finalize-scan";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub anon_key: String,
    pub access_token: Option<SecretString>,
    pub request_timeout: Duration,
}

pub struct BackendClient {
    client: Client,
    base_url: String,
    anon_key: String,
    token: Option<SecretString>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest<'a> {
    scan_session_id: &'a ScanSessionId,
    product_id: &'a ProductId,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            token: config.access_token,
        })
    }

    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let Some(token) = self.token.as_ref() else {
            return Err(BackendError::NotAuthenticated);
        };

        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "backend request");

        let mut req = self
            .client
            .request(method, &url)
            .bearer_auth(token.expose_secret())
            .header("apikey", &self.anon_key)
            .header("accept", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &text),
            });
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Prefer the backend's `{"error": "..."}` field over the raw body.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("API error: {status}"))
}

#[async_trait]
impl PromptSource for BackendClient {
    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn fetch_prompts(&self, product_id: &ProductId) -> Result<PromptBundle, BackendError> {
        self.request::<(), _>(Method::GET, PROMPTS_PATH, &[("productId", product_id.as_str())], None)
            .await
    }
}

#[async_trait]
impl ResultSink for BackendClient {
    #[instrument(skip(self, payload), fields(platform = %payload.platform, prompt_id = %payload.prompt_id))]
    async fn submit_result(&self, payload: &ScanResultPayload) -> Result<(), BackendError> {
        let _: serde_json::Value = self
            .request(Method::POST, SCAN_RESULTS_PATH, &[], Some(payload))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(scan_session_id = %scan_session_id))]
    async fn finalize(&self, scan_session_id: &ScanSessionId, product_id: &ProductId) -> Result<(), BackendError> {
        let body = FinalizeRequest {
            scan_session_id,
            product_id,
        };
        let _: serde_json::Value = self.request(Method::POST, FINALIZE_PATH, &[], Some(&body)).await?;
        Ok(())
    }
}
