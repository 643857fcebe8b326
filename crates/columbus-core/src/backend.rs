//! Prompt source and result sink contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::executor::{Citation, CollectedResponse, Sentiment};
use crate::ids::{ProductId, PromptId, ScanSessionId};
use crate::platform::Platform;
use crate::scan::WorkItem;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl Product {
    /// Brand name handed to collection, falling back to the product name.
    pub fn brand_or_name(&self) -> &str {
        if self.brand.is_empty() {
            &self.name
        } else {
            &self.brand
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Everything a scan needs to know about a product up front.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBundle {
    pub product: Product,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub competitors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub model_used: Option<String>,
    pub had_web_search: bool,
    pub response_time_ms: Option<u64>,
}

/// One collected answer as posted to the result sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultPayload {
    pub product_id: ProductId,
    pub scan_session_id: ScanSessionId,
    pub platform: Platform,
    pub prompt_id: PromptId,
    pub prompt_text: String,
    pub response_text: String,
    pub brand_mentioned: bool,
    pub citation_present: bool,
    pub position: Option<i32>,
    pub sentiment: Sentiment,
    pub competitor_mentions: Vec<String>,
    pub citations: Vec<Citation>,
    pub metadata: ResultMetadata,
}

impl ScanResultPayload {
    pub fn new(
        product_id: &ProductId,
        scan_session_id: &ScanSessionId,
        item: &WorkItem,
        response: &CollectedResponse,
    ) -> Self {
        Self {
            product_id: product_id.clone(),
            scan_session_id: scan_session_id.clone(),
            platform: item.platform,
            prompt_id: item.prompt_id.clone(),
            prompt_text: item.prompt_text.clone(),
            response_text: response.response_text.clone(),
            brand_mentioned: response.brand_mentioned,
            citation_present: response.citation_present(),
            position: response.position,
            sentiment: response.sentiment,
            competitor_mentions: response.competitor_mentions.clone(),
            citations: response.citations.clone(),
            metadata: ResultMetadata {
                model_used: response.model_used.clone(),
                had_web_search: response.had_web_search,
                response_time_ms: response.response_time_ms,
            },
        }
    }
}

#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn fetch_prompts(&self, product_id: &ProductId) -> Result<PromptBundle, BackendError>;
}

/// Durable store for collected answers. Calls are best-effort from the
/// orchestrator's point of view.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn submit_result(&self, payload: &ScanResultPayload) -> Result<(), BackendError>;
    async fn finalize(&self, scan_session_id: &ScanSessionId, product_id: &ProductId) -> Result<(), BackendError>;
}
