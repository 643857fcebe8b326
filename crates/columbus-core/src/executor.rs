//! Wire contract between the orchestrator and the per-destination executor
//! running inside a tab.

use serde::{Deserialize, Serialize};

/// Requests sent to an executor. Serialized as `{"type": "...", ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorRequest {
    CheckLogin,
    SubmitPrompt {
        prompt: String,
    },
    CollectResponse {
        brand: String,
        competitors: Vec<String>,
    },
}

impl ExecutorRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckLogin => "CHECK_LOGIN",
            Self::SubmitPrompt { .. } => "SUBMIT_PROMPT",
            Self::CollectResponse { .. } => "COLLECT_RESPONSE",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatus {
    #[serde(default)]
    pub logged_in: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// Structured answer extracted by `COLLECT_RESPONSE`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectedResponse {
    pub success: bool,
    pub response_text: String,
    pub brand_mentioned: bool,
    pub citations: Vec<Citation>,
    pub competitor_mentions: Vec<String>,
    pub position: Option<i32>,
    pub sentiment: Sentiment,
    pub model_used: Option<String>,
    pub had_web_search: bool,
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectedResponse {
    pub fn citation_present(&self) -> bool {
        !self.citations.is_empty()
    }
}
