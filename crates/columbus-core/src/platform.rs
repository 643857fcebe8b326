//! The catalogue of conversational destinations a scan drives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One destination. Declaration order is the fixed processing order, and
/// `Ord` follows it so ordered maps iterate destinations in that order.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "chatgpt")]
    ChatGpt,
    Claude,
    Gemini,
    Perplexity,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::ChatGpt,
        Platform::Claude,
        Platform::Gemini,
        Platform::Perplexity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Perplexity => "perplexity",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
            Self::Perplexity => "Perplexity",
        }
    }

    /// Homepage used for the login check.
    pub fn home_url(self) -> &'static str {
        match self {
            Self::ChatGpt => "https://chatgpt.com",
            Self::Claude => "https://claude.ai",
            Self::Gemini => "https://gemini.google.com",
            Self::Perplexity => "https://www.perplexity.ai",
        }
    }

    /// URL that always opens a fresh conversation.
    pub fn new_chat_url(self) -> &'static str {
        match self {
            Self::ChatGpt => "https://chatgpt.com/",
            Self::Claude => "https://claude.ai/new",
            Self::Gemini => "https://gemini.google.com/app",
            Self::Perplexity => "https://www.perplexity.ai/",
        }
    }

    /// File name of the executor script for this destination.
    pub fn executor_script(self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt.js",
            Self::Claude => "claude.js",
            Self::Gemini => "gemini.js",
            Self::Perplexity => "perplexity.js",
        }
    }

    fn hostnames(self) -> &'static [&'static str] {
        match self {
            Self::ChatGpt => &["chatgpt.com", "chat.openai.com"],
            Self::Claude => &["claude.ai"],
            Self::Gemini => &["gemini.google.com"],
            Self::Perplexity => &["perplexity.ai"],
        }
    }

    /// Resolve the destination that owns `hostname` (subdomains included).
    pub fn from_hostname(hostname: &str) -> Option<Self> {
        let hostname = hostname.to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| {
            p.hostnames()
                .iter()
                .any(|h| hostname == *h || hostname.ends_with(&format!(".{h}")))
        })
    }

    /// Resolve the destination that owns a full URL.
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('@')
            .next()
            .unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default();
        Self::from_hostname(host)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}
