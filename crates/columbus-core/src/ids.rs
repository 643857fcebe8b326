use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::platform::Platform;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(ScanSessionId);
string_id!(WorkItemId);
string_id!(ProductId);
string_id!(PromptId);
string_id!(TabId);

impl ScanSessionId {
    /// Bare UUID: the backend stores scan sessions in a uuid column.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ScanSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkItemId {
    /// Stable id derived from the (destination, prompt, sample) triple.
    pub fn for_item(platform: Platform, prompt_id: &PromptId, sample_number: u32) -> Self {
        Self(format!("{}:{}:{}", platform.as_str(), prompt_id, sample_number))
    }
}

/// Browser window handle. Hosts hand out integer ids.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
