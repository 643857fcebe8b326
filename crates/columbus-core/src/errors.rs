use std::time::Duration;

use crate::ids::{TabId, WindowId};

/// Closed set of host browser failure categories.
///
/// Host adapters classify their native error text into one of these tags;
/// everything downstream matches on the tag.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BrowserError {
    // Transient: the user is interacting with the tab strip
    #[error("tabs cannot be edited right now: {0}")]
    TabEditingBlocked(String),
    // Transient: window is fullscreen and must be restored first
    #[error("window is fullscreen: {0}")]
    Fullscreen(String),

    #[error("tab not found: {0}")]
    TabNotFound(TabId),
    #[error("window not found: {0}")]
    WindowNotFound(WindowId),
    #[error("timed out after {timeout:?}: {context}")]
    Timeout { timeout: Duration, context: String },
    #[error("host error: {0}")]
    Host(String),
}

impl BrowserError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TabEditingBlocked(_) | Self::Fullscreen(_))
    }

    pub fn needs_fullscreen_exit(&self) -> bool {
        matches!(self, Self::Fullscreen(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::TabEditingBlocked(_) => "tab_editing_blocked",
            Self::Fullscreen(_) => "fullscreen",
            Self::TabNotFound(_) => "tab_not_found",
            Self::WindowNotFound(_) => "window_not_found",
            Self::Timeout { .. } => "timeout",
            Self::Host(_) => "host",
        }
    }
}

/// Failures talking to the executor capability inside a tab.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Nothing in the tab is listening (never attached, or unloaded).
    #[error("receiving end does not exist: {0}")]
    ReceiverMissing(String),
    #[error("channel disconnected: {0}")]
    Disconnected(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Outcome of the messaging gateway once its own retries are spent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    #[error("no response after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ChannelError },
    #[error("invalid executor response: {0}")]
    InvalidResponse(String),
}

/// Failures from the prompt source / result sink.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("network error: {0}")]
    Network(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BrowserError::TabEditingBlocked("dragging".into()).is_transient());
        assert!(BrowserError::Fullscreen("restore first".into()).is_transient());
        assert!(!BrowserError::Host("boom".into()).is_transient());
        assert!(!BrowserError::TabNotFound(TabId::from_raw("t")).is_transient());
        assert!(!BrowserError::WindowNotFound(WindowId(1)).is_transient());
    }

    #[test]
    fn only_fullscreen_needs_exit() {
        assert!(BrowserError::Fullscreen("x".into()).needs_fullscreen_exit());
        assert!(!BrowserError::TabEditingBlocked("x".into()).needs_fullscreen_exit());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(BrowserError::Fullscreen("x".into()).error_kind(), "fullscreen");
        assert_eq!(
            BrowserError::Timeout {
                timeout: Duration::from_secs(30),
                context: "tab load".into()
            }
            .error_kind(),
            "timeout"
        );
    }

    #[test]
    fn channel_error_wraps_browser_error() {
        let err: ChannelError = BrowserError::TabNotFound(TabId::from_raw("9")).into();
        assert_eq!(err.to_string(), "tab not found: 9");
    }

    #[test]
    fn messaging_error_display() {
        let err = MessagingError::Exhausted {
            attempts: 3,
            last: ChannelError::ReceiverMissing("tab 4".into()),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("tab 4"));
    }
}
