use columbus_core::errors::{BackendError, BrowserError, MessagingError};
use columbus_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("A scan is already running")]
    AlreadyRunning,

    #[error("No prompts configured for this product")]
    NoPrompts,

    #[error("No platforms selected")]
    NoPlatforms,

    #[error("samplesPerPrompt must be between 1 and {max}, got {got}")]
    InvalidSamples { got: u32, max: u32 },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}
