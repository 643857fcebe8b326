//! Drives a Chrome instance over the DevTools Protocol and exposes it as a
//! [`BrowserHost`](columbus_core::host::BrowserHost) and
//! [`ExecutorChannel`](columbus_core::host::ExecutorChannel).

mod browser;
pub mod chrome;
mod classify;
mod connection;

pub use browser::{CdpBrowser, LaunchOptions};
pub use classify::{classify_host_error, Subject};
pub use connection::{CdpConnection, CdpError, CdpEvent};
