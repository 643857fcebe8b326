//! # columbus-engine
//!
//! The scan orchestrator and the controllers it drives:
//!
//! - [`orchestrator::ScanOrchestrator`] owns the single session slot and the
//!   phase driver task.
//! - [`window::WindowController`] wraps host window/tab calls in bounded,
//!   tag-matched retries.
//! - [`messaging::MessagingGateway`] sends executor requests with re-attach.
//! - [`progress`] and [`stats`] derive broadcast snapshots from session state.

pub mod config;
pub mod error;
pub mod keepalive;
pub mod messaging;
pub mod mock;
pub mod orchestrator;
mod phases;
pub mod progress;
pub mod queue;
pub mod session;
pub mod stats;
pub mod window;

pub use config::{RetryPolicy, ScanConfig};
pub use error::ScanError;
pub use orchestrator::{ScanOrchestrator, ScanServices, StartOptions, StartedScan};
