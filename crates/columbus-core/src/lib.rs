//! Shared vocabulary for the scan orchestrator: identifiers, destinations,
//! the in-memory scan model, the seams to the browser host, executors and
//! backend, and the events broadcast to listeners.

pub mod backend;
pub mod errors;
pub mod events;
pub mod executor;
pub mod host;
pub mod ids;
pub mod platform;
pub mod scan;
