//! Client for the backend edge functions that hand out prompts and receive
//! scan results.

mod client;

pub use client::{BackendClient, BackendConfig};
