//! Sandbox client implementations.
//!
//! This module contains implementations of the `SandboxApi` trait.
//!
//! ## Available Backends
//!
//! - [`mock`] - A scripted sandbox for testing
//! - [`cuckoo`] - Cuckoo Sandbox REST API (requires `cuckoo` feature)
//!
//! ## Implementing a Custom Backend
//!
//! Any sandbox that can look samples up by SHA-256, accept uploads and
//! report a numeric score can be plugged in by implementing `SandboxApi`;
//! see the trait documentation for the contract on `None` versus
//! `MalformedResponse`.

pub mod mock;

#[cfg(feature = "cuckoo")]
pub mod cuckoo;

// Re-exports
pub use mock::{MockReply, MockSandbox};

#[cfg(feature = "cuckoo")]
pub use cuckoo::{CuckooClient, CuckooConfig};
