//! Core types and traits for the sandbridge library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`types`] - `FileRef`, `Fingerprint`, `TaskId`, `TaskStatus`, `Score`
//! - [`traits`] - The `SandboxApi` trait
//! - [`error`] - Structured error types
//! - [`hasher`] - Streaming SHA-256 file fingerprints
//! - [`result`] - Poll outcomes and score reports

pub mod error;
pub mod hasher;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{SandboxError, SandboxResult};
pub use hasher::FileHasher;
pub use result::{PollOutcome, PollPhase, ScoreReport};
pub use traits::{ArcSandbox, SandboxApi};
pub use types::{FileRef, Fingerprint, Score, TaskId, TaskStatus};
