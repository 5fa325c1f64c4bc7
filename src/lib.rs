//! # Sandbridge
//!
//! Feeds files extracted by a network security monitor into a Cuckoo
//! malware sandbox and reports a risk score for each one.
//!
//! ## Overview
//!
//! A network monitor (Zeek/Bro) drops every file it carves out of traffic
//! into a directory. Sandbridge watches that directory and, once per cycle:
//!
//! - Lists every regular file, skipping disallowed extensions
//! - Fingerprints each file with SHA-256
//! - Reuses the sandbox's earlier task for known content, or submits it
//! - Waits for the task to leave the queue and for its report to carry a score
//! - Emits one structured score line per file, `0.0` if no score arrived in time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sandbridge::backends::{CuckooClient, CuckooConfig};
//! use sandbridge::pipeline::{PollerConfig, ScanLoop, ScanLoopConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CuckooClient::new(CuckooConfig::new("http://10.0.0.5:8090", "token"))?;
//!     let scan_loop = ScanLoop::new(
//!         Arc::new(client),
//!         ScanLoopConfig::new("/nsm/bro/extracted"),
//!         PollerConfig::default(),
//!     );
//!
//!     let summary = scan_loop.run_cycle().await;
//!     println!("scored {} files", summary.scored);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes the Cuckoo client
//! - `cuckoo` - Cuckoo REST API client (reqwest)
//!
//! ## Architecture
//!
//! - **Core**: Fingerprints, task ids, scores, errors and the sandbox trait
//! - **Backends**: The Cuckoo client and a scripted mock
//! - **Pipeline**: Dedup, polling and the scan loop
//! - **Audit**: Structured per-file records on a dedicated tracing target
//! - **Config**: Environment-driven settings
//! - **Readiness**: Service-manager notifications

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod readiness;

// Re-export commonly used types at the crate root
pub use crate::core::{
    FileHasher, FileRef, Fingerprint, PollOutcome, PollPhase, SandboxApi, SandboxError,
    SandboxResult, Score, ScoreReport, TaskId, TaskStatus,
};

pub use crate::config::Config;
pub use crate::pipeline::{
    CycleSummary, DedupResolver, Poller, PollerConfig, Resolution, ScanLoop, ScanLoopConfig,
};

/// Prelude module for convenient imports.
///
/// ```rust
/// use sandbridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::core::{
        ArcSandbox, FileHasher, FileRef, Fingerprint, PollOutcome, PollPhase, SandboxApi,
        SandboxError, SandboxResult, Score, ScoreReport, TaskId, TaskStatus,
    };
    pub use crate::pipeline::{
        CycleSummary, DedupResolver, Poller, PollerConfig, Resolution, ScanLoop, ScanLoopConfig,
    };
}
