//! The scoring pipeline.
//!
//! - [`dedup`] - maps content fingerprints to sandbox tasks
//! - [`poller`] - waits for a task's score
//! - [`scan_loop`] - walks the watched directory and drives the other two

pub mod dedup;
pub mod poller;
pub mod scan_loop;

pub use dedup::{DedupResolver, Resolution};
pub use poller::{Poller, PollerConfig};
pub use scan_loop::{CycleSummary, ScanLoop, ScanLoopConfig};
