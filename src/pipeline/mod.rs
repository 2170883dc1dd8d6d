//! Processing Pipeline Module
//!
//! ```text
//! SnapshotSource ──▶ EventDetector::analyze ──▶ BroadcastService ──▶ listeners
//!  (stdin/replay/       (dedup, compound)        (queue, history,      + HTTP poll
//!   synthetic)                                    TTL timers)
//! ```

pub mod processing_loop;
pub mod source;

pub use processing_loop::{PipelineStats, ProcessingLoop};
pub use source::{
    JsonLinesSource, ReplaySource, SnapshotEvent, SnapshotSource, SourceError, StdinSource,
    SyntheticSource,
};
