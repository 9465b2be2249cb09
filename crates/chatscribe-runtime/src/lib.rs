//! Chatscribe runtime: the streaming extraction engine.
//!
//! A [`FleetOrchestrator`] runs one [`TargetProcessor`] per target
//! concurrently. Each processor drains a cancellable record stream built on
//! [`RecordSource`]: the live chat ([`ChatSource`]) or a one-shot viewer
//! snapshot ([`ViewerSnapshotSource`]). Page navigations from all targets
//! share one [`RequestLimiter`].

pub mod chat;
pub mod limiter;
pub mod orchestrator;
pub mod processor;
pub mod signals;
pub mod stream;
pub mod types;
pub mod viewers;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::ChatSource;
pub use limiter::{LimiterPermit, RequestLimiter};
pub use orchestrator::{run_fleet, FleetOrchestrator};
pub use processor::{PersistRecord, TargetProcessor};
pub use stream::{record_stream, RecordSource, RecordStream};
pub use types::*;
pub use viewers::ViewerSnapshotSource;
