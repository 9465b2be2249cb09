//! Runtime types.

use std::time::Duration;

use chatscribe_core::{Error, ScraperConfig, Target};

/// What each target's processor does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Follow the live chat until cancelled.
    Chat,
    /// Record one viewer snapshot, then finish.
    ViewerSnapshot,
}

/// Timing knobs of the record streams.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Cooperative pause between two stream iterations.
    pub yield_pause: Duration,
    /// Upper bound on waiting for the viewers panel to populate.
    pub viewer_settle: Duration,
    /// Sampling cadence while the viewers panel settles.
    pub poll_interval: Duration,
    /// Bound on waiting for the viewers control and panel to appear.
    pub viewer_ready_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            yield_pause: Duration::from_millis(10),
            viewer_settle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(250),
            viewer_ready_timeout: Duration::from_secs(30),
        }
    }
}

impl StreamSettings {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            yield_pause: config.yield_pause(),
            viewer_settle: config.viewer_settle(),
            poll_interval: config.poll_interval(),
            viewer_ready_timeout: config.viewer_ready_timeout(),
        }
    }
}

/// How one target's processing ended.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: Target,
    /// Records persisted, or the error that stopped the target.
    pub result: Result<usize, Error>,
}

/// Aggregate of all targets once every processor has settled.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl FleetReport {
    pub fn records(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Target, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.target, e)))
    }

    /// True when there was at least one target and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.result.is_err())
    }
}
