//! Progress model: build phases, marker rules, and the inference engine
//! that turns free-form compiler output into dual progress bars.

mod engine;
mod markers;

pub use engine::{EngineTuning, ProgressEngine, ProgressUpdate};
pub use markers::{MARKER_RULES, MarkerRule, match_marker};

/// Coarse stage of the compiler's known lifecycle.
///
/// Each phase owns a fixed slice of the overall progress bar. Transitions
/// are logically forward, but noisy logs can match markers out of order;
/// the engine tolerates that by never letting the overall percentage
/// regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialization,
    Setup,
    Compiling,
    Packaging,
    Finalizing,
}

impl Phase {
    /// Lower and upper bound of this phase's contribution to the overall
    /// progress percentage.
    pub fn bounds(self) -> (u8, u8) {
        match self {
            Phase::Initialization => (0, 10),
            Phase::Setup => (10, 20),
            Phase::Compiling => (20, 70),
            Phase::Packaging => (70, 90),
            Phase::Finalizing => (90, 100),
        }
    }

    /// Status line shown while this phase is active.
    pub fn message(self) -> &'static str {
        match self {
            Phase::Initialization => "Initializing build process...",
            Phase::Setup => "Setting up compiler environment...",
            Phase::Compiling => "Compiling application...",
            Phase::Packaging => "Packaging executable...",
            Phase::Finalizing => "Finalizing build...",
        }
    }
}

/// Point-in-time view of both progress bars.
///
/// `overall_percent` is non-decreasing for the life of one child;
/// `task_percent` resets to 0 on each phase change.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub overall_percent: u8,
    pub overall_message: String,
    pub task_percent: u8,
    pub task_message: String,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            overall_percent: 0,
            overall_message: "Starting...".to_string(),
            task_percent: 0,
            task_message: "Waiting for Nuitka output...".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_bounds_tile_the_full_range() {
        let phases = [
            Phase::Initialization,
            Phase::Setup,
            Phase::Compiling,
            Phase::Packaging,
            Phase::Finalizing,
        ];
        let mut expected_start = 0;
        for phase in phases {
            let (start, end) = phase.bounds();
            assert_eq!(start, expected_start, "{phase:?} starts where previous ended");
            assert!(end > start);
            expected_start = end;
        }
        assert_eq!(expected_start, 100);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let snap = ProgressSnapshot::default();
        assert_eq!(snap.overall_percent, 0);
        assert_eq!(snap.task_percent, 0);
        assert!(snap.overall_message.contains("Starting"));
        assert!(snap.task_message.contains("Waiting"));
    }
}
