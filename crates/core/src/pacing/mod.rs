use std::time::Duration;

use crate::{config::PacingConfig, timeline::seconds};

/// Result of fitting one frame's drawing into the frame budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    OnTime { remaining: Duration },
    Overrun { by: Duration },
}

impl FrameOutcome {
    pub fn is_overrun(&self) -> bool {
        matches!(self, FrameOutcome::Overrun { .. })
    }
}

/// Integral controller for the lull period. Headroom in the frame budget
/// lets the lull period creep up (livelier star field); tight or overrun
/// frames bring it back down, never below the baseline.
#[derive(Debug, Clone)]
pub struct FramePacer {
    config: PacingConfig,
    budget: Duration,
}

impl FramePacer {
    pub fn new(config: PacingConfig, frame_time: f64) -> Self {
        Self {
            config,
            budget: seconds(frame_time),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Classifies a frame that took `draw` to draw and returns the adjusted
    /// lull period alongside it.
    pub fn settle(&self, draw: Duration, lull: f64) -> (FrameOutcome, f64) {
        let baseline = self.config.lull_baseline;
        let lull = lull.max(baseline);
        let ease = |lull: f64| {
            if lull > baseline {
                (lull - self.config.lull_decrement).max(baseline)
            } else {
                lull
            }
        };

        match self.budget.checked_sub(draw).filter(|left| !left.is_zero()) {
            Some(remaining) => {
                let slack = self.budget.mul_f64(self.config.slack_ratio.max(0.0));
                let lull = if draw <= slack {
                    lull + self.config.lull_increment
                } else {
                    ease(lull)
                };
                (FrameOutcome::OnTime { remaining }, lull)
            }
            None => (
                FrameOutcome::Overrun {
                    by: draw.saturating_sub(self.budget),
                },
                ease(lull),
            ),
        }
    }

    /// How long to sleep after a frame: the rest of the budget, or a short
    /// yield after an overrun.
    pub fn pause_after(&self, outcome: &FrameOutcome) -> Duration {
        match outcome {
            FrameOutcome::OnTime { remaining } => *remaining,
            FrameOutcome::Overrun { .. } => seconds(self.config.overrun_yield),
        }
    }

    /// Pause for a worker that spent `elapsed` of its own frame budget. Does
    /// not touch the lull period.
    pub fn worker_pause(&self, elapsed: Duration) -> Duration {
        match self.budget.checked_sub(elapsed).filter(|left| !left.is_zero()) {
            Some(remaining) => remaining,
            None => seconds(self.config.overrun_yield),
        }
    }
}
