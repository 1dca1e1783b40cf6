use std::time::Instant;

use glam::DVec2;

use crate::{
    palette::Color,
    render::{Frame, Handle},
};

/// Lifecycle of a single seed. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrawState {
    Undrawn = 0,
    PendingDraw = 1,
    /// On screen and following its flight path.
    Drawn = 2,
    PendingUndraw = 3,
    Retired = 4,
}

/// What a fold request did to a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldStep {
    /// Never drawn, retired on the spot.
    Skipped,
    /// Queued for an undraw on the next frame.
    Queued,
    /// Already on its way out.
    Unchanged,
}

/// Starting virtual radius of a seed's flight.
const INITIAL_GROWTH: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct Seed {
    position: DVec2,
    delta: DVec2,
    radial_growth: f64,
    size: f64,
    color: Color,
    state: DrawState,
    flight_started: Instant,
    handle: Option<Handle>,
}

impl Seed {
    pub fn new(position: DVec2, size: f64, color: Color, now: Instant) -> Self {
        Self {
            position,
            delta: DVec2::ZERO,
            radial_growth: INITIAL_GROWTH,
            size,
            color,
            state: DrawState::Undrawn,
            flight_started: now,
            handle: None,
        }
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    pub fn position(&self) -> DVec2 {
        self.position
    }

    pub fn radial_growth(&self) -> f64 {
        self.radial_growth
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// `Undrawn -> PendingDraw`. Returns whether the seed was flipped.
    pub fn reveal(&mut self) -> bool {
        if self.state == DrawState::Undrawn {
            self.state = DrawState::PendingDraw;
            true
        } else {
            false
        }
    }

    pub fn request_fold(&mut self) -> FoldStep {
        match self.state {
            DrawState::Undrawn => {
                self.state = DrawState::Retired;
                FoldStep::Skipped
            }
            DrawState::PendingDraw | DrawState::Drawn => {
                self.state = DrawState::PendingUndraw;
                FoldStep::Queued
            }
            DrawState::PendingUndraw | DrawState::Retired => FoldStep::Unchanged,
        }
    }

    /// Called when the seed has flown out of the viewport.
    pub fn leave_viewport(&mut self) {
        if matches!(self.state, DrawState::PendingDraw | DrawState::Drawn) {
            self.state = DrawState::PendingUndraw;
        }
    }

    pub fn restart_flight(&mut self, now: Instant) {
        self.flight_started = now;
    }

    /// Pushes the seed away from `center`. The push grows with the time
    /// flown since the last step, so motion accelerates as the seed travels.
    pub fn fly(&mut self, now: Instant, flight_speed: f64, center: DVec2) {
        let period = now
            .saturating_duration_since(self.flight_started)
            .as_secs_f64()
            * flight_speed;
        self.flight_started = now;

        let growth = self.radial_growth * period;
        self.radial_growth += period;
        self.delta = (self.position - center) * growth;
        self.position += self.delta;
    }

    /// Issues whatever primitive call the current state asks for and
    /// advances the state. Returns whether the state changed.
    pub fn render(&mut self, frame: &mut Frame<'_>) -> bool {
        match self.state {
            DrawState::PendingDraw => {
                self.handle = Some(frame.draw_circle(self.position, self.size, self.color));
                self.delta = DVec2::ZERO;
                self.state = DrawState::Drawn;
                true
            }
            DrawState::Drawn => {
                if let Some(handle) = self.handle {
                    if self.delta != DVec2::ZERO {
                        frame.move_by(handle, self.delta);
                        self.delta = DVec2::ZERO;
                    }
                }
                false
            }
            DrawState::PendingUndraw => {
                if let Some(handle) = self.handle.take() {
                    frame.undraw(handle);
                }
                self.state = DrawState::Retired;
                true
            }
            DrawState::Undrawn | DrawState::Retired => false,
        }
    }
}
