//! Seed heads: phyllotaxis spirals of seeds that unfold into view seed by
//! seed, optionally fly apart, and fold away again.
//!
//! A [`SeedHead`] is shared between its owning worker, which flips seed
//! states and waits for them to settle, and the main loop, which performs the
//! actual draw calls through the [`Drawable`] implementation.

use std::{
    sync::{Condvar, Mutex, MutexGuard},
    time::Instant,
};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::{
    context::{Outcome, SimulationContext},
    palette::Color,
    random::SimRng,
    render::{Drawable, Frame},
    timeline::seconds,
    Result, SeedheadError,
};

pub mod phyllotaxis;
mod seed;

pub use seed::{DrawState, FoldStep, Seed};

/// Seed radius, either fixed or rolled per cycle by the owning task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SeedSize {
    Fixed(f64),
    Random,
}

/// Everything needed to build one seed head. Tasks derive a fresh value each
/// cycle instead of mutating a shared one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedHeadSpec {
    pub center: DVec2,
    pub seed_count: usize,
    pub size: SeedSize,
    pub color: Color,
    /// Frames slept between successive seeds while unfolding or folding.
    pub speed: f64,
    pub scale: f64,
    /// Angular ratio of the spiral.
    pub phi: f64,
    /// Whether drawn seeds fly away from the field center.
    pub motion: bool,
}

/// Order in which seeds are visited while unfolding or folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Generation order, center outward.
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    fn indices(self, len: usize) -> Box<dyn Iterator<Item = usize>> {
        match self {
            Direction::Forward => Box::new(0..len),
            Direction::Reverse => Box::new((0..len).rev()),
        }
    }
}

#[derive(Debug)]
pub struct SeedHead {
    spec: SeedHeadSpec,
    flight_speed: f64,
    /// When set, undrawn seeds keep flying unseen instead of waiting for
    /// their reveal, which visibly distorts the unfolding shape.
    mutate: bool,
    seeds: Mutex<Vec<Seed>>,
    settled: Condvar,
}

impl SeedHead {
    /// Builds the seeds for `spec`. `flight_period` bounds the randomly
    /// drawn flight speed.
    pub fn new(spec: SeedHeadSpec, flight_period: f64, rng: &mut SimRng, now: Instant) -> Self {
        let size = match spec.size {
            SeedSize::Fixed(size) => size,
            SeedSize::Random => rng.int_range(1, 4) as f64,
        };
        let seeds = phyllotaxis::spiral(spec.seed_count, spec.scale, spec.phi, spec.center)
            .into_iter()
            .map(|position| Seed::new(position, size, spec.color, now))
            .collect();

        Self {
            flight_speed: rng.unit() * flight_period,
            mutate: rng.unit() < 0.5,
            seeds: Mutex::new(seeds),
            settled: Condvar::new(),
            spec,
        }
    }

    pub fn spec(&self) -> &SeedHeadSpec {
        &self.spec
    }

    pub fn flight_speed(&self) -> f64 {
        self.flight_speed
    }

    pub fn mutates(&self) -> bool {
        self.mutate
    }

    pub fn seed_count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn states(&self) -> Result<Vec<DrawState>> {
        Ok(self.lock()?.iter().map(Seed::state).collect())
    }

    /// No seed is still waiting for its first draw.
    pub fn is_unfolded(&self) -> Result<bool> {
        Ok(all_drawn(&self.lock()?))
    }

    pub fn is_folded(&self) -> Result<bool> {
        Ok(all_retired(&self.lock()?))
    }

    /// Reveals the seeds one at a time, `speed` frames apart, then waits
    /// until the main loop has drawn every one of them.
    pub fn unfold(
        &self,
        ctx: &SimulationContext,
        direction: Direction,
        speed: f64,
    ) -> Result<Outcome> {
        let stagger = ctx.frame_time() * speed;
        let len = self.seed_count()?;
        for index in direction.indices(len) {
            let revealed = self.lock()?[index].reveal();
            if revealed && !ctx.sleep(stagger) {
                return Ok(Outcome::Interrupted);
            }
            if !ctx.is_running() {
                return Ok(Outcome::Interrupted);
            }
        }
        self.wait_until(ctx, all_drawn)
    }

    /// Retires the seeds one at a time. Seeds that never made it on screen
    /// are dropped without a pause; visible ones are queued for undraw
    /// `speed` frames apart. Waits until every seed is retired.
    pub fn fold(&self, ctx: &SimulationContext, direction: Direction, speed: f64) -> Result<Outcome> {
        let stagger = ctx.frame_time() * speed;
        let len = self.seed_count()?;
        for index in direction.indices(len) {
            let step = self.lock()?[index].request_fold();
            if step == FoldStep::Queued && !ctx.sleep(stagger) {
                return Ok(Outcome::Interrupted);
            }
            if !ctx.is_running() {
                return Ok(Outcome::Interrupted);
            }
        }
        self.wait_until(ctx, all_retired)
    }

    fn wait_until(&self, ctx: &SimulationContext, done: fn(&[Seed]) -> bool) -> Result<Outcome> {
        let poll = seconds(ctx.frame_time());
        let mut seeds = self.lock()?;
        loop {
            if done(&seeds) {
                return Ok(Outcome::Completed);
            }
            if !ctx.is_running() {
                return Ok(Outcome::Interrupted);
            }
            seeds = self
                .settled
                .wait_timeout(seeds, poll)
                .map_err(|_| SeedheadError::msg("seed head has been poisoned"))?
                .0;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Seed>>> {
        self.seeds
            .lock()
            .map_err(|_| SeedheadError::msg("seed head has been poisoned"))
    }
}

fn all_drawn(seeds: &[Seed]) -> bool {
    seeds.iter().all(|seed| seed.state() != DrawState::PendingDraw)
}

fn all_retired(seeds: &[Seed]) -> bool {
    seeds.iter().all(|seed| seed.state() == DrawState::Retired)
}

impl Drawable for SeedHead {
    fn draw(&self, frame: &mut Frame<'_>) -> Result<()> {
        let mut seeds = self.lock()?;
        let mut changed = false;
        for seed in seeds.iter_mut() {
            if self.spec.motion && seed.state() != DrawState::Retired {
                if seed.state() == DrawState::Undrawn && !self.mutate {
                    seed.restart_flight(frame.now);
                }
                seed.fly(frame.now, self.flight_speed, frame.center);
            }
            if !frame.viewport.contains(seed.position()) {
                seed.leave_viewport();
            }
            changed |= seed.render(frame);
        }
        drop(seeds);
        if changed {
            self.settled.notify_all();
        }
        Ok(())
    }
}
