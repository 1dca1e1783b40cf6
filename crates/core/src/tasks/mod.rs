//! Long-lived worker threads.
//!
//! Every seed head worker runs the same cycle (build a head, publish it,
//! unfold, hold, fold, rest, unpublish) and differs only in how it derives
//! the next cycle's parameters, which is what [`TaskBehavior`] selects.

use std::sync::Arc;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::{
    config::TaskConfig,
    context::{Outcome, SimulationContext},
    random::SimRng,
    render::Drawable,
    seedhead::{Direction, SeedHead},
    starfield::StarFieldTask,
    Result, SeedHeadSpec, SeedSize, TaskId,
};

/// A unit of work that owns one thread for the lifetime of the simulation.
pub trait WorkerTask: Send {
    fn id(&self) -> TaskId;

    /// Thread name.
    fn name(&self) -> String;

    /// Runs until shutdown. Must return promptly once
    /// [`SimulationContext::is_running`] turns false.
    fn run(self: Box<Self>, ctx: Arc<SimulationContext>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskBehavior {
    /// Same head every cycle; unfolds forward, folds back in reverse.
    Fixed,
    /// Fixed center, new colour, motion, size and shape every cycle.
    Mutable,
    /// Like `Mutable`, and also wanders around the viewport with a varying
    /// seed count and speed.
    Roaming,
}

/// Everything one cycle of a seed head task needs, derived up front.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclePlan {
    pub spec: SeedHeadSpec,
    pub unfold: Direction,
    pub unfold_speed: f64,
    /// Seconds to keep the unfolded head on screen before folding.
    pub hold: f64,
    pub fold: Direction,
    pub fold_speed: f64,
    /// Seconds to rest after folding.
    pub rest: f64,
    /// Whether to yield to the sequencer between folding and resting.
    pub checkpoint_before_rest: bool,
}

pub struct SeedHeadTask {
    id: TaskId,
    behavior: TaskBehavior,
    delay: f64,
    base: SeedHeadSpec,
    phi: f64,
    rng: SimRng,
    cycles: u64,
}

impl SeedHeadTask {
    pub fn new(config: &TaskConfig, rng: SimRng) -> Self {
        Self {
            id: config.id,
            behavior: config.behavior,
            delay: config.delay,
            phi: config.spec.phi,
            base: config.spec.clone(),
            rng,
            cycles: 0,
        }
    }

    pub fn behavior(&self) -> TaskBehavior {
        self.behavior
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Derives the next cycle's parameters. The configured head is never
    /// touched; each cycle gets a fresh value.
    pub fn plan_cycle(&mut self, ctx: &SimulationContext) -> CyclePlan {
        let frame_time = ctx.frame_time();
        let rng = &mut self.rng;
        let mut spec = self.base.clone();
        spec.phi = self.phi;

        match self.behavior {
            TaskBehavior::Fixed => CyclePlan {
                unfold: Direction::Forward,
                unfold_speed: spec.speed,
                hold: rng.int_range(self.delay as i64, 6) as f64,
                fold: Direction::Reverse,
                fold_speed: spec.speed * 2.0,
                rest: rng.unit() * frame_time * self.delay * 600.0,
                checkpoint_before_rest: false,
                spec,
            },
            TaskBehavior::Mutable => {
                spec.color = rng.choose_or(ctx.palette(), spec.color);
                spec.motion = rng.choose_or(&[true, false, true], true);
                if spec.size == SeedSize::Random {
                    spec.size = SeedSize::Fixed(rng.int_range(1, 4) as f64);
                }
                let fold = Direction::from_forward(rng.choose_or(&[true, false, true], true));
                self.phi = rng.choose_or(&ctx.config().shape_ratios, self.phi);
                CyclePlan {
                    unfold: Direction::Forward,
                    unfold_speed: spec.speed,
                    hold: 0.0,
                    fold,
                    fold_speed: spec.speed,
                    rest: rng.unit() * frame_time * self.delay * 100.0,
                    checkpoint_before_rest: true,
                    spec,
                }
            }
            TaskBehavior::Roaming => {
                let viewport = ctx.viewport();
                let reach_x = (f64::from(viewport.width) / 2.0 - 100.0).max(0.0) as i64;
                let reach_y = (f64::from(viewport.height) / 2.0 - 80.0).max(0.0) as i64;

                spec.seed_count = rng.int_range(20, self.base.seed_count as i64) as usize;
                spec.center = self.base.center
                    + DVec2::new(
                        rng.int_range(-reach_x, reach_x) as f64,
                        rng.int_range(-reach_y, reach_y) as f64,
                    );
                if spec.size == SeedSize::Random {
                    spec.size = SeedSize::Fixed(rng.int_range(1, 2) as f64);
                }
                let top = ((self.base.speed * 100.0).floor() as i64).saturating_add(10);
                let mut jittered = || rng.int_range(top.saturating_sub(5), top) as f64 / 100.0;
                let unfold_speed = jittered();
                let fold_speed = jittered();

                spec.color = rng.choose_or(ctx.palette(), spec.color);
                spec.motion = rng.choose_or(&[true, false, true], true);
                let unfold = Direction::from_forward(rng.choose_or(&[true, false, true, true], true));
                let fold = Direction::from_forward(rng.choose_or(&[true, false, true], true));
                self.phi = rng.choose_or(&ctx.config().shape_ratios, self.phi);
                CyclePlan {
                    unfold,
                    unfold_speed,
                    hold: 0.0,
                    fold,
                    fold_speed,
                    rest: rng.unit() * frame_time * self.delay * 100.0,
                    checkpoint_before_rest: true,
                    spec,
                }
            }
        }
    }

    /// One full publish/unfold/fold/unpublish cycle.
    fn cycle(&mut self, ctx: &SimulationContext) -> Result<Outcome> {
        let plan = self.plan_cycle(ctx);
        let flight_period = ctx.config().timing.flight_period_const();
        let head = Arc::new(SeedHead::new(plan.spec, flight_period, &mut self.rng, ctx.now()));
        tracing::debug!(
            task = self.id,
            cycle = self.cycles,
            seeds = head.seed_count()?,
            phi = head.spec().phi,
            "seed head cycle started"
        );

        let drawable: Arc<dyn Drawable> = head.clone();
        ctx.registry().publish(self.id, Some(drawable))?;

        if head.unfold(ctx, plan.unfold, plan.unfold_speed)?.is_interrupted()
            || !ctx.sleep(plan.hold)
            || head.fold(ctx, plan.fold, plan.fold_speed)?.is_interrupted()
        {
            return Ok(Outcome::Interrupted);
        }
        if plan.checkpoint_before_rest
            && ctx.sequencer().checkpoint(self.id)?.is_interrupted()
        {
            return Ok(Outcome::Interrupted);
        }
        if !ctx.sleep(plan.rest) {
            return Ok(Outcome::Interrupted);
        }

        ctx.registry().unpublish(self.id)?;
        self.cycles += 1;
        ctx.sequencer().checkpoint(self.id)
    }
}

impl WorkerTask for SeedHeadTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> String {
        format!("seedhead-{}", self.id)
    }

    fn run(mut self: Box<Self>, ctx: Arc<SimulationContext>) -> Result<()> {
        tracing::debug!(task = self.id, behavior = ?self.behavior, "seed head task started");
        if ctx.sleep(self.delay) {
            while ctx.is_running() {
                if self.cycle(&ctx)?.is_interrupted() {
                    break;
                }
            }
        }

        // An interrupted head is simply dropped.
        ctx.registry().unpublish(self.id)?;
        tracing::debug!(task = self.id, cycles = self.cycles, "seed head task stopped");
        Ok(())
    }
}

/// Builds every worker the configuration asks for. Seed head tasks must
/// already be registered with the sequencer before they are run.
pub fn from_config(ctx: &SimulationContext) -> Vec<Box<dyn WorkerTask>> {
    let config = ctx.config();
    let mut workers: Vec<Box<dyn WorkerTask>> = config
        .tasks
        .iter()
        .map(|task| {
            let rng = ctx.rng_for(u64::from(task.id));
            Box::new(SeedHeadTask::new(task, rng)) as Box<dyn WorkerTask>
        })
        .collect();
    if config.starfield.enabled {
        workers.push(Box::new(StarFieldTask::new(ctx)));
    }
    workers
}
