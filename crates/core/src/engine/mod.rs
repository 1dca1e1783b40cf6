//! The draw thread and the lifecycle of the worker threads around it.
//!
//! [`MainLoop`] is the only place that talks to a [`Renderer`]; workers only
//! reach the screen through the draw registry.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    config::AppConfig,
    context::SimulationContext,
    pacing::{FrameOutcome, FramePacer},
    render::{Frame, Renderer, WindowId},
    tasks, Result, SeedheadError,
};

/// Totals reported when the main loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub overruns: u64,
    pub worst_overrun: Duration,
    pub final_lull: f64,
}

pub struct MainLoop<R: Renderer> {
    ctx: Arc<SimulationContext>,
    renderer: R,
    window: WindowId,
    pacer: FramePacer,
    summary: RunSummary,
}

impl<R: Renderer> MainLoop<R> {
    /// Opens the scene window on `renderer`.
    pub fn new(ctx: Arc<SimulationContext>, mut renderer: R) -> Result<Self> {
        let viewport = ctx.viewport();
        let window = renderer.create_window(&viewport.title, viewport.width, viewport.height)?;
        let pacer = FramePacer::new(ctx.config().pacing.clone(), ctx.frame_time());
        Ok(Self {
            summary: RunSummary {
                final_lull: ctx.lull_period(),
                ..RunSummary::default()
            },
            ctx,
            renderer,
            window,
            pacer,
        })
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Whether another frame should be drawn.
    pub fn is_open(&self) -> bool {
        self.ctx.is_running() && !self.renderer.is_closed(self.window)
    }

    /// Draws one frame, sleeps out the rest of its budget and advances the
    /// sequencer.
    pub fn tick(&mut self) -> Result<FrameOutcome> {
        let ctx = Arc::clone(&self.ctx);
        let drawables = ctx.registry().snapshot()?;

        let started = ctx.now();
        self.renderer.begin_frame(self.window);
        {
            let mut frame = Frame {
                renderer: &mut self.renderer,
                window: self.window,
                now: started,
                center: ctx.center(),
                viewport: ctx.viewport(),
            };
            for (_, drawable) in &drawables {
                drawable.draw(&mut frame)?;
            }
        }
        self.renderer.end_frame(self.window);
        let draw = ctx.now().saturating_duration_since(started);

        let (outcome, lull) = self.pacer.settle(draw, ctx.lull_period());
        ctx.set_lull_period(lull);
        self.record(&outcome, lull);
        ctx.sleep_for(self.pacer.pause_after(&outcome));

        ctx.set_center(self.renderer.pointer_position(self.window));
        if ctx.config().warp.enabled {
            ctx.sequencer().tick(ctx.now())?;
        }
        Ok(outcome)
    }

    /// Runs until the window closes, shutdown is requested, or `max_frames`
    /// frames have been drawn.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<RunSummary> {
        while self.is_open() && max_frames.map_or(true, |max| self.summary.frames < max) {
            self.tick()?;
        }
        tracing::info!(
            frames = self.summary.frames,
            overruns = self.summary.overruns,
            worst_overrun_ms = self.summary.worst_overrun.as_secs_f64() * 1000.0,
            "main loop stopped"
        );
        Ok(self.summary)
    }

    fn record(&mut self, outcome: &FrameOutcome, lull: f64) {
        self.summary.frames += 1;
        self.summary.final_lull = lull;
        match *outcome {
            FrameOutcome::OnTime { remaining } => {
                tracing::trace!(remaining_ms = remaining.as_secs_f64() * 1000.0, lull, "frame");
            }
            FrameOutcome::Overrun { by } => {
                self.summary.overruns += 1;
                self.summary.worst_overrun = self.summary.worst_overrun.max(by);
                let overrun_ms = by.as_secs_f64() * 1000.0;
                if by > self.pacer.budget() {
                    tracing::warn!(overrun_ms, lull, "frame overran its budget");
                } else {
                    tracing::debug!(overrun_ms, lull, "frame overran its budget");
                }
            }
        }
    }
}

/// Running worker threads and the context they share.
pub struct Simulation {
    ctx: Arc<SimulationContext>,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl Simulation {
    /// Validates `config`, registers every seed head task with the
    /// sequencer and starts one thread per worker.
    pub fn start(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let ctx = Arc::new(SimulationContext::new(config));
        for task in &ctx.config().tasks {
            ctx.sequencer().register(task.id)?;
        }

        let mut workers = Vec::new();
        for worker in tasks::from_config(&ctx) {
            let worker_ctx = Arc::clone(&ctx);
            let handle = thread::Builder::new()
                .name(worker.name())
                .spawn(move || worker.run(worker_ctx))?;
            workers.push(handle);
        }
        tracing::info!(
            workers = workers.len(),
            width = ctx.viewport().width,
            height = ctx.viewport().height,
            "simulation started"
        );
        Ok(Self { ctx, workers })
    }

    pub fn context(&self) -> &Arc<SimulationContext> {
        &self.ctx
    }

    /// Starts the workers, draws on `renderer` until it closes or
    /// `max_frames` is reached, then shuts everything down.
    pub fn run<R: Renderer>(
        config: AppConfig,
        renderer: R,
        max_frames: Option<u64>,
    ) -> Result<(RunSummary, R)> {
        let simulation = Self::start(config)?;
        let mut main_loop = MainLoop::new(Arc::clone(&simulation.ctx), renderer)?;
        let summary = main_loop.run(max_frames);
        simulation.shutdown()?;
        Ok((summary?, main_loop.into_renderer()))
    }

    /// Signals shutdown and waits for every worker. The first worker error,
    /// if any, is returned after all threads have been joined.
    pub fn shutdown(self) -> Result<()> {
        self.ctx.request_shutdown();
        let mut first_error = None;
        for handle in self.workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            let result = handle
                .join()
                .map_err(|_| SeedheadError::msg(format!("{name} panicked")))
                .and_then(|result| result);
            if let Err(err) = result {
                tracing::error!(worker = %name, error = %err, "worker failed");
                first_error.get_or_insert(err);
            }
        }
        tracing::info!("simulation stopped");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::render::HeadlessRenderer;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.timing.base_frame_time = 0.002;
        config.timing.slug_factor = 1.0;
        config.rng_seed = Some(5);
        for task in &mut config.tasks {
            task.delay = 0.0;
            task.spec.seed_count = task.spec.seed_count.min(40);
        }
        config
    }

    #[test]
    fn headless_run_draws_the_requested_frames() {
        let (summary, renderer) =
            Simulation::run(fast_config(), HeadlessRenderer::new(), Some(60)).unwrap();
        assert_eq!(summary.frames, 60);
        assert_eq!(renderer.stats().frames, 60);
        assert!(summary.final_lull >= 1.0);
        assert!(summary.overruns <= summary.frames);
    }

    #[test]
    fn closing_the_window_stops_the_loop() {
        let renderer = HeadlessRenderer::new().close_after_frames(5);
        let (summary, _) = Simulation::run(fast_config(), renderer, None).unwrap();
        assert_eq!(summary.frames, 5);
    }

    #[test]
    fn invalid_config_fails_before_any_thread_starts() {
        let mut config = fast_config();
        config.warp.trigger_task = 99;
        assert!(matches!(
            Simulation::start(config),
            Err(SeedheadError::UnregisteredTask(99))
        ));
    }

    #[test]
    fn pointer_moves_the_field_center() {
        let mut config = fast_config();
        config.tasks.clear();
        config.warp.enabled = false;
        let simulation = Simulation::start(config).unwrap();
        let mut renderer = HeadlessRenderer::new();
        renderer.set_pointer(DVec2::new(100.0, 200.0));
        let mut main_loop = MainLoop::new(Arc::clone(simulation.context()), renderer).unwrap();

        main_loop.tick().unwrap();
        assert_eq!(simulation.context().center(), DVec2::new(100.0, 200.0));
        simulation.shutdown().unwrap();
    }

    #[test]
    fn shutdown_clears_the_registry() {
        let simulation = Simulation::start(fast_config()).unwrap();
        let ctx = Arc::clone(simulation.context());
        let mut main_loop = MainLoop::new(Arc::clone(&ctx), HeadlessRenderer::new()).unwrap();
        main_loop.run(Some(30)).unwrap();
        simulation.shutdown().unwrap();
        assert!(ctx.registry().is_empty().unwrap());
    }

    #[test]
    fn trigger_task_leads_the_scene_into_a_warp() {
        let mut config = fast_config();
        config.tasks.retain(|task| task.id == 3);
        config.tasks[0].spec.seed_count = 20;
        config.warp.dodge_min = 0;
        config.warp.dodge_max = 0;
        config.warp.durations = vec![0.05];
        config.warp.arming_timeout = 0.05;
        config.warp.sync_timeout = 1.0;
        config.warp.trigger_poll_delay = 0.005;
        config.warp.broadcast_poll_delay = 0.005;
        config.warp.default_poll_delay = 0.005;

        let simulation = Simulation::start(config).unwrap();
        let ctx = Arc::clone(simulation.context());
        let mut main_loop = MainLoop::new(Arc::clone(&ctx), HeadlessRenderer::new()).unwrap();

        let mut warped = false;
        let mut released = false;
        for _ in 0..5000 {
            main_loop.tick().unwrap();
            if ctx.star_warp() {
                warped = true;
            } else if warped {
                released = true;
                break;
            }
        }
        simulation.shutdown().unwrap();
        assert!(warped && released);
        assert!(!ctx.sequencer().control(3).unwrap().pause);
    }
}
