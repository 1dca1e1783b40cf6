//! Background star field.
//!
//! Stars drift radially away from the field center, growing as they go, and
//! are recycled at a random position once they leave the viewport. The
//! owning worker updates every star once per frame and then hands the whole
//! field to the main loop through a single-slot handoff: it never runs more
//! than one update ahead of what has been drawn.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::Instant,
};

use glam::DVec2;

use crate::{
    config::{StarFieldConfig, ViewportConfig},
    context::{Outcome, SimulationContext},
    pacing::FramePacer,
    palette::{self, Color},
    random::SimRng,
    render::{Drawable, Frame, Handle},
    tasks::WorkerTask,
    timeline::seconds,
    Result, SeedheadError, TaskId,
};

/// Stars at or below this size are drawn as points, larger ones as lines.
const POINT_SIZE_LIMIT: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct Star {
    position: DVec2,
    /// Where the previous frame's line ended.
    anchor: DVec2,
    size: f64,
    color: Color,
    handle: Option<Handle>,
}

impl Star {
    fn spawn(viewport: &ViewportConfig, restart_size: f64, rng: &mut SimRng) -> Self {
        let mut star = Self {
            position: DVec2::ZERO,
            anchor: DVec2::ZERO,
            size: 0.0,
            color: palette::WHITE,
            handle: None,
        };
        star.restart(viewport, restart_size, None, rng);
        star
    }

    pub fn position(&self) -> DVec2 {
        self.position
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Recycles the star at a random point inside the viewport. In warp mode
    /// (`warp_palette` present) it takes a random palette colour.
    fn restart(
        &mut self,
        viewport: &ViewportConfig,
        restart_size: f64,
        warp_palette: Option<&[Color]>,
        rng: &mut SimRng,
    ) {
        self.position = DVec2::new(
            rng.int_range(1, i64::from(viewport.width)) as f64,
            rng.int_range(1, i64::from(viewport.height)) as f64,
        );
        self.anchor = self.position;
        self.size = rng.unit() * restart_size;
        self.color = warp_palette
            .and_then(|colors| rng.choose(colors).copied())
            .unwrap_or(palette::WHITE);
    }

    fn advance(&mut self, center: DVec2, line_length: f64, adjust: f64) {
        let expansion = self.size * line_length * adjust;
        self.position += (self.position - center) * expansion;
        self.size += line_length;
    }

    fn erase(&mut self, frame: &mut Frame<'_>) {
        if let Some(handle) = self.handle.take() {
            frame.undraw(handle);
        }
    }

    fn render(&mut self, frame: &mut Frame<'_>) {
        let color = self.color.scaled((self.size / 2.0).min(1.0));
        let handle = if self.size > POINT_SIZE_LIMIT {
            frame.draw_line(self.anchor, self.position, color)
        } else {
            frame.draw_point(self.position, color)
        };
        self.handle = Some(handle);
        self.anchor = self.position;
    }
}

/// Single-slot handoff flag between the star field worker and the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldControl {
    /// The worker may compute the next update.
    NeedsUpdate,
    /// An update is waiting to be drawn.
    UpdatedPendingDraw,
}

/// Per-update inputs that change from frame to frame.
#[derive(Debug, Clone, Copy)]
pub struct FieldStep {
    pub center: DVec2,
    pub line_length: f64,
    pub warp: bool,
}

#[derive(Debug)]
struct FieldState {
    stars: Vec<Star>,
    control: FieldControl,
    drawn: bool,
    /// Updates handed to the main loop so far.
    published: u64,
}

#[derive(Debug)]
pub struct StarField {
    config: StarFieldConfig,
    viewport: ViewportConfig,
    state: Mutex<FieldState>,
    handoff: Condvar,
}

impl StarField {
    pub fn new(config: StarFieldConfig, viewport: ViewportConfig, rng: &mut SimRng) -> Self {
        let stars = (0..config.star_count(&viewport))
            .map(|_| Star::spawn(&viewport, config.restart_size, rng))
            .collect();
        Self {
            state: Mutex::new(FieldState {
                stars,
                control: FieldControl::NeedsUpdate,
                drawn: false,
                published: 0,
            }),
            handoff: Condvar::new(),
            config,
            viewport,
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.stars.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.stars.is_empty())
    }

    pub fn control(&self) -> Result<FieldControl> {
        Ok(self.lock()?.control)
    }

    pub fn was_drawn(&self) -> Result<bool> {
        Ok(self.lock()?.drawn)
    }

    pub fn updates_published(&self) -> Result<u64> {
        Ok(self.lock()?.published)
    }

    pub fn stars(&self) -> Result<Vec<Star>> {
        Ok(self.lock()?.stars.clone())
    }

    /// Moves every star one step and restarts those that left the viewport.
    pub fn update(&self, step: FieldStep, palette: &[Color], rng: &mut SimRng) -> Result<()> {
        let warp_palette = step.warp.then_some(palette);
        let mut state = self.lock()?;
        for star in state.stars.iter_mut() {
            star.advance(step.center, step.line_length, self.config.line_length_adjust);
            if !self.viewport.contains(star.position) {
                star.restart(&self.viewport, self.config.restart_size, warp_palette, rng);
            }
        }
        Ok(())
    }

    /// Marks the current update as ready for the main loop.
    pub fn publish_update(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.control = FieldControl::UpdatedPendingDraw;
        state.published += 1;
        Ok(())
    }

    /// Blocks until the main loop has drawn the pending update.
    pub fn wait_drawn(&self, ctx: &SimulationContext) -> Result<Outcome> {
        let poll = seconds(ctx.frame_time());
        let mut state = self.lock()?;
        loop {
            if state.control == FieldControl::NeedsUpdate {
                return Ok(Outcome::Completed);
            }
            if !ctx.is_running() {
                return Ok(Outcome::Interrupted);
            }
            state = self
                .handoff
                .wait_timeout(state, poll)
                .map_err(|_| SeedheadError::msg("star field has been poisoned"))?
                .0;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, FieldState>> {
        self.state
            .lock()
            .map_err(|_| SeedheadError::msg("star field has been poisoned"))
    }
}

impl Drawable for StarField {
    /// Redraws the whole field if an update is pending; otherwise the
    /// previous frame's stars stay on screen.
    fn draw(&self, frame: &mut Frame<'_>) -> Result<()> {
        let mut state = self.lock()?;
        if state.control != FieldControl::UpdatedPendingDraw {
            return Ok(());
        }
        if state.drawn {
            for star in state.stars.iter_mut() {
                star.erase(frame);
            }
        }
        for star in state.stars.iter_mut() {
            star.render(frame);
        }
        state.drawn = true;
        state.control = FieldControl::NeedsUpdate;
        drop(state);
        self.handoff.notify_all();
        Ok(())
    }
}

/// Next flight period: ramps toward the cap while warped, decays back to
/// the base otherwise.
pub fn next_flight_period(current: f64, warp: bool, config: &StarFieldConfig) -> f64 {
    if warp {
        if current < config.warp_flight_cap {
            (current * config.warp_ramp).min(config.warp_flight_cap)
        } else {
            current
        }
    } else if current > config.base_flight_period {
        (current / config.calm_decay).max(config.base_flight_period)
    } else {
        current
    }
}

/// Worker that owns the star field.
pub struct StarFieldTask {
    id: TaskId,
    field: Arc<StarField>,
    rng: SimRng,
    flight_period: f64,
}

impl StarFieldTask {
    pub fn new(ctx: &SimulationContext) -> Self {
        let config = ctx.config().starfield.clone();
        let id = config.task_id;
        let mut rng = ctx.rng_for(u64::from(id));
        let flight_period = config.base_flight_period;
        let field = StarField::new(config, ctx.viewport().clone(), &mut rng);
        Self {
            id,
            field: Arc::new(field),
            rng,
            flight_period,
        }
    }

    pub fn field(&self) -> &Arc<StarField> {
        &self.field
    }

    fn step(&mut self, ctx: &SimulationContext, pacer: &FramePacer) -> Result<Outcome> {
        let started: Instant = ctx.now();
        let warp = ctx.star_warp();
        self.flight_period = next_flight_period(self.flight_period, warp, &ctx.config().starfield);
        let step = FieldStep {
            center: ctx.center(),
            line_length: self.flight_period * ctx.lull_period(),
            warp,
        };
        self.field.update(step, ctx.palette(), &mut self.rng)?;

        let elapsed = ctx.now().saturating_duration_since(started);
        if !ctx.sleep_for(pacer.worker_pause(elapsed)) {
            return Ok(Outcome::Interrupted);
        }
        self.field.publish_update()?;
        self.field.wait_drawn(ctx)
    }
}

impl WorkerTask for StarFieldTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> String {
        format!("star-field-{}", self.id)
    }

    fn run(mut self: Box<Self>, ctx: Arc<SimulationContext>) -> Result<()> {
        let pacer = FramePacer::new(ctx.config().pacing.clone(), ctx.frame_time());
        tracing::info!(task = self.id, stars = self.field.len()?, "star field started");
        ctx.registry()
            .publish(self.id, Some(Arc::clone(&self.field) as Arc<dyn Drawable>))?;

        while ctx.is_running() {
            if self.step(&ctx, &pacer)?.is_interrupted() {
                break;
            }
        }

        ctx.registry().unpublish(self.id)?;
        let updates = self.field.updates_published()?;
        tracing::info!(task = self.id, updates, "star field stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        render::{HeadlessRenderer, Renderer, WindowId},
    };

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.viewport.width = 200;
        config.viewport.height = 100;
        config.starfield.density = 1.0;
        config.timing.base_frame_time = 0.001;
        config.timing.slug_factor = 1.0;
        config.rng_seed = Some(3);
        config
    }

    fn draw_once(
        field: &StarField,
        renderer: &mut HeadlessRenderer,
        window: WindowId,
        viewport: &ViewportConfig,
    ) {
        let mut frame = Frame {
            renderer,
            window,
            now: Instant::now(),
            center: viewport.center(),
            viewport,
        };
        field.draw(&mut frame).unwrap();
    }

    #[test]
    fn star_count_follows_density() {
        let config = small_config();
        let mut rng = SimRng::seeded(1);
        let field = StarField::new(config.starfield.clone(), config.viewport.clone(), &mut rng);
        assert_eq!(field.len().unwrap(), 20);
        for star in field.stars().unwrap() {
            assert!(config.viewport.contains(star.position()));
            assert!(star.size() < 1.0);
        }
    }

    #[test]
    fn stars_on_the_boundary_restart_in_the_same_tick() {
        let config = small_config();
        let mut rng = SimRng::seeded(2);
        let field = StarField::new(config.starfield.clone(), config.viewport.clone(), &mut rng);
        {
            let mut state = field.lock().unwrap();
            state.stars[0].position = DVec2::new(200.0, 50.0);
            state.stars[0].size = 0.0;
            state.stars[1].position = DVec2::new(0.0, 50.0);
            state.stars[1].size = 0.0;
            state.stars[2].position = DVec2::new(190.0, 50.0);
            state.stars[2].size = 5.0;
        }

        let step = FieldStep {
            center: DVec2::new(100.0, 50.0),
            line_length: 0.1,
            warp: false,
        };
        field.update(step, &palette::PALETTE, &mut rng).unwrap();

        let stars = field.stars().unwrap();
        for star in &stars[..3] {
            assert!(config.viewport.contains(star.position()));
            assert!(star.size() < 1.0);
        }
        for star in &stars {
            assert!(config.viewport.contains(star.position()));
        }
    }

    #[test]
    fn warp_restarts_pick_palette_colours() {
        let config = small_config();
        let mut rng = SimRng::seeded(4);
        let field = StarField::new(config.starfield.clone(), config.viewport.clone(), &mut rng);
        for star in field.lock().unwrap().stars.iter_mut() {
            star.position = DVec2::new(190.0, 90.0);
            star.size = 1.0;
        }
        let step = FieldStep {
            center: DVec2::new(100.0, 50.0),
            line_length: 50.0,
            warp: true,
        };
        let warm = [palette::RED];
        field.update(step, &warm, &mut rng).unwrap();
        assert!(field
            .stars()
            .unwrap()
            .iter()
            .all(|star| star.color() == palette::RED));
    }

    #[test]
    fn draw_only_consumes_published_updates() {
        let config = small_config();
        let mut rng = SimRng::seeded(5);
        let field = StarField::new(config.starfield.clone(), config.viewport.clone(), &mut rng);
        let mut renderer = HeadlessRenderer::new();
        let window = renderer.create_window("stars", 200, 100).unwrap();

        draw_once(&field, &mut renderer, window, &config.viewport);
        assert_eq!(renderer.live_count(), 0);
        assert!(!field.was_drawn().unwrap());

        field.publish_update().unwrap();
        assert_eq!(field.control().unwrap(), FieldControl::UpdatedPendingDraw);
        draw_once(&field, &mut renderer, window, &config.viewport);
        assert_eq!(field.control().unwrap(), FieldControl::NeedsUpdate);
        assert_eq!(renderer.live_count(), 20);

        // Second redraw replaces, never accumulates.
        field.publish_update().unwrap();
        draw_once(&field, &mut renderer, window, &config.viewport);
        assert_eq!(renderer.live_count(), 20);
        assert_eq!(renderer.stats().undraws, 20);
    }

    #[test]
    fn small_stars_are_points_and_large_ones_lines() {
        let viewport = small_config().viewport;
        let mut renderer = HeadlessRenderer::new();
        let window = renderer.create_window("stars", 200, 100).unwrap();
        let mut frame = Frame {
            renderer: &mut renderer,
            window,
            now: Instant::now(),
            center: viewport.center(),
            viewport: &viewport,
        };
        let mut star = Star {
            position: DVec2::new(10.0, 10.0),
            anchor: DVec2::new(9.0, 9.0),
            size: 1.0,
            color: palette::WHITE,
            handle: None,
        };
        star.render(&mut frame);
        star.size = 3.0;
        star.position = DVec2::new(12.0, 12.0);
        star.render(&mut frame);

        let stats = renderer.stats();
        assert_eq!((stats.points, stats.lines), (1, 1));
    }

    #[test]
    fn flight_period_ramps_and_decays_within_bounds() {
        let config = StarFieldConfig::default();
        let mut period = config.base_flight_period;
        for _ in 0..2000 {
            period = next_flight_period(period, true, &config);
            assert!(period <= config.warp_flight_cap);
        }
        assert_eq!(period, config.warp_flight_cap);

        for _ in 0..200 {
            period = next_flight_period(period, false, &config);
            assert!(period >= config.base_flight_period);
        }
        assert_eq!(period, config.base_flight_period);
    }

    #[test]
    fn worker_never_runs_ahead_of_the_draw_thread() {
        let ctx = Arc::new(SimulationContext::new(small_config()));
        let task = Box::new(StarFieldTask::new(&ctx));
        let field = Arc::clone(task.field());
        let worker = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || task.run(ctx))
        };

        let mut renderer = HeadlessRenderer::new();
        let window = renderer.create_window("stars", 200, 100).unwrap();
        let mut draws = 0u64;
        for _ in 0..200 {
            if field.control().unwrap() == FieldControl::UpdatedPendingDraw {
                draw_once(&field, &mut renderer, window, ctx.viewport());
                draws += 1;
            }
            assert!(field.updates_published().unwrap() <= draws + 1);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(draws > 0);

        // With nobody drawing, the worker publishes at most one more update
        // and then stays parked on it.
        thread::sleep(Duration::from_millis(30));
        let parked_at = field.updates_published().unwrap();
        assert!(parked_at <= draws + 1);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(field.updates_published().unwrap(), parked_at);
        assert_eq!(field.control().unwrap(), FieldControl::UpdatedPendingDraw);

        // Drawing again releases it.
        draw_once(&field, &mut renderer, window, ctx.viewport());
        let mut resumed = false;
        for _ in 0..200 {
            if field.updates_published().unwrap() > parked_at {
                resumed = true;
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(resumed);

        ctx.request_shutdown();
        worker.join().unwrap().unwrap();
        assert!(!ctx.registry().contains(16).unwrap());
    }
}
