use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Condvar, Mutex, PoisonError, RwLock,
    },
    time::{Duration, Instant},
};

use glam::DVec2;

use crate::{
    config::{AppConfig, ViewportConfig},
    palette::{Color, PALETTE},
    random::SimRng,
    timeline::seconds,
    DrawRegistry, Sequencer,
};

/// Whether a blocking operation ran to completion or stopped early because
/// the process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

impl Outcome {
    pub fn is_interrupted(self) -> bool {
        self == Outcome::Interrupted
    }
}

/// Process-wide stop flag with a condition variable so sleepers wake as soon
/// as it is raised.
#[derive(Debug, Default)]
struct ShutdownSignal {
    raised: AtomicBool,
    lock: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        let mut raised = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        *raised = true;
        self.wake.notify_all();
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Returns `false` if the signal was raised before `duration` elapsed.
    fn sleep(&self, duration: Duration) -> bool {
        let raised = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if duration.is_zero() {
            return !*raised;
        }
        let (raised, _) = self
            .wake
            .wait_timeout_while(raised, duration, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        !*raised
    }
}

/// Everything the workers and the main loop share. Built once per run and
/// handed out behind an `Arc`.
pub struct SimulationContext {
    config: AppConfig,
    seed: u64,
    center: RwLock<DVec2>,
    lull_period: AtomicU64,
    palette: Vec<Color>,
    shutdown: ShutdownSignal,
    registry: DrawRegistry,
    sequencer: Sequencer,
}

impl SimulationContext {
    pub fn new(config: AppConfig) -> Self {
        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let sequencer = Sequencer::new(
            config.warp.clone(),
            SimRng::for_owner(seed, u64::MAX),
            Instant::now(),
        );
        Self {
            center: RwLock::new(config.viewport.center()),
            lull_period: AtomicU64::new(config.pacing.lull_baseline.to_bits()),
            palette: PALETTE.to_vec(),
            seed,
            shutdown: ShutdownSignal::default(),
            registry: DrawRegistry::new(),
            sequencer,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn viewport(&self) -> &ViewportConfig {
        &self.config.viewport
    }

    /// Frame budget in seconds.
    pub fn frame_time(&self) -> f64 {
        self.config.timing.frame_time()
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    pub fn registry(&self) -> &DrawRegistry {
        &self.registry
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Time source for frame measurement, seed flight and the sequencer.
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// A fresh generator for `owner`, reproducible when the run seed is
    /// fixed.
    pub fn rng_for(&self, owner: u64) -> SimRng {
        SimRng::for_owner(self.seed, owner)
    }

    /// Expansion center of the star field and of seed flight.
    pub fn center(&self) -> DVec2 {
        *self.center.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_center(&self, center: DVec2) {
        *self.center.write().unwrap_or_else(PoisonError::into_inner) = center;
    }

    pub fn lull_period(&self) -> f64 {
        f64::from_bits(self.lull_period.load(Ordering::Relaxed))
    }

    pub fn set_lull_period(&self, lull: f64) {
        self.lull_period.store(lull.to_bits(), Ordering::Relaxed);
    }

    pub fn star_warp(&self) -> bool {
        self.sequencer.star_warp()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_raised()
    }

    /// Raises the shutdown flag and wakes every sleeping or paused worker.
    pub fn request_shutdown(&self) {
        if self.is_running() {
            tracing::info!("shutdown requested");
        }
        self.shutdown.raise();
        self.sequencer.shutdown();
    }

    /// Sleeps for `secs` seconds unless shutdown is requested first. Returns
    /// whether the simulation is still running.
    pub fn sleep(&self, secs: f64) -> bool {
        self.sleep_for(seconds(secs))
    }

    pub fn sleep_for(&self, duration: Duration) -> bool {
        self.shutdown.sleep(duration)
    }
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("seed", &self.seed)
            .field("center", &self.center())
            .field("lull_period", &self.lull_period())
            .field("running", &self.is_running())
            .field("registry", &self.registry)
            .finish()
    }
}
