use std::{collections::HashSet, path::Path};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::{
    palette, tasks::TaskBehavior, Result, SeedHeadSpec, SeedSize, SeedheadError, TaskId,
};

/// The golden ratio conjugate, the angular ratio of a "true" fibonacci head.
pub const FIB_RATIO: f64 = 0.618;

/// Upper bound on a head's speed, in frames between seeds.
pub const MAX_SEED_SPEED: f64 = 1000.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub viewport: ViewportConfig,
    pub timing: TimingConfig,
    pub pacing: PacingConfig,
    pub starfield: StarFieldConfig,
    pub warp: WarpConfig,
    /// Angular ratios the mutable variants pick φ from. Repeats weight the
    /// choice.
    pub shape_ratios: Vec<f64>,
    pub tasks: Vec<TaskConfig>,
    /// Fixed seed for every RNG in the run; random when absent.
    pub rng_seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let viewport = ViewportConfig::default();
        let center = viewport.center();
        Self {
            viewport,
            timing: TimingConfig::default(),
            pacing: PacingConfig::default(),
            starfield: StarFieldConfig::default(),
            warp: WarpConfig::default(),
            shape_ratios: vec![FIB_RATIO, 0.45, 0.53, FIB_RATIO, 0.57, FIB_RATIO, 0.71],
            tasks: default_tasks(center),
            rng_seed: None,
        }
    }
}

impl AppConfig {
    /// The reference scene: a fixed head, a mutable trigger head, nine
    /// roaming heads and the star field.
    pub fn live_defaults() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskConfig> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Checks everything the running scene relies on. Called before any
    /// thread is spawned so setup mistakes fail fast.
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(SeedheadError::InvalidInput("viewport must not be empty"));
        }
        if !(self.timing.frame_time() > 0.0) {
            return Err(SeedheadError::InvalidInput("frame time must be positive"));
        }
        if self.shape_ratios.is_empty() {
            return Err(SeedheadError::InvalidInput("shape ratios must not be empty"));
        }
        if self.pacing.lull_increment < 0.0 || self.pacing.lull_decrement < 0.0 {
            return Err(SeedheadError::InvalidInput("lull steps must not be negative"));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id) {
                return Err(SeedheadError::DuplicateTask(task.id));
            }
            if task.spec.seed_count < 2 {
                return Err(SeedheadError::InvalidInput("seed count must be at least 2"));
            }
            if !(task.spec.scale > 0.0) {
                return Err(SeedheadError::InvalidInput("seed scale must be positive"));
            }
            if !(task.spec.speed >= 0.0 && task.spec.speed <= MAX_SEED_SPEED) {
                return Err(SeedheadError::InvalidInput("seed speed out of range"));
            }
        }
        if self.starfield.enabled && !seen.insert(self.starfield.task_id) {
            return Err(SeedheadError::DuplicateTask(self.starfield.task_id));
        }

        if self.warp.enabled {
            if self.warp.dodge_min > self.warp.dodge_max {
                return Err(SeedheadError::InvalidInput("dodge range is inverted"));
            }
            if self.warp.durations.is_empty() {
                return Err(SeedheadError::InvalidInput("warp durations must not be empty"));
            }
            if self.task(self.warp.trigger_task).is_none() {
                return Err(SeedheadError::UnregisteredTask(self.warp.trigger_task));
            }
        }

        Ok(())
    }
}

/// Window geometry. The title is only forwarded to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            title: "Starfield and Fibonacci Seedhead Animated Patterns".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

impl ViewportConfig {
    pub fn size(&self) -> DVec2 {
        DVec2::new(f64::from(self.width), f64::from(self.height))
    }

    pub fn center(&self) -> DVec2 {
        self.size() * 0.5
    }

    /// Closed-boundary containment: a point sitting exactly on an edge has
    /// already left.
    pub fn contains(&self, point: DVec2) -> bool {
        let size = self.size();
        point.x > 0.0 && point.x < size.x && point.y > 0.0 && point.y < size.y
    }
}

/// Frame budget and flight-speed constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Nominal frame duration in seconds before slugging.
    pub base_frame_time: f64,
    /// Stretches the frame time and shrinks flight speeds; values above one
    /// slow the whole scene down for weaker machines.
    pub slug_factor: f64,
    /// Upper bound of a seed head's randomly drawn flight speed, before
    /// slugging.
    pub seed_flight_period: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_frame_time: 0.02,
            slug_factor: 1.5,
            seed_flight_period: 0.3,
        }
    }
}

impl TimingConfig {
    pub fn frame_time(&self) -> f64 {
        self.base_frame_time * self.slug_factor
    }

    pub fn flight_period_const(&self) -> f64 {
        if self.slug_factor > 0.0 {
            self.seed_flight_period / self.slug_factor
        } else {
            self.seed_flight_period
        }
    }
}

/// Lull-period controller tuning for the main loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub lull_baseline: f64,
    pub lull_increment: f64,
    pub lull_decrement: f64,
    /// A frame drawn within this fraction of its budget counts as slack.
    pub slack_ratio: f64,
    /// Sleep after an overrun so workers still get scheduled.
    pub overrun_yield: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            lull_baseline: 1.0,
            lull_increment: 0.004,
            lull_decrement: 0.004,
            slack_ratio: 0.2,
            overrun_yield: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StarFieldConfig {
    pub enabled: bool,
    pub task_id: TaskId,
    /// Stars per thousand square pixels.
    pub density: f64,
    pub base_flight_period: f64,
    /// Flight period ceiling while warped.
    pub warp_flight_cap: f64,
    /// Per-tick multiplier applied while warped.
    pub warp_ramp: f64,
    /// Per-tick divisor applied while calm.
    pub calm_decay: f64,
    pub line_length_adjust: f64,
    /// Restarted stars get a size in `[0, restart_size)`.
    pub restart_size: f64,
}

impl Default for StarFieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            task_id: 16,
            density: 0.04,
            base_flight_period: 0.01,
            warp_flight_cap: 0.25,
            warp_ramp: 1.01,
            calm_decay: 1.1,
            line_length_adjust: 0.5,
            restart_size: 1.0,
        }
    }
}

impl StarFieldConfig {
    pub fn star_count(&self, viewport: &ViewportConfig) -> usize {
        let area = f64::from(viewport.width) * f64::from(viewport.height);
        (area / 1000.0 * self.density).max(0.0) as usize
    }
}

/// Sequencer timings. Every value here is aesthetic tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    pub enabled: bool,
    /// The task whose self-reported pause gates every warp.
    pub trigger_task: TaskId,
    pub dodge_min: u32,
    pub dodge_max: u32,
    /// Candidate lengths, in seconds, of both warps and calm windows.
    pub durations: Vec<f64>,
    /// How long to wait for the trigger task before re-issuing the pause.
    pub arming_timeout: f64,
    /// How long an armed warp may wait for the trigger before giving up.
    pub sync_timeout: f64,
    pub trigger_poll_delay: f64,
    pub broadcast_poll_delay: f64,
    /// Poll delay given to tasks on registration.
    pub default_poll_delay: f64,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_task: 3,
            dodge_min: 4,
            dodge_max: 12,
            durations: vec![21.0, 20.0, 23.0, 18.0, 25.0],
            arming_timeout: 2.0,
            sync_timeout: 30.0,
            trigger_poll_delay: 8.0,
            broadcast_poll_delay: 8.0,
            default_poll_delay: 4.0,
        }
    }
}

/// One seed head worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: TaskId,
    pub behavior: TaskBehavior,
    /// Initial stagger in seconds. Also scales hold and rest times.
    pub delay: f64,
    pub spec: SeedHeadSpec,
}

fn default_tasks(center: DVec2) -> Vec<TaskConfig> {
    let fixed = SeedHeadSpec {
        center,
        seed_count: 500,
        size: SeedSize::Fixed(3.0),
        color: palette::WHITE,
        speed: 2.0,
        scale: 0.5,
        phi: FIB_RATIO,
        motion: false,
    };
    let mutable = SeedHeadSpec {
        seed_count: 800,
        size: SeedSize::Random,
        color: palette::YELLOW,
        motion: true,
        ..fixed.clone()
    };
    let roaming = SeedHeadSpec {
        seed_count: 500,
        size: SeedSize::Random,
        color: palette::BLUE,
        speed: 0.5,
        motion: true,
        ..fixed.clone()
    };
    let sprinkle = SeedHeadSpec {
        seed_count: 250,
        size: SeedSize::Fixed(1.0),
        color: palette::BLUE,
        speed: 1.0,
        ..fixed.clone()
    };

    let mut tasks = vec![
        TaskConfig {
            id: 1,
            behavior: TaskBehavior::Fixed,
            delay: 0.0,
            spec: fixed,
        },
        TaskConfig {
            id: 3,
            behavior: TaskBehavior::Mutable,
            delay: 8.0,
            spec: mutable,
        },
        TaskConfig {
            id: 6,
            behavior: TaskBehavior::Roaming,
            delay: 6.0,
            spec: roaming.clone(),
        },
        TaskConfig {
            id: 7,
            behavior: TaskBehavior::Roaming,
            delay: 8.0,
            spec: roaming,
        },
    ];
    let stagger = [1.0, 2.0, 1.0, 3.0, 2.0, 1.0, 2.0];
    tasks.extend((8..15).zip(stagger).map(|(id, delay)| TaskConfig {
        id,
        behavior: TaskBehavior::Roaming,
        delay,
        spec: sprinkle.clone(),
    }));
    tasks
}
