//! Core library for the seedhead generative art scene.
//!
//! A star field and a handful of phyllotaxis "seed heads" are animated by
//! long-lived worker threads. Workers only mutate their own state and publish
//! it through the [`DrawRegistry`]; a single [`MainLoop`] performs every draw
//! call, paces frames and drives the warp [`Sequencer`].

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod pacing;
pub mod palette;
pub mod random;
pub mod registry;
pub mod render;
pub mod seedhead;
pub mod sequencer;
pub mod starfield;
pub mod tasks;
pub mod timeline;

pub use glam;

pub use config::AppConfig;
pub use context::{Outcome, SimulationContext};
pub use engine::{MainLoop, RunSummary, Simulation};
pub use error::{Result, SeedheadError};
pub use registry::{DrawRegistry, TaskId};
pub use render::{Drawable, HeadlessRenderer, Renderer};
pub use seedhead::{SeedHead, SeedHeadSpec, SeedSize};
pub use sequencer::{Sequencer, WarpPhase};
pub use starfield::{StarField, StarFieldTask};
pub use tasks::{SeedHeadTask, TaskBehavior, WorkerTask};
