//! Boundary between the worker threads and the drawing backend.
//!
//! Only the main loop ever holds a [`Renderer`]. Workers hand over
//! [`Drawable`] values through the draw registry, and the main loop calls
//! [`Drawable::draw`] with a [`Frame`] once per tick.

use std::time::Instant;

use glam::DVec2;

use crate::{config::ViewportConfig, palette::Color, Result};

mod headless;

pub use headless::{HeadlessRenderer, Primitive, RenderStats};

/// Identifies a window created by a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u32);

/// Identifies one drawn primitive so it can later be moved or undrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

/// Retained-mode drawing backend. Primitives stay on screen until undrawn.
/// Implementations are driven from a single thread.
pub trait Renderer {
    fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<WindowId>;

    fn draw_circle(&mut self, window: WindowId, center: DVec2, radius: f64, color: Color)
        -> Handle;

    fn draw_line(&mut self, window: WindowId, from: DVec2, to: DVec2, color: Color) -> Handle;

    fn draw_point(&mut self, window: WindowId, at: DVec2, color: Color) -> Handle;

    fn move_by(&mut self, handle: Handle, delta: DVec2);

    fn undraw(&mut self, handle: Handle);

    fn pointer_position(&self, window: WindowId) -> DVec2;

    fn is_closed(&self, window: WindowId) -> bool;

    /// Starts batching. Nothing needs to reach the screen until
    /// [`Renderer::end_frame`].
    fn begin_frame(&mut self, window: WindowId);

    fn end_frame(&mut self, window: WindowId);
}

/// Everything a [`Drawable`] needs during one tick of the main loop.
pub struct Frame<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub window: WindowId,
    pub now: Instant,
    /// Expansion center of the star field, following the pointer.
    pub center: DVec2,
    pub viewport: &'a ViewportConfig,
}

impl Frame<'_> {
    pub fn draw_circle(&mut self, center: DVec2, radius: f64, color: Color) -> Handle {
        self.renderer.draw_circle(self.window, center, radius, color)
    }

    pub fn draw_line(&mut self, from: DVec2, to: DVec2, color: Color) -> Handle {
        self.renderer.draw_line(self.window, from, to, color)
    }

    pub fn draw_point(&mut self, at: DVec2, color: Color) -> Handle {
        self.renderer.draw_point(self.window, at, color)
    }

    pub fn move_by(&mut self, handle: Handle, delta: DVec2) {
        self.renderer.move_by(handle, delta);
    }

    pub fn undraw(&mut self, handle: Handle) {
        self.renderer.undraw(handle);
    }
}

/// A worker-owned object the main loop draws on the worker's behalf.
pub trait Drawable: Send + Sync {
    fn draw(&self, frame: &mut Frame<'_>) -> Result<()>;
}
