use std::collections::HashMap;

use glam::DVec2;

use super::{Handle, Renderer, WindowId};
use crate::{palette::Color, Result, SeedheadError};

/// Shape and placement of a primitive the [`HeadlessRenderer`] keeps alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Circle {
        center: DVec2,
        radius: f64,
        color: Color,
    },
    Line {
        from: DVec2,
        to: DVec2,
        color: Color,
    },
    Point {
        at: DVec2,
        color: Color,
    },
}

impl Primitive {
    fn translate(&mut self, delta: DVec2) {
        match self {
            Primitive::Circle { center, .. } => *center += delta,
            Primitive::Line { from, to, .. } => {
                *from += delta;
                *to += delta;
            }
            Primitive::Point { at, .. } => *at += delta,
        }
    }
}

/// Call counters collected by the [`HeadlessRenderer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub circles: u64,
    pub lines: u64,
    pub points: u64,
    pub moves: u64,
    pub undraws: u64,
    /// Moves and undraws addressed to handles that were not alive.
    pub stale_calls: u64,
}

#[derive(Debug)]
struct HeadlessWindow {
    title: String,
    size: DVec2,
    closed: bool,
}

/// A [`Renderer`] with no display attached. It keeps the retained primitive
/// set in memory, so it doubles as a recording renderer for tests.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    windows: Vec<HeadlessWindow>,
    live: HashMap<Handle, Primitive>,
    next_handle: u64,
    stats: RenderStats,
    pointer: Option<DVec2>,
    close_after: Option<u64>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes every window once `frames` frames have been flushed.
    pub fn close_after_frames(mut self, frames: u64) -> Self {
        self.close_after = Some(frames);
        self
    }

    /// Pins the reported pointer position. Without it the pointer rests at
    /// the window center.
    pub fn set_pointer(&mut self, position: DVec2) {
        self.pointer = Some(position);
    }

    pub fn close(&mut self) {
        for window in &mut self.windows {
            window.closed = true;
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn primitive(&self, handle: Handle) -> Option<&Primitive> {
        self.live.get(&handle)
    }

    pub fn window_title(&self, window: WindowId) -> Option<&str> {
        self.window(window).map(|w| w.title.as_str())
    }

    fn window(&self, window: WindowId) -> Option<&HeadlessWindow> {
        self.windows.get(window.0 as usize)
    }

    fn insert(&mut self, primitive: Primitive) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, primitive);
        handle
    }
}

impl Renderer for HeadlessRenderer {
    fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<WindowId> {
        if width == 0 || height == 0 {
            return Err(SeedheadError::InvalidInput("window must not be empty"));
        }
        let id = u32::try_from(self.windows.len())
            .map_err(|_| SeedheadError::msg("too many headless windows"))?;
        self.windows.push(HeadlessWindow {
            title: title.to_string(),
            size: DVec2::new(f64::from(width), f64::from(height)),
            closed: false,
        });
        Ok(WindowId(id))
    }

    fn draw_circle(
        &mut self,
        _window: WindowId,
        center: DVec2,
        radius: f64,
        color: Color,
    ) -> Handle {
        self.stats.circles += 1;
        self.insert(Primitive::Circle {
            center,
            radius,
            color,
        })
    }

    fn draw_line(&mut self, _window: WindowId, from: DVec2, to: DVec2, color: Color) -> Handle {
        self.stats.lines += 1;
        self.insert(Primitive::Line { from, to, color })
    }

    fn draw_point(&mut self, _window: WindowId, at: DVec2, color: Color) -> Handle {
        self.stats.points += 1;
        self.insert(Primitive::Point { at, color })
    }

    fn move_by(&mut self, handle: Handle, delta: DVec2) {
        match self.live.get_mut(&handle) {
            Some(primitive) => {
                self.stats.moves += 1;
                primitive.translate(delta);
            }
            None => self.stats.stale_calls += 1,
        }
    }

    fn undraw(&mut self, handle: Handle) {
        if self.live.remove(&handle).is_some() {
            self.stats.undraws += 1;
        } else {
            self.stats.stale_calls += 1;
        }
    }

    fn pointer_position(&self, window: WindowId) -> DVec2 {
        self.pointer
            .or_else(|| self.window(window).map(|w| w.size * 0.5))
            .unwrap_or(DVec2::ZERO)
    }

    fn is_closed(&self, window: WindowId) -> bool {
        self.window(window).map(|w| w.closed).unwrap_or(true)
    }

    fn begin_frame(&mut self, _window: WindowId) {}

    fn end_frame(&mut self, _window: WindowId) {
        self.stats.frames += 1;
        if self
            .close_after
            .map(|limit| self.stats.frames >= limit)
            .unwrap_or(false)
        {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::WHITE;

    #[test]
    fn tracks_live_primitives() {
        let mut renderer = HeadlessRenderer::new();
        let window = renderer.create_window("test", 100, 100).unwrap();

        let circle = renderer.draw_circle(window, DVec2::new(10.0, 10.0), 2.0, WHITE);
        let point = renderer.draw_point(window, DVec2::ZERO, WHITE);
        renderer.move_by(circle, DVec2::new(1.0, -1.0));
        renderer.undraw(point);
        renderer.undraw(point);

        assert_eq!(renderer.live_count(), 1);
        match renderer.primitive(circle) {
            Some(Primitive::Circle { center, .. }) => assert_eq!(*center, DVec2::new(11.0, 9.0)),
            other => panic!("unexpected primitive {other:?}"),
        }
        let stats = renderer.stats();
        assert_eq!(stats.undraws, 1);
        assert_eq!(stats.stale_calls, 1);
    }

    #[test]
    fn closes_after_frame_limit() {
        let mut renderer = HeadlessRenderer::new().close_after_frames(2);
        let window = renderer.create_window("test", 10, 10).unwrap();
        assert_eq!(renderer.window_title(window), Some("test"));

        renderer.end_frame(window);
        assert!(!renderer.is_closed(window));
        renderer.end_frame(window);
        assert!(renderer.is_closed(window));
    }

    #[test]
    fn pointer_defaults_to_window_center() {
        let mut renderer = HeadlessRenderer::new();
        let window = renderer.create_window("test", 200, 100).unwrap();
        assert_eq!(renderer.pointer_position(window), DVec2::new(100.0, 50.0));

        renderer.set_pointer(DVec2::new(3.0, 4.0));
        assert_eq!(renderer.pointer_position(window), DVec2::new(3.0, 4.0));
    }
}
