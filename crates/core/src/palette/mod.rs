use serde::{Deserialize, Serialize};

/// Plain 8-bit RGB colour. The renderer has no alpha channel, so fading is
/// approximated with [`Color::scaled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Darkens every channel by `alpha` (clamped to `[0, 1]`), flooring the
    /// result.
    pub fn scaled(self, alpha: f64) -> Self {
        let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
        let scale = |channel: u8| (f64::from(channel) * alpha).floor() as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

pub const WHITE: Color = Color::rgb(255, 255, 255);
pub const RED: Color = Color::rgb(255, 0, 0);
pub const YELLOW: Color = Color::rgb(255, 255, 0);
pub const BLUE: Color = Color::rgb(0, 0, 255);

/// Seed and warp-star colours. Hand picked rather than random RGB so the
/// spectrum stays saturated; whites and greys are repeated to weight them.
pub const PALETTE: [Color; 46] = [
    Color::rgb(255, 0, 0),
    Color::rgb(232, 81, 81),
    Color::rgb(237, 142, 142),
    Color::rgb(255, 94, 0),
    Color::rgb(255, 128, 0),
    Color::rgb(255, 191, 0),
    Color::rgb(255, 221, 0),
    Color::rgb(255, 247, 0),
    Color::rgb(238, 255, 0),
    Color::rgb(200, 255, 0),
    Color::rgb(170, 255, 0),
    Color::rgb(132, 255, 0),
    Color::rgb(94, 255, 0),
    Color::rgb(55, 255, 0),
    Color::rgb(13, 255, 0),
    Color::rgb(0, 255, 68),
    Color::rgb(0, 255, 119),
    Color::rgb(0, 255, 221),
    Color::rgb(0, 208, 255),
    Color::rgb(0, 145, 255),
    Color::rgb(0, 85, 255),
    Color::rgb(4, 0, 255),
    Color::rgb(30, 0, 255),
    Color::rgb(76, 0, 255),
    Color::rgb(89, 0, 255),
    Color::rgb(144, 0, 255),
    Color::rgb(166, 0, 255),
    Color::rgb(191, 0, 255),
    Color::rgb(208, 0, 255),
    Color::rgb(212, 0, 255),
    Color::rgb(238, 0, 255),
    Color::rgb(248, 156, 255),
    Color::rgb(255, 0, 170),
    Color::rgb(255, 0, 187),
    Color::rgb(255, 0, 64),
    Color::rgb(255, 143, 171),
    Color::rgb(255, 0, 0),
    Color::rgb(255, 0, 0),
    Color::rgb(238, 255, 212),
    Color::rgb(212, 255, 228),
    Color::rgb(255, 255, 255),
    Color::rgb(255, 255, 255),
    Color::rgb(255, 255, 255),
    Color::rgb(201, 201, 201),
    Color::rgb(168, 168, 168),
    Color::rgb(145, 145, 145),
];
