use glam::DVec2;

/// Places seeds on a phyllotaxis spiral around `center`.
///
/// Seed `i` (for `i` in `1..seed_count`) sits at radius `i * scale` and
/// angle `(i * 360 * phi) mod 360` degrees. Offsets are truncated toward
/// zero so the pattern stays symmetric about its center. The crowded middle
/// is thinned: once more than `2 / scale` seeds have landed inside radius
/// `2 / scale`, further inner seeds are dropped.
///
/// The returned order is the reveal order used when unfolding.
pub fn spiral(seed_count: usize, scale: f64, phi: f64, center: DVec2) -> Vec<DVec2> {
    if !(scale > 0.0) || !scale.is_finite() {
        return Vec::new();
    }

    let middle = 2.0 / scale;
    let mut inner = 0usize;
    let mut placed = Vec::with_capacity(seed_count.saturating_sub(1));

    for index in 1..seed_count {
        let radius = index as f64 * scale;
        if radius < middle {
            inner += 1;
            if inner as f64 > middle {
                continue;
            }
        }
        placed.push(center + offset(index, radius, phi));
    }

    placed
}

fn offset(index: usize, radius: f64, phi: f64) -> DVec2 {
    let angle = (index as f64 * 360.0 * phi) % 360.0;
    let (sin, cos) = angle.to_radians().sin_cos();
    DVec2::new((radius * cos).trunc(), (radius * sin).trunc())
}
