//! Polar/rectangular conversions in screen coordinates.
//!
//! Angles are degrees measured from +X and increase toward +Y. Since screen Y
//! grows downward, positive angles turn clockwise on the display.

/// Wraps an angle into [0, 360).
pub fn normalize_deg(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Point at `radius` and `deg` around `center`.
pub fn polar_to_rect(center: (f64, f64), radius: f64, deg: f64) -> (f64, f64) {
    let rad = deg.to_radians();
    (center.0 + radius * rad.cos(), center.1 + radius * rad.sin())
}

/// Inverse of [`polar_to_rect`]: returns `(radius, deg)` with `deg` in [0, 360).
pub fn rect_to_polar(center: (f64, f64), x: f64, y: f64) -> (f64, f64) {
    let dx = x - center.0;
    let dy = y - center.1;
    (dx.hypot(dy), offset_angle_deg(dx, dy))
}

/// Heading of an offset vector, in [0, 360).
pub fn offset_angle_deg(dx: f64, dy: f64) -> f64 {
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    normalize_deg(dy.atan2(dx).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn zero_degrees_points_along_x() {
        let (x, y) = polar_to_rect((512.0, 384.0), 200.0, 0.0);
        assert!((x - 712.0).abs() < EPS);
        assert!((y - 384.0).abs() < EPS);
    }

    #[test]
    fn ninety_degrees_points_down_the_screen() {
        let (x, y) = polar_to_rect((512.0, 384.0), 200.0, 90.0);
        assert!((x - 512.0).abs() < EPS);
        assert!((y - 584.0).abs() < EPS);
    }

    #[test]
    fn polar_round_trip() {
        let center = (512.0, 384.0);
        for k in 0..16 {
            let deg = k as f64 * 22.5;
            let (x, y) = polar_to_rect(center, 150.0, deg);
            let (r, back) = rect_to_polar(center, x, y);
            assert!((r - 150.0).abs() < EPS);
            let diff = (back - deg).abs();
            assert!(diff < 1e-7 || (diff - 360.0).abs() < 1e-7, "{deg} -> {back}");
        }
    }

    #[test]
    fn negative_angles_are_normalized() {
        assert!((normalize_deg(-45.0) - 315.0).abs() < EPS);
        assert!((normalize_deg(720.0)).abs() < EPS);
        assert!((offset_angle_deg(1.0, -1.0) - 315.0).abs() < EPS);
    }

    #[test]
    fn zero_offset_has_zero_heading() {
        assert_eq!(offset_angle_deg(0.0, 0.0), 0.0);
    }
}
