use glam::Vec2;

/// Lengths below this are treated as zero by the geometry helpers.
pub const MY_EPSILON: f32 = 0.0005;

/// Extra 2D operations on top of [`glam::Vec2`].
pub trait Vec2Ext {
    /// Returns `self + t * other`.
    fn add_scaled(self, other: Vec2, t: f32) -> Vec2;

    /// Scalar 2D cross product (z component of the 3D cross product).
    fn cross(self, other: Vec2) -> f32;

    /// Rotates the vector by 90 degrees counter-clockwise.
    fn tangent(self) -> Vec2;

    /// Normalizes the vector, or returns zero if its length is below [`MY_EPSILON`].
    fn normalize_eps(self) -> Vec2;

    /// Flushes components smaller than [`MY_EPSILON`] to zero.
    fn epsilon_snap(self) -> Vec2;
}

impl Vec2Ext for Vec2 {
    #[inline]
    fn add_scaled(self, other: Vec2, t: f32) -> Vec2 {
        self + other * t
    }

    #[inline]
    fn cross(self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    #[inline]
    fn tangent(self) -> Vec2 {
        self.perp()
    }

    #[inline]
    fn normalize_eps(self) -> Vec2 {
        let length = self.length();
        if length > MY_EPSILON && length.is_finite() {
            self / length
        } else {
            Vec2::ZERO
        }
    }

    #[inline]
    fn epsilon_snap(self) -> Vec2 {
        let snap = |v: f32| if v.abs() < MY_EPSILON { 0.0 } else { v };
        Vec2::new(snap(self.x), snap(self.y))
    }
}

/// Calculate distance from line segment.
///
/// Returns the offset from the closest point of the segment to `point`.
pub fn distance_from_line(point: Vec2, line: [Vec2; 2]) -> Vec2 {
    let a = point - line[0];
    let b = line[1] - line[0];
    let b_len2 = b.length_squared();

    if b_len2 <= MY_EPSILON * MY_EPSILON {
        a
    } else {
        let t = (a.dot(b) / b_len2).clamp(0.0, 1.0);
        a - t * b
    }
}

/// Perpendicular distance from `point` to the ray `origin + s * dir` with `s` in `[0, length]`.
///
/// Returns [`f32::INFINITY`] when the projection of `point` falls outside the ray
/// or when `dir` is degenerate.
pub fn point_to_ray_distance(point: Vec2, origin: Vec2, dir: Vec2, length: f32) -> f32 {
    let dir = dir.normalize_eps();
    if dir == Vec2::ZERO {
        return f32::INFINITY;
    }

    let rel = point - origin;
    let along = rel.dot(dir);
    if along < 0.0 || along > length {
        return f32::INFINITY;
    }

    dir.cross(rel).abs()
}

/// Tests whether two segments given as `start + s * dir`, `s` in `[0, len]`, intersect.
///
/// Parallel and degenerate segments never intersect.
pub fn segments_intersect(p1: Vec2, d1: Vec2, l1: f32, p2: Vec2, d2: Vec2, l2: f32) -> bool {
    let d1 = d1.normalize_eps();
    let d2 = d2.normalize_eps();
    let denom = d1.cross(d2);
    if denom.abs() <= f32::EPSILON {
        return false;
    }

    let delta = p2 - p1;
    let s = delta.cross(d2) / denom;
    let t = delta.cross(d1) / denom;

    (0.0..=l1).contains(&s) && (0.0..=l2).contains(&t)
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::{vec2, Vec2};

    use super::{distance_from_line, point_to_ray_distance, segments_intersect, Vec2Ext};

    #[test]
    fn test_distance_from_line() {
        let line = [vec2(1.0, 1.0), vec2(4.0, 1.0)];

        assert_float_absolute_eq!(distance_from_line(vec2(2.0, 3.0), line).length(), 2.0);
        assert_float_absolute_eq!(distance_from_line(vec2(0.0, 0.25), line).length(), 1.25);
        assert_float_absolute_eq!(distance_from_line(vec2(7.0, 5.0), line).length(), 5.0);
    }

    #[test]
    fn test_distance_from_degenerate_line() {
        let line = [vec2(1.0, 1.0), vec2(1.0, 1.0)];
        assert_eq!(distance_from_line(vec2(4.0, 5.0), line), vec2(3.0, 4.0));
    }

    #[test]
    fn test_normalize_zero() {
        let n = Vec2::ZERO.normalize_eps();
        assert_eq!(n, Vec2::ZERO);
        assert!(!n.x.is_nan() && !n.y.is_nan());
        assert_eq!(vec2(0.0001, 0.0).normalize_eps(), Vec2::ZERO);
        assert_float_absolute_eq!(vec2(3.0, 4.0).normalize_eps().length(), 1.0);
    }

    #[test]
    fn test_cross_and_tangent() {
        assert_float_absolute_eq!(Vec2::X.cross(Vec2::Y), 1.0);
        assert_float_absolute_eq!(Vec2::Y.cross(Vec2::X), -1.0);
        assert_eq!(Vec2::X.tangent(), Vec2::Y);
        assert_float_absolute_eq!(vec2(2.0, 5.0).tangent().dot(vec2(2.0, 5.0)), 0.0);
        assert_eq!(vec2(1.0, 1.0).add_scaled(vec2(2.0, -1.0), 0.5), vec2(2.0, 0.5));
        assert_eq!(vec2(0.0001, 2.0).epsilon_snap(), vec2(0.0, 2.0));
    }

    #[test]
    fn test_point_to_ray_distance() {
        let origin = Vec2::ZERO;
        assert_float_absolute_eq!(point_to_ray_distance(vec2(2.0, 1.5), origin, Vec2::X, 3.0), 1.5);
        assert!(point_to_ray_distance(vec2(-1.0, 0.0), origin, Vec2::X, 3.0).is_infinite());
        assert!(point_to_ray_distance(vec2(4.0, 0.0), origin, Vec2::X, 3.0).is_infinite());
        assert!(point_to_ray_distance(vec2(1.0, 0.0), origin, Vec2::ZERO, 3.0).is_infinite());
    }

    #[test]
    fn test_segments_intersect() {
        // crossing
        assert!(segments_intersect(
            vec2(0.0, 0.0),
            vec2(1.0, 1.0),
            2.0_f32.sqrt() * 2.0,
            vec2(0.0, 2.0),
            vec2(1.0, -1.0),
            2.0_f32.sqrt() * 2.0,
        ));
        // too short to reach
        assert!(!segments_intersect(
            vec2(0.0, 0.0),
            Vec2::X,
            0.5,
            vec2(1.0, -1.0),
            Vec2::Y,
            2.0,
        ));
        // parallel
        assert!(!segments_intersect(
            vec2(0.0, 0.0),
            Vec2::X,
            5.0,
            vec2(0.0, 1.0),
            Vec2::X,
            5.0,
        ));
        // degenerate direction
        assert!(!segments_intersect(
            vec2(0.0, 0.0),
            Vec2::ZERO,
            5.0,
            vec2(1.0, -1.0),
            Vec2::Y,
            2.0,
        ));
    }
}
