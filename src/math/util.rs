use super::{Point2d, Vector2d};
use cgmath::prelude::*;

/// Lines whose directions have a normalised cross product below this are parallel.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Rotates a vector 90 degrees clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// Computes the heading of a vector in radians.
///
/// Since the y-axis points down the screen, a heading of 0 points right
/// and a heading of π/2 points up.
pub fn heading(vec: Vector2d) -> f64 {
    -f64::atan2(vec.y, vec.x)
}

/// The unit vector pointing along the given heading. The inverse of [heading].
pub fn heading_dir(heading: f64) -> Vector2d {
    Vector2d::new(heading.cos(), -heading.sin())
}

/// Intersects the infinite lines through two pairs of points.
///
/// # Returns
/// The parameters `(t, u)` such that the intersection point is
/// `p1 + t * (p2 - p1)` and `q1 + u * (q2 - q1)`,
/// or `None` if the lines are parallel.
pub fn line_intersection(
    p1: Point2d,
    p2: Point2d,
    q1: Point2d,
    q2: Point2d,
) -> Option<(f64, f64)> {
    let r = p2 - p1;
    let s = q2 - q1;
    let denom = r.perp_dot(s);
    if denom.abs() <= PARALLEL_EPSILON * r.magnitude() * s.magnitude() {
        return None;
    }
    let qp = q1 - p1;
    Some((qp.perp_dot(s) / denom, qp.perp_dot(r) / denom))
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn headings_follow_screen_axes() {
        assert_approx_eq!(heading(Vector2d::new(1.0, 0.0)), 0.0);
        assert_approx_eq!(heading(Vector2d::new(0.0, -1.0)), FRAC_PI_2);
        assert_approx_eq!(heading(Vector2d::new(0.0, 1.0)), -FRAC_PI_2);
        assert_approx_eq!(heading(Vector2d::new(-1.0, 0.0)).abs(), PI);

        for h in [0.0, 0.3, FRAC_PI_2, 2.0, -1.0] {
            assert_approx_eq!(heading(heading_dir(h)), h);
        }
    }

    #[test]
    fn crossing_lines() {
        let (t, u) = line_intersection(
            Point2d::new(0.0, 5.0),
            Point2d::new(10.0, 5.0),
            Point2d::new(2.0, 0.0),
            Point2d::new(2.0, 20.0),
        )
        .unwrap();
        assert_approx_eq!(t, 0.2);
        assert_approx_eq!(u, 0.25);
    }

    #[test]
    fn parallel_lines() {
        let a = (Point2d::new(0.0, 0.0), Point2d::new(10.0, 0.0));
        let b = (Point2d::new(10.0, 4.0), Point2d::new(0.0, 4.0));
        assert!(line_intersection(a.0, a.1, b.0, b.1).is_none());
        assert!(line_intersection(a.0, a.1, a.1, a.0).is_none());
    }
}
