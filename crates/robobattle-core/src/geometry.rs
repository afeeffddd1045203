//! Axis-aligned boxes, segment tests and heading helpers.
//!
//! Headings follow the battlefield convention: 0 points north (+y) and angles
//! grow clockwise, so a unit step is `(sin h, cos h)`.

use std::f64::consts::{PI, TAU};

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum corner
    pub min: DVec2,
    /// Maximum corner
    pub max: DVec2,
}

impl Rect {
    /// Rectangle of the given size centered on `center`.
    #[must_use]
    pub fn centered(center: DVec2, width: f64, height: f64) -> Self {
        let half = DVec2::new(width / 2.0, height / 2.0);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// True when the two rectangles overlap with positive area.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// True when `point` lies inside or on the edge.
    #[must_use]
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// True when the segment `a`-`b` touches the rectangle.
    ///
    /// Liang-Barsky clipping against the four edges.
    #[must_use]
    pub fn intersects_segment(&self, a: DVec2, b: DVec2) -> bool {
        let d = b - a;
        let mut t0 = 0.0_f64;
        let mut t1 = 1.0_f64;
        let checks = [
            (-d.x, a.x - self.min.x),
            (d.x, self.max.x - a.x),
            (-d.y, a.y - self.min.y),
            (d.y, self.max.y - a.y),
        ];
        for (p, q) in checks {
            if p == 0.0 {
                if q < 0.0 {
                    return false;
                }
            } else {
                let r = q / p;
                if p < 0.0 {
                    t0 = t0.max(r);
                } else {
                    t1 = t1.min(r);
                }
                if t0 > t1 {
                    return false;
                }
            }
        }
        true
    }
}

/// True when segments `a1`-`a2` and `b1`-`b2` cross or touch.
#[must_use]
pub fn segments_intersect(a1: DVec2, a2: DVec2, b1: DVec2, b2: DVec2) -> bool {
    fn orient(p: DVec2, q: DVec2, r: DVec2) -> f64 {
        (q - p).perp_dot(r - p)
    }
    fn on_segment(p: DVec2, q: DVec2, r: DVec2) -> bool {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    }

    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// Unit direction for a heading.
#[must_use]
pub fn heading_vector(heading: f64) -> DVec2 {
    DVec2::new(heading.sin(), heading.cos())
}

/// Normalizes an absolute angle into `[0, 2π)`.
#[must_use]
pub fn normal_absolute_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Normalizes a relative angle into `[-π, π)`.
#[must_use]
pub fn normal_relative_angle(angle: f64) -> f64 {
    let a = (angle + PI).rem_euclid(TAU) - PI;
    if a >= PI {
        -PI
    } else {
        a
    }
}

/// Absolute heading from `from` towards `to`.
#[must_use]
pub fn bearing(from: DVec2, to: DVec2) -> f64 {
    let d = to - from;
    normal_absolute_angle(d.x.atan2(d.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod rect_tests {
        use super::*;

        #[test]
        fn centered_rect_has_expected_corners() {
            let r = Rect::centered(DVec2::new(50.0, 50.0), 36.0, 36.0);
            assert_eq!(r.min, DVec2::new(32.0, 32.0));
            assert_eq!(r.max, DVec2::new(68.0, 68.0));
        }

        #[test]
        fn touching_rects_do_not_intersect() {
            let a = Rect::centered(DVec2::new(0.0, 0.0), 2.0, 2.0);
            let b = Rect::centered(DVec2::new(2.0, 0.0), 2.0, 2.0);
            assert!(!a.intersects(&b));
            let c = Rect::centered(DVec2::new(1.9, 0.0), 2.0, 2.0);
            assert!(a.intersects(&c));
        }

        #[test]
        fn segment_through_rect() {
            let r = Rect::centered(DVec2::new(10.0, 10.0), 4.0, 4.0);
            assert!(r.intersects_segment(DVec2::new(0.0, 10.0), DVec2::new(20.0, 10.0)));
            assert!(r.intersects_segment(DVec2::new(10.0, 10.0), DVec2::new(10.0, 10.0)));
            assert!(!r.intersects_segment(DVec2::new(0.0, 0.0), DVec2::new(5.0, 0.0)));
            assert!(!r.intersects_segment(DVec2::new(0.0, 20.0), DVec2::new(20.0, 20.0)));
        }

        #[test]
        fn segment_ending_inside_rect() {
            let r = Rect::centered(DVec2::new(200.0, 200.0), 36.0, 36.0);
            assert!(r.intersects_segment(DVec2::new(177.0, 200.0), DVec2::new(188.0, 200.0)));
        }
    }

    mod segment_tests {
        use super::*;

        #[test]
        fn crossing_segments() {
            assert!(segments_intersect(
                DVec2::new(0.0, 0.0),
                DVec2::new(10.0, 10.0),
                DVec2::new(0.0, 10.0),
                DVec2::new(10.0, 0.0),
            ));
        }

        #[test]
        fn parallel_segments() {
            assert!(!segments_intersect(
                DVec2::new(0.0, 0.0),
                DVec2::new(10.0, 0.0),
                DVec2::new(0.0, 1.0),
                DVec2::new(10.0, 1.0),
            ));
        }

        #[test]
        fn collinear_overlap() {
            assert!(segments_intersect(
                DVec2::new(0.0, 0.0),
                DVec2::new(10.0, 0.0),
                DVec2::new(5.0, 0.0),
                DVec2::new(15.0, 0.0),
            ));
        }
    }

    mod angle_tests {
        use super::*;

        #[test]
        fn heading_zero_points_north() {
            let v = heading_vector(0.0);
            assert!(v.x.abs() < 1e-12);
            assert!((v.y - 1.0).abs() < 1e-12);

            let east = heading_vector(PI / 2.0);
            assert!((east.x - 1.0).abs() < 1e-12);
        }

        #[test]
        fn normalization() {
            assert!((normal_absolute_angle(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
            assert!((normal_relative_angle(1.5 * PI) + PI / 2.0).abs() < 1e-12);
            assert!(normal_absolute_angle(TAU).abs() < 1e-12);
        }

        #[test]
        fn bearing_east() {
            let b = bearing(DVec2::new(0.0, 0.0), DVec2::new(10.0, 0.0));
            assert!((b - PI / 2.0).abs() < 1e-12);
        }
    }
}
