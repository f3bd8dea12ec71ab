// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! Two-circle collision helpers.
//!
//! These are degenerate utilities, not part of the interpreter core: a
//! host calls them against whatever pairs of bullets (or a bullet and a
//! player) it cares about.

/// Anything with a position and a collision radius.
pub trait Circle {
    /// Current X position.
    fn x(&self) -> f32;
    /// Current Y position.
    fn y(&self) -> f32;
    /// Collision radius.
    fn radius(&self) -> f32;
    /// X position on the previous frame. Defaults to the current position
    /// (a stationary circle never "swept" anywhere).
    fn prev_x(&self) -> f32 {
        self.x()
    }
    /// Y position on the previous frame. Defaults to the current position.
    fn prev_y(&self) -> f32 {
        self.y()
    }
}

/// True if two circles currently overlap (boundary inclusive).
pub fn overlaps<A: Circle, B: Circle>(a: &A, b: &B) -> bool {
    let dx = a.x() - b.x();
    let dy = a.y() - b.y();
    let radius = a.radius() + b.radius();
    dx * dx + dy * dy <= radius * radius
}

/// True if two moving circles collided at any point between the previous
/// and current frame.
///
/// Treats `b`'s motion relative to `a` as a line segment and finds the
/// closest point on it to `a`'s start, the standard swept-circle-vs-point
/// reduction.
pub fn collides<A: Circle, B: Circle>(a: &A, b: &B) -> bool {
    let radius = a.radius() + b.radius();

    let dir_x = a.prev_x() + (b.x() - a.x()) - b.prev_x();
    let dir_y = a.prev_y() + (b.y() - a.y()) - b.prev_y();

    let diff_x = a.prev_x() - b.prev_x();
    let diff_y = a.prev_y() - b.prev_y();

    if dir_x.abs() < 0.0001 && dir_y.abs() < 0.0001 {
        return diff_x * diff_x + diff_y * diff_y < radius * radius;
    }

    let t = (diff_x * dir_x + diff_y * dir_y) / (dir_x * dir_x + dir_y * dir_y);
    let t = t.clamp(0., 1.);

    let dist_x = a.prev_x() - (b.prev_x() + dir_x * t);
    let dist_y = a.prev_y() - (b.prev_y() + dir_y * t);

    dist_x * dist_x + dist_y * dist_y <= radius * radius
}

#[cfg(test)]
mod test {
    use super::*;

    struct Point {
        x: f32,
        y: f32,
        px: f32,
        py: f32,
        radius: f32,
    }

    impl Circle for Point {
        fn x(&self) -> f32 {
            self.x
        }

        fn y(&self) -> f32 {
            self.y
        }

        fn radius(&self) -> f32 {
            self.radius
        }

        fn prev_x(&self) -> f32 {
            self.px
        }

        fn prev_y(&self) -> f32 {
            self.py
        }
    }

    fn stationary(x: f32, y: f32, radius: f32) -> Point {
        Point {
            x,
            y,
            px: x,
            py: y,
            radius,
        }
    }

    #[test]
    fn test_overlaps_boundary_inclusive() {
        let a = stationary(0., 0., 1.);
        let b = stationary(2., 0., 1.);
        assert!(overlaps(&a, &b));
    }

    #[test]
    fn test_overlaps_just_past_boundary() {
        let a = stationary(0., 0., 1.);
        let b = stationary(2.001, 0., 1.);
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn test_collides_crossing_paths() {
        let a = Point {
            x: 0.,
            y: 0.,
            px: 100.,
            py: 100.,
            radius: 1.,
        };
        let b = Point {
            x: 0.,
            y: 100.,
            px: 100.,
            py: 0.,
            radius: 1.,
        };
        assert!(collides(&a, &b));
    }

    #[test]
    fn test_collides_stationary_uses_overlaps() {
        let a = stationary(0., 0., 1.);
        let b = stationary(2., 0., 1.);
        assert!(!collides(&a, &b));
        let b = stationary(1.5, 0., 1.);
        assert!(collides(&a, &b));
    }
}
