//! What happens to points that leave the global domain.

use crate::error::{Result, RuntimeError};
use crate::space::geometry::{Bounds, Coord, Point};
use serde::{Deserialize, Serialize};

/// Border rule applied to every point before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BorderKind {
    /// Points outside the global bounds are rejected
    #[default]
    Strict,
    /// Each axis wraps around
    Periodic,
}

impl BorderKind {
    /// Maps `point` into `global`.
    ///
    /// # Errors
    /// `OutOfBounds` when a strict border sees a point outside `global`.
    pub fn transform<T: Coord>(self, global: &Bounds, point: &Point<T>) -> Result<Point<T>> {
        if global.contains(point) {
            return Ok(*point);
        }
        match self {
            BorderKind::Strict => Err(RuntimeError::out_of_bounds(point, global)),
            BorderKind::Periodic => {
                let origin = global.origin();
                let extent = global.extent();
                let p = point.to_f64();
                let mut wrapped = [0.0; 2];
                for axis in 0..2 {
                    let offset = (p[axis] - origin[axis]).rem_euclid(extent[axis]);
                    wrapped[axis] = origin[axis] + offset;
                    // rem_euclid of a tiny negative offset rounds up to the extent itself
                    if wrapped[axis] >= origin[axis] + extent[axis] {
                        wrapped[axis] = origin[axis];
                    }
                }
                Ok(Point::from_f64(wrapped))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn domain() -> Bounds {
        Bounds::new([0.0, 0.0], [40.0, 60.0])
    }

    #[test]
    fn test_strict_rejects_outside_points() {
        let border = BorderKind::Strict;
        let inside = border.transform(&domain(), &Point::new(39i64, 59)).unwrap();
        assert_eq!(inside, Point::new(39, 59));
        let err = border.transform(&domain(), &Point::new(40i64, 0)).unwrap_err();
        assert!(matches!(err, RuntimeError::OutOfBounds { .. }));
    }

    #[test]
    fn test_periodic_wraps_discrete() {
        let border = BorderKind::Periodic;
        let wrap = |x: i64, y: i64| border.transform(&domain(), &Point::new(x, y)).unwrap();
        assert_eq!(wrap(40, -1), Point::new(0, 59));
        assert_eq!(wrap(-41, 125), Point::new(39, 5));
    }

    #[test]
    fn test_periodic_wraps_continuous() {
        let wrapped = BorderKind::Periodic
            .transform(&domain(), &Point::new(41.5f64, -0.25))
            .unwrap();
        assert_relative_eq!(wrapped.x, 1.5);
        assert_relative_eq!(wrapped.y, 59.75);
    }

    #[test]
    fn test_periodic_wrap_stays_half_open() {
        let global = domain();
        let wrapped = BorderKind::Periodic
            .transform(&global, &Point::new(-1e-17f64, 5.0))
            .unwrap();
        assert!(global.contains(&wrapped));
        assert_relative_eq!(wrapped.x, 0.0);
        assert_relative_eq!(wrapped.y, 5.0);
    }
}
