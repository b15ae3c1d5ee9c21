//! Points, coordinates and axis-aligned bounds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Scalar type of a space's coordinates.
///
/// Bounds arithmetic is done in `f64`; discrete spaces use whole numbers,
/// which `f64` represents exactly over any realistic domain.
pub trait Coord:
    Copy
    + PartialEq
    + PartialOrd
    + Debug
    + Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn to_f64(self) -> f64;

    /// Converts back from `f64`; discrete coordinates round down.
    fn from_f64(value: f64) -> Self;
}

impl Coord for i64 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.floor() as i64
    }
}

impl Coord for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// A location in a 2-D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

impl<T: Coord> Point<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn to_f64(&self) -> [f64; 2] {
        [self.x.to_f64(), self.y.to_f64()]
    }

    pub fn from_f64(coords: [f64; 2]) -> Self {
        Self {
            x: T::from_f64(coords[0]),
            y: T::from_f64(coords[1]),
        }
    }

    /// Largest per-axis distance to `other`.
    pub fn chebyshev_distance(&self, other: &Point<T>) -> f64 {
        let [ax, ay] = self.to_f64();
        let [bx, by] = other.to_f64();
        (ax - bx).abs().max((ay - by).abs())
    }
}

impl<T: Display> Display for Point<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Half-open axis-aligned rectangle: `origin <= p < origin + extent`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    origin: [f64; 2],
    extent: [f64; 2],
}

impl Bounds {
    pub fn new(origin: [f64; 2], extent: [f64; 2]) -> Self {
        Self { origin, extent }
    }

    pub fn origin(&self) -> [f64; 2] {
        self.origin
    }

    pub fn extent(&self) -> [f64; 2] {
        self.extent
    }

    /// Exclusive upper corner.
    pub fn end(&self) -> [f64; 2] {
        [self.origin[0] + self.extent[0], self.origin[1] + self.extent[1]]
    }

    pub fn contains<T: Coord>(&self, point: &Point<T>) -> bool {
        self.contains_f64(point.to_f64())
    }

    pub fn contains_f64(&self, coords: [f64; 2]) -> bool {
        let end = self.end();
        (0..2).all(|axis| coords[axis] >= self.origin[axis] && coords[axis] < end[axis])
    }

    pub fn is_empty(&self) -> bool {
        self.extent[0] <= 0.0 || self.extent[1] <= 0.0
    }

    /// Overlap of two rectangles, if any.
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let (a_end, b_end) = (self.end(), other.end());
        let mut origin = [0.0; 2];
        let mut extent = [0.0; 2];
        for axis in 0..2 {
            origin[axis] = self.origin[axis].max(other.origin[axis]);
            extent[axis] = a_end[axis].min(b_end[axis]) - origin[axis];
        }
        let overlap = Bounds::new(origin, extent);
        (!overlap.is_empty()).then_some(overlap)
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end = self.end();
        write!(
            f,
            "[{}, {})x[{}, {})",
            self.origin[0], end[0], self.origin[1], end[1]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_contains_is_half_open() {
        let b = Bounds::new([0.0, 0.0], [20.0, 30.0]);
        assert!(b.contains(&Point::new(0i64, 0)));
        assert!(b.contains(&Point::new(19i64, 29)));
        assert!(!b.contains(&Point::new(20i64, 0)));
        assert!(!b.contains(&Point::new(0i64, 30)));
        assert!(b.contains(&Point::new(19.999f64, 0.0)));
        assert!(!b.contains(&Point::new(-0.001f64, 0.0)));
    }

    #[test]
    fn test_intersection() {
        let a = Bounds::new([0.0, 0.0], [10.0, 10.0]);
        let b = Bounds::new([8.0, 0.0], [10.0, 2.0]);
        assert_eq!(a.intersection(&b), Some(Bounds::new([8.0, 0.0], [2.0, 2.0])));

        let far = Bounds::new([10.0, 0.0], [5.0, 5.0]);
        assert_eq!(a.intersection(&far), None);
    }

    #[test]
    fn test_discrete_from_f64_rounds_down() {
        assert_eq!(Point::<i64>::from_f64([2.9, -0.5]), Point::new(2, -1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Point::new(1i64, 2).to_string(), "(1, 2)");
        assert_eq!(Bounds::new([0.0, 0.0], [2.0, 3.0]).to_string(), "[0, 2)x[0, 3)");
    }

    proptest! {
        #[test]
        fn test_intersection_is_contained_in_both(
            ax in -50i32..50, ay in -50i32..50, aw in 1i32..40, ah in 1i32..40,
            bx in -50i32..50, by in -50i32..50, bw in 1i32..40, bh in 1i32..40,
            px in -60i64..100, py in -60i64..100,
        ) {
            let (ax, ay, aw, ah) = (ax as f64, ay as f64, aw as f64, ah as f64);
            let (bx, by, bw, bh) = (bx as f64, by as f64, bw as f64, bh as f64);
            let a = Bounds::new([ax, ay], [aw, ah]);
            let b = Bounds::new([bx, by], [bw, bh]);
            let p = Point::new(px, py).to_f64();
            let in_both = a.contains_f64(p) && b.contains_f64(p);
            let in_overlap = a.intersection(&b).is_some_and(|o| o.contains_f64(p));
            prop_assert_eq!(in_both, in_overlap);
        }
    }
}
