//! Spatial extents of a grid.

use serde::{Deserialize, Serialize};

/// Horizontal extent in grid coordinate units (degrees on spherical meshes,
/// metres or model units on flat meshes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing every `(x, y)` pair. Non-finite values are skipped.
    pub fn from_points(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let mut bbox: Option<Self> = None;
        for (&x, &y) in xs.iter().zip(ys) {
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => Self::new(x, y, x, y),
                Some(b) => Self::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            });
        }
        bbox
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Expand the box by `buffer` on every side.
    pub fn expand(&self, buffer: f64) -> Self {
        Self::new(
            self.min_x - buffer,
            self.min_y - buffer,
            self.max_x + buffer,
            self.max_y + buffer,
        )
    }
}

/// Full spatial domain of a field: horizontal box plus optional depth range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    pub horizontal: BoundingBox,
    /// `(shallowest, deepest)` level, `None` for surface-only grids.
    pub depth: Option<(f64, f64)>,
    /// Span of the periodic x axis, if any. Queries along x never leave the
    /// domain when this is set.
    pub periodic_x: Option<f64>,
}

impl DomainBounds {
    /// Whether a point lies inside the domain (periodic x always does).
    pub fn contains(&self, x: f64, y: f64, z: Option<f64>) -> bool {
        let x_ok = self.periodic_x.is_some()
            || (x >= self.horizontal.min_x && x <= self.horizontal.max_x);
        let y_ok = y >= self.horizontal.min_y && y <= self.horizontal.max_y;
        let z_ok = match (self.depth, z) {
            (Some((lo, hi)), Some(z)) => z >= lo && z <= hi,
            _ => true,
        };
        x_ok && y_ok && z_ok
    }

    /// Intersection of two domains, used for the common region of a vector.
    pub fn intersection(&self, other: &DomainBounds) -> Option<DomainBounds> {
        let horizontal = self.horizontal.intersection(&other.horizontal)?;
        let depth = match (self.depth, other.depth) {
            (Some((a0, a1)), Some((b0, b1))) => {
                let lo = a0.max(b0);
                let hi = a1.min(b1);
                if lo > hi {
                    return None;
                }
                Some((lo, hi))
            }
            (Some(d), None) | (None, Some(d)) => Some(d),
            (None, None) => None,
        };
        let periodic_x = match (self.periodic_x, other.periodic_x) {
            (Some(a), Some(b)) if (a - b).abs() < f64::EPSILON => Some(a),
            _ => None,
        };
        Some(DomainBounds {
            horizontal,
            depth,
            periodic_x,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let intersection = a.intersection(&b).unwrap();
        assert_eq!(intersection.min_x, 5.0);
        assert_eq!(intersection.min_y, 5.0);
        assert_eq!(intersection.max_x, 10.0);
        assert_eq!(intersection.max_y, 10.0);
    }

    #[test]
    fn test_from_points_skips_nan() {
        let bbox = BoundingBox::from_points(&[1.0, f64::NAN, -2.0], &[3.0, 0.0, 4.0]).unwrap();
        assert_eq!(bbox, BoundingBox::new(-2.0, 3.0, 1.0, 4.0));
        assert!(BoundingBox::from_points(&[], &[]).is_none());
    }

    #[test]
    fn test_domain_contains_periodic() {
        let domain = DomainBounds {
            horizontal: BoundingBox::new(0.0, -10.0, 350.0, 10.0),
            depth: Some((0.0, 100.0)),
            periodic_x: Some(360.0),
        };
        assert!(domain.contains(725.0, 0.0, Some(50.0)));
        assert!(!domain.contains(5.0, 20.0, None));
        assert!(!domain.contains(5.0, 0.0, Some(150.0)));
    }
}
