//! Planar polygon predicates for restricted zones
//!
//! Image-space coordinates (pixels). A [`Polygon`] wraps a `geo` polygon that
//! passed validation at construction, so the predicates never see an invalid
//! shape.

use crate::domain::types::{BBox, Point};
use geo::{coord, Area, Contains, Coord, Intersects, LineString, Rect, Validation};

/// Validated simple polygon
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<Point>,
    shape: geo::Polygon<f64>,
    area: f64,
}

impl Polygon {
    /// Build a polygon from its vertices (implicitly closed).
    ///
    /// A trailing vertex equal to the first and repeated consecutive vertices
    /// are ignored. Fails with a human-readable reason when fewer than three
    /// distinct vertices remain, a coordinate is not finite, the ring is not
    /// simple or the area is zero.
    pub fn new(points: &[Point]) -> Result<Self, String> {
        if points.len() < 3 {
            return Err(format!("polygon needs at least 3 points, got {}", points.len()));
        }
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err("polygon has non-finite coordinates".to_string());
        }

        let mut ring: Vec<Point> = Vec::with_capacity(points.len());
        for &p in points {
            if ring.last() != Some(&p) {
                ring.push(p);
            }
        }
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(format!("polygon needs at least 3 distinct points, got {}", ring.len()));
        }

        let exterior: LineString<f64> = ring.iter().map(|&[x, y]| coord! { x: x, y: y }).collect();
        let shape = geo::Polygon::new(exterior, Vec::new());
        if let Some(err) = shape.validation_errors().first() {
            return Err(format!("invalid polygon ring: {err}"));
        }

        let area = shape.unsigned_area();
        // Relative to the extent, so tiny but valid zones are kept
        let (min, max) = extent(&ring);
        if area <= f64::EPSILON * (max[0] - min[0]) * (max[1] - min[1]) {
            return Err("polygon has zero area".to_string());
        }

        Ok(Self { ring, shape, area })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.ring
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// True if the point lies on an edge
    pub fn on_boundary(&self, p: Point) -> bool {
        self.shape.exterior().intersects(&to_coord(p))
    }

    /// Strict containment: boundary points are outside
    pub fn contains(&self, p: Point) -> bool {
        self.shape.contains(&to_coord(p))
    }

    /// Closed containment: boundary points are inside
    pub fn covers(&self, p: Point) -> bool {
        self.shape.intersects(&to_coord(p))
    }

    /// True if the polygon and the (closed) box share at least one point;
    /// touching edges count.
    pub fn intersects_bbox(&self, bbox: &BBox) -> bool {
        let (min, max) = bbox.min_max();
        self.shape.intersects(&Rect::new(to_coord(min), to_coord(max)))
    }
}

#[inline]
fn to_coord([x, y]: Point) -> Coord<f64> {
    coord! { x: x, y: y }
}

fn extent(ring: &[Point]) -> (Point, Point) {
    ring.iter().fold(
        ([f64::INFINITY, f64::INFINITY], [f64::NEG_INFINITY, f64::NEG_INFINITY]),
        |(lo, hi), &[x, y]| ([lo[0].min(x), lo[1].min(y)], [hi[0].max(x), hi[1].max(y)]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(&[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]]).unwrap()
    }

    #[test]
    fn test_area() {
        assert!((square().area() - 10_000.0).abs() < 1e-6);
        let tri = Polygon::new(&[[0.0, 0.0], [4.0, 0.0], [0.0, 3.0]]).unwrap();
        assert!((tri.area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_accepts_tiny_triangle() {
        let tri = Polygon::new(&[[0.0, 0.0], [0.00004, 0.0], [0.0, 0.00004]]).unwrap();
        assert!(tri.area() > 0.0);
        assert!(tri.contains([0.00001, 0.00001]));
        assert!(!tri.contains([0.00003, 0.00003]));
    }

    #[test]
    fn test_rejects_too_few_points() {
        assert!(Polygon::new(&[[0.0, 0.0], [1.0, 1.0]]).is_err());
        // Closing duplicate does not count as a distinct vertex
        assert!(Polygon::new(&[[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = Polygon::new(&[[0.0, 0.0], [f64::NAN, 0.0], [0.0, 1.0]]).unwrap_err();
        assert!(err.contains("non-finite"));
    }

    #[test]
    fn test_rejects_bowtie_as_self_intersection() {
        // Signed area is zero: the crossing must be reported, not the area
        let err = Polygon::new(&[[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0]]).unwrap_err();
        assert!(err.starts_with("invalid polygon ring"), "{err}");
        assert!(err.contains("self-intersection"), "{err}");
    }

    #[test]
    fn test_rejects_collinear() {
        assert!(Polygon::new(&[[0.0, 0.0], [5.0, 0.0], [10.0, 0.0]]).is_err());
    }

    #[test]
    fn test_rejects_spike() {
        // Edge runs out to (20, 0) and back along itself
        let pts = [[0.0, 0.0], [20.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        assert!(Polygon::new(&pts).is_err());
    }

    #[test]
    fn test_accepts_closed_ring_and_concave() {
        let closed = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]];
        assert_eq!(Polygon::new(&closed).unwrap().vertices().len(), 4);

        let l_shape = [[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [5.0, 5.0], [5.0, 10.0], [0.0, 10.0]];
        let poly = Polygon::new(&l_shape).unwrap();
        assert!(poly.contains([2.0, 8.0]));
        assert!(!poly.contains([8.0, 8.0]));
    }

    #[test]
    fn test_contains_is_strict() {
        let poly = square();
        assert!(poly.contains([50.0, 50.0]));
        assert!(poly.contains([99.9, 50.0]));
        assert!(!poly.contains([100.1, 50.0]));
        // Boundary and vertices are outside
        assert!(!poly.contains([100.0, 50.0]));
        assert!(!poly.contains([0.0, 0.0]));
        assert!(poly.covers([100.0, 50.0]));
        assert!(poly.on_boundary([100.0, 50.0]));
        assert!(!poly.on_boundary([50.0, 50.0]));
    }

    #[test]
    fn test_bbox_straddling_boundary() {
        let poly = square();
        // Center (110, 50) is outside but the box crosses x = 100
        let bbox = BBox::new(90.0, 40.0, 130.0, 60.0);
        assert!(!poly.contains(bbox.center()));
        assert!(poly.intersects_bbox(&bbox));
    }

    #[test]
    fn test_bbox_touching_edge_counts() {
        let poly = square();
        assert!(poly.intersects_bbox(&BBox::new(100.0, 10.0, 120.0, 20.0)));
        assert!(!poly.intersects_bbox(&BBox::new(100.5, 10.0, 120.0, 20.0)));
    }

    #[test]
    fn test_bbox_containing_polygon_and_inside_polygon() {
        let poly = square();
        assert!(poly.intersects_bbox(&BBox::new(-10.0, -10.0, 200.0, 200.0)));
        assert!(poly.intersects_bbox(&BBox::new(10.0, 10.0, 20.0, 20.0)));
        // Corners given in reverse order
        assert!(poly.intersects_bbox(&BBox::new(20.0, 20.0, 10.0, 10.0)));
    }

    #[test]
    fn test_bbox_crossing_without_vertices_inside() {
        // Wide box crossing the square: no vertex of either shape lies inside
        // the other, only edges cross
        let bbox = BBox::new(-10.0, 40.0, 110.0, 60.0);
        let poly = square();
        assert!(!bbox.corners().iter().any(|&c| poly.covers(c)));
        assert!(poly.intersects_bbox(&bbox));
    }
}
