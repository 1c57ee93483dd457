//! 2D and 3D line segments and the geometric predicates used by linkers,
//! fitters and the reprojection filter.

use crate::{undirected_angle_deg, undirected_angle_deg_2d, Mat3, Pt2, Pt3, Real, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Segments shorter than this are treated as degenerate.
pub const DEGENERATE_LENGTH: Real = 1e-9;

/// Ordered pair of pixel endpoints in one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment2d {
    pub p0: Pt2,
    pub p1: Pt2,
}

impl Segment2d {
    pub fn new(p0: Pt2, p1: Pt2) -> Self {
        Self { p0, p1 }
    }

    pub fn from_coords(x0: Real, y0: Real, x1: Real, y1: Real) -> Self {
        Self::new(Pt2::new(x0, y0), Pt2::new(x1, y1))
    }

    pub fn length(&self) -> Real {
        (self.p1 - self.p0).norm()
    }

    pub fn direction(&self) -> Vec2 {
        self.p1 - self.p0
    }

    pub fn midpoint(&self) -> Pt2 {
        nalgebra::center(&self.p0, &self.p1)
    }

    /// Undirected angle to another segment, in degrees.
    pub fn angle_to(&self, other: &Segment2d) -> Real {
        undirected_angle_deg_2d(&self.direction(), &other.direction())
    }

    /// Distance from `p` to the infinite line through this segment.
    pub fn line_distance(&self, p: &Pt2) -> Real {
        let d = self.direction();
        let len = d.norm();
        if len < DEGENERATE_LENGTH {
            return (p - self.p0).norm();
        }
        let v = p - self.p0;
        (d.x * v.y - d.y * v.x).abs() / len
    }

    /// Largest endpoint distance of `other` to this segment's infinite line.
    pub fn max_endpoint_distance(&self, other: &Segment2d) -> Real {
        self.line_distance(&other.p0)
            .max(self.line_distance(&other.p1))
    }

    /// Overlap of `other` projected onto this segment, as a fraction of the
    /// shorter of the two lengths.
    pub fn overlap_ratio(&self, other: &Segment2d) -> Real {
        let d = self.direction();
        let len = d.norm();
        if len < DEGENERATE_LENGTH || other.length() < DEGENERATE_LENGTH {
            return 0.0;
        }
        let u = d / len;
        let a = (other.p0 - self.p0).dot(&u);
        let b = (other.p1 - self.p0).dot(&u);
        let overlap = (a.max(b).min(len) - a.min(b).max(0.0)).max(0.0);
        overlap / len.min(other.length())
    }

    pub fn is_finite(&self) -> bool {
        self.p0.iter().chain(self.p1.iter()).all(|v| v.is_finite())
    }
}

/// Ordered pair of world endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment3d {
    pub p0: Pt3,
    pub p1: Pt3,
}

impl Segment3d {
    pub fn new(p0: Pt3, p1: Pt3) -> Self {
        Self { p0, p1 }
    }

    pub fn length(&self) -> Real {
        (self.p1 - self.p0).norm()
    }

    pub fn direction(&self) -> Vec3 {
        self.p1 - self.p0
    }

    pub fn midpoint(&self) -> Pt3 {
        nalgebra::center(&self.p0, &self.p1)
    }

    pub fn is_finite(&self) -> bool {
        self.p0.iter().chain(self.p1.iter()).all(|v| v.is_finite())
    }

    pub fn is_degenerate(&self) -> bool {
        !self.is_finite() || self.length() < DEGENERATE_LENGTH
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.p1, self.p0)
    }

    pub fn angle_to(&self, other: &Segment3d) -> Real {
        undirected_angle_deg(&self.direction(), &other.direction())
    }

    /// Infinite supporting line, `None` for degenerate segments.
    pub fn line(&self) -> Option<InfiniteLine3> {
        InfiniteLine3::through(&self.p0, &self.p1)
    }

    /// Symmetric perpendicular distance: the largest distance of any endpoint
    /// to the other segment's infinite line.
    pub fn perpendicular_distance(&self, other: &Segment3d) -> Real {
        let (Some(la), Some(lb)) = (self.line(), other.line()) else {
            return Real::INFINITY;
        };
        la.distance_to_point(&other.p0)
            .max(la.distance_to_point(&other.p1))
            .max(lb.distance_to_point(&self.p0))
            .max(lb.distance_to_point(&self.p1))
    }

    /// Overlap of `other` projected onto this segment's direction, as a
    /// fraction of the shorter length.
    pub fn overlap_ratio(&self, other: &Segment3d) -> Real {
        let len = self.length();
        if len < DEGENERATE_LENGTH || other.length() < DEGENERATE_LENGTH {
            return 0.0;
        }
        let u = self.direction() / len;
        let a = (other.p0 - self.p0).dot(&u);
        let b = (other.p1 - self.p0).dot(&u);
        let overlap = (a.max(b).min(len) - a.min(b).max(0.0)).max(0.0);
        overlap / len.min(other.length())
    }

    /// Length-weighted aggregate of several segments believed to be one line.
    ///
    /// Direction is the dominant eigenvector of the sign-invariant scatter
    /// `sum w d d^T`, anchored at the weighted centroid of midpoints, with the
    /// extent spanning the projections of all member endpoints. The result is
    /// oriented like the first non-degenerate member.
    pub fn aggregate<'a>(segments: impl IntoIterator<Item = &'a Segment3d>) -> Option<Segment3d> {
        let members: Vec<&Segment3d> = segments
            .into_iter()
            .filter(|s| !s.is_degenerate())
            .collect();
        let first = *members.first()?;
        if members.len() == 1 {
            return Some(*first);
        }

        let mut scatter = Mat3::zeros();
        let mut anchor = Vec3::zeros();
        let mut total = 0.0;
        for seg in &members {
            let len = seg.length();
            let d = seg.direction() / len;
            scatter += d * d.transpose() * len;
            anchor += seg.midpoint().coords * len;
            total += len;
        }
        let anchor = Pt3::from(anchor / total);
        let eig = scatter.symmetric_eigen();
        let (imax, _) = eig.eigenvalues.argmax();
        let mut dir: Vec3 = eig.eigenvectors.column(imax).into_owned();
        if dir.dot(&first.direction()) < 0.0 {
            dir = -dir;
        }

        let (mut tmin, mut tmax) = (Real::INFINITY, Real::NEG_INFINITY);
        for seg in &members {
            for p in [seg.p0, seg.p1] {
                let t = (p - anchor).dot(&dir);
                tmin = tmin.min(t);
                tmax = tmax.max(t);
            }
        }
        let out = Segment3d::new(anchor + dir * tmin, anchor + dir * tmax);
        (!out.is_degenerate()).then_some(out)
    }
}

/// Infinite 3D line `point + s * direction`, with unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfiniteLine3 {
    pub point: Pt3,
    pub direction: Vec3,
}

impl InfiniteLine3 {
    pub fn through(a: &Pt3, b: &Pt3) -> Option<Self> {
        let d = b - a;
        let len = d.norm();
        if !(len > DEGENERATE_LENGTH) {
            return None;
        }
        Some(Self {
            point: *a,
            direction: d / len,
        })
    }

    /// Total least-squares line through a point cloud (centroid + principal axis).
    pub fn fit_points(points: &[Pt3]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as Real;
        let centroid = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;
        let mut cov = Mat3::zeros();
        for p in points {
            let d = p.coords - centroid;
            cov += d * d.transpose();
        }
        let eig = cov.symmetric_eigen();
        let (imax, lmax) = eig.eigenvalues.argmax();
        if !(lmax > 0.0) {
            return None;
        }
        let direction: Vec3 = eig.eigenvectors.column(imax).into_owned();
        Some(Self {
            point: Pt3::from(centroid),
            direction: direction.normalize(),
        })
    }

    pub fn distance_to_point(&self, p: &Pt3) -> Real {
        let v = p - self.point;
        (v - self.direction * v.dot(&self.direction)).norm()
    }

    pub fn project_point(&self, p: &Pt3) -> Pt3 {
        self.point + self.direction * (p - self.point).dot(&self.direction)
    }

    /// Point on this line closest to the ray `origin + t * ray`, `t > 0`.
    ///
    /// Returns `None` when the ray is (nearly) parallel to the line or the
    /// closest approach lies behind the ray origin.
    pub fn closest_point_to_ray(&self, origin: &Pt3, ray: &Vec3) -> Option<Pt3> {
        let d = self.direction;
        let r = ray.normalize();
        let w0 = self.point - origin;
        let b = d.dot(&r);
        let denom = 1.0 - b * b;
        if denom < 1e-10 {
            return None;
        }
        let dd = d.dot(&w0);
        let e = r.dot(&w0);
        let s = (b * e - dd) / denom;
        let t = (e - b * dd) / denom;
        if t <= 0.0 {
            return None;
        }
        Some(self.point + d * s)
    }
}

/// Outcome of lifting one 2D segment into 3D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "segment", rename_all = "snake_case")]
pub enum SegmentFit {
    Fitted(Segment3d),
    Failed,
}

impl SegmentFit {
    pub fn segment(&self) -> Option<&Segment3d> {
        match self {
            SegmentFit::Fitted(seg) => Some(seg),
            SegmentFit::Failed => None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, SegmentFit::Fitted(_))
    }

    /// Interpret a raw endpoint pair where an all-zero pair means "no fit".
    pub fn from_legacy_endpoints(p0: Pt3, p1: Pt3) -> Self {
        if p0.coords.iter().chain(p1.coords.iter()).all(|v| *v == 0.0) {
            SegmentFit::Failed
        } else {
            SegmentFit::Fitted(Segment3d::new(p0, p1))
        }
    }
}

impl From<Option<Segment3d>> for SegmentFit {
    fn from(value: Option<Segment3d>) -> Self {
        value.map_or(SegmentFit::Failed, SegmentFit::Fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_and_distance_2d() {
        let a = Segment2d::from_coords(0.0, 0.0, 10.0, 0.0);
        let b = Segment2d::from_coords(5.0, 1.0, 15.0, 1.0);
        assert!((a.overlap_ratio(&b) - 0.5).abs() < 1e-12);
        assert!((a.max_endpoint_distance(&b) - 1.0).abs() < 1e-12);
        assert!(a.angle_to(&b) < 1e-9);
        let reversed = Segment2d::new(b.p1, b.p0);
        assert!(a.angle_to(&reversed) < 1e-9);
        let disjoint = Segment2d::from_coords(20.0, 0.0, 30.0, 0.0);
        assert_eq!(a.overlap_ratio(&disjoint), 0.0);
    }

    #[test]
    fn perpendicular_distance_is_symmetric() {
        let a = Segment3d::new(Pt3::new(0.0, 0.0, 0.0), Pt3::new(1.0, 0.0, 0.0));
        let b = Segment3d::new(Pt3::new(0.0, 0.1, 0.0), Pt3::new(1.0, 0.1, 0.0));
        assert!((a.perpendicular_distance(&b) - 0.1).abs() < 1e-12);
        assert!((b.perpendicular_distance(&a) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn aggregate_ignores_member_orientation() {
        let a = Segment3d::new(Pt3::new(0.0, 0.0, 1.0), Pt3::new(2.0, 0.0, 1.0));
        let b = Segment3d::new(Pt3::new(3.0, 0.0, 1.0), Pt3::new(1.0, 0.0, 1.0));
        let agg = Segment3d::aggregate([&a, &b]).unwrap();
        assert!((agg.p0 - Pt3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
        assert!((agg.p1 - Pt3::new(3.0, 0.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn aggregate_of_nothing_is_none() {
        let degenerate = Segment3d::new(Pt3::origin(), Pt3::origin());
        assert!(Segment3d::aggregate([&degenerate]).is_none());
        assert!(Segment3d::aggregate(std::iter::empty()).is_none());
    }

    #[test]
    fn closest_point_to_ray_behind_origin_is_rejected() {
        let line = InfiniteLine3::through(&Pt3::new(-1.0, 0.0, 5.0), &Pt3::new(1.0, 0.0, 5.0))
            .unwrap();
        let hit = line
            .closest_point_to_ray(&Pt3::origin(), &Vec3::new(0.1, 0.0, 1.0))
            .unwrap();
        assert!((hit - Pt3::new(0.5, 0.0, 5.0)).norm() < 1e-9);
        assert!(line
            .closest_point_to_ray(&Pt3::origin(), &Vec3::new(0.0, 0.0, -1.0))
            .is_none());
        assert!(line
            .closest_point_to_ray(&Pt3::origin(), &Vec3::new(1.0, 0.0, 0.0))
            .is_none());
    }

    #[test]
    fn segment_fit_serializes_with_status_tag() {
        let fit = SegmentFit::Fitted(Segment3d::new(Pt3::origin(), Pt3::new(1.0, 0.0, 0.0)));
        let json = serde_json::to_string(&fit).unwrap();
        assert!(json.contains("\"status\":\"fitted\""));
        let back: SegmentFit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fit);
        let failed = serde_json::to_string(&SegmentFit::Failed).unwrap();
        assert_eq!(failed, "{\"status\":\"failed\"}");
    }

    #[test]
    fn legacy_zero_pair_is_failed() {
        let fit = SegmentFit::from_legacy_endpoints(Pt3::origin(), Pt3::origin());
        assert_eq!(fit, SegmentFit::Failed);
    }
}
