//! Planar synthetic scenes with exact depth.

use crate::{
    CameraImage, CameraView, DepthMap, FxFyCxCySkew, ImageCollection, ImageId, Mat3, NeighborMap,
    Pt2, Pt3, Real, Segment2d, Segment3d, Vec3,
};
use anyhow::{ensure, Result};
use std::collections::BTreeMap;

/// Plane `normal . x + offset = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub offset: Real,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn through(point: &Pt3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            offset: -normal.dot(&point.coords),
        }
    }

    /// Ray parameter `t > 0` of the intersection with `origin + t * dir`.
    pub fn intersect_ray(&self, origin: &Pt3, dir: &Vec3) -> Option<Real> {
        let denom = self.normal.dot(dir);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = -(self.normal.dot(&origin.coords) + self.offset) / denom;
        (t > 0.0).then_some(t)
    }
}

/// Build a view at `center` looking at `target`. `up` is the world direction
/// that should appear upwards in the image (image `y` grows downwards).
pub fn look_at(
    k: FxFyCxCySkew,
    center: Pt3,
    target: Pt3,
    up: Vec3,
    width: usize,
    height: usize,
) -> Result<CameraView> {
    let z = (target - center).normalize();
    let x = z.cross(&up);
    ensure!(x.norm() > 1e-9, "up vector is parallel to the viewing direction");
    let x = x.normalize();
    let y = z.cross(&x);
    let rotation = Mat3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
    let translation = -(rotation * center.coords);
    CameraView::new(k, rotation, translation, width, height)
}

/// Rasterize the depth of the nearest plane hit for every pixel center.
/// Pixels whose ray hits nothing get depth `0` (invalid).
pub fn render_depth(view: &CameraView, planes: &[Plane]) -> DepthMap {
    let center = view.center();
    let axis = view.optical_axis();
    DepthMap::from_fn(view.width, view.height, |x, y| {
        let dir = view.ray_direction(&Pt2::new(x as Real, y as Real));
        planes
            .iter()
            .filter_map(|p| p.intersect_ray(&center, &dir))
            .min_by(|a, b| a.total_cmp(b))
            .map_or(0.0, |t| (t * dir.dot(&axis)) as f32)
    })
}

/// Cameras, projected detections and depth for a set of known 3D segments.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub imagecols: ImageCollection,
    pub segments: BTreeMap<ImageId, Vec<Segment2d>>,
    pub depths: BTreeMap<ImageId, DepthMap>,
    /// Ground-truth lines.
    pub lines: Vec<Segment3d>,
    /// For each image, the ground-truth line index of every 2D segment.
    pub line_index: BTreeMap<ImageId, Vec<usize>>,
}

impl SyntheticScene {
    /// Assign ids `0..views.len()` and project every line that is fully
    /// visible in a view.
    pub fn build(views: Vec<CameraView>, lines: Vec<Segment3d>, planes: &[Plane]) -> Result<Self> {
        let mut imagecols = ImageCollection::new();
        let mut segments = BTreeMap::new();
        let mut depths = BTreeMap::new();
        let mut line_index = BTreeMap::new();

        for (idx, view) in views.into_iter().enumerate() {
            let id = idx as ImageId;
            let mut segs = Vec::new();
            let mut index = Vec::new();
            for (li, line) in lines.iter().enumerate() {
                let Some(seg) = view.project_segment(line) else {
                    continue;
                };
                if view.contains(&seg.p0) && view.contains(&seg.p1) {
                    segs.push(seg);
                    index.push(li);
                }
            }
            depths.insert(id, render_depth(&view, planes));
            segments.insert(id, segs);
            line_index.insert(id, index);
            imagecols.insert(id, CameraImage::new(format!("image_{id:04}.png"), view))?;
        }

        Ok(Self {
            imagecols,
            segments,
            depths,
            lines,
            line_index,
        })
    }

    /// Three cameras facing a wall at `z = 4` carrying two crossing segments.
    pub fn wall() -> Result<Self> {
        let k = FxFyCxCySkew::new(300.0, 300.0, 160.0, 120.0);
        let up = Vec3::new(0.0, -1.0, 0.0);
        let target = Pt3::new(0.0, 0.0, 4.0);
        let views = [
            Pt3::new(0.0, 0.0, 0.0),
            Pt3::new(0.4, 0.0, 0.0),
            Pt3::new(0.0, 0.3, -0.2),
        ]
        .into_iter()
        .map(|c| look_at(k, c, target, up, 320, 240))
        .collect::<Result<Vec<_>>>()?;

        let lines = vec![
            Segment3d::new(Pt3::new(-1.0, -0.5, 4.0), Pt3::new(1.0, 0.6, 4.0)),
            Segment3d::new(Pt3::new(0.8, -0.6, 4.0), Pt3::new(0.8, 0.5, 4.0)),
        ];
        let wall = Plane::through(&target, Vec3::z());
        Self::build(views, lines, &[wall])
    }

    /// Every image lists all other images as neighbors, in id order.
    pub fn all_pairs_neighbors(&self) -> NeighborMap {
        let ids = self.imagecols.image_ids();
        ids.iter()
            .map(|&i| (i, ids.iter().copied().filter(|&j| j != i).collect()))
            .collect()
    }
}
