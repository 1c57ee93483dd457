use crate::{Mat3, Pt2, Pt3, Real, Segment2d, Segment3d, Vec2, Vec3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Minimum camera-frame depth for a point to count as "in front".
pub const MIN_DEPTH: Real = 1e-9;

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew {
    /// Focal length in pixels along X.
    pub fx: Real,
    /// Focal length in pixels along Y.
    pub fy: Real,
    /// Principal point X coordinate in pixels.
    pub cx: Real,
    /// Principal point Y coordinate in pixels.
    pub cy: Real,
    /// Skew term (typically 0).
    #[serde(default)]
    pub skew: Real,
}

impl FxFyCxCySkew {
    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Geometric-mean focal length `sqrt(fx * fy)`.
    pub fn focal(&self) -> Real {
        (self.fx * self.fy).sqrt()
    }

    pub fn sensor_to_pixel(&self, sensor: &Vec2) -> Pt2 {
        let u = self.fx * sensor.x + self.skew * sensor.y + self.cx;
        let v = self.fy * sensor.y + self.cy;
        Pt2::new(u, v)
    }

    pub fn pixel_to_sensor(&self, pixel: &Pt2) -> Vec2 {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Vec2::new(sx, sy)
    }
}

/// A calibrated, undistorted pinhole view: intrinsics, world-to-camera pose
/// and image resolution.
///
/// Convention: `x_cam = R * x_world + T`. Depth is the camera-frame `z`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    pub k: FxFyCxCySkew,
    /// World-to-camera rotation `R`.
    pub rotation: Mat3,
    /// World-to-camera translation `T`.
    pub translation: Vec3,
    pub width: usize,
    pub height: usize,
}

impl CameraView {
    pub fn new(
        k: FxFyCxCySkew,
        rotation: Mat3,
        translation: Vec3,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        ensure!(width > 0 && height > 0, "camera resolution must be non-zero");
        ensure!(
            k.fx > 0.0 && k.fy > 0.0,
            "focal lengths must be positive (fx={}, fy={})",
            k.fx,
            k.fy
        );
        let orthonormality = (rotation.transpose() * rotation - Mat3::identity()).norm();
        ensure!(
            orthonormality < 1e-6 && rotation.determinant() > 0.0,
            "rotation is not a proper rotation matrix"
        );
        Ok(Self {
            k,
            rotation,
            translation,
            width,
            height,
        })
    }

    /// Camera center in world coordinates, `-R^T T`.
    pub fn center(&self) -> Pt3 {
        Pt3::from(-(self.rotation.transpose() * self.translation))
    }

    /// Unit optical axis in world coordinates.
    pub fn optical_axis(&self) -> Vec3 {
        self.rotation.transpose() * Vec3::z()
    }

    pub fn world_to_camera(&self, pw: &Pt3) -> Vec3 {
        self.rotation * pw.coords + self.translation
    }

    pub fn camera_to_world(&self, pc: &Vec3) -> Pt3 {
        Pt3::from(self.rotation.transpose() * (pc - self.translation))
    }

    /// Camera-frame depth of a world point.
    pub fn depth_of(&self, pw: &Pt3) -> Real {
        self.world_to_camera(pw).z
    }

    /// Project a world point. `None` when the point is not in front of the camera.
    pub fn project(&self, pw: &Pt3) -> Option<Pt2> {
        let pc = self.world_to_camera(pw);
        if pc.z <= MIN_DEPTH {
            return None;
        }
        Some(self.k.sensor_to_pixel(&Vec2::new(pc.x / pc.z, pc.y / pc.z)))
    }

    /// Project both endpoints of a 3D segment; `None` if either is behind the camera.
    pub fn project_segment(&self, seg: &Segment3d) -> Option<Segment2d> {
        Some(Segment2d::new(self.project(&seg.p0)?, self.project(&seg.p1)?))
    }

    /// Unit viewing-ray direction through `pixel`, in world coordinates.
    pub fn ray_direction(&self, pixel: &Pt2) -> Vec3 {
        let s = self.k.pixel_to_sensor(pixel);
        (self.rotation.transpose() * Vec3::new(s.x, s.y, 1.0)).normalize()
    }

    /// Back-project a pixel at a given camera-frame depth into the world.
    pub fn backproject(&self, pixel: &Pt2, depth: Real) -> Pt3 {
        let s = self.k.pixel_to_sensor(pixel);
        self.camera_to_world(&(Vec3::new(s.x, s.y, 1.0) * depth))
    }

    /// Whether a (sub)pixel location falls inside the image bounds.
    pub fn contains(&self, pixel: &Pt2) -> bool {
        pixel.x >= -0.5
            && pixel.y >= -0.5
            && pixel.x < self.width as Real - 0.5
            && pixel.y < self.height as Real - 0.5
    }
}
