//! Line reprojection residuals for a fixed pinhole camera.
//!
//! The projected line is built in homogeneous pixel coordinates as the cross
//! product of the two projected endpoints, so no perspective division is
//! needed and the residual stays smooth near the image border.

use linemap_core::CameraView;
use nalgebra::{DVectorView, RealField, SVector, Vector3};

/// Added to the line normal norm to keep the residual finite for degenerate lines.
pub const LINE_NORM_EPS: f64 = 1.0e-12;

/// Fixed camera data baked into a factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    /// `[fx, fy, cx, cy, skew]`.
    pub k: [f64; 5],
    /// World-to-camera rotation, row-major.
    pub r: [f64; 9],
    pub t: [f64; 3],
}

impl CameraData {
    pub fn from_view(view: &CameraView) -> Self {
        let mut r = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                r[3 * row + col] = view.rotation[(row, col)];
            }
        }
        Self {
            k: [view.k.fx, view.k.fy, view.k.cx, view.k.cy, view.k.skew],
            r,
            t: [view.translation.x, view.translation.y, view.translation.z],
        }
    }

    /// Homogeneous pixel `K (R p + t)` of a world point.
    fn project_h<T: RealField>(&self, p: &Vector3<T>) -> Vector3<T> {
        let c = |v: f64| T::from_f64(v).unwrap();
        let r = &self.r;
        let x = c(r[0]) * p.x.clone() + c(r[1]) * p.y.clone() + c(r[2]) * p.z.clone() + c(self.t[0]);
        let y = c(r[3]) * p.x.clone() + c(r[4]) * p.y.clone() + c(r[5]) * p.z.clone() + c(self.t[1]);
        let z = c(r[6]) * p.x.clone() + c(r[7]) * p.y.clone() + c(r[8]) * p.z.clone() + c(self.t[2]);
        let [fx, fy, cx, cy, skew] = self.k;
        Vector3::new(
            c(fx) * x.clone() + c(skew) * y.clone() + c(cx) * z.clone(),
            c(fy) * y + c(cy) * z.clone(),
            z,
        )
    }
}

/// f64 entry point of [`line_reproj_residual_generic`].
pub fn line_reproj_residual(
    endpoints: DVectorView<'_, f64>,
    camera: &CameraData,
    observed: &[[f64; 2]; 2],
    w: f64,
) -> SVector<f64, 2> {
    line_reproj_residual_generic(endpoints, camera, observed, w)
}

/// Signed distances of the two observed endpoints to the projection of the
/// line through `endpoints = [p0; p1]`, scaled by `sqrt(w)`.
pub(crate) fn line_reproj_residual_generic<T: RealField>(
    endpoints: DVectorView<'_, T>,
    camera: &CameraData,
    observed: &[[f64; 2]; 2],
    w: f64,
) -> SVector<T, 2> {
    debug_assert!(endpoints.len() == 6, "endpoints must have 6 params");
    let p0 = Vector3::new(endpoints[0].clone(), endpoints[1].clone(), endpoints[2].clone());
    let p1 = Vector3::new(endpoints[3].clone(), endpoints[4].clone(), endpoints[5].clone());
    let line = camera.project_h(&p0).cross(&camera.project_h(&p1));

    let eps = T::from_f64(LINE_NORM_EPS).unwrap();
    let norm = (line.x.clone() * line.x.clone() + line.y.clone() * line.y.clone() + eps).sqrt();
    let sqrt_w = T::from_f64(w.sqrt()).unwrap();
    let dist = |uv: &[f64; 2]| {
        let u = T::from_f64(uv[0]).unwrap();
        let v = T::from_f64(uv[1]).unwrap();
        (line.x.clone() * u + line.y.clone() * v + line.z.clone()) / norm.clone() * sqrt_w.clone()
    };
    SVector::<T, 2>::new(dist(&observed[0]), dist(&observed[1]))
}

pub fn endpoint_prior_residual(
    endpoints: DVectorView<'_, f64>,
    target: &[f64; 6],
    sqrt_w: f64,
) -> SVector<f64, 6> {
    endpoint_prior_residual_generic(endpoints, target, sqrt_w)
}

pub(crate) fn endpoint_prior_residual_generic<T: RealField>(
    endpoints: DVectorView<'_, T>,
    target: &[f64; 6],
    sqrt_w: f64,
) -> SVector<T, 6> {
    let s = T::from_f64(sqrt_w).unwrap();
    SVector::<T, 6>::from_fn(|i, _| {
        (endpoints[i].clone() - T::from_f64(target[i]).unwrap()) * s.clone()
    })
}
