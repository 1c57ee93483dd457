//! Pairwise compatibility tests between segment observations.

use linemap_core::{Real, Segment2d, Segment3d};
use serde::{Deserialize, Serialize};

/// Thresholds for linking two 2D segments in the same image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Linker2dConfig {
    /// Maximum undirected angle, degrees.
    pub th_angle: Real,
    /// Maximum endpoint-to-line distance in units of the 2D sigma.
    pub th_perp: Real,
    /// Minimum overlap as a fraction of the shorter segment.
    pub th_overlap: Real,
}

impl Default for Linker2dConfig {
    fn default() -> Self {
        Self {
            th_angle: 8.0,
            th_perp: 2.0,
            th_overlap: 0.05,
        }
    }
}

/// Thresholds for linking two 3D segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Linker3dConfig {
    /// Maximum undirected angle, degrees.
    pub th_angle: Real,
    /// Maximum endpoint-to-line distance, world units.
    pub th_perp: Real,
    /// Minimum overlap as a fraction of the shorter segment.
    pub th_overlap: Real,
}

impl Default for Linker3dConfig {
    fn default() -> Self {
        Self {
            th_angle: 10.0,
            th_perp: 0.05,
            th_overlap: 0.05,
        }
    }
}

impl Linker3dConfig {
    /// Stricter defaults used when consolidating finished tracks.
    pub fn remerge_default() -> Self {
        Self {
            th_angle: 5.0,
            th_perp: 0.05,
            th_overlap: 0.001,
        }
    }
}

/// 2D linker with the perpendicular threshold scaled by `sqrt(var2d)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLinker2d {
    pub config: Linker2dConfig,
    sigma: Real,
}

impl LineLinker2d {
    pub fn new(config: Linker2dConfig, var2d: Real) -> Self {
        Self {
            config,
            sigma: var2d.max(0.0).sqrt(),
        }
    }

    /// Perpendicular threshold in pixels.
    pub fn perp_threshold(&self) -> Real {
        self.config.th_perp * self.sigma
    }

    pub fn check_connection(&self, a: &Segment2d, b: &Segment2d) -> bool {
        if a.angle_to(b) > self.config.th_angle {
            return false;
        }
        let perp = a.max_endpoint_distance(b).max(b.max_endpoint_distance(a));
        if perp > self.perp_threshold() {
            return false;
        }
        a.overlap_ratio(b) >= self.config.th_overlap && b.overlap_ratio(a) >= self.config.th_overlap
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLinker3d {
    pub config: Linker3dConfig,
}

impl LineLinker3d {
    pub fn new(config: Linker3dConfig) -> Self {
        Self { config }
    }

    pub fn check_connection(&self, a: &Segment3d, b: &Segment3d) -> bool {
        if a.is_degenerate() || b.is_degenerate() {
            return false;
        }
        a.angle_to(b) <= self.config.th_angle
            && a.perpendicular_distance(b) <= self.config.th_perp
            && a.overlap_ratio(b) >= self.config.th_overlap
            && b.overlap_ratio(a) >= self.config.th_overlap
    }
}

/// Combined 2D + 3D linker used by the track merger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLinker {
    pub linker2d: LineLinker2d,
    pub linker3d: LineLinker3d,
}

impl LineLinker {
    pub fn new(linker2d: LineLinker2d, linker3d: LineLinker3d) -> Self {
        Self { linker2d, linker3d }
    }
}
