//! [`ProblemType`] implementation for fit-and-merge line reconstruction.

use anyhow::{ensure, Result};
use linemap_core::{
    DepthMap, ImageCollection, ImageId, LineTrack, NeighborMap, Real, SegmentMap,
};
use linemap_fit::FitOptions;
use linemap_merge::{
    LineLinker, LineLinker2d, LineLinker3d, Linker2dConfig, Linker3dConfig,
    ReprojectionFilterConfig,
};
use linemap_optim::{BackendSolveOptions, LineBundleOptions, RobustLoss};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::session::{InvalidationPolicy, ProblemType};

use super::error::FitnmergeError;
use super::state::FitnmergeState;

/// 2D variance used when the detector has no entry in the table.
pub const FALLBACK_VAR2D: Real = 5.0;

/// Fit-and-merge line reconstruction problem.
#[derive(Debug)]
pub struct FitnmergeProblem;

/// Input of a fit-and-merge run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnmergeInput {
    pub imagecols: ImageCollection,
    /// Detected 2D segments per image.
    pub segments: SegmentMap,
    pub depths: BTreeMap<ImageId, DepthMap>,
    /// Ranked neighbors; computed from camera poses when absent.
    #[serde(default)]
    pub neighbors: Option<NeighborMap>,
    /// Scene bounds as `[min, max]` corners, carried through untouched.
    #[serde(default)]
    pub ranges: Option<[[Real; 3]; 2]>,
}

impl FitnmergeInput {
    pub fn new(
        imagecols: ImageCollection,
        segments: SegmentMap,
        depths: BTreeMap<ImageId, DepthMap>,
    ) -> Self {
        Self {
            imagecols,
            segments,
            depths,
            neighbors: None,
            ranges: None,
        }
    }

    pub fn with_neighbors(mut self, neighbors: NeighborMap) -> Self {
        self.neighbors = Some(neighbors);
        self
    }

    pub fn num_segments(&self) -> usize {
        self.segments.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    /// RANSAC inlier threshold in units of per-sample sigma.
    pub ransac_th: Real,
    pub min_percentage_inliers: Real,
    /// Overrides the detector's 2D variance.
    pub var2d: Option<Real>,
    /// Worker threads; `0` lets rayon decide.
    pub n_jobs: usize,
    pub max_iters: usize,
    pub seed: u64,
}

impl Default for FittingConfig {
    fn default() -> Self {
        let fit = FitOptions::default();
        Self {
            ransac_th: fit.ransac_th,
            min_percentage_inliers: fit.min_percentage_inliers,
            var2d: None,
            n_jobs: 4,
            max_iters: fit.max_iters,
            seed: fit.seed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergingConfig {
    /// Overrides the detector's 2D variance.
    pub var2d: Option<Real>,
    pub linker2d: Linker2dConfig,
    pub linker3d: Linker3dConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemergingConfig {
    pub disable: bool,
    pub linker3d: Linker3dConfig,
}

impl Default for RemergingConfig {
    fn default() -> Self {
        Self {
            disable: false,
            linker3d: Linker3dConfig::remerge_default(),
        }
    }
}

/// Joint line refinement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub disable: bool,
    pub max_iters: usize,
    /// Verbosity level (0 = silent).
    pub verbosity: usize,
    pub loss: RobustLoss,
    pub obs_weight: f64,
    pub prior_weight: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        let bundle = LineBundleOptions::default();
        Self {
            disable: true,
            max_iters: 100,
            verbosity: 0,
            loss: bundle.loss,
            obs_weight: bundle.obs_weight,
            prior_weight: bundle.prior_weight,
        }
    }
}

impl RefinementConfig {
    pub fn bundle_opts(&self) -> LineBundleOptions {
        LineBundleOptions {
            loss: self.loss,
            obs_weight: self.obs_weight,
            prior_weight: self.prior_weight,
            ..LineBundleOptions::default()
        }
    }

    pub fn backend_opts(&self) -> BackendSolveOptions {
        BackendSolveOptions {
            max_iters: self.max_iters,
            verbosity: self.verbosity,
            ..BackendSolveOptions::default()
        }
    }
}

fn default_var2d_table() -> BTreeMap<String, Real> {
    [
        ("lsd", 5.0),
        ("sold2", 5.0),
        ("hawpv3", 5.0),
        ("tp_lsd", 5.0),
        ("deeplsd", 4.0),
    ]
    .into_iter()
    .map(|(name, v)| (name.to_owned(), v))
    .collect()
}

/// Configuration of a fit-and-merge run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnmergeConfig {
    /// Name of the 2D detector; selects the cache file and default variance.
    pub detector: String,
    /// Per-detector 2D variance in squared pixels.
    pub var2d: BTreeMap<String, Real>,

    /// Reuse an existing fit cache instead of refitting.
    pub skip_exists: bool,
    /// Only load the fit cache; never fit.
    pub load_fit: bool,
    /// Log a per-track report at the end of the run.
    pub visualize: bool,

    pub fitting: FittingConfig,
    pub merging: MergingConfig,
    pub remerging: RemergingConfig,
    pub filtering2d: ReprojectionFilterConfig,
    pub refinement: RefinementConfig,

    /// Maximum neighbors per image.
    pub n_neighbors: usize,
    /// Minimum supporting images for a track to count as visible in exports.
    pub n_visible_views: usize,

    pub dir_save: PathBuf,
    /// Where caches are read from; defaults to `dir_save`.
    pub dir_load: Option<PathBuf>,
}

impl Default for FitnmergeConfig {
    fn default() -> Self {
        Self {
            detector: "lsd".to_owned(),
            var2d: default_var2d_table(),
            skip_exists: false,
            load_fit: false,
            visualize: false,
            fitting: FittingConfig::default(),
            merging: MergingConfig::default(),
            remerging: RemergingConfig::default(),
            filtering2d: ReprojectionFilterConfig::default(),
            refinement: RefinementConfig::default(),
            n_neighbors: 20,
            n_visible_views: 4,
            dir_save: PathBuf::from("output"),
            dir_load: None,
        }
    }
}

impl FitnmergeConfig {
    /// Variance of the configured detector, [`FALLBACK_VAR2D`] if unknown.
    pub fn detector_var2d(&self) -> Real {
        self.var2d
            .get(&self.detector)
            .copied()
            .unwrap_or(FALLBACK_VAR2D)
    }

    pub fn fitting_var2d(&self) -> Real {
        self.fitting.var2d.unwrap_or_else(|| self.detector_var2d())
    }

    pub fn merging_var2d(&self) -> Real {
        self.merging.var2d.unwrap_or_else(|| self.detector_var2d())
    }

    pub fn dir_load(&self) -> &Path {
        self.dir_load.as_deref().unwrap_or(self.dir_save.as_path())
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            ransac_th: self.fitting.ransac_th,
            min_percentage_inliers: self.fitting.min_percentage_inliers,
            var2d: self.fitting_var2d(),
            max_iters: self.fitting.max_iters,
            seed: self.fitting.seed,
        }
    }

    pub fn linker(&self) -> LineLinker {
        LineLinker::new(
            LineLinker2d::new(self.merging.linker2d, self.merging_var2d()),
            LineLinker3d::new(self.merging.linker3d),
        )
    }

    pub fn remerge_linker(&self) -> LineLinker3d {
        LineLinker3d::new(self.remerging.linker3d)
    }
}

/// Summary counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitnmergeStats {
    pub num_images: usize,
    pub num_segments: usize,
    pub num_fitted: usize,
    pub num_merged_tracks: usize,
    pub num_filtered_tracks: usize,
    /// `None` when remerging is disabled.
    pub num_remerged_tracks: Option<usize>,
    pub num_final_tracks: usize,
    /// Tracks supported by at least `n_visible_views` images.
    pub num_visible_tracks: usize,
}

/// Final tracks of a run with summary counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnmergeOutput {
    pub tracks: Vec<LineTrack>,
    pub stats: FitnmergeStats,
}

pub type FitnmergeExport = FitnmergeOutput;

fn ensure_positive(name: &str, value: Real) -> Result<()> {
    ensure!(value > 0.0 && value.is_finite(), "{} must be positive (got {})", name, value);
    Ok(())
}

impl ProblemType for FitnmergeProblem {
    type Config = FitnmergeConfig;
    type Input = FitnmergeInput;
    type State = FitnmergeState;
    type Output = FitnmergeOutput;
    type Export = FitnmergeExport;

    fn name() -> &'static str {
        "line_fitnmerge_v1"
    }

    fn validate_input(input: &Self::Input) -> Result<()> {
        ensure!(!input.imagecols.is_empty(), "image collection is empty");
        if let Some(image_id) = input.imagecols.first_distorted() {
            return Err(FitnmergeError::NotUndistorted { image_id }.into());
        }
        for &image_id in input.segments.keys().chain(input.depths.keys()) {
            if !input.imagecols.contains(image_id) {
                return Err(FitnmergeError::MissingCamera { image_id }.into());
            }
        }
        for (&image_id, depth) in &input.depths {
            let view = input.imagecols.camview(image_id)?;
            ensure!(
                depth.width() == view.width && depth.height() == view.height,
                "depth map of image {} is {}x{}, camera is {}x{}",
                image_id,
                depth.width(),
                depth.height(),
                view.width,
                view.height
            );
        }
        Ok(())
    }

    fn validate_config(config: &Self::Config) -> Result<()> {
        ensure!(!config.detector.is_empty(), "detector name must not be empty");
        ensure_positive("fitting.ransac_th", config.fitting.ransac_th)?;
        ensure!(
            config.fitting.min_percentage_inliers > 0.0
                && config.fitting.min_percentage_inliers <= 1.0,
            "fitting.min_percentage_inliers must be in (0, 1] (got {})",
            config.fitting.min_percentage_inliers
        );
        ensure!(config.fitting.max_iters > 0, "fitting.max_iters must be positive");
        ensure_positive("fitting var2d", config.fitting_var2d())?;
        ensure_positive("merging var2d", config.merging_var2d())?;
        for (name, v) in [
            ("merging.linker2d.th_angle", config.merging.linker2d.th_angle),
            ("merging.linker2d.th_perp", config.merging.linker2d.th_perp),
            ("merging.linker3d.th_angle", config.merging.linker3d.th_angle),
            ("merging.linker3d.th_perp", config.merging.linker3d.th_perp),
            ("remerging.linker3d.th_angle", config.remerging.linker3d.th_angle),
            ("remerging.linker3d.th_perp", config.remerging.linker3d.th_perp),
            ("filtering2d.th_angular_2d", config.filtering2d.th_angular_2d),
            ("filtering2d.th_perp_2d", config.filtering2d.th_perp_2d),
        ] {
            ensure_positive(name, v)?;
        }
        ensure!(config.n_neighbors > 0, "n_neighbors must be positive");
        if !config.refinement.disable {
            ensure!(config.refinement.max_iters > 0, "refinement.max_iters must be positive");
            ensure_positive("refinement.obs_weight", config.refinement.obs_weight)?;
            ensure!(
                config.refinement.prior_weight >= 0.0,
                "refinement.prior_weight must be non-negative"
            );
        }
        Ok(())
    }

    fn on_input_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    /// Depth maps are only read by the fit stage; once fits exist the
    /// checkpoint leaves them out.
    fn checkpoint_input(input: &FitnmergeInput, state: &FitnmergeState) -> FitnmergeInput {
        if !state.has_fits() {
            return input.clone();
        }
        FitnmergeInput {
            imagecols: input.imagecols.clone(),
            segments: input.segments.clone(),
            depths: BTreeMap::new(),
            neighbors: input.neighbors.clone(),
            ranges: input.ranges,
        }
    }

    fn export(output: &Self::Output, _config: &Self::Config) -> Result<Self::Export> {
        Ok(output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linemap_core::synthetic::scene::SyntheticScene;

    #[test]
    fn input_with_short_depth_buffer_does_not_load() {
        let scene = SyntheticScene::wall().unwrap();
        let input = FitnmergeInput::new(scene.imagecols, scene.segments, scene.depths);
        assert!(FitnmergeProblem::validate_input(&input).is_ok());

        let mut value = serde_json::to_value(&input).unwrap();
        let depths = value["depths"].as_object_mut().unwrap();
        let first = depths.keys().next().cloned().unwrap();
        depths[&first]["data"] = serde_json::json!([1.0, 2.0, 3.0]);

        let err = serde_json::from_value::<FitnmergeInput>(value).unwrap_err();
        assert!(err.to_string().contains("depth buffer has 3 values"));
    }

    #[test]
    fn checkpoint_keeps_depths_until_fitted() {
        let scene = SyntheticScene::wall().unwrap();
        let input = FitnmergeInput::new(scene.imagecols, scene.segments, scene.depths);
        let mut state = FitnmergeState::default();
        let kept = FitnmergeProblem::checkpoint_input(&input, &state);
        assert_eq!(kept.depths.len(), input.depths.len());

        state.fits = Some(linemap_core::FitOutput::new());
        let stripped = FitnmergeProblem::checkpoint_input(&input, &state);
        assert!(stripped.depths.is_empty());
        assert_eq!(stripped.segments, input.segments);
        assert!(FitnmergeProblem::validate_input(&stripped).is_ok());
    }

    #[test]
    fn var2d_resolution() {
        let mut config = FitnmergeConfig::default();
        assert_eq!(config.fitting_var2d(), 5.0);

        config.detector = "deeplsd".to_owned();
        assert_eq!(config.fitting_var2d(), 4.0);
        assert_eq!(config.merging_var2d(), 4.0);

        config.fitting.var2d = Some(2.0);
        assert_eq!(config.fitting_var2d(), 2.0);
        assert_eq!(config.fit_options().var2d, 2.0);
        assert_eq!(config.merging_var2d(), 4.0);

        config.detector = "my_detector".to_owned();
        assert_eq!(config.merging_var2d(), FALLBACK_VAR2D);
    }

    #[test]
    fn dir_load_defaults_to_dir_save() {
        let mut config = FitnmergeConfig::default();
        assert_eq!(config.dir_load(), Path::new("output"));
        config.dir_load = Some(PathBuf::from("previous_run"));
        assert_eq!(config.dir_load(), Path::new("previous_run"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: FitnmergeConfig = serde_json::from_str(
            r#"{ "detector": "sold2", "remerging": { "disable": true }, "fitting": { "n_jobs": 1 } }"#,
        )
        .unwrap();
        assert_eq!(config.detector, "sold2");
        assert!(config.remerging.disable);
        assert_eq!(config.remerging.linker3d, Linker3dConfig::remerge_default());
        assert_eq!(config.fitting.n_jobs, 1);
        assert_eq!(config.fitting.ransac_th, 0.75);
        assert!(config.refinement.disable);
        assert_eq!(config.n_neighbors, 20);
    }

    #[test]
    fn config_validation() {
        assert!(FitnmergeProblem::validate_config(&FitnmergeConfig::default()).is_ok());

        let mut config = FitnmergeConfig::default();
        config.fitting.min_percentage_inliers = 1.5;
        assert!(FitnmergeProblem::validate_config(&config).is_err());

        let mut config = FitnmergeConfig::default();
        config.n_neighbors = 0;
        assert!(FitnmergeProblem::validate_config(&config).is_err());

        let mut config = FitnmergeConfig::default();
        config.merging.var2d = Some(-1.0);
        assert!(FitnmergeProblem::validate_config(&config).is_err());
    }
}
