//! Parallel per-image fitting.

use crate::{estimate_seg3d_from_depth, DispatchError, FitError, FitOptions};
use linemap_core::{
    CameraView, DepthMap, FitOutput, ImageCollection, ImageId, Segment2d, SegmentFit, SegmentMap,
};
use log::{debug, info, trace, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Everything needed to fit the segments of one image.
#[derive(Debug, Clone, Copy)]
pub struct ImageFitInput<'a> {
    pub image_id: ImageId,
    pub segments: &'a [Segment2d],
    pub view: &'a CameraView,
    pub depth: Option<&'a DepthMap>,
}

/// Lifts the 2D segments of one image into 3D.
///
/// Implementations must return exactly one [`SegmentFit`] per input segment,
/// in input order. They are called concurrently from worker threads.
pub trait SegmentFitter: Sync {
    fn fit_image(&self, input: &ImageFitInput<'_>) -> Vec<SegmentFit>;
}

/// Default fitter: robust depth sampling along each segment.
#[derive(Debug, Clone, Default)]
pub struct DepthSegmentFitter {
    pub opts: FitOptions,
}

impl DepthSegmentFitter {
    pub fn new(opts: FitOptions) -> Self {
        Self { opts }
    }
}

impl SegmentFitter for DepthSegmentFitter {
    fn fit_image(&self, input: &ImageFitInput<'_>) -> Vec<SegmentFit> {
        let Some(depth) = input.depth else {
            debug!(
                "image {}: {}, {} segments left unfitted",
                input.image_id,
                FitError::MissingDepth,
                input.segments.len()
            );
            return vec![SegmentFit::Failed; input.segments.len()];
        };
        input
            .segments
            .iter()
            .enumerate()
            .map(|(k, seg)| {
                match estimate_seg3d_from_depth(seg, depth, input.view, &self.opts, k as u64) {
                    Ok(seg3d) => SegmentFit::Fitted(seg3d),
                    Err(err) => {
                        trace!("image {} segment {}: {}", input.image_id, k, err);
                        SegmentFit::Failed
                    }
                }
            })
            .collect()
    }
}

/// Summary counts of a fit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FitStats {
    pub num_images: usize,
    pub num_segments: usize,
    pub num_fitted: usize,
}

impl FitStats {
    pub fn from_output(output: &FitOutput) -> Self {
        let mut stats = Self {
            num_images: output.len(),
            ..Self::default()
        };
        for fits in output.values() {
            stats.num_segments += fits.len();
            stats.num_fitted += fits.iter().filter(|f| f.is_fitted()).count();
        }
        stats
    }
}

/// Fit every image of the collection on a pool of `n_jobs` workers
/// (`0` uses the rayon default).
///
/// The output holds one entry per image of `imagecols`. Images without 2D
/// segments map to an empty list; images without a depth map, and images
/// whose fitter panicked, map to all-`Failed`.
pub fn fit_3d_segs<F: SegmentFitter + ?Sized>(
    fitter: &F,
    segments: &SegmentMap,
    imagecols: &ImageCollection,
    depths: &BTreeMap<ImageId, DepthMap>,
    n_jobs: usize,
) -> Result<FitOutput, DispatchError> {
    for id in segments.keys().filter(|id| !imagecols.contains(**id)) {
        warn!("ignoring 2D segments of image {} which has no camera", id);
    }

    let inputs: Vec<ImageFitInput<'_>> = imagecols
        .iter()
        .map(|(image_id, image)| ImageFitInput {
            image_id,
            segments: segments.get(&image_id).map_or(&[][..], Vec::as_slice),
            view: &image.view,
            depth: depths.get(&image_id),
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_jobs)
        .thread_name(|idx| format!("linemap-fit-{idx}"))
        .build()?;

    let results: Vec<(ImageId, Vec<SegmentFit>)> = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| (input.image_id, fit_one(fitter, input)))
            .collect()
    });
    let output: FitOutput = results.into_iter().collect();

    let stats = FitStats::from_output(&output);
    info!(
        "fitted {} / {} segments over {} images",
        stats.num_fitted, stats.num_segments, stats.num_images
    );
    Ok(output)
}

fn fit_one<F: SegmentFitter + ?Sized>(fitter: &F, input: &ImageFitInput<'_>) -> Vec<SegmentFit> {
    let expected = input.segments.len();
    let mut fits = match catch_unwind(AssertUnwindSafe(|| fitter.fit_image(input))) {
        Ok(fits) => fits,
        Err(_) => {
            warn!(
                "fitting image {} panicked, marking its {} segments as failed",
                input.image_id, expected
            );
            return vec![SegmentFit::Failed; expected];
        }
    };
    if fits.len() != expected {
        warn!(
            "fitter returned {} results for {} segments of image {}",
            fits.len(),
            expected,
            input.image_id
        );
        fits.resize(expected, SegmentFit::Failed);
    }
    debug!(
        "image {}: {} / {} segments fitted",
        input.image_id,
        fits.iter().filter(|f| f.is_fitted()).count(),
        expected
    );
    fits
}

#[cfg(test)]
mod tests {
    use super::*;
    use linemap_core::synthetic::scene::SyntheticScene;

    struct PanicOn(ImageId);

    impl SegmentFitter for PanicOn {
        fn fit_image(&self, input: &ImageFitInput<'_>) -> Vec<SegmentFit> {
            if input.image_id == self.0 {
                panic!("boom");
            }
            DepthSegmentFitter::default().fit_image(input)
        }
    }

    #[test]
    fn output_aligns_with_input() {
        let scene = SyntheticScene::wall().unwrap();
        let out = fit_3d_segs(
            &DepthSegmentFitter::default(),
            &scene.segments,
            &scene.imagecols,
            &scene.depths,
            2,
        )
        .unwrap();
        assert_eq!(out.len(), scene.imagecols.len());
        for (id, segs) in &scene.segments {
            assert_eq!(out[id].len(), segs.len());
            assert!(out[id].iter().all(SegmentFit::is_fitted));
        }
    }

    #[test]
    fn panicking_image_is_isolated() {
        let scene = SyntheticScene::wall().unwrap();
        let out = fit_3d_segs(&PanicOn(1), &scene.segments, &scene.imagecols, &scene.depths, 0)
            .unwrap();
        assert!(out[&1].iter().all(|f| !f.is_fitted()));
        assert_eq!(out[&1].len(), scene.segments[&1].len());
        assert!(out[&0].iter().all(SegmentFit::is_fitted));
    }

    #[test]
    fn missing_depth_yields_failures() {
        let scene = SyntheticScene::wall().unwrap();
        let mut depths = scene.depths.clone();
        depths.remove(&2);
        let out = fit_3d_segs(
            &DepthSegmentFitter::default(),
            &scene.segments,
            &scene.imagecols,
            &depths,
            1,
        )
        .unwrap();
        assert_eq!(out[&2], vec![SegmentFit::Failed; 2]);
        assert_eq!(FitStats::from_output(&out).num_fitted, 4);
    }
}
