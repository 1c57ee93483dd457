//! On-disk cache of the per-image fit output.
//!
//! The cache is a JSON file `<detector>_fit_segs.json`. Files written by
//! older runners, a bare map from image id to endpoint pairs where an
//! all-zero pair marks a failed fit, are still readable.

use anyhow::{bail, ensure, Context, Result};
use linemap_core::{FitOutput, ImageId, Pt3, Real, SegmentFit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::problem::FitnmergeInput;

pub fn fit_cache_file_name(detector: &str) -> String {
    format!("{detector}_fit_segs.json")
}

pub fn fit_cache_path(dir: &Path, detector: &str) -> PathBuf {
    dir.join(fit_cache_file_name(detector))
}

/// Legacy layout: image id to `[[p0], [p1]]` per segment.
type LegacyFitMap = BTreeMap<ImageId, Vec<[[Real; 3]; 2]>>;

/// Persisted fit output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitCache {
    /// Detector the fits were computed for. Empty for legacy files.
    #[serde(default)]
    pub detector: String,
    pub fits: FitOutput,
}

impl FitCache {
    pub fn new(detector: impl Into<String>, fits: FitOutput) -> Self {
        Self {
            detector: detector.into(),
            fits,
        }
    }

    /// Write through a temporary file and rename, so readers never see a
    /// partially written cache.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(self)?;
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to move fit cache into {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match serde_json::from_str::<FitCache>(&text) {
            Ok(cache) => Ok(cache),
            Err(err) => match serde_json::from_str::<LegacyFitMap>(&text) {
                Ok(legacy) => Ok(Self::from_legacy(legacy)),
                Err(_) => Err(err).with_context(|| format!("failed to parse {}", path.display())),
            },
        }
    }

    fn from_legacy(legacy: LegacyFitMap) -> Self {
        let fits = legacy
            .into_iter()
            .map(|(id, pairs)| {
                let fits = pairs
                    .iter()
                    .map(|[a, b]| {
                        SegmentFit::from_legacy_endpoints(
                            Pt3::new(a[0], a[1], a[2]),
                            Pt3::new(b[0], b[1], b[2]),
                        )
                    })
                    .collect();
                (id, fits)
            })
            .collect();
        Self {
            detector: String::new(),
            fits,
        }
    }

    /// Check that the cache describes `input`: same detector (when recorded),
    /// same image ids and the same number of segments per image.
    pub fn check_against(&self, detector: &str, input: &FitnmergeInput) -> Result<()> {
        if !self.detector.is_empty() && self.detector != detector {
            bail!(
                "cache was computed for detector {:?}, run uses {:?}",
                self.detector,
                detector
            );
        }
        let cached: Vec<ImageId> = self.fits.keys().copied().collect();
        ensure!(
            cached == input.imagecols.image_ids(),
            "cached image ids {:?} differ from the collection {:?}",
            cached,
            input.imagecols.image_ids()
        );
        for (id, fits) in &self.fits {
            let expected = input.segments.get(id).map_or(0, Vec::len);
            ensure!(
                fits.len() == expected,
                "image {} has {} cached fits for {} segments",
                id,
                fits.len(),
                expected
            );
        }
        Ok(())
    }
}
