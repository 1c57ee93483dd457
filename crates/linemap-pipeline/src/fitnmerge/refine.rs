//! Joint refinement collaborator.

use anyhow::Result;
use linemap_core::LineReconstruction;
use linemap_optim::optimize_line_bundle;
use log::debug;

use super::problem::RefinementConfig;

/// Jointly refines a reconstruction. Invoked at most once per run.
pub trait LineRefiner {
    fn refine(
        &self,
        reconstruction: &LineReconstruction,
        config: &RefinementConfig,
    ) -> Result<LineReconstruction>;
}

/// Line bundle adjustment with cameras held fixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineBundleRefiner;

impl LineRefiner for LineBundleRefiner {
    fn refine(
        &self,
        reconstruction: &LineReconstruction,
        config: &RefinementConfig,
    ) -> Result<LineReconstruction> {
        let estimate =
            optimize_line_bundle(reconstruction, &config.bundle_opts(), &config.backend_opts())?;
        debug!(
            "line bundle cost {:.4e} -> {:.4e}",
            estimate.report.initial_cost, estimate.report.final_cost
        );
        Ok(estimate.reconstruction)
    }
}
