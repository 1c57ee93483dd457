use thiserror::Error;

/// Reasons a single 2D segment could not be lifted into 3D.
///
/// These never escape the fitter as errors: they become
/// [`linemap_core::SegmentFit::Failed`] and are logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("no depth map for image")]
    MissingDepth,
    #[error("need at least 2 valid depth samples, got {0}")]
    NotEnoughSamples(usize),
    #[error("no consensus line found")]
    NoConsensus,
    #[error("inlier support {support:.3} below required {required:.3}")]
    LowSupport { support: f64, required: f64 },
    #[error("viewing ray of endpoint {0} is parallel to the line or meets it behind the camera")]
    EndpointRay(usize),
    #[error("recovered segment is degenerate")]
    Degenerate,
}

/// Failure to run the fitting dispatcher itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to build fitting thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
