use crate::factors::line_reprojection::{endpoint_prior_residual, line_reproj_residual, CameraData};
use anyhow::{anyhow, ensure, Result};
use nalgebra::{DVector, DVectorView};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier for a parameter block in the IR.
///
/// Stable within a `ProblemIR` instance; residual blocks reference their
/// parameters by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Robust loss applied to a residual block.
///
/// Per-observation robustification comes from using one residual block per
/// observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
    Arctan {
        scale: f64,
    },
}

/// Backend-agnostic factor kinds.
///
/// Each kind implies its parameter layout and residual dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Observed 2D segment against a 3D line given by two endpoints.
    ///
    /// Parameters: \[endpoints\] (6D Euclidean, `[p0; p1]`).
    /// Residual: signed pixel distances of both observed endpoints to the
    /// projected infinite line, scaled by `sqrt(w)`.
    LineReprojection {
        camera: CameraData,
        observed: [[f64; 2]; 2],
        w: f64,
    },
    /// Quadratic pull of the endpoints towards their initial values.
    ///
    /// Parameters: \[endpoints\] (6D Euclidean).
    EndpointPrior { target: [f64; 6], sqrt_w: f64 },
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::LineReprojection { .. } => 2,
            FactorKind::EndpointPrior { .. } => 6,
        }
    }

    /// Number of parameter blocks the factor expects.
    pub fn num_params(&self) -> usize {
        1
    }

    /// Plain (non-robust) residual at the given parameter values.
    pub fn evaluate(&self, params: &[&DVector<f64>]) -> Result<DVector<f64>> {
        ensure!(
            params.len() == self.num_params(),
            "factor expects {} params, got {}",
            self.num_params(),
            params.len()
        );
        let endpoints: DVectorView<'_, f64> = params[0].as_view();
        ensure!(endpoints.len() == 6, "line endpoints must be 6D");
        let r = match self {
            FactorKind::LineReprojection {
                camera,
                observed,
                w,
            } => DVector::from_row_slice(line_reproj_residual(endpoints, camera, observed, *w).as_slice()),
            FactorKind::EndpointPrior { target, sqrt_w } => {
                DVector::from_row_slice(endpoint_prior_residual(endpoints, target, *sqrt_w).as_slice())
            }
        };
        Ok(r)
    }
}

/// Parameter block definition in the IR.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    /// Hold the whole block constant.
    pub fixed: bool,
}

/// Residual block definition in the IR.
///
/// The order of `params` must match the factor's expected parameter order.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

impl ResidualBlock {
    pub fn new(params: Vec<ParamId>, loss: RobustLoss, factor: FactorKind) -> Self {
        let residual_dim = factor.residual_dim();
        Self {
            params,
            loss,
            factor,
            residual_dim,
        }
    }
}

/// Backend-agnostic optimization problem representation.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(&mut self, name: impl Into<String>, dim: usize, fixed: bool) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            fixed,
        });
        id
    }

    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        for (idx, param) in self.params.iter().enumerate() {
            ensure!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            ensure!(param.dim > 0, "param {} has zero dimension", param.name);
        }
        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );
            ensure!(
                residual.params.len() == residual.factor.num_params(),
                "residual {} references {} params, factor expects {}",
                r_idx,
                residual.params.len(),
                residual.factor.num_params()
            );
            for param in &residual.params {
                let block = self
                    .params
                    .get(param.0)
                    .ok_or_else(|| anyhow!("residual {} references missing param {:?}", r_idx, param))?;
                ensure!(
                    block.dim == 6,
                    "residual {} expects 6D endpoints, {} has dim {}",
                    r_idx,
                    block.name,
                    block.dim
                );
            }
            if let RobustLoss::Huber { scale } | RobustLoss::Cauchy { scale } | RobustLoss::Arctan { scale } =
                residual.loss
            {
                ensure!(scale > 0.0, "residual {} has non-positive loss scale", r_idx);
            }
        }
        Ok(())
    }

    /// Half the sum of squared (non-robust) residuals at `values`.
    pub fn evaluate_cost(&self, values: &HashMap<String, DVector<f64>>) -> Result<f64> {
        let mut cost = 0.0;
        for residual in &self.residuals {
            let params = residual
                .params
                .iter()
                .map(|id| {
                    let name = &self.params[id.0].name;
                    values
                        .get(name)
                        .ok_or_else(|| anyhow!("missing value for parameter {}", name))
                })
                .collect::<Result<Vec<_>>>()?;
            cost += 0.5 * residual.factor.evaluate(&params)?.norm_squared();
        }
        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> FactorKind {
        FactorKind::EndpointPrior {
            target: [0.0; 6],
            sqrt_w: 1.0,
        }
    }

    #[test]
    fn validate_catches_bad_dimensions() {
        let mut ir = ProblemIR::new();
        let id = ir.add_param_block("track_0", 5, false);
        ir.add_residual_block(ResidualBlock::new(vec![id], RobustLoss::None, prior()));
        assert!(ir.validate().is_err());

        let mut ir = ProblemIR::new();
        let id = ir.add_param_block("track_0", 6, false);
        ir.add_residual_block(ResidualBlock::new(
            vec![id],
            RobustLoss::Huber { scale: 0.0 },
            prior(),
        ));
        assert!(ir.validate().is_err());
    }

    #[test]
    fn prior_cost_is_half_squared_distance() {
        let mut ir = ProblemIR::new();
        let id = ir.add_param_block("track_0", 6, false);
        ir.add_residual_block(ResidualBlock::new(vec![id], RobustLoss::None, prior()));
        ir.validate().unwrap();
        let mut values = HashMap::new();
        values.insert(
            "track_0".to_string(),
            DVector::from_vec(vec![1.0, 0.0, 0.0, 0.0, 2.0, 0.0]),
        );
        assert!((ir.evaluate_cost(&values).unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(ir.param_by_name("track_0"), Some(id));
    }
}
