use crate::backend::{BackendSolution, BackendSolveOptions, OptimBackend, SolveReport};
use crate::factors::line_reprojection::{
    endpoint_prior_residual_generic, line_reproj_residual_generic, CameraData,
};
use crate::ir::{FactorKind, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, ensure, Result};
use log::debug;
use nalgebra::DVector;
use std::collections::HashMap;
use tiny_solver::factors::Factor;
use tiny_solver::loss_functions::{ArctanLoss, CauchyLoss, HuberLoss, Loss};
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;

/// tiny-solver backend adapter.
#[derive(Debug, Clone, Copy)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    fn compile(&self, ir: &ProblemIR, initial: &HashMap<String, DVector<f64>>) -> Result<Problem> {
        ir.validate()?;

        let mut problem = Problem::new();
        for param in &ir.params {
            let init = initial.get(&param.name).ok_or_else(|| {
                anyhow!(
                    "initial values missing parameter {} (id {:?})",
                    param.name,
                    param.id
                )
            })?;
            ensure!(
                init.len() == param.dim,
                "initial dimension mismatch for {}: expected {}, got {}",
                param.name,
                param.dim,
                init.len()
            );
            if param.fixed {
                for idx in 0..param.dim {
                    problem.fix_variable(&param.name, idx);
                }
            }
        }

        for residual in &ir.residuals {
            let (factor, loss) = compile_factor(residual)?;
            let param_names: Vec<&str> = residual
                .params
                .iter()
                .map(|id| ir.params[id.0].name.as_str())
                .collect();
            problem.add_residual_block(residual.residual_dim, &param_names, factor, loss);
        }
        Ok(problem)
    }
}

impl OptimBackend for TinySolverBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let problem = self.compile(ir, initial)?;
        let initial_cost = ir.evaluate_cost(initial)?;

        let optimizer = LevenbergMarquardtOptimizer::default();
        let solution = optimizer
            .optimize(&problem, initial, Some(to_optimizer_options(opts)))
            .ok_or_else(|| anyhow!("tiny-solver failed to converge"))?;

        let final_cost = ir.evaluate_cost(&solution)?;
        debug!(
            "tiny-solver: {} params, {} residuals, cost {:.6e} -> {:.6e}",
            ir.params.len(),
            ir.residuals.len(),
            initial_cost,
            final_cost
        );
        Ok(BackendSolution {
            params: solution,
            report: SolveReport {
                initial_cost,
                final_cost,
                num_blocks: ir.params.len(),
                num_residuals: ir.residuals.len(),
            },
        })
    }
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        min_abs_error_decrease_threshold: opts.min_abs_decrease,
        min_rel_error_decrease_threshold: opts.min_rel_decrease,
        min_error_threshold: opts.min_cost,
        ..OptimizerOptions::default()
    }
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    match loss {
        RobustLoss::None => Ok(None),
        RobustLoss::Huber { scale } => {
            ensure!(scale > 0.0, "Huber scale must be positive");
            Ok(Some(Box::new(HuberLoss::new(scale))))
        }
        RobustLoss::Cauchy { scale } => {
            ensure!(scale > 0.0, "Cauchy scale must be positive");
            Ok(Some(Box::new(CauchyLoss::new(scale))))
        }
        RobustLoss::Arctan { scale } => {
            ensure!(scale > 0.0, "Arctan scale must be positive");
            Ok(Some(Box::new(ArctanLoss::new(scale))))
        }
    }
}

type CompiledFactor = (
    Box<dyn tiny_solver::factors::FactorImpl + Send>,
    Option<Box<dyn Loss + Send>>,
);

fn compile_factor(residual: &ResidualBlock) -> Result<CompiledFactor> {
    let loss = compile_loss(residual.loss)?;
    match &residual.factor {
        FactorKind::LineReprojection {
            camera,
            observed,
            w,
        } => Ok((
            Box::new(TinyLineReprojFactor {
                camera: *camera,
                observed: *observed,
                w: *w,
            }),
            loss,
        )),
        FactorKind::EndpointPrior { target, sqrt_w } => Ok((
            Box::new(TinyEndpointPriorFactor {
                target: *target,
                sqrt_w: *sqrt_w,
            }),
            loss,
        )),
    }
}

#[derive(Debug, Clone)]
struct TinyLineReprojFactor {
    camera: CameraData,
    observed: [[f64; 2]; 2],
    w: f64,
}

impl<T: nalgebra::RealField> Factor<T> for TinyLineReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 1, "expected [endpoints] parameter block");
        let r = line_reproj_residual_generic(params[0].as_view(), &self.camera, &self.observed, self.w);
        DVector::from_row_slice(r.as_slice())
    }
}

#[derive(Debug, Clone)]
struct TinyEndpointPriorFactor {
    target: [f64; 6],
    sqrt_w: f64,
}

impl<T: nalgebra::RealField> Factor<T> for TinyEndpointPriorFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 1, "expected [endpoints] parameter block");
        let r = endpoint_prior_residual_generic(params[0].as_view(), &self.target, self.sqrt_w);
        DVector::from_row_slice(r.as_slice())
    }
}
