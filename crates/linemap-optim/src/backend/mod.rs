//! Solver seam for line bundle problems.
//!
//! A backend takes a [`ProblemIR`] and the initial endpoint blocks, and
//! returns the solved blocks under the same names. [`TinySolverBackend`] is
//! the only implementation.

mod tiny_solver_backend;

use anyhow::Result;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ir::ProblemIR;

pub use tiny_solver_backend::TinySolverBackend;

/// Stopping criteria of the least-squares solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSolveOptions {
    pub max_iters: usize,
    /// 0 is silent.
    pub verbosity: usize,
    /// Stop when an iteration lowers the cost by less than this.
    pub min_abs_decrease: f64,
    pub min_rel_decrease: f64,
    /// Stop once the cost falls below this.
    pub min_cost: f64,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            verbosity: 0,
            min_abs_decrease: 1e-5,
            min_rel_decrease: 1e-5,
            min_cost: 1e-10,
        }
    }
}

/// Outcome of one line bundle solve. Costs are half the plain squared
/// residual norm, without robust loss.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SolveReport {
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Endpoint blocks, one per track.
    pub num_blocks: usize,
    pub num_residuals: usize,
}

/// Solved endpoint blocks keyed by IR block name.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub params: HashMap<String, DVector<f64>>,
    pub report: SolveReport,
}

pub trait OptimBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution>;
}
