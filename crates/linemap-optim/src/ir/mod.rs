//! Backend-independent intermediate representation of optimization problems.

mod types;

pub use types::{FactorKind, ParamBlock, ParamId, ProblemIR, ResidualBlock, RobustLoss};
