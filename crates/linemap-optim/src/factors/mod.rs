//! Residual models shared by the IR evaluator and solver backends.

pub mod line_reprojection;
