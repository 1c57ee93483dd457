//! Problem builders that turn line reconstructions into IR.

pub mod line_bundle;
