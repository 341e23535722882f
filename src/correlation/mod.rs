//! Correlation matrices and copula-coupled sampling.

pub mod copula;
pub mod matrix;
