//! Reduction of raw runs to summary statistics, tail-risk metrics and
//! sensitivity rankings.

pub mod analyzer;
pub mod risk;
pub mod sensitivity;
pub mod statistics;
