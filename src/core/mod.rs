//! Foundational types: distribution specs and seeded random sources.

pub mod distribution;
pub mod rng;
