//! Iteration driver: run context, engine and the raw run it produces.

pub mod context;
pub mod engine;
pub mod run;
