//! Scenario assembly: archetype catalogue, output transforms and the builder
//! that validates them into a read-only [`builder::Scenario`].

pub mod archetype;
pub mod builder;
pub mod transform;
