//! Per-patch physics collaborators owned by each patch.

pub mod operators;

pub use operators::{FieldSolver, Interpolator, OperatorSet, Projector};
