//! Data module: particle records, bin-indexed stores and species
#![warn(missing_docs)]

pub mod particle;
pub mod particle_store;
pub mod species;

pub use crate::debug_invariants::DebugInvariants;

pub use particle::Particle;
pub use particle_store::{BinRange, ParticleStore};
pub use species::Species;
