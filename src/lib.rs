#![cfg_attr(docsrs, feature(doc_cfg))]
//! # patch-exchange
//!
//! patch-exchange is the domain-decomposition and particle-migration core of a
//! particle-in-cell code. The simulation box is cut into a grid of rectangular
//! patches distributed over ranks; after every particle push, particles that
//! left their patch are routed axis by axis to the patch that now contains
//! them and re-inserted into its bin-sorted store.
//!
//! ## Features
//! - Bin-indexed particle stores with range-checked primitives
//! - Patch grid with periodic wrap and balanced rank ownership
//! - Per-axis size handshake and bulk transfer, with direct copies between
//!   co-located patches and message passing between ranks
//! - Corner (diagonal) crossings forwarded without a separate code path
//! - Pluggable communication backends (serial, in-process, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! patch-exchange = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! A timestep hands each species' departed particles to
//! [`VectorPatch::exchange_particles`](vector_patch::VectorPatch::exchange_particles):
//!
//! ```
//! use patch_exchange::prelude::*;
//!
//! let params = SimulationParams::default();
//! let mut vp = VectorPatch::new(params, 1, 0, &["electron"])?;
//! vp.load_particles(0, vec![Particle::at(0, [7.5, 0.0, 0.0])])?;
//! vp.patch_mut(0)?.species_mut(0)?.store.get_mut(0)?.position[0] = 8.5;
//! vp.collect_departed(0)?;
//! let report = vp.exchange_particles(0, &NoComm)?;
//! assert_eq!(report.sent, 1);
//! assert_eq!(vp.patch(1)?.species(0)?.len(), 1);
//! # Ok::<(), ExchangeError>(())
//! ```

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod exchange_error;
pub mod params;
pub mod patch;
pub mod physics;
pub mod topology;
pub mod vector_patch;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::exchange::ExchangeReport;
    pub use crate::data::particle::Particle;
    pub use crate::data::particle_store::{BinRange, ParticleStore};
    pub use crate::data::species::Species;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::exchange_error::{ErrorContext, ExchangeError};
    pub use crate::params::SimulationParams;
    pub use crate::patch::Patch;
    pub use crate::topology::{AxisSide, LocalBounds, NeighborTable, PatchGrid, Side};
    pub use crate::vector_patch::{LossTally, VectorPatch};
}
