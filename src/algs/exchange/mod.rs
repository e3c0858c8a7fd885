//! Particle migration between patches.
//!
//! One call moves every departed particle of one species to the patch that
//! now contains it:
//!
//! 1. **Classify** each patch's departed list into per-face send lists.
//! 2. For each axis in increasing order:
//!    - issue the size handshake for every patch, then complete it;
//!    - issue the bulk transfer for every patch, then complete it;
//!    - forward received particles that still sit outside the patch on a
//!      later axis (corner crossings).
//! 3. **Compact** each store: delete departed records, open room in each bin
//!    and insert the arrivals.
//!
//! Co-located neighbors are served by direct copies; remote ones through the
//! [`Communicator`]. Every stage posts all of its sends and receives before
//! waiting on any, so two ranks exchanging symmetrically never block on each
//! other.

pub mod classify;
pub mod compaction;
pub mod size_exchange;
pub mod state;
pub mod transfer;

pub use classify::{classify, wrap_periodic};
pub use compaction::{cleanup_departed, insert_incoming};
pub use state::{AxisSides, ExchangeState};

use crate::algs::communicator::{CommTag, Communicator, Phase};
use crate::debug_invariants::DebugInvariants;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::patch::Patch;
use crate::topology::grid::PatchGrid;
use crate::topology::neighbors::NeighborTable;
use crate::topology::side::Side;
use crate::vector_patch::VectorPatch;
use hashbrown::HashMap;

/// Counts for one call of [`exchange_particles`] on one rank.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    /// Records shipped through a face; a corner particle counts once per hop.
    pub sent: usize,
    /// Records inserted into local stores.
    pub received: usize,
    /// Records dropped at non-periodic boundaries.
    pub lost: usize,
}

/// Shared, read-only context of one exchange.
pub(crate) struct Stage<'a, C: Communicator> {
    pub grid: &'a PatchGrid,
    pub slots: &'a HashMap<usize, usize>,
    pub comm: &'a C,
    pub rank: usize,
    pub species: usize,
}

impl<'a, C: Communicator> Stage<'a, C> {
    fn new(
        grid: &'a PatchGrid,
        slots: &'a HashMap<usize, usize>,
        comm: &'a C,
        rank: usize,
        species: usize,
    ) -> Result<Self, ExchangeError> {
        // Tags grow with every component: the largest one bounds them all.
        let last_patch = grid.total_patches().saturating_sub(1);
        CommTag::for_particles(
            species,
            last_patch,
            grid.n_dim() - 1,
            Side::High,
            Phase::Particles,
        )?;
        Ok(Self {
            grid,
            slots,
            comm,
            rank,
            species,
        })
    }

    /// Local slot of the neighbor across `(axis, side)`, `None` unless it
    /// is co-located.
    pub fn local_slot(
        &self,
        neighbors: &NeighborTable,
        axis: usize,
        side: Side,
    ) -> Result<Option<usize>, ExchangeError> {
        let Some(neighbor) = neighbors.get(axis, side) else {
            return Ok(None);
        };
        if !neighbors.is_local(axis, side, self.rank) {
            return Ok(None);
        }
        self.slots
            .get(&neighbor.patch)
            .copied()
            .map(Some)
            .ok_or(ExchangeError::UnknownPatch(neighbor.patch))
    }

    pub fn tag(
        &self,
        sender_patch: usize,
        axis: usize,
        side: Side,
        phase: Phase,
    ) -> Result<u32, ExchangeError> {
        CommTag::for_particles(self.species, sender_patch, axis, side, phase).map(CommTag::as_u32)
    }
}

/// Migrate departed particles of `species` across every patch of `vp`.
///
/// Collective: every rank holding patches must call it for the same species
/// in the same order. On return each store satisfies the bin invariants and
/// the departed lists are empty.
///
/// # Errors
/// `TransferTimeout` when a remote peer stays silent, `InvariantViolation`
/// or `IndexOutOfRange` on corrupted input. Both leave the stores in an
/// unspecified state; the run should abort.
pub fn exchange_particles<C: Communicator>(
    vp: &mut VectorPatch,
    species: usize,
    comm: &C,
) -> Result<ExchangeReport, ExchangeError> {
    let bin_width = vp.params.bin_width();
    let VectorPatch {
        grid,
        rank,
        patches,
        slots,
        losses,
        ..
    } = vp;
    let (grid, slots, rank) = (&*grid, &*slots, *rank);
    if !comm.is_no_comm() && (comm.rank() != rank || comm.size() != grid.n_ranks()) {
        return Err(ExchangeError::InvalidConfig(format!(
            "communicator is rank {} of {}, patches were laid out for rank {} of {}",
            comm.rank(),
            comm.size(),
            rank,
            grid.n_ranks()
        )));
    }
    let stage = Stage::new(grid, slots, comm, rank, species)?;
    let n_dim = grid.n_dim();
    let ctx = ErrorContext::species(species);

    let mut states: Vec<ExchangeState> =
        (0..patches.len()).map(|_| ExchangeState::new(n_dim)).collect();
    for (patch, state) in patches.iter_mut().zip(states.iter_mut()) {
        patch.species(species)?.store.validate_within(ctx)?;
        log::trace!(
            "[exchange] patch {} remote peers {:?}",
            patch.hindex,
            patch.neighbors.remote_ranks(rank)
        );
        classify::init_exchange(patch, species, grid, state)?;
    }

    for axis in 0..n_dim {
        log::trace!("[exchange] species {species}, axis {axis}: size handshake");
        let flight = size_exchange::issue(&stage, patches, &mut states, axis)?;
        size_exchange::complete(&stage, flight, &mut states)?;

        log::trace!("[exchange] species {species}, axis {axis}: bulk transfer");
        let flight = transfer::issue(&stage, patches, &mut states, axis)?;
        transfer::complete(&stage, flight, &mut states)?;
        transfer::forward_corners(&stage, patches, &mut states, axis)?;
    }

    let finish = |(patch, state): (&mut Patch, &mut ExchangeState)| {
        compaction::finish_patch(patch, species, state, bin_width)
    };
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        patches
            .par_iter_mut()
            .zip(states.par_iter_mut())
            .try_for_each(finish)?;
    }
    #[cfg(not(feature = "rayon"))]
    patches
        .iter_mut()
        .zip(states.iter_mut())
        .try_for_each(finish)?;

    let report = states
        .iter()
        .fold(ExchangeReport::default(), |acc, s| ExchangeReport {
            sent: acc.sent + s.sent,
            received: acc.received + s.received,
            lost: acc.lost + s.lost,
        });
    losses.record(species, report.lost);
    log::debug!(
        "[exchange] rank {rank}, species {species}: sent {}, received {}, lost {}",
        report.sent,
        report.received,
        report.lost
    );
    Ok(report)
}
