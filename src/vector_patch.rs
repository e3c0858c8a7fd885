//! The patches held by one rank, and the entry point of the exchange.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{self, ExchangeReport};
use crate::data::particle::Particle;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::params::SimulationParams;
use crate::patch::Patch;
use crate::topology::grid::PatchGrid;
use hashbrown::HashMap;

/// Boundary losses per species, accumulated across steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LossTally {
    per_species: Vec<u64>,
}

impl LossTally {
    pub fn record(&mut self, species: usize, lost: usize) {
        if self.per_species.len() <= species {
            self.per_species.resize(species + 1, 0);
        }
        self.per_species[species] += lost as u64;
    }

    pub fn get(&self, species: usize) -> u64 {
        self.per_species.get(species).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.per_species.iter().sum()
    }
}

/// Co-located patches of one rank.
#[derive(Debug)]
pub struct VectorPatch {
    pub(crate) params: SimulationParams,
    pub(crate) grid: PatchGrid,
    pub(crate) rank: usize,
    pub(crate) patches: Vec<Patch>,
    /// Global patch index -> position in `patches`.
    pub(crate) slots: HashMap<usize, usize>,
    pub(crate) losses: LossTally,
}

impl VectorPatch {
    /// Build the patches `rank` owns in a world of `n_ranks`.
    pub fn new(
        params: SimulationParams,
        n_ranks: usize,
        rank: usize,
        species_names: &[&str],
    ) -> Result<Self, ExchangeError> {
        let grid = PatchGrid::new(&params, n_ranks)?;
        if rank >= n_ranks {
            return Err(ExchangeError::InvalidConfig(format!(
                "rank {rank} outside a world of {n_ranks}"
            )));
        }
        let patches = grid
            .patches_of(rank)
            .map(|h| Patch::new(&grid, &params, h, species_names))
            .collect::<Result<Vec<_>, _>>()?;
        let slots = patches
            .iter()
            .enumerate()
            .map(|(slot, p)| (p.hindex, slot))
            .collect();
        log::debug!(
            "[vector_patch] rank {rank}/{n_ranks}: {} of {} patches",
            patches.len(),
            grid.total_patches()
        );
        Ok(Self {
            params,
            grid,
            rank,
            patches,
            slots,
            losses: LossTally::default(),
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn grid(&self) -> &PatchGrid {
        &self.grid
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut [Patch] {
        &mut self.patches
    }

    pub fn patch(&self, hindex: usize) -> Result<&Patch, ExchangeError> {
        let slot = self.slot(hindex)?;
        Ok(&self.patches[slot])
    }

    pub fn patch_mut(&mut self, hindex: usize) -> Result<&mut Patch, ExchangeError> {
        let slot = self.slot(hindex)?;
        Ok(&mut self.patches[slot])
    }

    fn slot(&self, hindex: usize) -> Result<usize, ExchangeError> {
        self.slots
            .get(&hindex)
            .copied()
            .ok_or(ExchangeError::UnknownPatch(hindex))
    }

    pub fn losses(&self) -> &LossTally {
        &self.losses
    }

    /// Distribute `particles` of `species` to the local patches containing
    /// them, replacing what they held. Particles of other ranks' patches are
    /// skipped; returns how many were kept.
    pub fn load_particles(
        &mut self,
        species: usize,
        particles: Vec<Particle>,
    ) -> Result<usize, ExchangeError> {
        let mut per_slot: Vec<Vec<Particle>> = vec![Vec::new(); self.patches.len()];
        let mut kept = 0usize;
        for p in particles {
            let Some(h) = self.grid.locate(&p.position) else {
                return Err(ExchangeError::invariant(
                    ErrorContext::species(species),
                    format!("particle {} lies outside the simulation box", p.id),
                ));
            };
            if let Some(&slot) = self.slots.get(&h) {
                per_slot[slot].push(p);
                kept += 1;
            }
        }
        for (patch, parts) in self.patches.iter_mut().zip(per_slot) {
            patch.load_particles(species, parts)?;
        }
        Ok(kept)
    }

    /// Scan every local patch for particles of `species` outside its bounds.
    pub fn collect_departed(&mut self, species: usize) -> Result<usize, ExchangeError> {
        let mut n = 0;
        for patch in &mut self.patches {
            n += patch.collect_departed(species)?;
        }
        Ok(n)
    }

    /// Move departed particles of `species` to the patches now containing
    /// them. Collective over all ranks of `comm`.
    pub fn exchange_particles<C: Communicator>(
        &mut self,
        species: usize,
        comm: &C,
    ) -> Result<ExchangeReport, ExchangeError> {
        exchange::exchange_particles(self, species, comm)
    }

    pub fn total_particles(&self, species: usize) -> usize {
        self.patches
            .iter()
            .filter_map(|p| p.species.get(species))
            .map(|s| s.len())
            .sum()
    }

    /// Verify every particle of `species` sits in its patch and its bin.
    pub fn check_binning(&self, species: usize) -> Result<(), ExchangeError> {
        let bin_width = self.params.bin_width();
        for patch in &self.patches {
            let sp = patch.species(species)?;
            let ctx = ErrorContext::species(species);
            if let Some(p) = sp
                .store
                .as_slice()
                .iter()
                .find(|p| !patch.bounds.contains(&p.position))
            {
                return Err(ExchangeError::invariant(
                    ctx,
                    format!("particle {} lies outside patch {}", p.id, patch.hindex),
                ));
            }
            sp.store
                .check_binning(patch.bounds.min[0], bin_width)
                .map_err(|e| e.within(ctx))?;
        }
        Ok(())
    }
}
