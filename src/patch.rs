//! A patch: one rectangular piece of the simulation box and its particles.

use crate::data::particle::Particle;
use crate::data::particle_store::ParticleStore;
use crate::data::species::Species;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::params::SimulationParams;
use crate::physics::operators::OperatorSet;
use crate::topology::bounds::LocalBounds;
use crate::topology::grid::PatchGrid;
use crate::topology::neighbors::NeighborTable;
use crate::topology::side::MAX_DIM;

#[derive(Debug)]
pub struct Patch {
    /// Global patch index.
    pub hindex: usize,
    /// Position in the patch grid.
    pub coords: [usize; MAX_DIM],
    pub bounds: LocalBounds,
    pub neighbors: NeighborTable,
    /// One entry per species, in the order given at construction.
    pub species: Vec<Species>,
    pub operators: OperatorSet,
    bin_width: f64,
}

impl Patch {
    /// Patch `hindex` of `grid`, with an empty store per species.
    pub fn new(
        grid: &PatchGrid,
        params: &SimulationParams,
        hindex: usize,
        species_names: &[&str],
    ) -> Result<Self, ExchangeError> {
        if hindex >= grid.total_patches() {
            return Err(ExchangeError::UnknownPatch(hindex));
        }
        let n_bins = params.n_bins();
        Ok(Self {
            hindex,
            coords: grid.coords(hindex),
            bounds: grid.bounds(hindex),
            neighbors: grid.neighbors(hindex),
            species: species_names
                .iter()
                .map(|name| Species::new(*name, n_bins))
                .collect(),
            operators: OperatorSet::from_params(params)?,
            bin_width: params.bin_width(),
        })
    }

    pub fn species(&self, species: usize) -> Result<&Species, ExchangeError> {
        self.species
            .get(species)
            .ok_or(ExchangeError::UnknownSpecies(species))
    }

    pub fn species_mut(&mut self, species: usize) -> Result<&mut Species, ExchangeError> {
        self.species
            .get_mut(species)
            .ok_or(ExchangeError::UnknownSpecies(species))
    }

    /// Width of one bin along axis 0.
    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Replace the particles of `species`, binning them by axis-0 coordinate.
    pub fn load_particles(
        &mut self,
        species: usize,
        particles: Vec<Particle>,
    ) -> Result<(), ExchangeError> {
        let origin = self.bounds.min[0];
        let bin_width = self.bin_width;
        let sp = self.species_mut(species)?;
        let n_bins = sp.store.n_bins();
        sp.store = ParticleStore::from_particles(particles, origin, bin_width, n_bins)
            .map_err(|e| e.within(ErrorContext::species(species)))?;
        sp.departed.clear();
        Ok(())
    }

    /// Mark every particle of `species` outside the patch as departed.
    ///
    /// Stands in for the particle push, which normally hands this list over.
    /// Returns how many were found.
    pub fn collect_departed(&mut self, species: usize) -> Result<usize, ExchangeError> {
        let bounds = self.bounds;
        let sp = self.species_mut(species)?;
        let outside: Vec<usize> = sp
            .store
            .as_slice()
            .iter()
            .enumerate()
            .filter(|(_, p)| !bounds.contains(&p.position))
            .map(|(i, _)| i)
            .collect();
        let n = outside.len();
        sp.departed = outside;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimulationParams {
        SimulationParams {
            n_dim: 1,
            cell_length: vec![1.0],
            n_space: vec![10],
            number_of_patches: vec![4],
            periodic: vec![false],
            cells_per_bin: 5,
            ..SimulationParams::default()
        }
    }

    #[test]
    fn departed_scan_finds_leavers() {
        let p = params();
        let grid = PatchGrid::new(&p, 1).unwrap();
        let mut patch = Patch::new(&grid, &p, 1, &["electron"]).unwrap();
        patch
            .load_particles(
                0,
                vec![
                    Particle::at(1, [12.0, 0.0, 0.0]),
                    Particle::at(2, [17.0, 0.0, 0.0]),
                ],
            )
            .unwrap();
        patch.species_mut(0).unwrap().store.get_mut(1).unwrap().position[0] = 20.5;
        assert_eq!(patch.collect_departed(0).unwrap(), 1);
        assert_eq!(patch.species(0).unwrap().departed, vec![1]);
        assert!(patch.species(1).is_err());
    }

    #[test]
    fn load_rejects_particles_of_other_patches() {
        let p = params();
        let grid = PatchGrid::new(&p, 1).unwrap();
        let mut patch = Patch::new(&grid, &p, 0, &["ion"]).unwrap();
        let err = patch
            .load_particles(0, vec![Particle::at(1, [15.0, 0.0, 0.0])])
            .unwrap_err();
        match err {
            ExchangeError::InvariantViolation { context, .. } => {
                assert_eq!(context.species, Some(0))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
