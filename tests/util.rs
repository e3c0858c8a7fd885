#![allow(dead_code)]
use patch_exchange::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// 1-D box of `n_patches` patches, each `n_space` unit cells wide.
pub fn params_1d(
    n_patches: usize,
    n_space: usize,
    cells_per_bin: usize,
    periodic: bool,
) -> SimulationParams {
    SimulationParams {
        n_dim: 1,
        cell_length: vec![1.0],
        n_space: vec![n_space],
        number_of_patches: vec![n_patches],
        periodic: vec![periodic],
        cells_per_bin,
        ..SimulationParams::default()
    }
}

/// 2-D box with unit cells.
pub fn params_2d(
    patches: [usize; 2],
    n_space: [usize; 2],
    periodic: [bool; 2],
) -> SimulationParams {
    SimulationParams {
        n_dim: 2,
        cell_length: vec![1.0, 1.0],
        n_space: n_space.to_vec(),
        number_of_patches: patches.to_vec(),
        periodic: periodic.to_vec(),
        cells_per_bin: 2,
        ..SimulationParams::default()
    }
}

/// `n` particles uniformly spread over the box, ids `0..n`.
pub fn random_particles(
    rng: &mut SmallRng,
    params: &SimulationParams,
    n: usize,
) -> Vec<Particle> {
    (0..n as u64)
        .map(|id| {
            let mut pos = [0.0; 3];
            for axis in 0..params.n_dim {
                pos[axis] = rng.gen_range(0.0..params.domain_length(axis));
            }
            Particle::at(id, pos)
        })
        .collect()
}

/// Move every particle of `species` by `f`, then hand the leavers over.
pub fn push<F: FnMut(&mut Particle)>(vp: &mut VectorPatch, species: usize, mut f: F) -> usize {
    for patch in vp.patches_mut() {
        let store = &mut patch.species_mut(species).unwrap().store;
        for i in 0..store.len() {
            f(store.get_mut(i).unwrap());
        }
    }
    vp.collect_departed(species).unwrap()
}

/// Random single-step motion that keeps every store sorted.
///
/// Particles within 0.9 of a cell from a face may hop 0.9 cell across it;
/// everyone else stays put, so no particle changes bin inside its patch and
/// every arrival lands in the edge cell it crossed into.
pub fn random_push(rng: &mut SmallRng, vp: &mut VectorPatch, species: usize) -> usize {
    let params = vp.params().clone();
    for patch in vp.patches_mut() {
        let bounds = patch.bounds;
        let store = &mut patch.species_mut(species).unwrap().store;
        for i in 0..store.len() {
            let p = store.get_mut(i).unwrap();
            let start = p.position;
            for axis in 0..params.n_dim {
                let hop = params.cell_length[axis] * 0.9;
                let x = start[axis];
                if !rng.gen_bool(0.5) {
                    continue;
                }
                if x - bounds.min[axis] < hop {
                    p.position[axis] = x - hop;
                } else if bounds.max[axis] - x <= hop {
                    p.position[axis] = x + hop;
                }
            }
        }
    }
    vp.collect_departed(species).unwrap()
}

pub fn all_particles(vp: &VectorPatch, species: usize) -> Vec<Particle> {
    vp.patches()
        .iter()
        .flat_map(|p| p.species(species).unwrap().store.as_slice().to_vec())
        .collect()
}

pub fn sorted_ids(parts: &[Particle]) -> Vec<u64> {
    let mut ids: Vec<u64> = parts.iter().map(|p| p.id).collect();
    ids.sort_unstable();
    ids
}

pub fn seeded(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Wraps a communicator and records the tag of every posted send.
pub struct CountingComm<C> {
    pub inner: C,
    pub sent_tags: Mutex<Vec<u32>>,
}

impl<C> CountingComm<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            sent_tags: Mutex::new(Vec::new()),
        }
    }

    pub fn sends(&self) -> usize {
        self.sent_tags.lock().unwrap().len()
    }

    pub fn sorted_tags(&self) -> Vec<u32> {
        let mut tags = self.sent_tags.lock().unwrap().clone();
        tags.sort_unstable();
        tags
    }
}

impl<C: Communicator> Communicator for CountingComm<C> {
    type SendHandle = C::SendHandle;
    type RecvHandle = C::RecvHandle;

    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Self::SendHandle {
        self.sent_tags.lock().unwrap().push(tag);
        self.inner.isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: u32, buf: &mut [u8]) -> Self::RecvHandle {
        self.inner.irecv(peer, tag, buf)
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn is_no_comm(&self) -> bool {
        self.inner.is_no_comm()
    }
}
