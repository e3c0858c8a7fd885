//! Exchange classifier: which face a departed particle leaves through.

use super::state::ExchangeState;
use crate::data::particle::Particle;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::patch::Patch;
use crate::topology::bounds::LocalBounds;
use crate::topology::grid::PatchGrid;
use crate::topology::side::{AxisSide, Side};

/// First face, testing axes `from_axis..n_dim` in order, that `p` lies beyond.
///
/// The lowest axis wins when several are violated at once.
pub fn classify(p: &Particle, bounds: &LocalBounds, from_axis: usize) -> Option<AxisSide> {
    (from_axis..bounds.n_dim).find_map(|axis| {
        bounds
            .outside(axis, p.coord(axis))
            .map(|side| AxisSide::new(axis, side))
    })
}

/// Fold a coordinate leaving the global box through a periodic face back in.
///
/// Applies only when patch `hindex` sits on that global face and the
/// coordinate is actually past it, so calling it twice is harmless.
pub fn wrap_periodic(p: &mut Particle, face: AxisSide, grid: &PatchGrid, hindex: usize) {
    let AxisSide { axis, side } = face;
    if !grid.is_periodic(axis) || !grid.at_global_edge(hindex, axis, side) {
        return;
    }
    let length = grid.domain_length(axis);
    let x = &mut p.position[axis];
    match side {
        Side::Low if *x < 0.0 => {
            *x += length;
            // A tiny negative coordinate rounds onto the excluded upper edge.
            if *x >= length {
                *x = below(length);
            }
        }
        Side::High if *x >= length => *x -= length,
        _ => {}
    }
}

/// Largest `f64` strictly below a positive finite `v`.
#[inline]
fn below(v: f64) -> f64 {
    f64::from_bits(v.to_bits() - 1)
}

/// Queue every departed particle of `species` in `patch` into its face's
/// send list, or count it lost when no neighbor sits across that face.
///
/// Indices of particles found inside the patch are dropped from the
/// departed list; those particles stay where they are.
pub(crate) fn init_exchange(
    patch: &mut Patch,
    species: usize,
    grid: &PatchGrid,
    state: &mut ExchangeState,
) -> Result<(), ExchangeError> {
    let hindex = patch.hindex;
    let bounds = patch.bounds;
    let sp = patch
        .species
        .get_mut(species)
        .ok_or(ExchangeError::UnknownSpecies(species))?;
    sp.departed.sort_unstable();
    sp.departed.dedup();

    let mut kept = Vec::with_capacity(sp.departed.len());
    for &idx in &sp.departed {
        let p = sp
            .store
            .get_mut(idx)
            .map_err(|e| e.within(ErrorContext::species(species)))?;
        let Some(face) = classify(p, &bounds, 0) else {
            log::trace!("[exchange] patch {hindex}: particle {} did not leave", p.id);
            continue;
        };
        kept.push(idx);
        if patch.neighbors.get(face.axis, face.side).is_some() {
            wrap_periodic(p, face, grid, hindex);
            state.send_indices[(face.axis, face.side)].push(idx);
        } else {
            state.lost += 1;
        }
    }
    sp.departed = kept;
    Ok(())
}
