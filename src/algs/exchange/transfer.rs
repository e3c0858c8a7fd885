//! Bulk transfer of particle records along one axis, plus forwarding of
//! corner particles to later axes.

use super::Stage;
use super::classify::{classify, wrap_periodic};
use super::state::{ExchangeState, InFlight, RecvMeta};
use crate::algs::communicator::{Communicator, Phase};
use crate::algs::wire::{cast_slice, decode_particles, particle_bytes};
use crate::data::particle::Particle;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::patch::Patch;
use crate::topology::side::{AxisSide, Side};

/// Ship every queued record along `axis`.
///
/// Records are copied out of the store after the periodic correction is
/// reapplied. Co-located neighbors receive them by value into their receive
/// buffer; remote neighbors get one message per face. Empty faces send
/// nothing and post no receive.
pub(crate) fn issue<C: Communicator>(
    stage: &Stage<'_, C>,
    patches: &mut [Patch],
    states: &mut [ExchangeState],
    axis: usize,
) -> Result<InFlight<C>, ExchangeError> {
    let mut flight = InFlight::new();
    let mut deliveries: Vec<(usize, Side, Vec<Particle>)> = Vec::new();
    for (slot, (patch, state)) in patches.iter_mut().zip(states.iter_mut()).enumerate() {
        let hindex = patch.hindex;
        for side in Side::ALL {
            let Some(neighbor) = patch.neighbors.get(axis, side) else {
                continue;
            };
            let face = AxisSide::new(axis, side);
            let ctx = ErrorContext::species(stage.species).with_axis_side(axis, side);
            let store = &mut patch.species_mut(stage.species)?.store;
            let queued = &state.send_indices[(axis, side)];
            let mut records = Vec::with_capacity(queued.len());
            for &idx in queued {
                let p = store.get_mut(idx).map_err(|e| e.within(ctx))?;
                wrap_periodic(p, face, stage.grid, hindex);
                records.push(*p);
            }
            state.sent += records.len();

            match stage.local_slot(&patch.neighbors, axis, side)? {
                Some(j) => {
                    if !records.is_empty() {
                        deliveries.push((j, side.opposite(), records));
                    }
                }
                None => {
                    if !records.is_empty() {
                        let tag = stage.tag(hindex, axis, side, Phase::Particles)?;
                        flight
                            .sends
                            .push(stage.comm.isend(neighbor.rank, tag, cast_slice(&records)));
                    }
                    let expected = state.recv_counts[(axis, side)];
                    if expected > 0 {
                        let tag =
                            stage.tag(neighbor.patch, axis, side.opposite(), Phase::Particles)?;
                        let mut buf = vec![0u8; particle_bytes(expected)];
                        let handle = stage.comm.irecv(neighbor.rank, tag, &mut buf);
                        let meta = RecvMeta {
                            slot,
                            axis,
                            side,
                            neighbor,
                            expected,
                        };
                        flight.recvs.push((meta, handle));
                    }
                }
            }
        }
    }
    for (j, side, records) in deliveries {
        states[j].recv[(axis, side)].extend(records);
    }
    Ok(flight)
}

/// Wait for every remote record message posted by [`issue`].
pub(crate) fn complete<C: Communicator>(
    stage: &Stage<'_, C>,
    flight: InFlight<C>,
    states: &mut [ExchangeState],
) -> Result<(), ExchangeError> {
    flight.drain(stage.species, |meta, bytes| {
        let particles = decode_particles(&bytes, meta.expected, meta.neighbor.rank)?;
        states[meta.slot].recv[(meta.axis, meta.side)].extend(particles);
        Ok(())
    })
}

/// Forward arrivals of `axis` that are still outside the patch on a later axis.
///
/// Such a particle is parked at the end of the local store (inside the last
/// bin), queued on the face it must leave through and marked departed, so
/// the next axis ships it and compaction deletes the parked copy. Without a
/// neighbor on that face it is counted lost. Either way it leaves the
/// receive buffer, whose count shrinks to match.
pub(crate) fn forward_corners<C: Communicator>(
    stage: &Stage<'_, C>,
    patches: &mut [Patch],
    states: &mut [ExchangeState],
    axis: usize,
) -> Result<(), ExchangeError> {
    if axis + 1 >= stage.grid.n_dim() {
        return Ok(());
    }
    for (patch, state) in patches.iter_mut().zip(states.iter_mut()) {
        let hindex = patch.hindex;
        let bounds = patch.bounds;
        let sp = patch
            .species
            .get_mut(stage.species)
            .ok_or(ExchangeError::UnknownSpecies(stage.species))?;
        for side in Side::ALL {
            let arrived = std::mem::take(&mut state.recv[(axis, side)]);
            let mut stay = Vec::with_capacity(arrived.len());
            for mut p in arrived {
                let Some(face) = classify(&p, &bounds, axis + 1) else {
                    stay.push(p);
                    continue;
                };
                if patch.neighbors.get(face.axis, face.side).is_none() {
                    state.lost += 1;
                    continue;
                }
                wrap_periodic(&mut p, face, stage.grid, hindex);
                let idx = sp.store.append_to_last_bin(p).map_err(|e| {
                    e.within(ErrorContext::species(stage.species).with_axis_side(axis, side))
                })?;
                state.send_indices[(face.axis, face.side)].push(idx);
                sp.departed.push(idx);
            }
            state.recv_counts[(axis, side)] = stay.len();
            state.recv[(axis, side)] = stay;
        }
    }
    Ok(())
}
