//! Size handshake: every face learns how many particles it will receive.

use super::Stage;
use super::state::{ExchangeState, InFlight, RecvMeta};
use crate::algs::communicator::{Communicator, Phase};
use crate::algs::wire::{WireCount, cast_slice, decode_count};
use crate::exchange_error::ExchangeError;
use crate::patch::Patch;
use crate::topology::side::Side;
use std::mem::size_of;

/// Announce send counts along `axis`.
///
/// Co-located neighbors get the count written straight into their
/// `recv_counts`; remote ones get a [`WireCount`] message, and a matching
/// receive is posted for theirs. Faces on a physical boundary are skipped.
pub(crate) fn issue<C: Communicator>(
    stage: &Stage<'_, C>,
    patches: &[Patch],
    states: &mut [ExchangeState],
    axis: usize,
) -> Result<InFlight<C>, ExchangeError> {
    let mut flight = InFlight::new();
    let mut local_writes = Vec::new();
    for (slot, patch) in patches.iter().enumerate() {
        for side in Side::ALL {
            let Some(neighbor) = patch.neighbors.get(axis, side) else {
                continue;
            };
            let count = states[slot].send_indices[(axis, side)].len();
            match stage.local_slot(&patch.neighbors, axis, side)? {
                Some(j) => local_writes.push((j, side.opposite(), count)),
                None => {
                    let msg = WireCount::new(count)?;
                    let tag = stage.tag(patch.hindex, axis, side, Phase::Size)?;
                    flight.sends.push(stage.comm.isend(
                        neighbor.rank,
                        tag,
                        cast_slice(std::slice::from_ref(&msg)),
                    ));
                    let tag = stage.tag(neighbor.patch, axis, side.opposite(), Phase::Size)?;
                    let mut buf = [0u8; size_of::<WireCount>()];
                    let handle = stage.comm.irecv(neighbor.rank, tag, &mut buf);
                    let meta = RecvMeta {
                        slot,
                        axis,
                        side,
                        neighbor,
                        expected: 1,
                    };
                    flight.recvs.push((meta, handle));
                }
            }
        }
    }
    for (j, side, count) in local_writes {
        states[j].recv_counts[(axis, side)] = count;
    }
    Ok(flight)
}

/// Wait for every remote count posted by [`issue`].
pub(crate) fn complete<C: Communicator>(
    stage: &Stage<'_, C>,
    flight: InFlight<C>,
    states: &mut [ExchangeState],
) -> Result<(), ExchangeError> {
    flight.drain(stage.species, |meta, bytes| {
        let n = decode_count(&bytes, meta.neighbor.rank)?;
        states[meta.slot].recv_counts[(meta.axis, meta.side)] = n;
        Ok(())
    })
}
