//! Transient per-patch exchange state, rebuilt for every call.

use crate::algs::communicator::{Communicator, Wait};
use crate::data::particle::Particle;
use crate::exchange_error::{ErrorContext, ExchangeError};
use crate::topology::neighbors::Neighbor;
use crate::topology::side::Side;
use std::ops::{Index, IndexMut};

/// One `T` per `(axis, side)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AxisSides<T>(Vec<[T; 2]>);

impl<T: Default> AxisSides<T> {
    pub fn new(n_dim: usize) -> Self {
        Self((0..n_dim).map(|_| [T::default(), T::default()]).collect())
    }
}

impl<T> AxisSides<T> {
    pub fn n_dim(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Side, &T)> {
        self.0.iter().enumerate().flat_map(|(axis, pair)| {
            Side::ALL
                .into_iter()
                .map(move |side| (axis, side, &pair[side.index()]))
        })
    }
}

impl<T> Index<(usize, Side)> for AxisSides<T> {
    type Output = T;

    fn index(&self, (axis, side): (usize, Side)) -> &T {
        &self.0[axis][side.index()]
    }
}

impl<T> IndexMut<(usize, Side)> for AxisSides<T> {
    fn index_mut(&mut self, (axis, side): (usize, Side)) -> &mut T {
        &mut self.0[axis][side.index()]
    }
}

/// Everything one patch accumulates during one exchange of one species.
#[derive(Clone, Debug, Default)]
pub struct ExchangeState {
    /// Store indices queued to leave through each face.
    pub send_indices: AxisSides<Vec<usize>>,
    /// Particle counts announced by each neighbor.
    pub recv_counts: AxisSides<usize>,
    /// Particles received through each face.
    pub recv: AxisSides<Vec<Particle>>,
    /// Particles shipped through a face (a corner particle counts once per hop).
    pub sent: usize,
    /// Particles dropped at a non-periodic boundary.
    pub lost: usize,
    /// Particles inserted into the store.
    pub received: usize,
}

impl ExchangeState {
    pub fn new(n_dim: usize) -> Self {
        Self {
            send_indices: AxisSides::new(n_dim),
            recv_counts: AxisSides::new(n_dim),
            recv: AxisSides::new(n_dim),
            ..Self::default()
        }
    }
}

/// Where a posted receive's payload goes.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RecvMeta {
    pub slot: usize,
    pub axis: usize,
    pub side: Side,
    pub neighbor: Neighbor,
    pub expected: usize,
}

/// All handles posted by one stage of one axis.
pub(crate) struct InFlight<C: Communicator> {
    pub recvs: Vec<(RecvMeta, C::RecvHandle)>,
    pub sends: Vec<C::SendHandle>,
}

impl<C: Communicator> InFlight<C> {
    pub fn new() -> Self {
        Self {
            recvs: Vec::new(),
            sends: Vec::new(),
        }
    }

    /// Wait on every handle. `on_data` consumes each payload; the first
    /// failure is returned only after all handles have completed.
    pub fn drain<F>(self, species: usize, mut on_data: F) -> Result<(), ExchangeError>
    where
        F: FnMut(RecvMeta, Vec<u8>) -> Result<(), ExchangeError>,
    {
        let mut first_err = None;
        for (meta, handle) in self.recvs {
            let result = match handle.wait() {
                Some(bytes) => on_data(meta, bytes),
                None => {
                    let context =
                        ErrorContext::species(species).with_axis_side(meta.axis, meta.side);
                    log::error!(
                        "[exchange] no reply from patch {} on rank {} ({context})",
                        meta.neighbor.patch,
                        meta.neighbor.rank
                    );
                    Err(ExchangeError::TransferTimeout {
                        context,
                        peer_rank: meta.neighbor.rank,
                        peer_patch: meta.neighbor.patch,
                    })
                }
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        let unfinished = self
            .sends
            .into_iter()
            .map(Wait::wait)
            .filter(Option::is_none)
            .count();
        if unfinished > 0 {
            log::warn!("[exchange] species {species}: {unfinished} send(s) did not complete");
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_sides_index_by_face() {
        let mut s: AxisSides<usize> = AxisSides::new(2);
        s[(1, Side::High)] = 4;
        s[(0, Side::Low)] = 1;
        let flat: Vec<usize> = s.iter().map(|(_, _, v)| *v).collect();
        assert_eq!(flat, vec![1, 0, 0, 4]);
        assert_eq!(s.n_dim(), 2);
    }

    #[test]
    fn drain_reports_silent_receive_after_all_sends() {
        use crate::algs::communicator::NoComm;
        let meta = RecvMeta {
            slot: 0,
            axis: 1,
            side: Side::High,
            neighbor: Neighbor { patch: 3, rank: 1 },
            expected: 1,
        };
        let flight: InFlight<NoComm> = InFlight {
            recvs: vec![(meta, ())],
            sends: vec![(), ()],
        };
        let mut seen = 0;
        let err = flight
            .drain(2, |_, _| {
                seen += 1;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(seen, 0);
        match err {
            ExchangeError::TransferTimeout {
                context,
                peer_rank,
                peer_patch,
            } => {
                assert_eq!((peer_rank, peer_patch), (1, 3));
                assert_eq!(context.species, Some(2));
                assert_eq!(context.axis, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }

        let sends_only: InFlight<NoComm> = InFlight {
            recvs: Vec::new(),
            sends: vec![()],
        };
        assert!(sends_only.drain(0, |_, _| Ok(())).is_ok());
    }
}
