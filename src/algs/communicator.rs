//! Thin façade over intra-process (Rayon) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the exchange posts every
//! send and receive of a stage first and only then calls `.wait()`, so two
//! symmetric neighbors never block on each other. A receive handle that is
//! still unanswered when its timeout elapses yields `None` from `wait`; the
//! exchange turns that into a fatal `TransferTimeout`.

use crate::exchange_error::ExchangeError;
use crate::params::SimulationParams;
use crate::topology::side::{MAX_DIM, Side};
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time a posted receive may wait for its matching send.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf` to `peer`.
    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `buf.len()` bytes from `peer`; the data comes back
    /// from `wait`, at its actual length.
    fn irecv(&self, peer: usize, tag: u32, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion. A receive yields its whole payload, a completed
    /// send yields an empty buffer; `None` means the request never completed.
    fn wait(self) -> Option<Vec<u8>>;
}

/// Which of the two messages of an axis/side exchange a tag belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Particle count handshake.
    Size,
    /// Particle records.
    Particles,
}

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u32);

impl CommTag {
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Tag of the message `sender_patch` emits through `side` of `axis`.
    ///
    /// A receiver reconstructs it from its neighbor's patch index and
    /// `side.opposite()`. Including the side keeps the two messages apart
    /// when the same neighbor sits on both faces (periodic axis with two
    /// patches). Tags are checked against `i32::MAX`, the widest range MPI
    /// allows. An MPI library only guarantees `MPI_TAG_UB >= 32767`, so large
    /// layouts may exceed a smaller bound there and fail inside MPI.
    pub fn for_particles(
        species: usize,
        sender_patch: usize,
        axis: usize,
        side: Side,
        phase: Phase,
    ) -> Result<Self, ExchangeError> {
        let phase_bit = match phase {
            Phase::Size => 0u64,
            Phase::Particles => 1u64,
        };
        let per_patch = (MAX_DIM * 2 * 2) as u64;
        let local = ((axis as u64 * 2) + side.index() as u64) * 2 + phase_bit;
        let encoded = (sender_patch as u64)
            .checked_mul(per_patch)
            .and_then(|v| v.checked_add(local))
            .and_then(|v| v.checked_mul(1 << 4))
            .and_then(|v| v.checked_add((species as u64) & 0xF));
        match encoded {
            Some(v) if v <= i32::MAX as u64 && species < 16 => Ok(Self(v as u32)),
            _ => Err(ExchangeError::TagOverflow {
                species,
                patch: sender_patch,
            }),
        }
    }
}

/// Compile-time no-op comm for pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u32, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u32, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u32); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

static MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(DashMap::new()));

/// Send on a [`RayonComm`]; the payload is in the mailbox once posted.
#[derive(Copy, Clone, Debug)]
pub struct Posted;

impl Wait for Posted {
    fn wait(self) -> Option<Vec<u8>> {
        Some(Vec::new())
    }
}

/// Pending receive on a [`RayonComm`]; polls the mailbox when waited on.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    timeout: Duration,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let start = Instant::now();
        let mut spins = 0u32;
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    return Some(bytes.to_vec());
                }
            }
            if start.elapsed() >= self.timeout {
                return None;
            }
            spins += 1;
            if spins < 64 {
                std::thread::yield_now();
            } else {
                std::thread::sleep(Duration::from_micros(50));
            }
        }
    }
}

/// Ranks living in one process, exchanging through a shared FIFO mailbox.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Duration,
}

impl fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RayonComm {
    /// Rank `rank` of `size`, on the process-global mailbox.
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: MAILBOX.clone(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// `size` ranks sharing a fresh mailbox, isolated from every other group.
    pub fn group(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                timeout: DEFAULT_TIMEOUT,
            })
            .collect()
    }

    /// Like [`RayonComm::group`], with receives bounded by `params.comm_timeout()`.
    pub fn group_from_params(size: usize, params: &SimulationParams) -> Vec<Self> {
        let timeout = params.comm_timeout();
        Self::group(size)
            .into_iter()
            .map(|c| c.with_timeout(timeout))
            .collect()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Messages posted but not yet received, across the whole mailbox.
    pub fn pending_messages(&self) -> usize {
        self.mailbox.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Communicator for RayonComm {
    type SendHandle = Posted;
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        Posted
    }

    fn irecv(&self, peer: usize, tag: u32, _buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            timeout: self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, DEFAULT_TIMEOUT, Wait};
    use crate::exchange_error::ExchangeError;
    use crate::params::SimulationParams;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, Destination, Source};
    use std::time::{Duration, Instant};

    enum Poll {
        Pending,
        Ready(Option<Vec<u8>>),
    }

    /// Request handle; `poll(true)` abandons an incomplete request.
    pub struct MpiHandle {
        poll: Box<dyn FnMut(bool) -> Poll>,
        timeout: Duration,
    }

    impl Wait for MpiHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            let start = Instant::now();
            loop {
                match (self.poll)(false) {
                    Poll::Ready(data) => return data,
                    Poll::Pending if start.elapsed() >= self.timeout => {
                        let _ = (self.poll)(true);
                        return None;
                    }
                    Poll::Pending => std::thread::yield_now(),
                }
            }
        }
    }

    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        timeout: Duration,
    }

    // SAFETY: the exchange drives one MpiComm from a single thread at a time;
    // MPI is initialized at the default (funneled) threading level.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, ExchangeError> {
            let universe = mpi::initialize().ok_or_else(|| {
                ExchangeError::InvalidConfig("MPI was already initialized".to_string())
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
                timeout: DEFAULT_TIMEOUT,
            })
        }

        /// World communicator with receives bounded by `params.comm_timeout()`.
        pub fn from_params(params: &SimulationParams) -> Result<Self, ExchangeError> {
            Ok(Self::new()?.with_timeout(params.comm_timeout()))
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> MpiHandle {
            let owned: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = owned;
            // SAFETY: `ptr` comes from a leaked box and is reclaimed exactly once,
            // after the request completed.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag as i32);
            let mut slot = Some(req);
            MpiHandle {
                poll: Box::new(move |abandon| match slot.take() {
                    None => Poll::Ready(None),
                    Some(r) if abandon => {
                        std::mem::forget(r);
                        Poll::Ready(None)
                    }
                    Some(r) => match r.test() {
                        Ok(_) => {
                            drop(unsafe { Box::from_raw(ptr) });
                            Poll::Ready(Some(Vec::new()))
                        }
                        Err(r) => {
                            slot = Some(r);
                            Poll::Pending
                        }
                    },
                }),
                timeout: self.timeout,
            }
        }

        fn irecv(&self, peer: usize, tag: u32, buf: &mut [u8]) -> MpiHandle {
            let owned: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = owned;
            // SAFETY: as in `isend`; the box is only read back after completion.
            let data: &'static mut [u8] = unsafe { &mut *ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, tag as i32);
            let mut slot = Some(req);
            MpiHandle {
                poll: Box::new(move |abandon| match slot.take() {
                    None => Poll::Ready(None),
                    Some(r) if abandon => {
                        std::mem::forget(r);
                        Poll::Ready(None)
                    }
                    Some(r) => match r.test() {
                        Ok(_) => {
                            let boxed = unsafe { Box::from_raw(ptr) };
                            Poll::Ready(Some(boxed.into_vec()))
                        }
                        Err(r) => {
                            slot = Some(r);
                            Poll::Pending
                        }
                    },
                }),
                timeout: self.timeout,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let comms = RayonComm::group(2);
        let mut recv_buf = [0u8; 4];
        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn unanswered_receive_times_out() {
        let comms = RayonComm::group(2);
        let c1 = comms[1].clone().with_timeout(Duration::from_millis(20));
        let mut buf = [0u8; 4];
        assert!(c1.irecv(0, 1, &mut buf).wait().is_none());
    }

    #[test]
    fn groups_are_isolated() {
        let a = RayonComm::group(2);
        let b = RayonComm::group(2);
        a[0].isend(1, 3, &[9]);
        let mut buf = [0u8; 1];
        let h = b[1]
            .clone()
            .with_timeout(Duration::from_millis(10))
            .irecv(0, 3, &mut buf);
        assert!(h.wait().is_none());
        assert_eq!(a[0].pending_messages(), 1);
    }

    #[test]
    fn tags_distinguish_sides_and_phases() {
        let a = CommTag::for_particles(0, 5, 1, Side::Low, Phase::Size).unwrap();
        let b = CommTag::for_particles(0, 5, 1, Side::High, Phase::Size).unwrap();
        let c = CommTag::for_particles(0, 5, 1, Side::Low, Phase::Particles).unwrap();
        let d = CommTag::for_particles(1, 5, 1, Side::Low, Phase::Size).unwrap();
        let e = CommTag::for_particles(0, 6, 1, Side::Low, Phase::Size).unwrap();
        let all = [a, b, c, d, e];
        for i in 0..all.len() {
            for j in i + 1..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
        assert!(CommTag::for_particles(0, usize::MAX / 2, 0, Side::Low, Phase::Size).is_err());
        assert!(CommTag::for_particles(16, 0, 0, Side::Low, Phase::Size).is_err());
    }
}
