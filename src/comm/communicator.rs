//! Communication abstraction for intra-process (thread) and inter-process
//! (MPI) message passing.
//!
//! The engine is poll-driven: a suspended collective is advanced by asking
//! each of its pending receives whether its message has arrived, never by
//! blocking on one. The receive contract here reflects that — [`RecvRequest::poll`]
//! is the primary operation and the blocking [`RecvRequest::recv`] exists
//! only for the few synchronous paths (the relationship exchange). Message
//! sizes are fixed by the wire protocol, so a receive is posted with its
//! exact expected length; there is no size negotiation or truncation.

use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A posted send. Dropping an unfinished send is allowed; backends release
/// the payload buffer once the transfer is done.
pub trait SendRequest {
    /// Complete the send and release its buffer.
    fn finish(self);
}

/// A posted receive.
pub trait RecvRequest {
    /// `Some(message)` once the matching send has arrived.
    fn poll(&mut self) -> Option<Vec<u8>>;
    /// Block until the message arrives; `None` from backends that can never
    /// deliver one.
    fn recv(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: SendRequest;
    /// Handle returned by `irecv`.
    type RecvHandle: RecvRequest;

    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of exactly `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u32, len: usize) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Synchronization barrier (default: no-op for non-MPI comms).
    fn barrier(&self) {}
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u32);

impl CommTag {
    #[inline]
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u32) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u32> for CommTag {
    #[inline]
    fn from(x: u32) -> Self {
        CommTag::new(x)
    }
}

/// Tag pair for the two-phase relationship-sharing exchange.
#[derive(Copy, Clone, Debug)]
pub struct ExchangeCommTags {
    /// Tag used during the size-exchange phase.
    pub sizes: CommTag,
    /// Tag used during the data-exchange phase.
    pub data: CommTag,
}

impl ExchangeCommTags {
    /// Construct tags from a base, assigning deterministic offsets per phase.
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

impl SendRequest for () {
    fn finish(self) {}
}

impl RecvRequest for () {
    fn poll(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn recv(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests. Group
/// collectives over a single rank complete in place, so nothing is ever
/// actually transferred.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u32, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u32, _len: usize) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: intra-process / multi-thread ---

type Key = (usize, usize, u32); // (src, dst, tag)

/// Undelivered messages of one universe, keyed by (src, dst, tag) channel.
///
/// Delivery is pull-only: a send appends to its channel queue and a poll
/// pops from it. Because every consumer polls (the blocking receive is a
/// poll loop), one table with one lock is all the machinery needed — there
/// is no completion signalling to coordinate.
#[derive(Default)]
struct MessageBoard {
    channels: Mutex<HashMap<Key, VecDeque<Vec<u8>>>>,
}

impl MessageBoard {
    fn post(&self, key: Key, msg: Vec<u8>) {
        self.channels
            .lock()
            .expect("message board poisoned")
            .entry(key)
            .or_default()
            .push_back(msg);
    }

    fn take(&self, key: Key) -> Option<Vec<u8>> {
        let mut channels = self.channels.lock().expect("message board poisoned");
        let queue = channels.get_mut(&key)?;
        let msg = queue.pop_front();
        // Drained channels are removed so finished nodes leave no residue.
        if queue.is_empty() {
            channels.remove(&key);
        }
        msg
    }
}

static DEFAULT_BOARD: Lazy<Arc<MessageBoard>> = Lazy::new(Arc::default);

/// One rank of an in-process communicator backed by a shared message board.
///
/// `ThreadComm::universe` gives each test its own board, so concurrent
/// tests cannot exchange messages even when tags collide. `ThreadComm::new`
/// joins a process-global board for quick ad-hoc pairs.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    board: Arc<MessageBoard>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// Join the process-global message board.
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            board: DEFAULT_BOARD.clone(),
        }
    }

    /// A fresh isolated universe: one communicator per rank.
    pub fn universe(size: usize) -> Vec<Self> {
        let board = Arc::new(MessageBoard::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                board: board.clone(),
            })
            .collect()
    }
}

/// A pending receive on a message board channel.
pub struct ThreadRecv {
    board: Arc<MessageBoard>,
    key: Key,
    expect: usize,
}

impl RecvRequest for ThreadRecv {
    fn poll(&mut self) -> Option<Vec<u8>> {
        let msg = self.board.take(self.key)?;
        debug_assert_eq!(
            msg.len(),
            self.expect,
            "message size drifted from the wire protocol"
        );
        Some(msg)
    }

    fn recv(mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(msg) = self.poll() {
                return Some(msg);
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for ThreadComm {
    // A posted message lands on the board immediately; the send is complete
    // at the call.
    type SendHandle = ();
    type RecvHandle = ThreadRecv;

    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) {
        self.board.post((self.rank, peer, tag), buf.to_vec());
    }

    fn irecv(&self, peer: usize, tag: u32, len: usize) -> ThreadRecv {
        ThreadRecv {
            board: self.board.clone(),
            key: (peer, self.rank, tag),
            expect: len,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::StaticScope;
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    /// MPI-backed communicator over a duplicated world communicator.
    ///
    /// The duplication keeps clustering traffic isolated from unrelated
    /// messages on the world communicator.
    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let uni = mpi::initialize().expect("MPI initialization failed");
            let world = uni.world().duplicate();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: uni,
                world,
                rank,
                size,
            }
        }
    }

    /// One in-flight point-to-point operation, send or receive.
    ///
    /// The payload buffer is leaked into the request's static scope and
    /// reclaimed exactly once — on completion, or on drop after waiting out
    /// a still-pending request.
    pub struct MpiRequest {
        req: Option<mpi::request::Request<'static, [u8], StaticScope>>,
        buf: Option<*mut [u8]>,
    }

    impl MpiRequest {
        fn post(
            payload: Box<[u8]>,
            start: impl FnOnce(&'static mut [u8]) -> mpi::request::Request<'static, [u8], StaticScope>,
        ) -> Self {
            let leaked: &'static mut [u8] = Box::leak(payload);
            let buf: *mut [u8] = leaked;
            Self {
                req: Some(start(leaked)),
                buf: Some(buf),
            }
        }

        fn reclaim(&mut self) -> Option<Box<[u8]>> {
            self.buf.take().map(|p| unsafe { Box::from_raw(p) })
        }
    }

    impl SendRequest for MpiRequest {
        fn finish(mut self) {
            if let Some(req) = self.req.take() {
                let _ = req.wait();
            }
            drop(self.reclaim());
        }
    }

    impl RecvRequest for MpiRequest {
        fn poll(&mut self) -> Option<Vec<u8>> {
            let req = self.req.take()?;
            match req.test() {
                Ok(_status) => self.reclaim().map(Vec::from),
                Err(req) => {
                    self.req = Some(req);
                    None
                }
            }
        }

        fn recv(mut self) -> Option<Vec<u8>> {
            if let Some(req) = self.req.take() {
                let _ = req.wait();
            }
            self.reclaim().map(Vec::from)
        }
    }

    impl Drop for MpiRequest {
        fn drop(&mut self) {
            if let Some(req) = self.req.take() {
                let _ = req.wait();
            }
            drop(self.reclaim());
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiRequest;
        type RecvHandle = MpiRequest;

        fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> MpiRequest {
            debug_assert!(tag <= i32::MAX as u32);
            let target = self.world.process_at_rank(peer as i32);
            MpiRequest::post(buf.to_vec().into_boxed_slice(), move |payload| {
                // Move, not reborrow: the send buffer must stay `'static`.
                let payload: &'static [u8] = payload;
                target.immediate_send_with_tag(StaticScope, payload, tag as i32)
            })
        }

        fn irecv(&self, peer: usize, tag: u32, len: usize) -> MpiRequest {
            debug_assert!(tag <= i32::MAX as u32);
            let source = self.world.process_at_rank(peer as i32);
            MpiRequest::post(vec![0u8; len].into_boxed_slice(), move |payload| {
                source.immediate_receive_into_with_tag(StaticScope, payload, tag as i32)
            })
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiRequest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_round_trip() {
        let comms = ThreadComm::universe(2);
        let tag = CommTag::new(7).as_u32();
        let msg = b"hello";
        comms[0].isend(1, tag, msg);

        let h = comms[1].irecv(0, tag, msg.len());
        assert_eq!(h.recv().unwrap(), msg);
    }

    #[test]
    fn poll_does_not_block() {
        let comms = ThreadComm::universe(2);
        let mut h = comms[1].irecv(0, 9, 3);
        assert!(h.poll().is_none());
        comms[0].isend(1, 9, &[1, 2, 3]);
        // The message is already on the board; polling must see it now.
        assert_eq!(h.poll().unwrap(), vec![1, 2, 3]);
        // Consumed exactly once.
        assert!(h.poll().is_none());
    }

    #[test]
    fn fifo_order_per_channel() {
        let comms = ThreadComm::universe(2);
        for i in 0..10u8 {
            comms[0].isend(1, 3, &[i]);
        }
        let mut out = Vec::new();
        for _ in 0..10 {
            out.push(comms[1].irecv(0, 3, 1).recv().unwrap()[0]);
        }
        assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
    }

    #[test]
    fn channels_are_independent() {
        let comms = ThreadComm::universe(3);
        comms[0].isend(2, 5, &[10]);
        comms[1].isend(2, 5, &[11]);
        comms[0].isend(2, 6, &[12]);
        assert_eq!(comms[2].irecv(1, 5, 1).recv().unwrap(), vec![11]);
        assert_eq!(comms[2].irecv(0, 6, 1).recv().unwrap(), vec![12]);
        assert_eq!(comms[2].irecv(0, 5, 1).recv().unwrap(), vec![10]);
    }

    #[test]
    fn universes_are_isolated() {
        let a = ThreadComm::universe(2);
        let b = ThreadComm::universe(2);
        a[0].isend(1, 5, &[42]);
        let mut foreign = b[1].irecv(0, 5, 1);
        assert!(foreign.poll().is_none());
        // Drain so the message cannot leak into another assertion.
        assert_eq!(a[1].irecv(0, 5, 1).recv().unwrap(), vec![42]);
    }

    #[test]
    fn no_comm_never_delivers() {
        let comm = NoComm;
        comm.isend(0, 1, &[1]);
        let mut h = comm.irecv(0, 1, 1);
        assert!(h.poll().is_none());
        assert!(h.recv().is_none());
        assert_eq!((comm.rank(), comm.size()), (0, 1));
    }
}
