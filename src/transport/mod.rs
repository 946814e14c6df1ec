//! The narrow contract between the wrapper and the message-passing runtime.
//!
//! Two runtimes implement [`Transport`]:
//! - [`local::LocalTransport`], an in-process world of simulated ranks, and
//! - `mpi::MpiTransport` (feature `mpi-support`), raw MPI calls through rsmpi.
//!
//! Every fallible call reports the runtime's non-zero status code as a
//! [`Status`]. The runtime's "no process" rank is `None` on this side of the
//! seam.

use std::fmt;

use crate::datatype::ElementKind;

pub mod local;
#[cfg(feature = "mpi-support")]
pub mod mpi;

/// A process's zero-based identity within a communicator.
pub type Rank = i32;

/// Non-success status code returned by a runtime call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const ERR_BUFFER: Status = Status(1);
    pub const ERR_COUNT: Status = Status(2);
    pub const ERR_TYPE: Status = Status(3);
    pub const ERR_TAG: Status = Status(4);
    pub const ERR_COMM: Status = Status(5);
    pub const ERR_RANK: Status = Status(6);
    pub const ERR_TOPOLOGY: Status = Status(10);
    pub const ERR_DIMS: Status = Status(11);
    pub const ERR_ARG: Status = Status(12);
    pub const ERR_TRUNCATE: Status = Status(14);
    pub const ERR_OTHER: Status = Status(15);

    /// Raw status code.
    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Status::ERR_BUFFER => "ERR_BUFFER",
            Status::ERR_COUNT => "ERR_COUNT",
            Status::ERR_TYPE => "ERR_TYPE",
            Status::ERR_TAG => "ERR_TAG",
            Status::ERR_COMM => "ERR_COMM",
            Status::ERR_RANK => "ERR_RANK",
            Status::ERR_TOPOLOGY => "ERR_TOPOLOGY",
            Status::ERR_DIMS => "ERR_DIMS",
            Status::ERR_ARG => "ERR_ARG",
            Status::ERR_TRUNCATE => "ERR_TRUNCATE",
            Status::ERR_OTHER => "ERR_OTHER",
            _ => return write!(f, "{}", self.0),
        };
        write!(f, "{} ({})", self.0, name)
    }
}

/// Result of a runtime call.
pub type TransportResult<T> = std::result::Result<T, Status>;

/// Arguments of one combined send-and-receive.
///
/// Buffers are raw bytes; `*_count` elements of `*_kind` are read from `send`
/// and at most `recv_count` elements are written into `recv`. A `None` peer
/// skips that half of the exchange.
#[derive(Debug)]
pub struct Exchange<'a> {
    pub send: &'a [u8],
    pub send_count: i32,
    pub send_kind: ElementKind,
    pub dest: Option<Rank>,
    pub recv: &'a mut [u8],
    pub recv_count: i32,
    pub recv_kind: ElementKind,
    pub source: Option<Rank>,
    pub tag: i32,
}

/// Calls the wrapper makes on the message-passing runtime.
///
/// Implementations assume the runtime is already initialized. Slices passed
/// to the `cart_*` calls hold one entry per topology dimension.
pub trait Transport: Clone {
    /// Opaque communicator handle.
    type Handle: Copy + Eq + fmt::Debug;

    /// The global communicator (all processes).
    fn world(&self) -> Self::Handle;
    /// The communicator holding only the calling process.
    fn comm_self(&self) -> Self::Handle;
    /// The null communicator.
    fn null(&self) -> Self::Handle;

    /// Built-in communicators are never freed.
    fn is_builtin(&self, comm: Self::Handle) -> bool {
        comm == self.world() || comm == self.comm_self() || comm == self.null()
    }

    fn comm_rank(&self, comm: Self::Handle) -> TransportResult<Rank>;
    fn comm_size(&self, comm: Self::Handle) -> TransportResult<i32>;
    /// Collective: new context with the same group (and topology).
    fn comm_dup(&self, comm: Self::Handle) -> TransportResult<Self::Handle>;
    fn comm_free(&self, comm: Self::Handle) -> TransportResult<()>;

    /// `true` when a Cartesian topology is attached to `comm`.
    fn topo_test(&self, comm: Self::Handle) -> TransportResult<bool>;
    /// Number of Cartesian dimensions of `comm`.
    fn cartdim_get(&self, comm: Self::Handle) -> TransportResult<i32>;
    /// Collective: attach a Cartesian topology to a duplicate of `comm`.
    /// Processes left out of the grid receive [`Transport::null`].
    fn cart_create(
        &self,
        comm: Self::Handle,
        dims: &[i32],
        periods: &[bool],
        reorder: bool,
    ) -> TransportResult<Self::Handle>;
    /// Extents, periodicity and own coordinates.
    fn cart_get(
        &self,
        comm: Self::Handle,
        dims: &mut [i32],
        periods: &mut [bool],
        coords: &mut [i32],
    ) -> TransportResult<()>;
    /// Coordinates of `rank`.
    fn cart_coords(&self, comm: Self::Handle, rank: Rank, coords: &mut [i32]) -> TransportResult<()>;
    /// Rank at `coords`; out-of-range input is the caller's problem.
    fn cart_rank(&self, comm: Self::Handle, coords: &[i32]) -> TransportResult<Rank>;

    /// Blocking combined send-and-receive.
    fn sendrecv(&self, comm: Self::Handle, exchange: Exchange<'_>) -> TransportResult<()>;

    /// Tear down every process of `comm`'s job.
    fn abort(&self, comm: Self::Handle, code: i32) -> !;
}
