//! MPI runtime reached through rsmpi's raw bindings.
//!
//! Only the calls of the [`Transport`] contract are issued here; handles are
//! raw `MPI_Comm` values. MPI reports failures through return codes only when
//! the communicator's error handler is `MPI_ERRORS_RETURN`; with the default
//! `MPI_ERRORS_ARE_FATAL` a failing call aborts the job before a status can
//! reach the wrapper.

use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_void};

use ::mpi::environment::Universe;
use ::mpi::ffi;
use ::mpi::traits::*;

use super::{Exchange, Rank, Status, Transport, TransportResult};
use crate::datatype::ElementKind;
use crate::mpi_error::{MpiWrapperError, Result};

const SUCCESS: c_int = 0;

#[inline]
fn check(code: c_int) -> TransportResult<()> {
    if code == SUCCESS { Ok(()) } else { Err(Status(code)) }
}

fn proc_null() -> Rank {
    unsafe { ffi::RSMPI_PROC_NULL }
}

fn peer(rank: Option<Rank>) -> Rank {
    rank.unwrap_or_else(proc_null)
}

fn raw_datatype(kind: ElementKind) -> ffi::MPI_Datatype {
    match kind {
        ElementKind::Null => unsafe { ffi::RSMPI_DATATYPE_NULL },
        ElementKind::SignedChar => i8::equivalent_datatype().as_raw(),
        ElementKind::UnsignedChar => u8::equivalent_datatype().as_raw(),
        ElementKind::Short => i16::equivalent_datatype().as_raw(),
        ElementKind::UnsignedShort => u16::equivalent_datatype().as_raw(),
        ElementKind::Int => i32::equivalent_datatype().as_raw(),
        ElementKind::Unsigned => u32::equivalent_datatype().as_raw(),
        ElementKind::LongLong => i64::equivalent_datatype().as_raw(),
        ElementKind::UnsignedLongLong => u64::equivalent_datatype().as_raw(),
        ElementKind::Float => f32::equivalent_datatype().as_raw(),
        ElementKind::Double => f64::equivalent_datatype().as_raw(),
    }
}

/// Zero-sized handle on the process's MPI library.
///
/// MPI must be initialized (see [`MpiTransport::initialize`]) before any call
/// is made through it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpiTransport;

impl MpiTransport {
    /// Initialize MPI. The returned [`Universe`] finalizes MPI when dropped,
    /// so it has to outlive every communicator.
    pub fn initialize() -> Result<(Universe, MpiTransport)> {
        let universe = ::mpi::initialize()
            .ok_or(MpiWrapperError::Initialization("MPI is already initialized"))?;
        log::debug!("MPI initialized, world size {}", universe.world().size());
        Ok((universe, MpiTransport))
    }

    /// `true` once MPI has been initialized.
    pub fn is_initialized() -> bool {
        ::mpi::environment::is_initialized()
    }

    /// `true` once MPI has been finalized.
    pub fn is_finalized() -> bool {
        ::mpi::environment::is_finalized()
    }

    /// Rank of this process in the world communicator.
    pub fn world_rank(&self) -> Result<Rank> {
        self.comm_rank(self.world())
            .map_err(MpiWrapperError::transport("MPI_Comm_rank"))
    }

    /// Number of processes in the world communicator.
    pub fn world_size(&self) -> Result<i32> {
        self.comm_size(self.world())
            .map_err(MpiWrapperError::transport("MPI_Comm_size"))
    }
}

impl Transport for MpiTransport {
    type Handle = ffi::MPI_Comm;

    fn world(&self) -> ffi::MPI_Comm {
        unsafe { ffi::RSMPI_COMM_WORLD }
    }

    fn comm_self(&self) -> ffi::MPI_Comm {
        unsafe { ffi::RSMPI_COMM_SELF }
    }

    fn null(&self) -> ffi::MPI_Comm {
        unsafe { ffi::RSMPI_COMM_NULL }
    }

    fn comm_rank(&self, comm: ffi::MPI_Comm) -> TransportResult<Rank> {
        let mut rank: c_int = 0;
        check(unsafe { ffi::MPI_Comm_rank(comm, &mut rank) })?;
        Ok(rank)
    }

    fn comm_size(&self, comm: ffi::MPI_Comm) -> TransportResult<i32> {
        let mut size: c_int = 0;
        check(unsafe { ffi::MPI_Comm_size(comm, &mut size) })?;
        Ok(size)
    }

    fn comm_dup(&self, comm: ffi::MPI_Comm) -> TransportResult<ffi::MPI_Comm> {
        let mut dup = MaybeUninit::<ffi::MPI_Comm>::uninit();
        check(unsafe { ffi::MPI_Comm_dup(comm, dup.as_mut_ptr()) })?;
        Ok(unsafe { dup.assume_init() })
    }

    fn comm_free(&self, comm: ffi::MPI_Comm) -> TransportResult<()> {
        let mut comm = comm;
        check(unsafe { ffi::MPI_Comm_free(&mut comm) })
    }

    fn topo_test(&self, comm: ffi::MPI_Comm) -> TransportResult<bool> {
        let mut status: c_int = 0;
        check(unsafe { ffi::MPI_Topo_test(comm, &mut status) })?;
        // graph and distributed-graph topologies do not count
        Ok(status == unsafe { ffi::RSMPI_CART })
    }

    fn cartdim_get(&self, comm: ffi::MPI_Comm) -> TransportResult<i32> {
        let mut ndims: c_int = 0;
        check(unsafe { ffi::MPI_Cartdim_get(comm, &mut ndims) })?;
        Ok(ndims)
    }

    fn cart_create(
        &self,
        comm: ffi::MPI_Comm,
        dims: &[i32],
        periods: &[bool],
        reorder: bool,
    ) -> TransportResult<ffi::MPI_Comm> {
        if dims.len() != periods.len() {
            return Err(Status::ERR_ARG);
        }
        let periods: Vec<c_int> = periods.iter().map(|&p| c_int::from(p)).collect();
        let mut cart = MaybeUninit::<ffi::MPI_Comm>::uninit();
        check(unsafe {
            ffi::MPI_Cart_create(
                comm,
                dims.len() as c_int,
                dims.as_ptr(),
                periods.as_ptr(),
                c_int::from(reorder),
                cart.as_mut_ptr(),
            )
        })?;
        Ok(unsafe { cart.assume_init() })
    }

    fn cart_get(
        &self,
        comm: ffi::MPI_Comm,
        dims: &mut [i32],
        periods: &mut [bool],
        coords: &mut [i32],
    ) -> TransportResult<()> {
        let n = dims.len();
        if periods.len() != n || coords.len() != n {
            return Err(Status::ERR_ARG);
        }
        let mut raw_periods: Vec<c_int> = vec![0; n];
        check(unsafe {
            ffi::MPI_Cart_get(
                comm,
                n as c_int,
                dims.as_mut_ptr(),
                raw_periods.as_mut_ptr(),
                coords.as_mut_ptr(),
            )
        })?;
        for (flag, raw) in periods.iter_mut().zip(raw_periods) {
            *flag = raw != 0;
        }
        Ok(())
    }

    fn cart_coords(&self, comm: ffi::MPI_Comm, rank: Rank, coords: &mut [i32]) -> TransportResult<()> {
        check(unsafe { ffi::MPI_Cart_coords(comm, rank, coords.len() as c_int, coords.as_mut_ptr()) })
    }

    fn cart_rank(&self, comm: ffi::MPI_Comm, coords: &[i32]) -> TransportResult<Rank> {
        let mut rank: c_int = 0;
        check(unsafe { ffi::MPI_Cart_rank(comm, coords.as_ptr(), &mut rank) })?;
        Ok(rank)
    }

    fn sendrecv(&self, comm: ffi::MPI_Comm, mut exchange: Exchange<'_>) -> TransportResult<()> {
        let mut status = MaybeUninit::<ffi::MPI_Status>::uninit();
        check(unsafe {
            ffi::MPI_Sendrecv(
                exchange.send.as_ptr() as *const c_void,
                exchange.send_count,
                raw_datatype(exchange.send_kind),
                peer(exchange.dest),
                exchange.tag,
                exchange.recv.as_mut_ptr() as *mut c_void,
                exchange.recv_count,
                raw_datatype(exchange.recv_kind),
                peer(exchange.source),
                exchange.tag,
                comm,
                status.as_mut_ptr(),
            )
        })
    }

    fn abort(&self, comm: ffi::MPI_Comm, code: i32) -> ! {
        log::error!("MPI_Abort with code {code}");
        unsafe {
            ffi::MPI_Abort(comm, code);
        }
        std::process::abort()
    }
}
