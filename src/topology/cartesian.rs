//! `CartCommunicator`: a communicator whose processes form an N-dimensional grid.
//!
//! The grid extents and periodicity are fixed when the topology is attached
//! and live in the runtime; every query below asks the runtime again instead
//! of caching them.
//!
//! # Shifts
//!
//! [`CartCommunicator::shift`] generalizes the runtime's single-axis shift to
//! an arbitrary displacement vector. For a direction `d` and own coordinates
//! `c`, the source peer sits at `c + d` and the destination peer at `c - d`.
//! In a 2-D grid, `[1, 1]` yields the "north-east" peer as source and the
//! "south-west" peer as destination.
//!
//! Periodic wraparound only corrects coordinates that are out of range by one
//! step (`-1` and `extent`). A larger displacement that leaves the grid gives
//! `None`, even along a periodic dimension.

use std::ops::Deref;

use crate::mpi_error::{MpiWrapperError, Result};
use crate::topology::communicator::Communicator;
use crate::transport::{Rank, Transport};

/// Extents, periodicity and own coordinates of a Cartesian communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartesianLayout<const N: usize> {
    /// `dims[i]` is the extent of axis i.
    pub dims: [usize; N],
    /// `periods[i]` is true if axis i wraps around.
    pub periods: [bool; N],
    /// `coords[i]` is the calling process's coordinate along axis i.
    pub coords: [usize; N],
}

/// A communicator with an `N`-dimensional Cartesian topology attached.
///
/// Derefs to [`Communicator`], so it can be used wherever a plain process
/// group is expected. It follows the same ownership rules.
#[derive(Debug, Clone)]
pub struct CartCommunicator<T: Transport, const N: usize> {
    comm: Communicator<T>,
}

impl<T: Transport, const N: usize> CartCommunicator<T, N> {
    /// Attach an `N`-dimensional grid to a duplicate of `parent` (collective).
    ///
    /// In strict mode the product of `dims` must equal the size of `parent`.
    /// In permissive mode that check is skipped and the runtime decides; MPI
    /// rejects larger grids and hands the null communicator to processes
    /// left out of a smaller one.
    ///
    /// With `reorder` the runtime may renumber ranks relative to `parent`.
    pub fn new(
        dims: [usize; N],
        periods: [bool; N],
        reorder: bool,
        parent: &Communicator<T>,
    ) -> Result<Self> {
        parent.validation_mode().ensure(|| {
            let group_size = parent.size()?;
            let extent_product = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
            if extent_product.is_some() && extent_product == usize::try_from(group_size).ok() {
                Ok(())
            } else {
                Err(MpiWrapperError::ExtentMismatch {
                    extent_product,
                    group_size,
                })
            }
        })?;

        let raw_dims = raw_extents(&dims)?;
        let handle = parent
            .transport()
            .cart_create(parent.handle(), &raw_dims, &periods, reorder)
            .map_err(MpiWrapperError::transport("cart_create"))?;
        log::debug!(
            "attached {}-d cartesian topology {dims:?} (periods {periods:?}) to {:?} as {handle:?}",
            N,
            parent.handle()
        );
        Ok(Self {
            comm: Communicator::owned(parent.transport().clone(), handle, parent.config()),
        })
    }

    /// Grid over the whole world, with reordering allowed.
    pub fn with_world(transport: T, dims: [usize; N], periods: [bool; N]) -> Result<Self> {
        let world = Communicator::world(transport);
        Self::new(dims, periods, true, &world)
    }

    /// Adopt a communicator that already carries a Cartesian topology.
    ///
    /// Strict mode verifies that a topology is attached and that it has `N`
    /// dimensions.
    pub fn from_communicator(comm: Communicator<T>) -> Result<Self> {
        comm.validation_mode().ensure(|| {
            if !topology_attached(&comm)? {
                return Err(MpiWrapperError::NoCartesianTopology);
            }
            let ndims = comm
                .transport()
                .cartdim_get(comm.handle())
                .map_err(MpiWrapperError::transport("cartdim_get"))?;
            if usize::try_from(ndims).ok() == Some(N) {
                Ok(())
            } else {
                Err(MpiWrapperError::DimensionMismatch {
                    expected: N,
                    actual: ndims.max(0) as usize,
                })
            }
        })?;
        Ok(Self { comm })
    }

    /// Give up the topology view and keep the plain communicator.
    pub fn into_communicator(self) -> Communicator<T> {
        self.comm
    }

    /// Number of dimensions reported by the runtime.
    pub fn num_dimensions(&self) -> Result<usize> {
        self.ensure_topology()?;
        let n = self
            .transport()
            .cartdim_get(self.handle())
            .map_err(MpiWrapperError::transport("cartdim_get"))?;
        Ok(n.max(0) as usize)
    }

    /// Extents, periodicity and own coordinates in one runtime query.
    pub fn layout(&self) -> Result<CartesianLayout<N>> {
        self.ensure_topology()?;
        let mut dims = [0i32; N];
        let mut periods = [false; N];
        let mut coords = [0i32; N];
        self.transport()
            .cart_get(self.handle(), &mut dims, &mut periods, &mut coords)
            .map_err(MpiWrapperError::transport("cart_get"))?;
        Ok(CartesianLayout {
            dims: unsigned(dims),
            periods,
            coords: unsigned(coords),
        })
    }

    /// Coordinates of the calling process.
    pub fn coords(&self) -> Result<[usize; N]> {
        self.ensure_topology()?;
        let rank = self.rank()?;
        self.query_coords(rank)
    }

    /// Periodicity of each dimension, as fixed at construction.
    pub fn periods(&self) -> Result<[bool; N]> {
        Ok(self.layout()?.periods)
    }

    /// Extent of each dimension, as fixed at construction.
    pub fn topology_dims(&self) -> Result<[usize; N]> {
        Ok(self.layout()?.dims)
    }

    /// Coordinates of `rank`. Strict mode rejects ranks outside the group.
    pub fn rank_to_coordinates(&self, rank: Rank) -> Result<[usize; N]> {
        self.ensure_topology()?;
        self.validation_mode().ensure(|| {
            let size = self.size()?;
            if (0..size).contains(&rank) {
                Ok(())
            } else {
                Err(MpiWrapperError::RankOutOfRange { rank, size })
            }
        })?;
        self.query_coords(rank)
    }

    /// Rank at `coords`, or `None` when any component lies outside
    /// `[0, extent)`. The bounds check happens here; the runtime only ever
    /// sees in-range coordinates.
    pub fn coordinates_to_rank(&self, coords: &[i32; N]) -> Result<Option<Rank>> {
        let dims = self.topology_dims()?;
        if !in_bounds(coords, &dims) {
            return Ok(None);
        }
        let rank = self
            .transport()
            .cart_rank(self.handle(), coords)
            .map_err(MpiWrapperError::transport("cart_rank"))?;
        Ok(Some(rank))
    }

    /// Source and destination ranks for a displacement along `direction`.
    ///
    /// Returns `(source, dest)` where `source` is the peer at
    /// `coords + direction` and `dest` the peer at `coords - direction`,
    /// after one-step periodic correction. `None` marks "no process".
    pub fn shift(&self, direction: &[i32; N]) -> Result<(Option<Rank>, Option<Rank>)> {
        let mine = self.coords()?.map(|c| c as i32);
        let source: [i32; N] = std::array::from_fn(|i| mine[i].saturating_add(direction[i]));
        let dest: [i32; N] = std::array::from_fn(|i| mine[i].saturating_sub(direction[i]));

        let source = self.check_periodicity(source)?;
        let dest = self.check_periodicity(dest)?;

        Ok((
            self.coordinates_to_rank(&source)?,
            self.coordinates_to_rank(&dest)?,
        ))
    }

    fn check_periodicity(&self, coords: [i32; N]) -> Result<[i32; N]> {
        let layout = self.layout()?;
        Ok(wrap_periodic(coords, &layout.dims, &layout.periods))
    }

    fn query_coords(&self, rank: Rank) -> Result<[usize; N]> {
        let mut coords = [0i32; N];
        self.transport()
            .cart_coords(self.handle(), rank, &mut coords)
            .map_err(MpiWrapperError::transport("cart_coords"))?;
        Ok(unsigned(coords))
    }

    fn ensure_topology(&self) -> Result<()> {
        self.validation_mode().ensure(|| {
            if topology_attached(&self.comm)? {
                Ok(())
            } else {
                Err(MpiWrapperError::NoCartesianTopology)
            }
        })
    }
}

fn topology_attached<T: Transport>(comm: &Communicator<T>) -> Result<bool> {
    comm.transport()
        .topo_test(comm.handle())
        .map_err(MpiWrapperError::transport("topo_test"))
}

impl<T: Transport, const N: usize> Deref for CartCommunicator<T, N> {
    type Target = Communicator<T>;

    fn deref(&self) -> &Communicator<T> {
        &self.comm
    }
}

impl<T: Transport, const N: usize> AsRef<Communicator<T>> for CartCommunicator<T, N> {
    fn as_ref(&self) -> &Communicator<T> {
        &self.comm
    }
}

impl<T: Transport, const N: usize> From<CartCommunicator<T, N>> for Communicator<T> {
    fn from(cart: CartCommunicator<T, N>) -> Self {
        cart.into_communicator()
    }
}

fn raw_extents<const N: usize>(dims: &[usize; N]) -> Result<[i32; N]> {
    let mut raw = [0i32; N];
    for (dimension, (slot, &extent)) in raw.iter_mut().zip(dims).enumerate() {
        *slot = i32::try_from(extent)
            .map_err(|_| MpiWrapperError::InvalidExtent { dimension, extent })?;
    }
    Ok(raw)
}

fn unsigned<const N: usize>(raw: [i32; N]) -> [usize; N] {
    raw.map(|v| v.max(0) as usize)
}

/// `true` when `0 <= coords[i] < dims[i]` for every axis.
pub(crate) fn in_bounds<const N: usize>(coords: &[i32; N], dims: &[usize; N]) -> bool {
    coords
        .iter()
        .zip(dims)
        .all(|(&c, &extent)| usize::try_from(c).is_ok_and(|c| c < extent))
}

/// One-step periodic correction: on periodic axes `-1` becomes `extent - 1`
/// and `extent` becomes `0`. Every other value is left alone.
pub(crate) fn wrap_periodic<const N: usize>(
    coords: [i32; N],
    dims: &[usize; N],
    periods: &[bool; N],
) -> [i32; N] {
    let mut wrapped = coords;
    for ((c, &extent), &periodic) in wrapped.iter_mut().zip(dims).zip(periods) {
        if !periodic {
            continue;
        }
        let extent = extent as i32;
        if *c == -1 {
            *c = extent - 1;
        } else if *c == extent {
            *c = 0;
        }
    }
    wrapped
}
