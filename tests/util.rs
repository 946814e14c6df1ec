#![allow(dead_code)]
use mpi_wrapper::prelude::*;

/// World communicators of every rank, in rank order.
pub fn world_comms(world: &LocalWorld, config: WrapperConfig) -> Vec<Communicator<LocalTransport>> {
    world
        .transports()
        .into_iter()
        .map(|t| Communicator::world_with_config(t, config))
        .collect()
}

/// Build the same grid on every rank of `world`, one rank after the other,
/// without reordering.
pub fn try_carts<const N: usize>(
    world: &LocalWorld,
    dims: [usize; N],
    periods: [bool; N],
    config: WrapperConfig,
) -> Vec<Result<CartCommunicator<LocalTransport, N>>> {
    world_comms(world, config)
        .iter()
        .map(|parent| CartCommunicator::new(dims, periods, false, parent))
        .collect()
}

/// Strict grid on every rank; panics if any rank fails.
pub fn carts<const N: usize>(
    world: &LocalWorld,
    dims: [usize; N],
    periods: [bool; N],
) -> Vec<CartCommunicator<LocalTransport, N>> {
    try_carts(world, dims, periods, WrapperConfig::strict())
        .into_iter()
        .enumerate()
        .map(|(rank, cart)| cart.unwrap_or_else(|e| panic!("rank {rank}: {e}")))
        .collect()
}

/// Row-major coordinates of `rank` in a grid of extents `dims`.
pub fn row_major<const N: usize>(mut rank: usize, dims: [usize; N]) -> [usize; N] {
    let mut coords = [0; N];
    for i in (0..N).rev() {
        coords[i] = rank % dims[i];
        rank /= dims[i];
    }
    coords
}
