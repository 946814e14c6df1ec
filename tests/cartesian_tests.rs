mod util;

use mpi_wrapper::prelude::*;
use util::{carts, row_major, try_carts, world_comms};

#[test]
fn construction_round_trip() {
    let world = LocalWorld::new(6);
    let grid = carts(&world, [2, 3], [true, false]);
    for (rank, cart) in grid.iter().enumerate() {
        assert_eq!(cart.topology_dims().unwrap(), [2, 3]);
        assert_eq!(cart.periods().unwrap(), [true, false]);
        assert_eq!(cart.num_dimensions().unwrap(), 2);
        assert_eq!(cart.size().unwrap(), 6);
        assert_eq!(cart.rank().unwrap(), rank as i32);
        assert_eq!(cart.coords().unwrap(), row_major(rank, [2, 3]));
        assert_eq!(
            cart.layout().unwrap(),
            CartesianLayout {
                dims: [2, 3],
                periods: [true, false],
                coords: row_major(rank, [2, 3]),
            }
        );
        assert!(cart.is_owner());
    }
}

#[test]
fn grid_lives_on_its_own_context() {
    let world = LocalWorld::new(2);
    let grid = carts(&world, [2], [false]);
    let handle = grid[0].handle();
    assert_ne!(handle, LocalComm::WORLD);
    assert_eq!(grid[1].handle(), handle);
    drop(grid);
    assert_eq!(world.release_count(handle), 2);
    assert_eq!(world.live_contexts(), 0);
}

#[test]
fn with_world_spans_every_rank() {
    let world = LocalWorld::new(3);
    let coords = world.run(|t| {
        let cart = CartCommunicator::with_world(t, [3, 1], [false, true]).unwrap();
        cart.coords().unwrap()
    });
    assert_eq!(coords, vec![[0, 0], [1, 0], [2, 0]]);
}

#[test]
fn strict_mode_rejects_extent_mismatch() {
    let world = LocalWorld::new(4);
    for result in try_carts(&world, [3], [false], WrapperConfig::strict()) {
        assert_eq!(
            result.unwrap_err(),
            MpiWrapperError::ExtentMismatch {
                extent_product: Some(3),
                group_size: 4
            }
        );
    }
    let overflow = try_carts(&world, [usize::MAX, 2], [false, false], WrapperConfig::strict());
    assert!(matches!(
        overflow[0],
        Err(MpiWrapperError::ExtentMismatch {
            extent_product: None,
            group_size: 4
        })
    ));
    assert_eq!(world.live_contexts(), 0);
}

#[test]
fn strict_mode_rejects_a_larger_grid_like_the_three_dimensional_case() {
    let world = LocalWorld::new(3);
    let ok = try_carts(&world, [1, 3, 1], [true, true, false], WrapperConfig::strict());
    assert!(ok.iter().all(Result::is_ok));
    let too_big = try_carts(&world, [1, 4, 1], [true, true, false], WrapperConfig::strict());
    assert!(too_big.iter().all(Result::is_err));
}

#[test]
fn permissive_mode_lets_the_runtime_reject_a_larger_grid() {
    let world = LocalWorld::new(2);
    let result = try_carts(&world, [4], [false], WrapperConfig::permissive());
    assert_eq!(
        result[0].as_ref().unwrap_err(),
        &MpiWrapperError::Transport {
            call: "cart_create",
            status: Status::ERR_DIMS
        }
    );
}

#[test]
fn permissive_mode_leaves_ranks_out_of_a_smaller_grid() {
    let world = LocalWorld::new(3);
    let grid: Vec<_> = try_carts(&world, [2], [false], WrapperConfig::permissive())
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(grid[0].coords().unwrap(), [0]);
    assert_eq!(grid[1].coords().unwrap(), [1]);
    assert_eq!(grid[2].handle(), LocalComm::NULL);
    assert!(!grid[2].is_owner());
    assert_eq!(
        grid[2].coords().unwrap_err().status(),
        Some(Status::ERR_COMM)
    );
}

#[test]
fn extents_beyond_the_runtime_int_are_rejected_in_every_mode() {
    let world = LocalWorld::new(1);
    let huge = i32::MAX as usize + 1;
    let result = try_carts(&world, [huge], [false], WrapperConfig::permissive());
    assert_eq!(
        result[0].as_ref().unwrap_err(),
        &MpiWrapperError::InvalidExtent {
            dimension: 0,
            extent: huge
        }
    );
}

#[test]
fn periodic_ring_shift() {
    let world = LocalWorld::new(4);
    let grid = carts(&world, [4], [true]);
    for (rank, cart) in grid.iter().enumerate() {
        let rank = rank as i32;
        assert_eq!(
            cart.shift(&[1]).unwrap(),
            (Some((rank + 1) % 4), Some((rank + 3) % 4))
        );
    }
    assert_eq!(grid[0].shift(&[1]).unwrap(), (Some(1), Some(3)));
    assert_eq!(grid[3].shift(&[1]).unwrap(), (Some(0), Some(2)));
}

#[test]
fn open_chain_shift_hits_the_boundary() {
    let world = LocalWorld::new(4);
    let grid = carts(&world, [4], [false]);
    assert_eq!(grid[0].shift(&[1]).unwrap(), (Some(1), None));
    assert_eq!(grid[2].shift(&[1]).unwrap(), (Some(3), Some(1)));
    assert_eq!(grid[3].shift(&[1]).unwrap(), (None, Some(2)));
    assert_eq!(grid[0].shift(&[-1]).unwrap(), (None, Some(1)));
}

#[test]
fn size_one_periodic_axis_shifts_onto_itself() {
    for w in 1..=5 {
        let world = LocalWorld::new(w);
        for (rank, cart) in carts(&world, [w, 1, 1], [false, true, false]).iter().enumerate() {
            let rank = rank as i32;
            assert_eq!(cart.shift(&[0, 1, 0]).unwrap(), (Some(rank), Some(rank)));
            assert_eq!(cart.shift(&[0, 1, 1]).unwrap(), (None, None));
        }
    }
}

#[test]
fn linear_chain_boundary_ranks() {
    for w in 1..=5 {
        let world = LocalWorld::new(w);
        let grid = carts(&world, [w, 1, 1], [false, true, false]);
        let last = w as i32 - 1;
        for (rank, cart) in grid.iter().enumerate() {
            let rank = rank as i32;
            let (source, dest) = cart.shift(&[1, 0, 0]).unwrap();
            let expected_source = (rank < last).then_some(rank + 1);
            let expected_dest = (rank > 0).then_some(rank - 1);
            assert_eq!((source, dest), (expected_source, expected_dest), "w={w} rank={rank}");
        }
        if w == 1 {
            assert_eq!(grid[0].shift(&[1, 0, 0]).unwrap(), (None, None));
        }
    }
}

#[test]
fn diagonal_shift_on_a_torus() {
    let world = LocalWorld::new(9);
    let grid = carts(&world, [3, 3], [true, true]);
    // (0,0): source (1,1) = 4, dest (-1,-1) -> (2,2) = 8
    assert_eq!(grid[0].shift(&[1, 1]).unwrap(), (Some(4), Some(8)));
    // (1,2): source (2,3) -> (2,0) = 6, dest (0,1) = 1
    assert_eq!(grid[5].shift(&[1, 1]).unwrap(), (Some(6), Some(1)));
}

#[test]
fn mixed_boundaries_in_two_dimensions() {
    let world = LocalWorld::new(6);
    let grid = carts(&world, [2, 3], [true, false]);
    // (0,2): source (1,3) off the open axis, dest (-1,1) -> (1,1) = 4
    assert_eq!(grid[2].shift(&[1, 1]).unwrap(), (None, Some(4)));
    // (1,0): source (2,1) -> (0,1) = 1, dest (0,-1) off the open axis
    assert_eq!(grid[3].shift(&[1, 1]).unwrap(), (Some(1), None));
}

#[test]
fn multi_step_displacement_is_not_wrapped() {
    let world = LocalWorld::new(4);
    let grid = carts(&world, [4], [true]);
    assert_eq!(grid[0].shift(&[2]).unwrap(), (Some(2), None));
    // 2 + 2 lands exactly on the extent, which still wraps
    assert_eq!(grid[2].shift(&[2]).unwrap(), (Some(0), Some(0)));
    assert_eq!(grid[3].shift(&[2]).unwrap(), (None, Some(1)));
    assert_eq!(grid[0].shift(&[i32::MAX]).unwrap(), (None, None));
}

#[test]
fn coordinates_to_rank_checks_bounds_before_the_runtime() {
    let world = LocalWorld::new(6);
    let grid = carts(&world, [2, 3], [true, true]);
    assert_eq!(grid[0].coordinates_to_rank(&[1, 2]).unwrap(), Some(5));
    assert_eq!(grid[0].coordinates_to_rank(&[2, 0]).unwrap(), None);
    assert_eq!(grid[0].coordinates_to_rank(&[0, -1]).unwrap(), None);
}

#[test]
fn rank_to_coordinates_in_strict_mode() {
    let world = LocalWorld::new(6);
    let grid = carts(&world, [3, 2], [false, false]);
    assert_eq!(grid[0].rank_to_coordinates(5).unwrap(), [2, 1]);
    assert_eq!(
        grid[0].rank_to_coordinates(6).unwrap_err(),
        MpiWrapperError::RankOutOfRange { rank: 6, size: 6 }
    );
}

#[test]
fn rank_to_coordinates_in_permissive_mode_defers_to_the_runtime() {
    let world = LocalWorld::new(2);
    let grid: Vec<_> = try_carts(&world, [2], [false], WrapperConfig::permissive())
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(
        grid[1].rank_to_coordinates(-1).unwrap_err(),
        MpiWrapperError::Transport {
            call: "cart_coords",
            status: Status::ERR_RANK
        }
    );
}

#[test]
fn clones_of_a_grid_answer_queries_and_never_release() {
    let world = LocalWorld::new(2);
    let grid = carts(&world, [2], [false]);
    let handle = grid[0].handle();
    let copies: Vec<_> = grid.iter().cloned().collect();
    for (rank, copy) in copies.iter().enumerate() {
        assert_eq!(copy.rank().unwrap(), rank as i32);
        assert!(!copy.is_owner());
    }
    drop(copies);
    assert_eq!(world.release_count(handle), 0);
    drop(grid);
    assert_eq!(world.release_count(handle), 2);
}

#[test]
fn adopting_a_plain_communicator() {
    let world = LocalWorld::new(2);
    let strict = world_comms(&world, WrapperConfig::strict());
    let dup = strict[0].duplicate().unwrap();
    assert_eq!(
        CartCommunicator::<_, 1>::from_communicator(dup).unwrap_err(),
        MpiWrapperError::NoCartesianTopology
    );

    let permissive = world_comms(&world, WrapperConfig::permissive());
    let adopted = CartCommunicator::<_, 1>::from_communicator(permissive[0].clone()).unwrap();
    assert_eq!(
        adopted.coords().unwrap_err(),
        MpiWrapperError::Transport {
            call: "cart_coords",
            status: Status::ERR_TOPOLOGY
        }
    );
}

#[test]
fn permissive_queries_without_topology_report_the_runtime_status() {
    let world = LocalWorld::new(1);
    let comm = Communicator::world_with_config(world.transport(0), WrapperConfig::permissive());
    let adopted = CartCommunicator::<_, 2>::from_communicator(comm).unwrap();
    assert_eq!(
        adopted.topology_dims().unwrap_err(),
        MpiWrapperError::Transport {
            call: "cart_get",
            status: Status::ERR_TOPOLOGY
        }
    );
}

#[test]
fn adopting_a_grid_checks_dimensionality() {
    let world = LocalWorld::new(4);
    let grid = carts(&world, [2, 2], [false, true]);
    let plain: Communicator<_> = grid[0].clone().into();
    assert_eq!(
        CartCommunicator::<_, 3>::from_communicator(plain.clone()).unwrap_err(),
        MpiWrapperError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    );
    let adopted = CartCommunicator::<_, 2>::from_communicator(plain).unwrap();
    assert_eq!(adopted.periods().unwrap(), [false, true]);
}

#[test]
fn duplicated_grid_keeps_its_topology() {
    let world = LocalWorld::new(4);
    let grid = carts(&world, [4], [true]);
    let dups: Vec<_> = grid.iter().map(|c| c.duplicate().unwrap()).collect();
    for (rank, dup) in dups.into_iter().enumerate() {
        let cart = CartCommunicator::<_, 1>::from_communicator(dup).unwrap();
        assert_eq!(cart.coords().unwrap(), [rank]);
        assert!(cart.is_owner());
    }
}

#[test]
fn grid_is_usable_as_a_communicator() {
    let world = LocalWorld::new(3);
    let received = world.run(|t| {
        let ring = CartCommunicator::with_world(t, [3], [true]).unwrap();
        let (source, dest) = ring.shift(&[1]).unwrap();
        let mut recv = [0i32; 1];
        let me = ring.rank().unwrap();
        ring.send_recv(&[me], dest, &mut recv, source).unwrap();
        recv[0]
    });
    assert_eq!(received, vec![1, 2, 0]);
}
