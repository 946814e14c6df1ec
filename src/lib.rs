#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mpi-wrapper
//!
//! mpi-wrapper is a thin, type-safe convenience layer over an existing
//! message-passing runtime (MPI) for distributed scientific codes. It provides:
//!
//! - [`Communicator`](topology::communicator::Communicator): an ownership-tagged
//!   communicator handle. Clones never release, moves carry ownership, and
//!   built-in communicators are never freed.
//! - Typed combined send/receive, with element kinds resolved at compile time
//!   through [`MpiDatatype`](datatype::MpiDatatype).
//! - [`CartCommunicator`](topology::cartesian::CartCommunicator): an
//!   N-dimensional process grid with periodic or hard boundaries, coordinate
//!   to rank conversion and multi-axis neighbor shifts.
//!
//! ## Runtimes
//! The runtime is reached through the [`Transport`](transport::Transport)
//! trait. Two implementations ship with the crate:
//! - [`transport::local::LocalWorld`]: an in-process world of simulated ranks,
//!   used by the tests and for running grid logic without an MPI install.
//! - `transport::mpi::MpiTransport` (feature `mpi-support`): raw MPI calls
//!   through rsmpi.
//!
//! ## Validation
//! Caller-side precondition checks are governed by
//! [`ValidationMode`](config::ValidationMode): `Strict` raises them as errors,
//! `Permissive` skips them. The default is `Strict` in debug builds (or with
//! the `strict-checks` feature) and `Permissive` otherwise. Runtime failures
//! are always reported.
//!
//! ## Usage
//! ```rust
//! use mpi_wrapper::prelude::*;
//!
//! let world = LocalWorld::new(4);
//! let neighbors = world.run(|transport| {
//!     let ring = CartCommunicator::with_world(transport, [4], [true])?;
//!     ring.shift(&[1])
//! });
//! assert_eq!(neighbors[0], Ok((Some(1), Some(3))));
//! ```

pub mod config;
pub mod datatype;
pub mod mpi_error;
pub mod topology;
pub mod transport;

pub use mpi_error::{MpiWrapperError, Result};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::config::{ValidationMode, WrapperConfig};
    pub use crate::datatype::{ElementKind, MpiDatatype};
    pub use crate::mpi_error::{MpiWrapperError, Result};
    pub use crate::topology::cartesian::{CartCommunicator, CartesianLayout};
    pub use crate::topology::communicator::{Communicator, Ownership};
    pub use crate::transport::local::{LocalComm, LocalTransport, LocalWorld};
    #[cfg(feature = "mpi-support")]
    pub use crate::transport::mpi::MpiTransport;
    pub use crate::transport::{Rank, Status, Transport};
}
