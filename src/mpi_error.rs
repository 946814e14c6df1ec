//! MpiWrapperError: unified error type for the public APIs of mpi-wrapper.
//!
//! Precondition violations are only raised in [`ValidationMode::Strict`];
//! runtime status failures and exchange failures are raised in every mode.
//!
//! [`ValidationMode::Strict`]: crate::config::ValidationMode::Strict

use crate::transport::{Rank, Status};
use thiserror::Error;

/// Unified error type for communicator and topology operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MpiWrapperError {
    /// The product of the topology extents does not match the parent group size.
    #[error(
        "dimension size different than group size: product of extents is {extent_product:?}, group size is {group_size}"
    )]
    ExtentMismatch {
        /// `None` when the product overflows `usize`.
        extent_product: Option<usize>,
        group_size: i32,
    },
    /// An extent cannot be handed to the runtime (it does not fit its `int`).
    #[error("extent {extent} of dimension {dimension} is not representable by the runtime")]
    InvalidExtent { dimension: usize, extent: usize },
    /// Topology information was requested from a communicator without one.
    #[error("no cartesian topology attached")]
    NoCartesianTopology,
    /// The attached topology has a different dimensionality than requested.
    #[error("cartesian topology has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// A rank outside of `[0, size)` was passed to a topology query.
    #[error("rank {rank} outside of [0, {size})")]
    RankOutOfRange { rank: Rank, size: i32 },
    /// A runtime call reported a non-success status.
    #[error("{call} fails with status {status}")]
    Transport { call: &'static str, status: Status },
    /// The combined send-and-receive reported a non-success status.
    #[error("send_recv fails with status {0}")]
    ExchangeFailed(Status),
    /// The message-passing runtime could not be initialized.
    #[error("runtime initialization failed: {0}")]
    Initialization(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MpiWrapperError>;

impl MpiWrapperError {
    /// Returns a closure mapping a runtime [`Status`] into a `Transport` error
    /// tagged with `call`; meant for `map_err`.
    pub(crate) fn transport(call: &'static str) -> impl FnOnce(Status) -> Self {
        move |status| MpiWrapperError::Transport { call, status }
    }

    /// Status reported by the runtime, if this error came from it.
    pub fn status(&self) -> Option<Status> {
        match self {
            MpiWrapperError::Transport { status, .. } | MpiWrapperError::ExchangeFailed(status) => {
                Some(*status)
            }
            _ => None,
        }
    }
}
