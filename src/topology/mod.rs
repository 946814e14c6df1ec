//! Process groups and the Cartesian grids laid over them.

pub mod cartesian;
pub mod communicator;

pub use cartesian::{CartCommunicator, CartesianLayout};
pub use communicator::{Communicator, Ownership};
