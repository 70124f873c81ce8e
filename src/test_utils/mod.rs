//! Fixtures shared by the unit tests of every module: logger setup, reply
//! encoding and an in-memory server.
mod common;
mod mock;

pub use common::*;
pub(crate) use mock::*;
