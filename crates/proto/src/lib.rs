//! Shared wire types for the warden control socket.
//!
//! This crate defines the messages exchanged between the launcher daemon and the
//! processes that cooperate with it (loaders resolving tenant endpoints, worker units
//! reporting their own deletion, operators querying status) over a Unix domain socket.
//! Frames are length-prefixed postcard.

#![warn(missing_docs)]

pub mod codec;
pub mod paths;
pub mod types;

pub use codec::{read_frame, write_frame};
pub use types::*;

/// Line a worker unit writes to its stdout once all three endpoints are listening.
///
/// The spawner treats the first line equal to this value as the readiness handshake.
pub const READY_LINE: &str = "warden-unit-ready";
