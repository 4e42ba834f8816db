//! Control socket for the warden launcher daemon.
//!
//! The registry lives in the launcher process. Loaders, worker units and operators reach
//! it through a Unix domain socket speaking length-prefixed postcard frames (see
//! [`warden_proto::codec`]). Each connection carries a sequence of request/response
//! pairs; a `Resolve` may block for up to `launcher_wait_secs` while the launcher spawns.

#![warn(missing_docs)]

pub mod client;
mod error;
pub mod server;

pub use client::ControlClient;
pub use error::ControlError;
pub use server::serve;
