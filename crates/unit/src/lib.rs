//! Worker unit runtime.
//!
//! A worker unit serves exactly one tenant on the three ports the launcher assigned it:
//!
//! | Endpoint | Role |
//! |---|---|
//! | setup | provisions tenant versions, delegated to [`UnitHandler::setup`] |
//! | delete | reports the tenant's deletion to the launcher, then shuts the unit down |
//! | user | serves tenant traffic, delegated to [`UnitHandler::user`] |
//!
//! Startup binds all three listeners before printing [`warden_proto::READY_LINE`] on
//! stdout, which completes the launcher's spawn handshake. Shutdown (signal or delete)
//! stops accepting on every endpoint, drains in-flight connections for a bounded time,
//! and returns.

#![warn(missing_docs)]

mod error;
mod handler;
mod report;
mod unit;

pub use error::UnitError;
pub use handler::{AckHandler, Role, UnitHandler};
pub use report::{DeletionReporter, SocketReporter};
pub use unit::{BoundUnit, UnitConfig, announce_ready};
