//! Worker registry and launcher reconciliation for per-tenant worker processes.
//!
//! # Purpose
//!
//! - Own the authoritative map from [`TenantId`] to [`Entry`] and the pool of free ports handed to worker units.
//! - Implement the handoff between callers that need a tenant's endpoint (loaders), worker units that report their own deletion, and the single launcher that spawns and retires processes.
//! - Exclude the control socket transport (see `warden-control`) and the worker unit runtime (see `warden-unit`).
//!
//! # Mental model
//!
//! - The registry lives inside the launcher daemon. Other processes reach it through the control socket, so every mutation happens in exactly one address space.
//! - Callers never spawn. They insert a placeholder, raise the dirty flag and wait for the launcher to publish an update.
//! - The launcher is the only actor that allocates ports or starts processes. It runs reconciliation passes forever; a pass with no dirty flag is a no-op.
//! - Process liveness is never cached. Every decision re-probes the pid through [`ProcessProbe`].
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`Registry`] | Table, port pool, dirty flag and update notification | MUST be the only owner of table state | `Registry::new` |
//! | [`Entry`] | One tenant row | `deleted` MUST only go false to true | `Registry::resolve`, `Registry::mark_deleted`, `Registry::reconcile` |
//! | [`PortPool`] | Free ports within the configured range | MUST hand out ports as a 3-port unit, lowest first | `Registry::reconcile`, `Registry::resolve` |
//! | [`ReconcileOutcome`] | Result of one launcher pass | `Failure` MUST terminate the launcher | `Registry::reconcile` |
//! | [`WorkerSpawner`] | Process creation seam | MUST return only after readiness or the handshake timeout | [`CommandSpawner`], `test_helpers::FakeSpawner` |
//! | [`ProcessProbe`] | Liveness seam | Permission denied MUST count as alive | [`SystemProbe`], `test_helpers::FakeProbe` |
//!
//! # Invariants
//!
//! 1. Every port in range MUST be either free or held by exactly one recorded instance.
//!    - Enforced in: `Registry::reconcile`, `Registry::resolve`, `PortPool::reclaim`
//!    - Tested by: `tests::properties::ports_are_conserved_across_churn`, `tests::reconcile::spawn_failure_returns_allocated_ports`
//!    - Failure symptom: two tenants are told to bind the same port, or the pool slowly drains until every spawn fails.
//!
//! 2. A tenant MUST have at most one recorded instance.
//!    - Enforced in: `Entry::install`, `Registry::reconcile`
//!    - Tested by: `tests::properties::at_most_one_instance_per_tenant`, `tests::handoff::concurrent_resolvers_share_one_spawn`
//!    - Failure symptom: a tenant runs twice and its state diverges between processes.
//!
//! 3. Deletion MUST be monotonic and self-report MUST be idempotent.
//!    - Enforced in: `Entry::mark_deleted`, `Registry::mark_deleted`
//!    - Tested by: `tests::self_report::mark_deleted_is_idempotent`, `tests::self_report::deletion_never_reverts`
//!    - Failure symptom: a deleted tenant is respawned behind the delete endpoint's back.
//!
//! 4. A resolver MUST subscribe to the update notification before releasing the changes lock.
//!    - Enforced in: `Registry::resolve`
//!    - Tested by: `tests::handoff::resolve_waits_for_launcher_and_returns_spawned_endpoint`
//!    - Failure symptom: a pass completes between placeholder insertion and the wait, and the caller times out although its worker is running.
//!
//! 5. Every wait MUST be bounded.
//!    - Enforced in: `Registry::resolve` (`launcher_wait_secs`), `CommandSpawner::spawn` (`worker_process_wait_secs`), `Registry::reconcile` (`termination_wait_secs`)
//!    - Tested by: `tests::handoff::resolve_times_out_without_launcher_and_keeps_placeholder`, `tests::reconcile::unresponsive_deleted_worker_bounds_the_pass`, `spawner::tests::silent_child_times_out_but_keeps_pid`
//!    - Failure symptom: gateway requests hang forever behind a stuck launcher or a worker that never exits.
//!
//! 6. Port exhaustion and spawn failure MUST abort the pass and leave the tenant's entry unmodified.
//!    - Enforced in: `Registry::reconcile`
//!    - Tested by: `tests::reconcile::port_exhaustion_fails_pass_and_leaves_entry_untouched`
//!    - Failure symptom: half-built instances are visible to resolvers.
//!
//! 7. Only a tenant's own worker unit MAY mark it deleted over the control socket.
//!    - Enforced in: `Registry::report_deleted`
//!    - Tested by: `tests::self_report::report_from_another_process_is_refused`, `tests::self_report::report_from_owner_marks_deleted`
//!    - Failure symptom: a client tombstones a live tenant and every later resolve fails with `WorkerDeleted`.
//!
//! # Data flow
//!
//! 1. Resolve: lock, inspect the entry (insert a placeholder if missing), subscribe, unlock, wait for the update, lock again and read the instance.
//! 2. Reconcile: lock, reap children, consume the dirty flag, erase retired rows, reclaim dead instances, spawn missing ones, publish, unlock.
//! 3. Self-report: lock, check the reporter owns the row, set `deleted`, raise dirty on the first transition, unlock.
//!
//! # Concurrency and ordering
//!
//! - The changes lock is a single async mutex over the table, the pool and the dirty flag. A reconciliation pass holds it from start to finish, including spawn handshakes.
//! - The update notification is a generation counter on a `watch` channel; publishing wakes every subscribed resolver at once.
//! - Raising the dirty flag also wakes the launcher's idle wait, so a fresh placeholder does not sit out the idle poll.

#![warn(missing_docs)]

mod config;
mod entry;
mod error;
pub mod launcher;
mod ports;
pub mod probe;
mod reconcile;
mod registry;
pub mod spawner;

#[doc(hidden)]
pub mod test_helpers;


pub use config::{ConfigError, RegistryConfig};
pub use entry::Entry;
pub use error::{LauncherError, ReportError, ResolveError, SpawnError};
pub use ports::PortPool;
pub use probe::{ProcessProbe, SystemProbe, is_process_alive};
pub use reconcile::ReconcileOutcome;
pub use registry::Registry;
pub use spawner::{CommandSpawner, SpawnedWorker, WorkerSpawner};
pub use warden_proto::{Endpoint, EntrySnapshot, Instance, Port, RegistryStatus, TenantId};
