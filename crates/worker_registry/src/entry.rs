use warden_proto::{EntrySnapshot, Instance, TenantId};

use crate::probe::ProcessProbe;

/// One registry row.
///
/// `deleted = false` with no instance means the tenant needs spawning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
	deleted: bool,
	instance: Option<Instance>,
}

impl Entry {
	/// A row that has already been deleted and has no process.
	pub(crate) fn tombstone() -> Self {
		Self {
			deleted: true,
			instance: None,
		}
	}

	/// Whether the tenant has reported its own deletion.
	#[must_use]
	pub fn is_deleted(&self) -> bool {
		self.deleted
	}

	/// The recorded instance, live or not.
	#[must_use]
	pub fn instance(&self) -> Option<&Instance> {
		self.instance.as_ref()
	}

	/// Whether the recorded instance's process is still running.
	pub fn is_running(&self, probe: &dyn ProcessProbe) -> bool {
		self.instance.as_ref().is_some_and(|instance| probe.is_alive(instance.pid))
	}

	/// Sets the deletion flag. Returns true only on the first transition.
	pub(crate) fn mark_deleted(&mut self) -> bool {
		!std::mem::replace(&mut self.deleted, true)
	}

	/// Clears the instance, handing back its ports for reclamation.
	pub(crate) fn take_instance(&mut self) -> Option<Instance> {
		self.instance.take()
	}

	/// Records a freshly spawned instance.
	pub(crate) fn install(&mut self, instance: Instance) {
		debug_assert!(self.instance.is_none(), "installing over a recorded instance leaks its ports");
		self.instance = Some(instance);
	}

	pub(crate) fn snapshot(&self, tenant_id: TenantId) -> EntrySnapshot {
		EntrySnapshot {
			tenant_id,
			deleted: self.deleted,
			instance: self.instance,
		}
	}
}
