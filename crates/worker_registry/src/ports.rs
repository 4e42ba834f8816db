use std::collections::BTreeSet;

use warden_proto::{Endpoint, Port};

use crate::config::PORTS_PER_WORKER;

/// Free ports within the configured inclusive range.
///
/// Ports are handed out three at a time, lowest first, so a reclaimed endpoint is the
/// first one reused.
#[derive(Debug, Clone)]
pub struct PortPool {
	start: Port,
	end: Port,
	free: BTreeSet<Port>,
}

impl PortPool {
	/// Creates a pool holding every port in `start..=end`.
	#[must_use]
	pub fn new(start: Port, end: Port) -> Self {
		Self {
			start,
			end,
			free: (start..=end).collect(),
		}
	}

	/// Number of free ports.
	#[must_use]
	pub fn len(&self) -> usize {
		self.free.len()
	}

	/// Whether no port is free.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.free.is_empty()
	}

	/// Whether `port` is currently free.
	#[must_use]
	pub fn contains(&self, port: Port) -> bool {
		self.free.contains(&port)
	}

	/// Configured range as `(start, end)`.
	#[must_use]
	pub fn range(&self) -> (Port, Port) {
		(self.start, self.end)
	}

	/// Free ports in ascending order.
	pub fn iter(&self) -> impl Iterator<Item = Port> + '_ {
		self.free.iter().copied()
	}

	/// Removes the three lowest free ports as `{setup, delete, user}`.
	///
	/// Returns `None` without touching the pool when fewer than three are free.
	pub fn allocate_endpoint(&mut self) -> Option<Endpoint> {
		if self.free.len() < PORTS_PER_WORKER {
			return None;
		}
		let setup_port = self.free.pop_first()?;
		let delete_port = self.free.pop_first()?;
		let user_port = self.free.pop_first()?;
		Some(Endpoint {
			setup_port,
			delete_port,
			user_port,
		})
	}

	/// Returns an endpoint's ports to the pool.
	pub fn reclaim(&mut self, endpoint: &Endpoint) {
		for port in endpoint.ports() {
			if !(self.start..=self.end).contains(&port) {
				tracing::warn!(port, start = self.start, end = self.end, "ignoring reclaimed port outside the configured range");
				continue;
			}
			if !self.free.insert(port) {
				tracing::warn!(port, "port reclaimed twice");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocates_three_lowest_ports() {
		let mut pool = PortPool::new(9000, 9008);
		let endpoint = pool.allocate_endpoint().unwrap();
		assert_eq!(endpoint.ports(), [9000, 9001, 9002]);
		assert_eq!(pool.len(), 6);

		let next = pool.allocate_endpoint().unwrap();
		assert_eq!(next.ports(), [9003, 9004, 9005]);
	}

	#[test]
	fn allocation_without_three_ports_is_non_mutating() {
		let mut pool = PortPool::new(9000, 9004);
		pool.allocate_endpoint().unwrap();
		assert_eq!(pool.len(), 2);

		assert!(pool.allocate_endpoint().is_none());
		assert_eq!(pool.iter().collect::<Vec<_>>(), vec![9003, 9004]);
	}

	#[test]
	fn reclaimed_ports_are_reused_first() {
		let mut pool = PortPool::new(9000, 9008);
		let first = pool.allocate_endpoint().unwrap();
		let _second = pool.allocate_endpoint().unwrap();

		pool.reclaim(&first);
		assert_eq!(pool.allocate_endpoint(), Some(first));
	}

	#[test]
	fn double_reclaim_does_not_duplicate() {
		let mut pool = PortPool::new(9000, 9002);
		let endpoint = pool.allocate_endpoint().unwrap();
		pool.reclaim(&endpoint);
		pool.reclaim(&endpoint);
		assert_eq!(pool.len(), 3);
	}
}
