//! Process liveness checks.
//!
//! The registry never trusts a recorded pid on its own: a worker unit can exit at any
//! time, and its pid may linger as an unreaped zombie until the launcher collects it.
//! [`SystemProbe`] reaps before probing so that exited children read as dead.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// Liveness seam between the registry and the operating system.
pub trait ProcessProbe: Send + Sync + 'static {
	/// Collects every exited child without blocking. Returns how many were reaped.
	fn reap_children(&self) -> usize;

	/// Whether `pid` refers to a running process.
	///
	/// Permission errors MUST be reported as alive.
	fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by `waitpid` and `kill(pid, 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
	fn reap_children(&self) -> usize {
		let mut reaped = 0;
		loop {
			match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
				Ok(status) => {
					tracing::debug!(?status, "reaped child");
					reaped += 1;
				}
				Err(Errno::EINTR) => {}
				Err(err) => {
					tracing::warn!(error = %err, "waitpid failed while reaping");
					break;
				}
			}
		}
		reaped
	}

	fn is_alive(&self, pid: u32) -> bool {
		is_process_alive(pid)
	}
}

/// Reports whether `pid` is running, reaping it first if it is an exited child.
///
/// Pids that do not fit a positive `pid_t` are dead. `EPERM` from the signal probe
/// means the process exists under another user and counts as alive.
#[must_use]
pub fn is_process_alive(pid: u32) -> bool {
	let Ok(raw) = i32::try_from(pid) else {
		return false;
	};
	if raw <= 0 {
		return false;
	}
	let pid = Pid::from_raw(raw);

	if let Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) = waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
		return false;
	}

	match kill(pid, None) {
		Ok(()) => true,
		Err(Errno::ESRCH) => false,
		Err(_) => true,
	}
}
