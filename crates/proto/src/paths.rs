//! Utilities for control socket path resolution.

use std::path::PathBuf;

/// Environment variable overriding the control socket path.
pub const SOCKET_ENV: &str = "WARDEN_SOCKET";

/// Returns the default control socket path.
///
/// Prioritizes writable directories so the launcher can bind even in restricted
/// environments (containers, CI sandboxes).
///
/// # Resolution Order
///
/// 1. `WARDEN_SOCKET` environment variable.
/// 2. System runtime directory (e.g., `$XDG_RUNTIME_DIR`).
/// 3. System temp directory (e.g., `/tmp`).
///
/// The default file name is `warden.sock`.
#[must_use]
pub fn default_socket_path() -> PathBuf {
	if let Ok(p) = std::env::var(SOCKET_ENV) {
		return PathBuf::from(p);
	}

	dirs::runtime_dir()
		.filter(|p| std::fs::create_dir_all(p).is_ok())
		.unwrap_or_else(std::env::temp_dir)
		.join("warden.sock")
}
