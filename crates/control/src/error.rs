use std::path::PathBuf;

use thiserror::Error;
use warden_proto::{ErrorCode, RequestId};

/// Errors from the control socket server and client.
#[derive(Debug, Error)]
pub enum ControlError {
	/// Socket I/O or framing failed.
	#[error("control socket I/O error: {0}")]
	Io(#[from] std::io::Error),
	/// The launcher answered with an error code.
	#[error("launcher returned error: {0}")]
	Remote(ErrorCode),
	/// The launcher answered a different request than the one sent.
	#[error("response for request {got:?} while waiting for {expected:?}")]
	MismatchedResponse {
		/// Id of the outstanding request.
		expected: RequestId,
		/// Id echoed by the launcher.
		got: RequestId,
	},
	/// The launcher answered with a payload of the wrong kind.
	#[error("unexpected response payload, expected {0}")]
	UnexpectedResponse(&'static str),
	/// Another launcher is already answering on the socket.
	#[error("a launcher is already listening on {}", .0.display())]
	AlreadyRunning(PathBuf),
}

impl ControlError {
	/// The remote error code, if the launcher rejected the request.
	#[must_use]
	pub fn code(&self) -> Option<ErrorCode> {
		match self {
			Self::Remote(code) => Some(*code),
			_ => None,
		}
	}
}
