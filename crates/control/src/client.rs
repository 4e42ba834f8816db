//! Client side of the control socket.

use std::path::Path;

use tokio::net::UnixStream;
use warden_proto::{Endpoint, RegistryStatus, Request, RequestId, RequestPayload, Response, ResponsePayload, TenantId, read_frame, write_frame};

use crate::error::ControlError;

/// One connection to the launcher's control socket.
///
/// Requests are sent one at a time; each call waits for its response.
#[derive(Debug)]
pub struct ControlClient {
	stream: UnixStream,
	next_id: u64,
}

impl ControlClient {
	/// Connects to the socket at `path`.
	///
	/// # Errors
	///
	/// Returns [`ControlError::Io`] if nothing is listening.
	pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ControlError> {
		let stream = UnixStream::connect(path.as_ref()).await?;
		Ok(Self::from_stream(stream))
	}

	/// Wraps an already connected stream.
	#[must_use]
	pub fn from_stream(stream: UnixStream) -> Self {
		Self { stream, next_id: 1 }
	}

	/// Sends one request and waits for its response payload.
	///
	/// # Errors
	///
	/// Returns [`ControlError::Remote`] when the launcher answers with an error code.
	pub async fn request(&mut self, payload: RequestPayload) -> Result<ResponsePayload, ControlError> {
		let id = RequestId(self.next_id);
		self.next_id += 1;

		write_frame(&mut self.stream, &Request { id, payload }).await?;
		let response: Response = read_frame(&mut self.stream).await?;

		if response.request_id != id {
			return Err(ControlError::MismatchedResponse {
				expected: id,
				got: response.request_id,
			});
		}
		if let Some(code) = response.error {
			return Err(ControlError::Remote(code));
		}
		response.payload.ok_or(ControlError::UnexpectedResponse("a payload"))
	}

	/// Checks that the launcher is answering.
	///
	/// # Errors
	///
	/// Fails on I/O errors or an unexpected reply.
	pub async fn ping(&mut self) -> Result<(), ControlError> {
		match self.request(RequestPayload::Ping).await? {
			ResponsePayload::Pong => Ok(()),
			_ => Err(ControlError::UnexpectedResponse("Pong")),
		}
	}

	/// Resolves `tenant_id` to its worker unit endpoint, spawning on demand.
	///
	/// # Errors
	///
	/// Caller-visible resolve failures arrive as [`ControlError::Remote`].
	pub async fn resolve(&mut self, tenant_id: TenantId) -> Result<Endpoint, ControlError> {
		match self.request(RequestPayload::Resolve { tenant_id }).await? {
			ResponsePayload::Endpoint(endpoint) => Ok(endpoint),
			_ => Err(ControlError::UnexpectedResponse("Endpoint")),
		}
	}

	/// Reports that `tenant_id` has been deleted.
	///
	/// # Errors
	///
	/// Fails on I/O errors or an unexpected reply.
	pub async fn mark_deleted(&mut self, tenant_id: TenantId) -> Result<(), ControlError> {
		match self.request(RequestPayload::MarkDeleted { tenant_id }).await? {
			ResponsePayload::MarkedDeleted => Ok(()),
			_ => Err(ControlError::UnexpectedResponse("MarkedDeleted")),
		}
	}

	/// Fetches a snapshot of the registry.
	///
	/// # Errors
	///
	/// Fails on I/O errors or an unexpected reply.
	pub async fn status(&mut self) -> Result<RegistryStatus, ControlError> {
		match self.request(RequestPayload::Status).await? {
			ResponsePayload::Status(status) => Ok(status),
			_ => Err(ControlError::UnexpectedResponse("Status")),
		}
	}
}
