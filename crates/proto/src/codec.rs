//! Length-prefixed postcard framing.
//!
//! Each frame is a little-endian `u32` byte length followed by the postcard encoding of
//! one message. Frames larger than [`MAX_FRAME_LEN`] are rejected before allocation.

use std::io::{Error as IoError, ErrorKind};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single encoded frame.
pub const MAX_FRAME_LEN: u32 = 1 << 20;

/// Encodes `msg` and writes it as one frame, then flushes.
///
/// # Errors
///
/// Returns `InvalidData` if the message cannot be encoded or exceeds
/// [`MAX_FRAME_LEN`], and any I/O error from the writer.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> std::io::Result<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let buf = postcard::to_allocvec(msg).map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
	let len = u32::try_from(buf.len())
		.ok()
		.filter(|len| *len <= MAX_FRAME_LEN)
		.ok_or_else(|| IoError::new(ErrorKind::InvalidData, "frame too large"))?;
	writer.write_u32_le(len).await?;
	writer.write_all(&buf).await?;
	writer.flush().await
}

/// Reads one frame and decodes it.
///
/// # Errors
///
/// Returns `UnexpectedEof` when the peer closed the stream between frames,
/// `InvalidData` for oversized or undecodable frames, and any other I/O error.
pub async fn read_frame<R, T>(reader: &mut R) -> std::io::Result<T>
where
	R: AsyncRead + Unpin,
	T: DeserializeOwned,
{
	let len = reader.read_u32_le().await?;
	if len > MAX_FRAME_LEN {
		return Err(IoError::new(ErrorKind::InvalidData, format!("frame of {len} bytes exceeds limit")));
	}
	let mut buf = vec![0u8; len as usize];
	reader.read_exact(&mut buf).await?;
	postcard::from_bytes(&buf).map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))
}
