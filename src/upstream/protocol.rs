//! Relay framing
//!
//! Every request starts with a one-byte discriminator:
//!
//! ```text
//!   1  write            [1][len: u32 BE][payload]
//!   2  read             [2]
//!   3  write-then-read  [3][len: u32 BE][payload]
//!   4  close            [4]
//! ```
//!
//! Reads (`2` and `3`) are answered with `[len: u32 BE][payload]`. A zero
//! length answer means the relay has nothing to send right now.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::UpstreamError;

pub const WRITE: u8 = 1;
pub const READ: u8 = 2;
pub const EXCHANGE: u8 = 3;
pub const CLOSE: u8 = 4;

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One request to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Forward client bytes
    Write(Bytes),
    /// Ask for relay bytes
    Read,
    /// Forward client bytes, then ask for relay bytes
    Exchange(Bytes),
    /// End of the client stream
    Close,
}

impl Request {
    #[must_use]
    pub const fn discriminator(&self) -> u8 {
        match self {
            Self::Write(_) => WRITE,
            Self::Read => READ,
            Self::Exchange(_) => EXCHANGE,
            Self::Close => CLOSE,
        }
    }

    /// True when the relay answers with a length-prefixed frame
    #[must_use]
    pub const fn expects_response(&self) -> bool {
        matches!(self, Self::Read | Self::Exchange(_))
    }

    fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Write(data) | Self::Exchange(data) => Some(data),
            Self::Read | Self::Close => None,
        }
    }

    /// Serialize the request
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::FrameTooLarge`] if the payload length does
    /// not fit the 32-bit prefix.
    pub fn encode(&self) -> Result<Bytes, UpstreamError> {
        let payload = self.payload();
        let len = payload.map_or(0, Bytes::len);
        let mut buf = BytesMut::with_capacity(1 + LENGTH_PREFIX_SIZE + len);
        buf.put_u8(self.discriminator());

        if let Some(payload) = payload {
            buf.put_u32(length_prefix(payload.len())?);
            buf.extend_from_slice(payload);
        }
        Ok(buf.freeze())
    }
}

fn length_prefix(len: usize) -> Result<u32, UpstreamError> {
    u32::try_from(len).map_err(|_| UpstreamError::FrameTooLarge {
        len,
        limit: u32::MAX as usize,
    })
}

async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Bytes, UpstreamError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > max_len {
        return Err(UpstreamError::FrameTooLarge { len, limit: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Send one request
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub async fn write_request<W>(writer: &mut W, request: &Request) -> Result<(), UpstreamError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&request.encode()?).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the relay's answer to a read or write-then-read request
///
/// # Errors
///
/// Returns [`UpstreamError::FrameTooLarge`] for frames above `max_len`, or an
/// I/O error (including unexpected EOF).
pub async fn read_response<R>(reader: &mut R, max_len: usize) -> Result<Bytes, UpstreamError>
where
    R: AsyncRead + Unpin,
{
    read_frame(reader, max_len).await
}

/// Relay side: read the next request, or `None` at a clean end of stream
///
/// # Errors
///
/// Returns [`UpstreamError::Protocol`] for an unknown discriminator and
/// [`UpstreamError::FrameTooLarge`] for payloads above `max_len`.
pub async fn read_request<R>(reader: &mut R, max_len: usize) -> Result<Option<Request>, UpstreamError>
where
    R: AsyncRead + Unpin,
{
    let mut discriminator = [0u8; 1];
    if reader.read(&mut discriminator).await? == 0 {
        return Ok(None);
    }

    let request = match discriminator[0] {
        WRITE => Request::Write(read_frame(reader, max_len).await?),
        READ => Request::Read,
        EXCHANGE => Request::Exchange(read_frame(reader, max_len).await?),
        CLOSE => Request::Close,
        other => {
            return Err(UpstreamError::protocol(format!(
                "unknown request discriminator {other}"
            )))
        }
    };
    Ok(Some(request))
}

/// Relay side: answer a read request
///
/// # Errors
///
/// Returns an error if the payload is too large for the prefix or the write fails.
pub async fn write_response<W>(writer: &mut W, payload: &[u8]) -> Result<(), UpstreamError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(length_prefix(payload.len())?);
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
