//! Length-prefixed framing.
//!
//! Every message on the wire is `[4-byte length N, big-endian signed] [N bytes]`.
//! There is no magic number, checksum or version byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};
use crate::transport::codec::{Codec, Serializer};

/// Size of the length field in bytes.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Default upper bound on a single frame payload (16 MB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Initial read buffer capacity
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Framing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest payload accepted from the peer, in bytes
    pub max_frame_length: usize,
}

impl FrameConfig {
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frame_length == 0 {
            return Err(RpcError::InvalidRequest(
                "max_frame_length must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_length > i32::MAX as usize {
            return Err(RpcError::InvalidRequest(format!(
                "max_frame_length must not exceed {}",
                i32::MAX
            )));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Prepends the length header to `payload`.
///
/// # Errors
///
/// Returns `Protocol` if the payload does not fit a signed 32-bit length.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = i32::try_from(payload.len()).map_err(|_| {
        RpcError::Protocol(format!("payload too large to frame: {} bytes", payload.len()))
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_LEN + payload.len());
    buf.put_i32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Accumulating frame decoder.
///
/// Feed it a growing buffer; it yields one complete payload at a time and
/// leaves partial frames untouched until more bytes arrive.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use myrpc_common::transport::{encode_frame, FrameDecoder};
///
/// let frame = encode_frame(b"hello").unwrap();
/// let decoder = FrameDecoder::default();
///
/// let mut buf = BytesMut::from(&frame[..3]);
/// assert!(decoder.decode(&mut buf).unwrap().is_none());
/// assert_eq!(buf.len(), 3);
///
/// buf.extend_from_slice(&frame[3..]);
/// assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"hello");
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    config: FrameConfig,
}

impl FrameDecoder {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Attempts to take one frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` without consuming anything when the header or the
    /// payload is incomplete. On success exactly `4 + N` bytes are consumed.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` for a negative length or one above the configured
    /// maximum. The stream cannot be resynchronised after either.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if buf.len() < LENGTH_FIELD_LEN {
            return Ok(None);
        }

        let mut header = [0u8; LENGTH_FIELD_LEN];
        header.copy_from_slice(&buf[..LENGTH_FIELD_LEN]);
        let len = i32::from_be_bytes(header);

        if len < 0 {
            return Err(RpcError::Protocol(format!("negative frame length: {}", len)));
        }
        let len = len as usize;
        if len > self.config.max_frame_length {
            return Err(RpcError::Protocol(format!(
                "frame too large: {} bytes (max {} bytes)",
                len, self.config.max_frame_length
            )));
        }

        if buf.len() < LENGTH_FIELD_LEN + len {
            buf.reserve(LENGTH_FIELD_LEN + len - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_FIELD_LEN);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

/// Frame layer plus a serializer, for typed messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec {
    decoder: FrameDecoder,
    serializer: Codec,
}

impl MessageCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(config),
            serializer: Codec::new(),
        }
    }

    /// Serializes `value` and frames it.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        let payload = self.serializer.serialize(value)?;
        encode_frame(&payload)
    }

    /// Decodes one typed message if a complete frame is buffered.
    pub fn decode<T: DeserializeOwned>(&self, buf: &mut BytesMut) -> Result<Option<T>> {
        match self.decoder.decode(buf)? {
            Some(payload) => Ok(Some(self.serializer.deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn decoder(&self) -> FrameDecoder {
        self.decoder
    }

    pub fn serializer(&self) -> Codec {
        self.serializer
    }
}

/// Reads whole frames from an async byte stream.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config),
        }
    }

    /// Returns the next frame payload, or `None` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// `Protocol` for a malformed length, `ConnectionClosed` if the peer hung
    /// up in the middle of a frame, `Io` for read failures.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RpcError::ConnectionClosed);
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
