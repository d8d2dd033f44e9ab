// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk-Server Wire Protocol
//!
//! Length-prefixed, little-endian framed messages over any `AsyncRead +
//! AsyncWrite` stream: `(length_u64, type_u64, body[length - 16])` (spec
//! §6). A session begins with both sides exchanging [`Message::Hello`] —
//! the initiator sets [`Capabilities::PULL_CHUNKS`], the server advertises
//! [`Capabilities::READABLE_STORE`] — after which the initiator drives
//! [`Message::Request`]/[`Message::Chunk`]/[`Message::Missing`] exchanges and
//! closes with [`Message::Goodbye`]. A truncated frame, an unexpected type for
//! the current exchange, or a body shorter than its declared id/flag prefix
//! fails the session with [`CasyncError::ProtocolError`].

use casync_domain::{CasyncError, ChunkId, CHUNK_ID_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_LEN: usize = 16;

/// Maximum frame body the protocol accepts, guarding against a malicious or
/// corrupt peer claiming an unbounded length and exhausting memory.
const MAX_BODY_LEN: u64 = 256 * 1024 * 1024;

#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Hello = 1,
    Request = 2,
    Chunk = 3,
    Missing = 4,
    Goodbye = 5,
    Abort = 6,
}

impl MessageType {
    fn from_u64(value: u64) -> Result<Self, CasyncError> {
        match value {
            1 => Ok(Self::Hello),
            2 => Ok(Self::Request),
            3 => Ok(Self::Chunk),
            4 => Ok(Self::Missing),
            5 => Ok(Self::Goodbye),
            6 => Ok(Self::Abort),
            other => Err(CasyncError::protocol(format!("unknown message type {other}"))),
        }
    }
}

/// Capability flags exchanged in [`Message::Hello`], a plain bitset over a
/// `u64` rather than a crate newtype — two flags don't warrant the
/// dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities(u64);

impl Capabilities {
    /// The sender wants to pull chunks (the initiator's role).
    pub const PULL_CHUNKS: Capabilities = Capabilities(0b0000_0001);
    /// The sender can serve chunk reads (the server's role).
    pub const READABLE_STORE: Capabilities = Capabilities(0b0000_0010);

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn from_bits_truncate(bits: u64) -> Self {
        Capabilities(bits & (Self::PULL_CHUNKS.0 | Self::READABLE_STORE.0))
    }

    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello { capabilities: Capabilities },
    Request { flags: u64, id: ChunkId },
    Chunk { flags: u64, id: ChunkId, data: Vec<u8> },
    Missing { flags: u64, id: ChunkId },
    Goodbye,
    Abort { reason: String },
}

impl Message {
    fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::Request { .. } => MessageType::Request,
            Message::Chunk { .. } => MessageType::Chunk,
            Message::Missing { .. } => MessageType::Missing,
            Message::Goodbye => MessageType::Goodbye,
            Message::Abort { .. } => MessageType::Abort,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            Message::Hello { capabilities } => capabilities.bits().to_le_bytes().to_vec(),
            Message::Request { flags, id } => {
                let mut body = Vec::with_capacity(8 + CHUNK_ID_LEN);
                body.extend_from_slice(&flags.to_le_bytes());
                body.extend_from_slice(id.as_bytes());
                body
            }
            Message::Chunk { flags, id, data } => {
                let mut body = Vec::with_capacity(8 + CHUNK_ID_LEN + data.len());
                body.extend_from_slice(&flags.to_le_bytes());
                body.extend_from_slice(id.as_bytes());
                body.extend_from_slice(data);
                body
            }
            Message::Missing { flags, id } => {
                let mut body = Vec::with_capacity(8 + CHUNK_ID_LEN);
                body.extend_from_slice(&flags.to_le_bytes());
                body.extend_from_slice(id.as_bytes());
                body
            }
            Message::Goodbye => Vec::new(),
            Message::Abort { reason } => reason.as_bytes().to_vec(),
        }
    }

    fn decode_body(message_type: MessageType, body: &[u8]) -> Result<Self, CasyncError> {
        match message_type {
            MessageType::Hello => {
                let bits = read_u64(body, 0)?;
                Ok(Message::Hello {
                    capabilities: Capabilities::from_bits_truncate(bits),
                })
            }
            MessageType::Request => {
                let flags = read_u64(body, 0)?;
                let id = read_chunk_id(body, 8)?;
                Ok(Message::Request { flags, id })
            }
            MessageType::Chunk => {
                let flags = read_u64(body, 0)?;
                let id = read_chunk_id(body, 8)?;
                let data = body.get(8 + CHUNK_ID_LEN..).ok_or_else(|| truncated("CHUNK"))?.to_vec();
                Ok(Message::Chunk { flags, id, data })
            }
            MessageType::Missing => {
                let flags = read_u64(body, 0)?;
                let id = read_chunk_id(body, 8)?;
                Ok(Message::Missing { flags, id })
            }
            MessageType::Goodbye => Ok(Message::Goodbye),
            MessageType::Abort => {
                let reason = String::from_utf8_lossy(body).into_owned();
                Ok(Message::Abort { reason })
            }
        }
    }

    /// Writes this message as a single length-prefixed frame.
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), CasyncError> {
        let body = self.encode_body();
        let length = (HEADER_LEN + body.len()) as u64;
        writer
            .write_all(&length.to_le_bytes())
            .await
            .map_err(|e| CasyncError::Io(format!("writing frame length: {e}")))?;
        writer
            .write_all(&(self.message_type() as u64).to_le_bytes())
            .await
            .map_err(|e| CasyncError::Io(format!("writing frame type: {e}")))?;
        writer
            .write_all(&body)
            .await
            .map_err(|e| CasyncError::Io(format!("writing frame body: {e}")))?;
        writer.flush().await.map_err(|e| CasyncError::Io(format!("flushing frame: {e}")))?;
        Ok(())
    }

    /// Reads one length-prefixed frame, failing the session on a truncated
    /// stream, an oversized length, or an unrecognized message type.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, CasyncError> {
        let mut length_buf = [0u8; 8];
        reader
            .read_exact(&mut length_buf)
            .await
            .map_err(|e| CasyncError::protocol(format!("reading frame length: {e}")))?;
        let length = u64::from_le_bytes(length_buf);
        if length < HEADER_LEN as u64 || length > MAX_BODY_LEN {
            return Err(CasyncError::protocol(format!("invalid frame length {length}")));
        }

        let mut type_buf = [0u8; 8];
        reader
            .read_exact(&mut type_buf)
            .await
            .map_err(|e| CasyncError::protocol(format!("reading frame type: {e}")))?;
        let message_type = MessageType::from_u64(u64::from_le_bytes(type_buf))?;

        let body_len = (length as usize) - HEADER_LEN;
        let mut body = vec![0u8; body_len];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| CasyncError::protocol(format!("reading frame body: {e}")))?;

        Self::decode_body(message_type, &body)
    }
}

fn read_u64(body: &[u8], offset: usize) -> Result<u64, CasyncError> {
    let slice = body.get(offset..offset + 8).ok_or_else(|| truncated("u64 field"))?;
    Ok(u64::from_le_bytes(slice.try_into().expect("slice is exactly 8 bytes")))
}

fn read_chunk_id(body: &[u8], offset: usize) -> Result<ChunkId, CasyncError> {
    let slice = body.get(offset..offset + CHUNK_ID_LEN).ok_or_else(|| truncated("chunk id"))?;
    Ok(ChunkId::from_bytes(slice.try_into().expect("slice is exactly CHUNK_ID_LEN bytes")))
}

fn truncated(what: &str) -> CasyncError {
    CasyncError::protocol(format!("truncated frame: missing {what}"))
}

/// Performs the initiator side of the `HELLO` exchange: sends `HELLO` with
/// `PULL_CHUNKS` set, reads the peer's `HELLO`, and returns its advertised
/// capabilities. Fails if the peer doesn't advertise `READABLE_STORE`.
pub async fn client_handshake<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<Capabilities, CasyncError> {
    Message::Hello {
        capabilities: Capabilities::PULL_CHUNKS,
    }
    .write(stream)
    .await?;

    match Message::read(stream).await? {
        Message::Hello { capabilities } if capabilities.contains(Capabilities::READABLE_STORE) => Ok(capabilities),
        Message::Hello { .. } => Err(CasyncError::protocol("peer did not advertise READABLE_STORE")),
        other => Err(unexpected("HELLO", &other)),
    }
}

/// Performs the server side of the `HELLO` exchange: reads the initiator's
/// `HELLO` and responds with `READABLE_STORE`.
pub async fn server_handshake<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<Capabilities, CasyncError> {
    let peer_caps = match Message::read(stream).await? {
        Message::Hello { capabilities } => capabilities,
        other => return Err(unexpected("HELLO", &other)),
    };

    Message::Hello {
        capabilities: Capabilities::READABLE_STORE,
    }
    .write(stream)
    .await?;

    Ok(peer_caps)
}

/// Requests a single chunk from an already-handshaken stream, returning its
/// bytes or `CasyncError::ChunkMissing` if the server replies `MISSING`.
pub async fn request_chunk<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, id: ChunkId) -> Result<Vec<u8>, CasyncError> {
    Message::Request { flags: 0, id }.write(stream).await?;

    match Message::read(stream).await? {
        Message::Chunk { id: reply_id, data, .. } if reply_id == id => Ok(data),
        Message::Chunk { .. } => Err(CasyncError::protocol("CHUNK reply id mismatch")),
        Message::Missing { id: reply_id, .. } if reply_id == id => Err(CasyncError::chunk_missing(id)),
        Message::Missing { .. } => Err(CasyncError::protocol("MISSING reply id mismatch")),
        other => Err(unexpected("CHUNK or MISSING", &other)),
    }
}

fn unexpected(expected: &str, got: &Message) -> CasyncError {
    CasyncError::protocol(format!("expected {expected}, got {got:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_hello_handshake() {
        let (mut client, mut server) = duplex(4096);
        let (client_caps, server_caps) = tokio::join!(client_handshake(&mut client), server_handshake(&mut server));
        assert!(client_caps.unwrap().contains(Capabilities::READABLE_STORE));
        assert!(server_caps.unwrap().contains(Capabilities::PULL_CHUNKS));
    }

    #[tokio::test]
    async fn request_chunk_returns_data_on_hit() {
        let (mut client, mut server) = duplex(4096);
        let id = ChunkId::compute(b"payload");

        let server_task = tokio::spawn(async move {
            match Message::read(&mut server).await.unwrap() {
                Message::Request { id: req_id, .. } => {
                    Message::Chunk {
                        flags: 0,
                        id: req_id,
                        data: b"payload".to_vec(),
                    }
                    .write(&mut server)
                    .await
                    .unwrap();
                }
                other => panic!("unexpected message: {other:?}"),
            }
        });

        let data = request_chunk(&mut client, id).await.unwrap();
        assert_eq!(data, b"payload");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn request_chunk_surfaces_missing_as_chunk_missing_error() {
        let (mut client, mut server) = duplex(4096);
        let id = ChunkId::compute(b"payload");

        let server_task = tokio::spawn(async move {
            match Message::read(&mut server).await.unwrap() {
                Message::Request { id: req_id, .. } => {
                    Message::Missing { flags: 0, id: req_id }.write(&mut server).await.unwrap();
                }
                other => panic!("unexpected message: {other:?}"),
            }
        });

        let err = request_chunk(&mut client, id).await.unwrap_err();
        assert!(err.is_missing());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn truncated_frame_fails_the_session() {
        let (mut client, mut server) = duplex(4096);
        // Declare a frame with a length that promises more bytes than follow.
        tokio::spawn(async move {
            server.write_all(&64u64.to_le_bytes()).await.unwrap();
            server.write_all(&(MessageType::Hello as u64).to_le_bytes()).await.unwrap();
            server.write_all(&[0u8; 4]).await.unwrap();
            drop(server);
        });

        let err = Message::read(&mut client).await.unwrap_err();
        assert!(matches!(err, CasyncError::ProtocolError(_)));
    }
}
