// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Binary Index Codec
//!
//! Encodes and decodes the `.caibx` index format: a
//! sequence of framed records, each `{length: u64, type: u64, payload}`
//! (length counts only the payload), in the order format-header,
//! chunker-params, chunk-table. Encoding and decoding must round-trip
//! byte-exact so two nodes building the same index from the same input
//! produce identical files.
//!
//! Chunk-table entries store a cumulative `end_offset_u64` plus the chunk's
//! id — not `(start, size)` — so each record is 40 bytes rather than 48.
//! `start`/`size` are derived on read by differencing consecutive
//! `end_offset` values against an implicit zero base, matching the one
//! prior chunk's end (or zero, for the first chunk).
//!
//! Both a synchronous (`std::io`) and an async (`tokio::io`) surface are
//! provided, matching the chunker's sync-core/async-adapter split.

use casync_domain::{CasyncError, ChunkId, ChunkerParams, Index, IndexChunk};
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAGIC: &[u8; 8] = b"CASYIDX\0";
const FORMAT_VERSION: u64 = 1;

const RECORD_TYPE_HEADER: u64 = 1;
const RECORD_TYPE_PARAMS: u64 = 2;
const RECORD_TYPE_CHUNK: u64 = 3;

/// Writes `index` to `out` in the `.caibx` binary format.
pub fn write_index<W: Write>(out: &mut W, index: &Index) -> Result<(), CasyncError> {
    write_record(out, RECORD_TYPE_HEADER, MAGIC.iter().chain(&FORMAT_VERSION.to_le_bytes()).copied().collect::<Vec<u8>>().as_slice())?;
    write_record(out, RECORD_TYPE_PARAMS, &encode_params(&index.params))?;
    for chunk in index.iter() {
        write_record(out, RECORD_TYPE_CHUNK, &encode_chunk(chunk))?;
    }
    Ok(())
}

/// Reads an `Index` previously written by [`write_index`].
pub fn read_index<R: Read>(input: &mut R) -> Result<Index, CasyncError> {
    let (_type, header_payload) = read_record(input)?.ok_or_else(|| CasyncError::invalid_index("empty index file"))?;
    decode_header(&header_payload)?;

    let (record_type, params_payload) =
        read_record(input)?.ok_or_else(|| CasyncError::invalid_index("missing chunker params record"))?;
    if record_type != RECORD_TYPE_PARAMS {
        return Err(CasyncError::invalid_index(format!(
            "expected params record, got type {record_type}"
        )));
    }
    let params = decode_params(&params_payload)?;

    let mut chunks = Vec::new();
    let mut previous_end = 0u64;
    while let Some((record_type, payload)) = read_record(input)? {
        if record_type != RECORD_TYPE_CHUNK {
            return Err(CasyncError::invalid_index(format!("unknown record type {record_type}")));
        }
        let chunk = decode_chunk(&payload, previous_end)?;
        previous_end = chunk.end();
        chunks.push(chunk);
    }

    Index::new(params, chunks)
}

/// Async counterpart of [`write_index`], for writing a `.caibx` over a
/// tokio file handle without blocking the runtime.
pub async fn write_index_async<W: AsyncWrite + Unpin>(out: &mut W, index: &Index) -> Result<(), CasyncError> {
    let mut buf = Vec::new();
    write_index(&mut buf, index)?;
    out.write_all(&buf).await.map_err(|e| CasyncError::Io(e.to_string()))?;
    Ok(())
}

/// Async counterpart of [`read_index`].
pub async fn read_index_async<R: AsyncRead + Unpin>(input: &mut R) -> Result<Index, CasyncError> {
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).await.map_err(|e| CasyncError::Io(e.to_string()))?;
    read_index(&mut std::io::Cursor::new(buf))
}

fn write_record<W: Write>(out: &mut W, record_type: u64, payload: &[u8]) -> Result<(), CasyncError> {
    out.write_all(&(payload.len() as u64).to_le_bytes())
        .and_then(|_| out.write_all(&record_type.to_le_bytes()))
        .and_then(|_| out.write_all(payload))
        .map_err(|e| CasyncError::Io(e.to_string()))
}

/// Reads one framed record, or `None` at a clean end-of-stream (no bytes
/// consumed before the length field). A length/type header present with a
/// truncated payload is `InvalidIndex`, not a clean EOF.
fn read_record<R: Read>(input: &mut R) -> Result<Option<(u64, Vec<u8>)>, CasyncError> {
    let mut len_buf = [0u8; 8];
    match read_exact_or_eof(input, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u64::from_le_bytes(len_buf) as usize;

    let mut type_buf = [0u8; 8];
    input
        .read_exact(&mut type_buf)
        .map_err(|_| CasyncError::invalid_index("truncated record: missing type field"))?;
    let record_type = u64::from_le_bytes(type_buf);

    let mut payload = vec![0u8; len];
    input
        .read_exact(&mut payload)
        .map_err(|_| CasyncError::invalid_index(format!("truncated record: expected {len} byte payload")))?;

    Ok(Some((record_type, payload)))
}

fn read_exact_or_eof<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<bool, CasyncError> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(CasyncError::invalid_index("truncated record: partial length field")),
            Ok(n) => filled += n,
            Err(e) => return Err(CasyncError::Io(e.to_string())),
        }
    }
    Ok(true)
}

fn decode_header(payload: &[u8]) -> Result<(), CasyncError> {
    if payload.len() != MAGIC.len() + 8 {
        return Err(CasyncError::invalid_index("malformed format header"));
    }
    if &payload[..MAGIC.len()] != MAGIC {
        return Err(CasyncError::invalid_index("bad magic bytes"));
    }
    let version = u64::from_le_bytes(payload[MAGIC.len()..].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(CasyncError::invalid_index(format!("unsupported format version {version}")));
    }
    Ok(())
}

fn encode_params(params: &ChunkerParams) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.extend_from_slice(&params.feature_flags.to_le_bytes());
    buf.extend_from_slice(&params.min_size.to_le_bytes());
    buf.extend_from_slice(&params.avg_size.to_le_bytes());
    buf.extend_from_slice(&params.max_size.to_le_bytes());
    buf
}

fn decode_params(payload: &[u8]) -> Result<ChunkerParams, CasyncError> {
    if payload.len() != 32 {
        return Err(CasyncError::invalid_index("malformed chunker params record"));
    }
    let feature_flags = u64::from_le_bytes(payload[0..8].try_into().unwrap());
    let min_size = u64::from_le_bytes(payload[8..16].try_into().unwrap());
    let avg_size = u64::from_le_bytes(payload[16..24].try_into().unwrap());
    let max_size = u64::from_le_bytes(payload[24..32].try_into().unwrap());
    ChunkerParams::new(feature_flags, min_size, avg_size, max_size)
}

fn encode_chunk(chunk: &IndexChunk) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + casync_domain::CHUNK_ID_LEN);
    buf.extend_from_slice(&chunk.end().to_le_bytes());
    buf.extend_from_slice(chunk.id.as_bytes());
    buf
}

/// Decodes a chunk-table record, deriving `start`/`size` from the record's
/// cumulative `end_offset` and the previous chunk's end (`0` for the first
/// chunk).
fn decode_chunk(payload: &[u8], previous_end: u64) -> Result<IndexChunk, CasyncError> {
    if payload.len() != 8 + casync_domain::CHUNK_ID_LEN {
        return Err(CasyncError::invalid_index("malformed chunk record"));
    }
    let end_offset = u64::from_le_bytes(payload[0..8].try_into().unwrap());
    if end_offset < previous_end {
        return Err(CasyncError::invalid_index(format!(
            "chunk end_offset {end_offset} precedes previous end {previous_end}"
        )));
    }
    let mut id_bytes = [0u8; casync_domain::CHUNK_ID_LEN];
    id_bytes.copy_from_slice(&payload[8..]);
    Ok(IndexChunk {
        start: previous_end,
        size: end_offset - previous_end,
        id: ChunkId::from_bytes(id_bytes),
    })
}
