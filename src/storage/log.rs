// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Framed document log.
//!
//! Each frame is `u32 LE payload length | blake3(payload) | CBOR payload`.
//! A frame is only trusted when its full length is present and its digest
//! matches. A crash can only tear the final frame, so a bad frame at the end
//! of the log is a torn tail to discard, while a bad frame followed by more
//! data is corruption.

use crate::core::types::DocumentRecord;
use crate::storage::backend::StorageError;
use serde::{Deserialize, Serialize};

const LEN_BYTES: usize = 4;
const DIGEST_BYTES: usize = 32;
pub const FRAME_HEADER_LEN: usize = LEN_BYTES + DIGEST_BYTES;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    Put(DocumentRecord),
    Delete { id: String },
}

pub fn encode_frame(entry: &LogEntry) -> Result<Vec<u8>, StorageError> {
    let payload =
        serde_cbor::to_vec(entry).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        StorageError::Serialization(format!("log entry of {} bytes is too large", payload.len()))
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(blake3::hash(&payload).as_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Result of scanning a log buffer.
#[derive(Debug, Default)]
pub struct DecodedLog {
    pub entries: Vec<LogEntry>,
    /// Byte length of the trusted prefix.
    pub valid_len: u64,
    /// Why the final frame was rejected, if it was.
    pub tail_error: Option<String>,
    /// A rejected frame with more data after it. Nothing past `valid_len`
    /// may be discarded when this is set.
    pub corruption: Option<String>,
}

pub fn decode_frames(data: &[u8]) -> DecodedLog {
    let mut decoded = DecodedLog::default();
    let mut offset = 0usize;

    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < FRAME_HEADER_LEN {
            decoded.tail_error = Some(format!("truncated frame header at offset {}", offset));
            break;
        }

        let mut len_bytes = [0u8; LEN_BYTES];
        len_bytes.copy_from_slice(&rest[..LEN_BYTES]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if rest.len() - FRAME_HEADER_LEN < len {
            decoded.tail_error = Some(format!("truncated frame payload at offset {}", offset));
            break;
        }

        let digest = &rest[LEN_BYTES..FRAME_HEADER_LEN];
        let payload = &rest[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len];
        let is_last = rest.len() == FRAME_HEADER_LEN + len;
        let rejection = if blake3::hash(payload).as_bytes() != digest {
            Some(format!("checksum mismatch at offset {}", offset))
        } else {
            match serde_cbor::from_slice::<LogEntry>(payload) {
                Ok(entry) => {
                    decoded.entries.push(entry);
                    None
                }
                Err(e) => Some(format!("undecodable frame at offset {}: {}", offset, e)),
            }
        };
        if let Some(reason) = rejection {
            if is_last {
                decoded.tail_error = Some(reason);
            } else {
                decoded.corruption = Some(reason);
            }
            break;
        }

        offset += FRAME_HEADER_LEN + len;
        decoded.valid_len = offset as u64;
    }

    decoded
}
