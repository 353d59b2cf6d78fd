//! Exchange error type for retry classification.

use crate::transport::TransportError;

/// Error returned by one session-creation or chunk exchange.
/// Kept separate from anyhow so the transfer can classify it and decide
/// whether to back off, resync its offset, or fail.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Transport failed before an HTTP status was available.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Server answered with a status we do not treat as progress.
    #[error("HTTP {code}: {body}")]
    Http { code: u32, body: String },
    /// Server acknowledged only part of the chunk (308 short of the chunk end).
    #[error("server holds {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },
    /// Server rejected the chunk as not matching its offset (409/416).
    #[error("offset conflict (HTTP {code})")]
    Conflict { code: u32, server_offset: Option<u64> },
    /// Response violates the resumable-upload protocol (missing Location,
    /// offset moving backwards or past the end of the file).
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Reading the chunk from the local file failed. Not retried.
    #[error("read source: {0}")]
    Source(#[source] std::io::Error),
}

impl ChunkError {
    /// Offset the server reported alongside the failure, if any. Used to
    /// resume from what the server actually holds.
    pub fn server_offset(&self) -> Option<u64> {
        match self {
            ChunkError::Incomplete { received, .. } => Some(*received),
            ChunkError::Conflict { server_offset, .. } => *server_offset,
            _ => None,
        }
    }
}
