//! One HTTP exchange of a transfer, executed off the queue task.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::UploadOptions;
use crate::protocol::{self, ChunkAck};
use crate::retry::ChunkError;
use crate::source::FileSource;
use crate::transport::{AbortToken, Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Open the upload session.
    CreateSession,
    /// Send `[start, end)`; an empty range asks the server to finalize.
    Chunk {
        session_uri: String,
        start: u64,
        end: u64,
    },
}

/// Outcome of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Session(String),
    Chunk(ChunkAck),
}

/// Everything needed to run one exchange without touching the transfer.
/// Tagged with the transfer's epoch so a late result can be recognised.
pub struct Exchange {
    pub upload_id: String,
    pub epoch: u64,
    pub kind: ExchangeKind,
    pub(crate) options: UploadOptions,
    pub(crate) file: Arc<dyn FileSource>,
    pub(crate) abort: AbortToken,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("upload_id", &self.upload_id)
            .field("epoch", &self.epoch)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Exchange {
    /// Build the request, read the chunk, send it, and interpret the
    /// response. Blocking; run on the blocking pool.
    pub fn perform(self, transport: &dyn Transport) -> Result<Ack, ChunkError> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(TransportError::Aborted.into());
        }
        match &self.kind {
            ExchangeKind::CreateSession => {
                let endpoint = protocol::resolve_endpoint(&self.options)?;
                let request = protocol::create_session_request(&self.options, self.file.as_ref())?;
                tracing::debug!(upload_id = %self.upload_id, url = %request.url, "creating session");
                let response = transport.execute(&request, &self.abort)?;
                protocol::session_from_response(&response, &endpoint).map(Ack::Session)
            }
            ExchangeKind::Chunk {
                session_uri,
                start,
                end,
            } => {
                let request = protocol::chunk_request(
                    &self.options,
                    session_uri,
                    self.file.as_ref(),
                    *start,
                    *end,
                )?;
                tracing::debug!(
                    upload_id = %self.upload_id,
                    start = *start,
                    end = *end,
                    "sending chunk"
                );
                let response = transport.execute(&request, &self.abort)?;
                protocol::chunk_ack(&response, *start, *end, self.file.size()).map(Ack::Chunk)
            }
        }
    }
}
