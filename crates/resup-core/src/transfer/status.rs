//! Transfer status and the records sent to observers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Submitted but not configured (auto-upload off).
    Pending,
    /// Waiting for a concurrency slot.
    Queue,
    Uploading,
    Paused,
    /// Failed; resumable by an explicit upload command.
    Error,
    /// Absorbing: no command or response moves it elsewhere.
    Cancelled,
    Complete,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Queue => "queue",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Paused => "paused",
            UploadStatus::Error => "error",
            UploadStatus::Cancelled => "cancelled",
            UploadStatus::Complete => "complete",
        }
    }

    /// Entering this state frees or requests a slot, so the queue must
    /// re-run admission.
    pub(crate) fn readmits(self) -> bool {
        match self {
            UploadStatus::Queue
            | UploadStatus::Complete
            | UploadStatus::Error
            | UploadStatus::Cancelled => true,
            UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Paused => false,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record emitted to the observer on every status change and progress step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadState {
    pub upload_id: String,
    pub name: String,
    pub status: UploadStatus,
    /// Bytes acknowledged by the server.
    pub offset: u64,
    pub size: u64,
    /// Percent complete.
    pub progress: f64,
    /// Bytes per second over the current run.
    pub speed: f64,
    /// Estimated seconds remaining, when a rate is known.
    pub remaining: Option<f64>,
    pub session_uri: Option<String>,
    /// Final response body, or the error that stopped the transfer.
    pub response: Option<String>,
}

/// Point-in-time view of a transfer held by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSnapshot {
    pub upload_id: String,
    pub name: String,
    pub status: UploadStatus,
    pub offset: u64,
    pub size: u64,
    pub session_uri: Option<String>,
    pub retry_count: u32,
}
