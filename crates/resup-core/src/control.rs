//! Control commands for the upload queue.
//!
//! Commands are plain data (`{"action": "pause", "uploadId": "..."}`) so they
//! can arrive over the control socket as JSON lines as easily as from code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-item overrides merged into a transfer's options by `upload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOptions {
    /// Target transfer when the command itself carries no `uploadId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Extra fields for the session-creation body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Queue control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlCommand {
    /// Cancel every transfer that is not complete.
    CancelAll,
    /// Pause every transfer that is not complete.
    PauseAll,
    /// Re-queue every pending, paused, errored or queued transfer.
    UploadAll,
    /// Configure one transfer (merging `item_options`) and queue it.
    Upload {
        #[serde(default, rename = "uploadId", skip_serializing_if = "Option::is_none")]
        upload_id: Option<String>,
        #[serde(default, rename = "itemOptions", skip_serializing_if = "Option::is_none")]
        item_options: Option<ItemOptions>,
    },
    Cancel {
        #[serde(rename = "uploadId")]
        upload_id: String,
    },
    Pause {
        #[serde(rename = "uploadId")]
        upload_id: String,
    },
    /// Abandon any in-flight exchange and evict the transfer from the queue.
    Remove {
        #[serde(rename = "uploadId")]
        upload_id: String,
    },
}

impl ControlCommand {
    /// Resume (re-queue) one transfer without changing its options.
    pub fn upload(upload_id: impl Into<String>) -> Self {
        ControlCommand::Upload {
            upload_id: Some(upload_id.into()),
            item_options: None,
        }
    }

    /// Identity an `upload` command targets: `uploadId`, falling back to
    /// `itemOptions.uploadId`.
    pub fn upload_target(
        upload_id: Option<&str>,
        item_options: Option<&ItemOptions>,
    ) -> Result<String, ControlError> {
        upload_id
            .or_else(|| item_options.and_then(|o| o.upload_id.as_deref()))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(ControlError::MissingUploadId)
    }
}

/// Failure of a control command. The queue is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("no upload with id {0}")]
    NotFound(String),
    #[error("upload command carries no uploadId")]
    MissingUploadId,
    #[error("upload {0} was cancelled and cannot be resumed")]
    Cancelled(String),
    #[error("upload manager has stopped")]
    Stopped,
}

/// Default path for the control socket (XDG state dir).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("resup")?;
    dirs.place_state_file("control.sock")
}
