//! Upload queue manager.
//!
//! Keeps up to `concurrency` transfers uploading at once; when one finishes,
//! fails, is cancelled or a new one is queued, admission runs again and the
//! oldest queued transfer is started. The queue lives in a single tokio task;
//! `UploadManager` is a cheap handle that talks to it over a channel.

mod actor;

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::config::UploaderConfig;
use crate::control::{ControlCommand, ControlError};
use crate::source::FileSource;
use crate::transfer::{TransferSnapshot, UploadState};
use crate::transport::Transport;

use actor::{Event, Queue};

/// One file to submit, optionally with a caller-chosen upload id.
#[derive(Clone)]
pub struct UploadItem {
    pub file: Arc<dyn FileSource>,
    pub upload_id: Option<String>,
}

impl UploadItem {
    pub fn new(file: Arc<dyn FileSource>) -> Self {
        Self {
            file,
            upload_id: None,
        }
    }

    pub fn with_id(mut self, upload_id: impl Into<String>) -> Self {
        self.upload_id = Some(upload_id.into());
        self
    }
}

/// Handle to a running upload queue. Clones share the same queue; the queue
/// stops once every handle is dropped or `shutdown` is called.
#[derive(Clone)]
pub struct UploadManager {
    events: UnboundedSender<Event>,
}

impl UploadManager {
    /// Spawn the queue task on the current tokio runtime. Returns the handle
    /// and the observer sink that receives every `UploadState` record.
    pub fn start(
        cfg: &UploaderConfig,
        transport: Arc<dyn Transport>,
    ) -> (Self, UnboundedReceiver<UploadState>) {
        let (events, inbox) = mpsc::unbounded_channel();
        let (observer, states) = mpsc::unbounded_channel();
        let queue = Queue::new(cfg, transport, events.downgrade(), observer);
        tokio::spawn(queue.run(inbox));
        (Self { events }, states)
    }

    /// Add files to the queue. Returns their upload ids in submission order.
    pub async fn submit(
        &self,
        files: Vec<Arc<dyn FileSource>>,
    ) -> Result<Vec<String>, ControlError> {
        self.submit_items(files.into_iter().map(UploadItem::new).collect())
            .await
    }

    pub async fn submit_items(&self, items: Vec<UploadItem>) -> Result<Vec<String>, ControlError> {
        self.request(|reply| Event::Submit { items, reply }).await
    }

    /// Apply one control command.
    pub async fn control(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.request(|reply| Event::Control { command, reply })
            .await?
    }

    /// Apply commands in order; one result per command. A rejected command
    /// does not stop the rest.
    pub async fn control_batch(
        &self,
        commands: Vec<ControlCommand>,
    ) -> Vec<Result<(), ControlError>> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(self.control(command).await);
        }
        results
    }

    /// Transfers currently held by the queue, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<TransferSnapshot>, ControlError> {
        self.request(|reply| Event::Snapshot { reply }).await
    }

    /// Abort in-flight exchanges and stop the queue task.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.request(|reply| Event::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Event,
    ) -> Result<T, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(make(tx))
            .map_err(|_| ControlError::Stopped)?;
        rx.await.map_err(|_| ControlError::Stopped)
    }
}
