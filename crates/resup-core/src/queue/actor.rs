//! The queue task: owns every transfer and serializes all state changes.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;

use crate::config::{UploadOptions, UploaderConfig};
use crate::control::{ControlCommand, ControlError};
use crate::retry::{ChunkError, RetryPolicy};
use crate::transfer::{
    Ack, Exchange, Readmit, Step, Transfer, TransferSnapshot, UploadState, UploadStatus,
};
use crate::transport::Transport;

use super::UploadItem;

pub(crate) enum Event {
    Submit {
        items: Vec<UploadItem>,
        reply: oneshot::Sender<Vec<String>>,
    },
    Control {
        command: ControlCommand,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<TransferSnapshot>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    /// Posted by a transfer's readmit capability.
    ProcessQueue,
    /// An exchange finished on the blocking pool.
    Exchanged {
        upload_id: String,
        epoch: u64,
        result: Result<Ack, ChunkError>,
    },
    /// A backoff delay elapsed.
    RetryDue { upload_id: String, epoch: u64 },
}

pub(crate) struct Queue {
    transfers: Vec<Transfer>,
    concurrency: usize,
    auto_upload: bool,
    options: UploadOptions,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    /// Weak so the task stops once every `UploadManager` is gone.
    events: WeakUnboundedSender<Event>,
    observer: UnboundedSender<UploadState>,
}

impl Queue {
    pub(crate) fn new(
        cfg: &UploaderConfig,
        transport: Arc<dyn Transport>,
        events: WeakUnboundedSender<Event>,
        observer: UnboundedSender<UploadState>,
    ) -> Self {
        Self {
            transfers: Vec::new(),
            concurrency: cfg.concurrency(),
            auto_upload: cfg.auto_upload,
            options: cfg.upload_options(),
            policy: RetryPolicy::from_config(cfg.retry.as_ref()),
            transport,
            events,
            observer,
        }
    }

    pub(crate) async fn run(mut self, mut inbox: UnboundedReceiver<Event>) {
        tracing::debug!(concurrency = self.concurrency, "upload queue started");
        let mut stopped = None;
        while let Some(event) = inbox.recv().await {
            if let ControlFlow::Break(reply) = self.handle(event) {
                stopped = Some(reply);
                break;
            }
        }
        for t in &mut self.transfers {
            t.abandon();
        }
        tracing::debug!(remaining = self.transfers.len(), "upload queue stopped");
        if let Some(reply) = stopped {
            let _ = reply.send(());
        }
    }

    /// Apply one event. Breaks with the reply channel on shutdown.
    fn handle(&mut self, event: Event) -> ControlFlow<oneshot::Sender<()>> {
        match event {
            Event::Submit { items, reply } => {
                let ids = self.submit(items);
                let _ = reply.send(ids);
            }
            Event::Control { command, reply } => {
                let result = self.control(command);
                match &result {
                    // A pause frees a slot without readmitting.
                    Ok(()) => self.process_queue(),
                    Err(e) => tracing::warn!("control command rejected: {}", e),
                }
                let _ = reply.send(result);
            }
            Event::Snapshot { reply } => {
                let _ = reply.send(self.transfers.iter().map(Transfer::snapshot).collect());
            }
            Event::Shutdown { reply } => return ControlFlow::Break(reply),
            Event::ProcessQueue => self.process_queue(),
            Event::Exchanged {
                upload_id,
                epoch,
                result,
            } => {
                let Some(t) = self.find(&upload_id) else {
                    tracing::debug!(upload_id = %upload_id, "result for removed upload dropped");
                    return ControlFlow::Continue(());
                };
                let step = t.apply(epoch, result);
                let freed = !t.occupies_slot();
                self.drive(upload_id, step);
                if freed {
                    self.process_queue();
                }
            }
            Event::RetryDue { upload_id, epoch } => {
                let exchange = self.find(&upload_id).and_then(|t| t.retry(epoch));
                if let Some(exchange) = exchange {
                    self.dispatch(exchange);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn submit(&mut self, items: Vec<UploadItem>) -> Vec<String> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let upload_id = match item.upload_id.filter(|id| !id.is_empty()) {
                Some(id) if !self.contains(&id) => id,
                Some(id) => {
                    let fresh = new_upload_id();
                    tracing::warn!(
                        requested = %id,
                        assigned = %fresh,
                        "upload id already in use; assigned a new one"
                    );
                    fresh
                }
                None => new_upload_id(),
            };
            tracing::info!(
                upload_id = %upload_id,
                name = %item.file.name(),
                size = item.file.size(),
                "file submitted"
            );
            let mut transfer = Transfer::new(
                upload_id.clone(),
                item.file,
                self.options.clone(),
                self.policy,
                self.observer.clone(),
                self.readmit(),
            );
            if self.auto_upload {
                // Fresh transfers are pending, never cancelled.
                let _ = transfer.configure(None);
            }
            self.transfers.push(transfer);
            ids.push(upload_id);
        }
        ids
    }

    fn control(&mut self, command: ControlCommand) -> Result<(), ControlError> {
        tracing::debug!(?command, "control command");
        match command {
            ControlCommand::CancelAll => {
                self.transfers.iter_mut().for_each(Transfer::cancel);
            }
            ControlCommand::PauseAll => {
                self.transfers.iter_mut().for_each(Transfer::pause);
            }
            ControlCommand::UploadAll => {
                for t in &mut self.transfers {
                    if matches!(
                        t.status(),
                        UploadStatus::Pending
                            | UploadStatus::Queue
                            | UploadStatus::Paused
                            | UploadStatus::Error
                    ) {
                        t.configure(None)?;
                    }
                }
            }
            ControlCommand::Upload {
                upload_id,
                item_options,
            } => {
                let id = ControlCommand::upload_target(upload_id.as_deref(), item_options.as_ref())?;
                self.find_or_err(&id)?.configure(item_options.as_ref())?;
            }
            ControlCommand::Cancel { upload_id } => self.find_or_err(&upload_id)?.cancel(),
            ControlCommand::Pause { upload_id } => self.find_or_err(&upload_id)?.pause(),
            ControlCommand::Remove { upload_id } => {
                let idx = self
                    .transfers
                    .iter()
                    .position(|t| t.upload_id() == upload_id)
                    .ok_or_else(|| ControlError::NotFound(upload_id.clone()))?;
                let mut removed = self.transfers.remove(idx);
                removed.abandon();
                tracing::info!(upload_id = %upload_id, status = %removed.status(), "upload removed");
            }
        }
        Ok(())
    }

    /// Evict complete transfers, then start the oldest queued ones until
    /// `concurrency` slots are taken. A paused or cancelled transfer whose
    /// exchange is still on the wire keeps its slot.
    fn process_queue(&mut self) {
        let before = self.transfers.len();
        self.transfers
            .retain(|t| t.status() != UploadStatus::Complete);
        let evicted = before - self.transfers.len();

        let running = self
            .transfers
            .iter()
            .filter(|t| t.occupies_slot())
            .count();
        let free = self.concurrency.saturating_sub(running);
        let admitted: Vec<Exchange> = self
            .transfers
            .iter_mut()
            .filter(|t| t.status() == UploadStatus::Queue)
            .take(free)
            .filter_map(Transfer::start)
            .collect();

        if evicted > 0 || !admitted.is_empty() {
            tracing::debug!(
                evicted,
                running,
                admitted = admitted.len(),
                "admission pass"
            );
        }
        for exchange in admitted {
            self.dispatch(exchange);
        }
    }

    fn drive(&mut self, upload_id: String, step: Step) {
        match step {
            Step::Send(exchange) => self.dispatch(exchange),
            Step::Backoff { delay, epoch } => self.schedule_retry(upload_id, delay, epoch),
            Step::Idle => {}
        }
    }

    /// Run the exchange on the blocking pool and post its result back.
    fn dispatch(&self, exchange: Exchange) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let upload_id = exchange.upload_id.clone();
        let epoch = exchange.epoch;
        tokio::spawn(async move {
            let result =
                match tokio::task::spawn_blocking(move || exchange.perform(transport.as_ref()))
                    .await
                {
                    Ok(result) => result,
                    Err(e) => Err(ChunkError::Protocol(format!("exchange task failed: {}", e))),
                };
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(Event::Exchanged {
                    upload_id,
                    epoch,
                    result,
                });
            }
        });
    }

    fn schedule_retry(&self, upload_id: String, delay: Duration, epoch: u64) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(Event::RetryDue { upload_id, epoch });
            }
        });
    }

    fn readmit(&self) -> Readmit {
        let events = self.events.clone();
        Readmit::new(move || {
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(Event::ProcessQueue);
            }
        })
    }

    fn contains(&self, upload_id: &str) -> bool {
        self.transfers.iter().any(|t| t.upload_id() == upload_id)
    }

    fn find(&mut self, upload_id: &str) -> Option<&mut Transfer> {
        self.transfers
            .iter_mut()
            .find(|t| t.upload_id() == upload_id)
    }

    fn find_or_err(&mut self, upload_id: &str) -> Result<&mut Transfer, ControlError> {
        self.find(upload_id)
            .ok_or_else(|| ControlError::NotFound(upload_id.to_string()))
    }
}

fn new_upload_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
