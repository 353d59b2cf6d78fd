//! Per-file resumable upload state machine.
//!
//! A `Transfer` owns a file's session URI, acknowledged offset and retry
//! bookkeeping. It never performs I/O itself: `start`, `apply` and `retry`
//! hand back the next `Exchange` (or a backoff) and the queue runs it. Every
//! exchange carries the transfer's epoch; pausing or cancelling bumps the
//! epoch so a response that arrives afterwards is discarded.
//!
//! At most one exchange per transfer is on the wire. An abandoned exchange
//! keeps its slot until its result comes back; a resume in the meantime
//! holds the next send until then.

mod exchange;
mod status;

pub use exchange::{Ack, Exchange, ExchangeKind};
pub use status::{TransferSnapshot, UploadState, UploadStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::UploadOptions;
use crate::control::{ControlError, ItemOptions};
use crate::progress::RunClock;
use crate::protocol::{self, ChunkAck};
use crate::retry::{self, ChunkError, RetryDecision, RetryPolicy};
use crate::source::FileSource;
use crate::transport::AbortToken;

/// Capability handed to each transfer at construction: invoked whenever the
/// transfer enters `queue`, `complete`, `error` or `cancelled` so its owner can
/// re-run admission.
#[derive(Clone)]
pub struct Readmit(Arc<dyn Fn() + Send + Sync>);

impl Readmit {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn notify(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Readmit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Readmit")
    }
}

/// What the owner should do after driving the transfer.
#[derive(Debug)]
pub enum Step {
    /// Run this exchange now.
    Send(Exchange),
    /// Call `retry(epoch)` after `delay`.
    Backoff { delay: Duration, epoch: u64 },
    /// Nothing in flight.
    Idle,
}

pub struct Transfer {
    upload_id: String,
    file: Arc<dyn FileSource>,
    status: UploadStatus,
    session_uri: Option<String>,
    offset: u64,
    options: UploadOptions,
    policy: RetryPolicy,
    retry_count: u32,
    epoch: u64,
    /// An exchange has been handed out and its result not yet applied.
    in_flight: bool,
    /// Send the next exchange as soon as the in-flight one reports back.
    deferred: bool,
    abort: Option<AbortToken>,
    response: Option<String>,
    clock: RunClock,
    observer: UnboundedSender<UploadState>,
    readmit: Readmit,
}

impl Transfer {
    /// New transfer in `pending`. Emits its first record.
    pub fn new(
        upload_id: String,
        file: Arc<dyn FileSource>,
        options: UploadOptions,
        policy: RetryPolicy,
        observer: UnboundedSender<UploadState>,
        readmit: Readmit,
    ) -> Self {
        let t = Self {
            upload_id,
            file,
            status: UploadStatus::Pending,
            session_uri: None,
            offset: 0,
            options,
            policy,
            retry_count: 0,
            epoch: 0,
            in_flight: false,
            deferred: false,
            abort: None,
            response: None,
            clock: RunClock::start(0),
            observer,
            readmit,
        };
        t.emit();
        t
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn session_uri(&self) -> Option<&str> {
        self.session_uri.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Counts against concurrency: uploading, or an abandoned exchange
    /// still on the wire.
    pub fn occupies_slot(&self) -> bool {
        self.status == UploadStatus::Uploading || self.in_flight
    }

    /// Merge per-item options and make the transfer eligible for admission.
    /// No-op while uploading or once complete; cancelled transfers refuse.
    pub fn configure(&mut self, item: Option<&ItemOptions>) -> Result<(), ControlError> {
        match self.status {
            UploadStatus::Cancelled => Err(ControlError::Cancelled(self.upload_id.clone())),
            UploadStatus::Uploading | UploadStatus::Complete => Ok(()),
            UploadStatus::Pending
            | UploadStatus::Queue
            | UploadStatus::Paused
            | UploadStatus::Error => {
                if let Some(item) = item {
                    self.options.merge(item);
                }
                self.set_status(UploadStatus::Queue);
                Ok(())
            }
        }
    }

    /// Admission: `queue → uploading`. Returns the first exchange of the run,
    /// or `None` while an abandoned exchange has yet to report back; the
    /// send then comes out of `apply`.
    pub fn start(&mut self) -> Option<Exchange> {
        if self.status != UploadStatus::Queue {
            return None;
        }
        self.epoch += 1;
        self.retry_count = 0;
        self.response = None;
        self.clock = RunClock::start(self.offset);
        self.set_status(UploadStatus::Uploading);
        tracing::debug!(
            upload_id = %self.upload_id,
            offset = self.offset,
            size = self.size(),
            "upload admitted"
        );
        self.send_or_defer()
    }

    /// Stop without losing offset or session. Resuming re-sends from `offset`.
    pub fn pause(&mut self) {
        match self.status {
            UploadStatus::Paused | UploadStatus::Cancelled | UploadStatus::Complete => {}
            UploadStatus::Pending
            | UploadStatus::Queue
            | UploadStatus::Uploading
            | UploadStatus::Error => {
                self.abandon();
                self.set_status(UploadStatus::Paused);
            }
        }
    }

    pub fn cancel(&mut self) {
        match self.status {
            UploadStatus::Cancelled | UploadStatus::Complete => {}
            UploadStatus::Pending
            | UploadStatus::Queue
            | UploadStatus::Uploading
            | UploadStatus::Paused
            | UploadStatus::Error => {
                self.abandon();
                self.set_status(UploadStatus::Cancelled);
            }
        }
    }

    /// Drop whatever is in flight: raise its abort token and move to a new
    /// epoch so its result is ignored.
    pub fn abandon(&mut self) {
        if let Some(token) = self.abort.take() {
            token.store(true, Ordering::Relaxed);
        }
        self.deferred = false;
        self.epoch += 1;
    }

    /// Apply the result of the exchange tagged `epoch`.
    pub fn apply(&mut self, epoch: u64, result: Result<Ack, ChunkError>) -> Step {
        self.in_flight = false;
        if epoch != self.epoch || self.status != UploadStatus::Uploading {
            tracing::debug!(
                upload_id = %self.upload_id,
                epoch,
                status = %self.status,
                "discarding stale exchange result"
            );
            if self.deferred && self.status == UploadStatus::Uploading {
                self.deferred = false;
                return Step::Send(self.next_exchange());
            }
            return Step::Idle;
        }
        self.abort = None;

        match result {
            Ok(Ack::Session(uri)) => {
                if self.session_uri.is_none() {
                    tracing::debug!(upload_id = %self.upload_id, session = %uri, "session created");
                    self.session_uri = Some(uri);
                }
                self.retry_count = 0;
                self.emit();
                Step::Send(self.next_exchange())
            }
            Ok(Ack::Chunk(ChunkAck::Advanced(acked))) => {
                self.offset = acked.clamp(self.offset, self.size());
                self.retry_count = 0;
                self.emit();
                Step::Send(self.next_exchange())
            }
            Ok(Ack::Chunk(ChunkAck::Complete(body))) => {
                self.offset = self.size();
                self.retry_count = 0;
                self.response = Some(body).filter(|b| !b.is_empty());
                tracing::info!(upload_id = %self.upload_id, size = self.size(), "upload complete");
                self.set_status(UploadStatus::Complete);
                Step::Idle
            }
            Err(e) => self.on_failure(e),
        }
    }

    /// Backoff elapsed: resend from the current offset unless the run moved on.
    pub fn retry(&mut self, epoch: u64) -> Option<Exchange> {
        if epoch != self.epoch || self.status != UploadStatus::Uploading {
            return None;
        }
        self.send_or_defer()
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            upload_id: self.upload_id.clone(),
            name: self.file.name().to_string(),
            status: self.status,
            offset: self.offset,
            size: self.size(),
            session_uri: self.session_uri.clone(),
            retry_count: self.retry_count,
        }
    }

    pub fn state(&self) -> UploadState {
        let stats = self.clock.stats(self.offset, self.size());
        UploadState {
            upload_id: self.upload_id.clone(),
            name: self.file.name().to_string(),
            status: self.status,
            offset: self.offset,
            size: self.size(),
            progress: if self.status == UploadStatus::Complete {
                100.0
            } else {
                stats.percent()
            },
            speed: stats.bytes_per_sec(),
            remaining: stats.eta_secs(),
            session_uri: self.session_uri.clone(),
            response: self.response.clone(),
        }
    }

    fn on_failure(&mut self, e: ChunkError) -> Step {
        if let Some(server) = e.server_offset() {
            if server > self.offset && server <= self.size() {
                // Progress made: only attempts that gain nothing use up the budget.
                self.offset = server;
                self.retry_count = 0;
                self.emit();
            }
        }
        self.retry_count += 1;
        match self.policy.decide(self.retry_count, retry::classify(&e)) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    upload_id = %self.upload_id,
                    attempt = self.retry_count,
                    offset = self.offset,
                    "exchange failed: {}; retrying in {:?}",
                    e,
                    delay
                );
                Step::Backoff {
                    delay,
                    epoch: self.epoch,
                }
            }
            RetryDecision::NoRetry => {
                tracing::warn!(
                    upload_id = %self.upload_id,
                    attempts = self.retry_count,
                    "upload failed: {}",
                    e
                );
                self.response = Some(e.to_string());
                self.set_status(UploadStatus::Error);
                Step::Idle
            }
        }
    }

    fn send_or_defer(&mut self) -> Option<Exchange> {
        if self.in_flight {
            tracing::debug!(
                upload_id = %self.upload_id,
                "waiting for abandoned exchange before sending"
            );
            self.deferred = true;
            return None;
        }
        Some(self.next_exchange())
    }

    fn next_exchange(&mut self) -> Exchange {
        let abort: AbortToken = Arc::new(AtomicBool::new(false));
        self.abort = Some(Arc::clone(&abort));
        self.in_flight = true;
        let kind = match &self.session_uri {
            None => ExchangeKind::CreateSession,
            Some(uri) => ExchangeKind::Chunk {
                session_uri: uri.clone(),
                start: self.offset,
                end: protocol::chunk_end(self.offset, self.options.chunk_size, self.size()),
            },
        };
        Exchange {
            upload_id: self.upload_id.clone(),
            epoch: self.epoch,
            kind,
            options: self.options.clone(),
            file: Arc::clone(&self.file),
            abort,
        }
    }

    fn set_status(&mut self, status: UploadStatus) {
        self.status = status;
        self.emit();
        if status.readmits() {
            self.readmit.notify();
        }
    }

    fn emit(&self) {
        // A closed observer only means nobody is listening.
        let _ = self.observer.send(self.state());
    }
}
