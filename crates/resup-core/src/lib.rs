pub mod config;
pub mod logging;

// Upload engine
pub mod control;
pub mod progress;
pub mod protocol;
pub mod queue;
pub mod retry;
pub mod source;
pub mod transfer;
pub mod transport;

pub use queue::{UploadItem, UploadManager};
