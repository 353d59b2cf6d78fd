//! CLI command handlers. Each command is in its own file.

mod completions;
mod control;
mod man;
mod upload;

pub use completions::run_completions;
pub use control::run_control;
pub use man::run_man;
pub use upload::{run_upload, UploadArgs};
