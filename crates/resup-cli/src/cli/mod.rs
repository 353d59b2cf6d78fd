//! CLI for the resup upload manager.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resup_core::config;
use resup_core::control::ControlCommand;

use commands::{run_completions, run_control, run_man, run_upload, UploadArgs};

/// Top-level CLI for the resup upload manager.
#[derive(Debug, Parser)]
#[command(name = "resup")]
#[command(about = "resup: resumable chunked upload manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload files and stay in the foreground until they finish.
    Upload(UploadArgs),

    /// Pause an upload by its ID.
    Pause {
        /// Upload identifier (printed by `resup upload`).
        id: String,
    },

    /// Resume a paused or failed upload by its ID.
    Resume {
        /// Upload identifier.
        id: String,
    },

    /// Cancel an upload by its ID. Cancelled uploads cannot be resumed.
    Cancel {
        /// Upload identifier.
        id: String,
    },

    /// Abort an upload and drop it from the queue.
    Remove {
        /// Upload identifier.
        id: String,
    },

    /// Pause every upload that is not complete.
    PauseAll,

    /// Queue every pending, paused or failed upload.
    ResumeAll,

    /// Cancel every upload that is not complete.
    CancelAll,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print the man page to stdout.
    Man,
}

impl CliCommand {
    /// The control command a socket client subcommand sends, if any.
    pub fn control_command(&self) -> Option<ControlCommand> {
        let cmd = match self {
            CliCommand::Pause { id } => ControlCommand::Pause {
                upload_id: id.clone(),
            },
            CliCommand::Resume { id } => ControlCommand::upload(id.clone()),
            CliCommand::Cancel { id } => ControlCommand::Cancel {
                upload_id: id.clone(),
            },
            CliCommand::Remove { id } => ControlCommand::Remove {
                upload_id: id.clone(),
            },
            CliCommand::PauseAll => ControlCommand::PauseAll,
            CliCommand::ResumeAll => ControlCommand::UploadAll,
            CliCommand::CancelAll => ControlCommand::CancelAll,
            CliCommand::Upload(_) | CliCommand::Completions { .. } | CliCommand::Man => {
                return None
            }
        };
        Some(cmd)
    }

    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let Some(command) = cli.command.control_command() {
            return run_control(command).await;
        }
        match cli.command {
            CliCommand::Upload(args) => {
                let cfg = config::load_or_init()?;
                tracing::debug!(
                    url = %cfg.url,
                    chunk_size = cfg.chunk_size,
                    concurrency = cfg.concurrency,
                    "loaded config"
                );
                run_upload(cfg, args).await?;
            }
            CliCommand::Completions { shell } => run_completions(shell)?,
            CliCommand::Man => run_man()?,
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
