//! `resup pause|resume|cancel|remove <id>` and the bulk variants – forward
//! the command to the running `resup upload` over its control socket.

use anyhow::{bail, Result};
use resup_core::control::{default_control_socket_path, ControlCommand};

use crate::cli::control_socket;

pub async fn run_control(command: ControlCommand) -> Result<()> {
    let path = default_control_socket_path()?;
    let reply = control_socket::send_command(&path, &command).await?;
    if !reply.ok {
        bail!(reply
            .error
            .unwrap_or_else(|| "command rejected".to_string()));
    }
    println!("{}", describe(&command));
    Ok(())
}

/// Confirmation line printed after a command is accepted.
fn describe(command: &ControlCommand) -> String {
    match command {
        ControlCommand::CancelAll => "Cancelled all uploads".to_string(),
        ControlCommand::PauseAll => "Paused all uploads".to_string(),
        ControlCommand::UploadAll => "Resumed all uploads".to_string(),
        ControlCommand::Upload { upload_id, item_options } => {
            let id = upload_id
                .as_deref()
                .or_else(|| item_options.as_ref().and_then(|o| o.upload_id.as_deref()))
                .unwrap_or("?");
            format!("Resumed upload {}", id)
        }
        ControlCommand::Cancel { upload_id } => format!("Cancelled upload {}", upload_id),
        ControlCommand::Pause { upload_id } => format!("Paused upload {}", upload_id),
        ControlCommand::Remove { upload_id } => format!("Removed upload {}", upload_id),
    }
}
