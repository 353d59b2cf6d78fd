//! Control socket: server (during `resup upload`) and client (for `resup pause` etc.).
//! Protocol: one JSON `ControlCommand` per line, answered by one JSON `SocketReply` line.

use anyhow::{bail, Context, Result};
use resup_core::control::{ControlCommand, ControlError};
use resup_core::UploadManager;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Answer to one command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SocketReply {
    fn from_result(result: Result<(), ControlError>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(e) => Self::rejected(e.to_string()),
        }
    }

    fn rejected(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}

/// Binds `path` (replacing a stale socket) and spawns a task that applies
/// each command line to `manager` and writes back its reply.
pub fn spawn_control_listener(
    manager: UploadManager,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(manager, stream).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_connection(manager: UploadManager, stream: UnixStream) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<ControlCommand>(line) {
            Ok(command) => SocketReply::from_result(manager.control(command).await),
            Err(e) => {
                tracing::warn!("malformed control line {:?}: {}", line, e);
                SocketReply::rejected(format!("invalid command: {}", e))
            }
        };
        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        write.write_all(&out).await?;
    }
    Ok(())
}

/// Sends one command to a running `resup upload` and waits for its reply.
pub async fn send_command(socket_path: &Path, command: &ControlCommand) -> Result<SocketReply> {
    if !socket_path.exists() {
        bail!(
            "no upload is running (control socket {} not found)",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();

    let mut msg = serde_json::to_vec(command)?;
    msg.push(b'\n');
    write.write_all(&msg).await?;

    let Some(line) = BufReader::new(read).lines().next_line().await? else {
        bail!("control socket closed without a reply");
    };
    serde_json::from_str(&line).context("parse control reply")
}
