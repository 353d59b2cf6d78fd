//! Tests for pause, resume, cancel, remove, the bulk commands, and the
//! control socket they talk to.

use super::parse;
use crate::cli::control_socket::{self, SocketReply};
use crate::cli::CliCommand;
use resup_core::config::UploaderConfig;
use resup_core::control::ControlCommand;
use resup_core::source::{FileSource, MemoryFile};
use resup_core::transfer::UploadStatus;
use resup_core::transport::CurlTransport;
use resup_core::UploadManager;
use std::sync::Arc;

#[test]
fn cli_parse_pause() {
    match parse(&["resup", "pause", "abc"]) {
        CliCommand::Pause { id } => assert_eq!(id, "abc"),
        other => panic!("expected Pause, got {:?}", other),
    }
}

#[test]
fn cli_parse_bulk_commands() {
    assert!(matches!(parse(&["resup", "pause-all"]), CliCommand::PauseAll));
    assert!(matches!(parse(&["resup", "resume-all"]), CliCommand::ResumeAll));
    assert!(matches!(parse(&["resup", "cancel-all"]), CliCommand::CancelAll));
}

#[test]
fn cli_parse_completions_and_man() {
    assert!(matches!(
        parse(&["resup", "completions", "bash"]),
        CliCommand::Completions { .. }
    ));
    assert!(matches!(parse(&["resup", "man"]), CliCommand::Man));
}

#[test]
fn subcommands_map_to_control_commands() {
    let cases = [
        (
            vec!["resup", "pause", "a"],
            ControlCommand::Pause { upload_id: "a".into() },
        ),
        (vec!["resup", "resume", "a"], ControlCommand::upload("a")),
        (
            vec!["resup", "cancel", "a"],
            ControlCommand::Cancel { upload_id: "a".into() },
        ),
        (
            vec!["resup", "remove", "a"],
            ControlCommand::Remove { upload_id: "a".into() },
        ),
        (vec!["resup", "pause-all"], ControlCommand::PauseAll),
        (vec!["resup", "resume-all"], ControlCommand::UploadAll),
        (vec!["resup", "cancel-all"], ControlCommand::CancelAll),
    ];
    for (args, expected) in cases {
        assert_eq!(parse(&args).control_command(), Some(expected));
    }
    assert_eq!(parse(&["resup", "upload", "f"]).control_command(), None);
    assert_eq!(parse(&["resup", "man"]).control_command(), None);
}

#[test]
fn socket_reply_json_shape() {
    let ok = SocketReply {
        ok: true,
        error: None,
    };
    assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"ok":true}"#);
    let parsed: SocketReply =
        serde_json::from_str(r#"{"ok":false,"error":"no upload with id x"}"#).unwrap();
    assert!(!parsed.ok);
    assert_eq!(parsed.error.as_deref(), Some("no upload with id x"));
}

#[tokio::test]
async fn control_socket_applies_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");

    // Paused submission: nothing touches the network.
    let cfg = UploaderConfig {
        auto_upload: false,
        ..UploaderConfig::default()
    };
    let (manager, _states) = UploadManager::start(&cfg, Arc::new(CurlTransport::default()));
    let file: Arc<dyn FileSource> = Arc::new(MemoryFile::new("a.bin", b"abc".to_vec()));
    let ids = manager.submit(vec![file]).await.unwrap();
    let listener = control_socket::spawn_control_listener(manager.clone(), &path).unwrap();

    let reply = control_socket::send_command(
        &path,
        &ControlCommand::Pause {
            upload_id: ids[0].clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(
        reply,
        SocketReply {
            ok: true,
            error: None
        }
    );
    assert_eq!(
        manager.snapshot().await.unwrap()[0].status,
        UploadStatus::Paused
    );

    let reply = control_socket::send_command(
        &path,
        &ControlCommand::Cancel {
            upload_id: "missing".into(),
        },
    )
    .await
    .unwrap();
    assert!(!reply.ok);
    assert!(reply.error.unwrap().contains("missing"));

    listener.abort();
}

#[tokio::test]
async fn send_command_without_server_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.sock");
    let err = control_socket::send_command(&path, &ControlCommand::PauseAll)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no upload is running"));
}
