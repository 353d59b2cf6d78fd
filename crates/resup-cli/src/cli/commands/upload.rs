//! `resup upload <FILES>...` – submit files, print progress, and serve the
//! control socket until every upload has finished, failed or been cancelled.

use anyhow::{bail, Result};
use clap::Args;
use resup_core::config::UploaderConfig;
use resup_core::control::{default_control_socket_path, ControlCommand};
use resup_core::source::{FileSource, LocalFile};
use resup_core::transfer::{UploadState, UploadStatus};
use resup_core::transport::CurlTransport;
use resup_core::UploadManager;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::control_socket;

const PROGRESS_INTERVAL_MS: u64 = 500;

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Files to upload.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Upload endpoint (overrides `url` in config.toml).
    #[arg(long)]
    pub url: Option<String>,

    /// Origin a relative endpoint is resolved against.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// HTTP method used to create the upload session.
    #[arg(long)]
    pub method: Option<String>,

    /// Chunk size in bytes; 0 sends each file in a single request.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Maximum number of files uploading at once.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Bearer token sent as `Authorization`.
    #[arg(long)]
    pub token: Option<String>,

    /// Extra request header as `NAME:VALUE`. May be repeated.
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Submit without starting; start later with `resup resume-all`.
    #[arg(long)]
    pub paused: bool,

    /// Also send the token to session URIs on other origins.
    #[arg(long)]
    pub with_credentials: bool,
}

impl UploadArgs {
    /// Layer the flags over the config file values.
    pub fn apply(&self, cfg: &mut UploaderConfig) -> Result<()> {
        if let Some(url) = &self.url {
            cfg.url = url.clone();
        }
        if let Some(base_url) = &self.base_url {
            cfg.base_url = Some(base_url.clone());
        }
        if let Some(method) = &self.method {
            cfg.method = method.to_ascii_uppercase();
        }
        if let Some(chunk_size) = self.chunk_size {
            cfg.chunk_size = chunk_size;
        }
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency;
        }
        if let Some(token) = &self.token {
            cfg.token = Some(token.clone());
        }
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            cfg.headers.insert(name, value);
        }
        if self.paused {
            cfg.auto_upload = false;
        }
        if self.with_credentials {
            cfg.with_credentials = true;
        }
        Ok(())
    }
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header {:?} is not in NAME:VALUE form", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header {:?} has an empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub async fn run_upload(mut cfg: UploaderConfig, args: UploadArgs) -> Result<()> {
    args.apply(&mut cfg)?;

    let mut files: Vec<Arc<dyn FileSource>> = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(Arc::new(LocalFile::open(path)?));
    }

    let transport = Arc::new(CurlTransport::from_config(&cfg));
    let (manager, mut states) = UploadManager::start(&cfg, transport);

    let socket_path = default_control_socket_path().ok();
    if let Some(path) = &socket_path {
        match control_socket::spawn_control_listener(manager.clone(), path) {
            Ok(_) => tracing::debug!(path = %path.display(), "control socket listening"),
            Err(e) => tracing::warn!("control socket unavailable: {:#}", e),
        }
    }

    let ids = manager.submit(files).await?;
    for (id, path) in ids.iter().zip(&args.files) {
        println!("{}  {}", id, path.display());
    }
    if !cfg.auto_upload {
        println!(
            "{} upload(s) pending; start them with `resup resume-all`",
            ids.len()
        );
    }

    let mut latest: HashMap<String, UploadStatus> = HashMap::new();
    let mut printer = ProgressPrinter::default();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            rec = states.recv() => {
                let Some(rec) = rec else { break };
                printer.print(&rec);
                let changed = latest.insert(rec.upload_id.clone(), rec.status) != Some(rec.status);
                if changed && all_settled(&manager).await? {
                    break;
                }
            }
            _ = tick.tick() => {
                if all_settled(&manager).await? {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                println!("Interrupted; pausing uploads");
                let _ = manager.control(ControlCommand::PauseAll).await;
                break;
            }
        }
    }

    let _ = manager.shutdown().await;
    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }

    let count = |status: UploadStatus| ids.iter().filter(|id| latest.get(*id) == Some(&status)).count();
    let (complete, failed, cancelled) = (
        count(UploadStatus::Complete),
        count(UploadStatus::Error),
        count(UploadStatus::Cancelled),
    );
    tracing::info!(complete, failed, cancelled, "upload run finished");
    println!(
        "{} complete, {} failed, {} cancelled",
        complete, failed, cancelled
    );
    if failed > 0 {
        bail!("{} of {} upload(s) failed", failed, ids.len());
    }
    Ok(())
}

/// True once nothing is left that could still make progress: complete
/// uploads have left the queue and the rest are failed or cancelled.
async fn all_settled(manager: &UploadManager) -> Result<bool> {
    let snapshot = manager.snapshot().await?;
    Ok(snapshot
        .iter()
        .all(|t| matches!(t.status, UploadStatus::Error | UploadStatus::Cancelled)))
}

/// Prints one line per record: always on a status change, otherwise at most
/// every `PROGRESS_INTERVAL_MS` per upload.
#[derive(Default)]
struct ProgressPrinter {
    last: HashMap<String, (Instant, UploadStatus)>,
}

impl ProgressPrinter {
    fn print(&mut self, rec: &UploadState) {
        let now = Instant::now();
        let due = match self.last.get(&rec.upload_id) {
            Some((at, status)) => {
                *status != rec.status
                    || now.duration_since(*at).as_millis() as u64 >= PROGRESS_INTERVAL_MS
            }
            None => true,
        };
        if due {
            println!("{}", format_record(rec));
            self.last.insert(rec.upload_id.clone(), (now, rec.status));
        }
    }
}

fn format_record(rec: &UploadState) -> String {
    let done_mib = rec.offset as f64 / 1_048_576.0;
    let total_mib = rec.size as f64 / 1_048_576.0;
    let rate_mib = rec.speed / 1_048_576.0;
    let eta = rec
        .remaining
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    let mut line = format!(
        "{}  {:<9}  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  {}",
        rec.upload_id,
        rec.status.as_str(),
        done_mib,
        total_mib,
        rec.progress,
        rate_mib,
        eta,
        rec.name
    );
    if rec.status == UploadStatus::Error {
        if let Some(reason) = &rec.response {
            line.push_str("  error: ");
            line.push_str(reason);
        }
    }
    line
}
