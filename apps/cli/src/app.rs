//! Command implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use roomdrop_client::{UploadEvent, UploadOrchestrator};
use roomdrop_http::HttpTransport;
use roomdrop_ledger::{JsonFileStore, ResumeLedger};
use roomdrop_protocol::UploadTarget;
use roomdrop_transfer::FileSource;

use crate::config::Config;

/// Options of the `upload` command that override the config file.
#[derive(Debug, Default)]
pub struct UploadOptions {
    pub container: Option<String>,
    pub mime: Option<String>,
    pub server: Option<String>,
}

fn open_ledger(config: &Config) -> anyhow::Result<ResumeLedger> {
    let path = config.ledger_file()?;
    let store = JsonFileStore::open(path.clone())
        .with_context(|| format!("opening ledger {}", path.display()))?;
    Ok(ResumeLedger::new(Arc::new(store)))
}

fn container_for(config: &Config, container: Option<String>) -> anyhow::Result<String> {
    let container = container.unwrap_or_else(|| config.container_id.clone());
    if container.trim().is_empty() {
        anyhow::bail!("no container given; pass --container or set container_id in the config");
    }
    Ok(container)
}

/// Uploads `file`, resuming a previous attempt when the ledger knows it.
pub async fn upload(config: &Config, file: &Path, opts: UploadOptions) -> anyhow::Result<()> {
    let container = container_for(config, opts.container)?;
    let target = target_for_file(file, container, opts.mime)?;
    let server_url = opts.server.as_deref().unwrap_or(&config.server_url);

    let transport = HttpTransport::new(server_url)?;
    let orchestrator =
        UploadOrchestrator::new(Arc::new(transport), open_ledger(config)?, config.client_config());
    let source = FileSource::open(file).with_context(|| format!("opening {}", file.display()))?;

    tracing::info!(file = %file.display(), server = %server_url, size = target.size_bytes, "uploading");
    let mut handle = orchestrator.start(target, Arc::new(source));

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping upload (it can be resumed later)");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            UploadEvent::Progress {
                bytes_sent,
                total_bytes,
                bytes_per_second,
                ..
            } => eprintln!("{}", progress_line(bytes_sent, total_bytes, bytes_per_second)),
            UploadEvent::Retrying {
                attempt,
                next_retry_secs,
                reason,
                ..
            } => eprintln!("retry {attempt} in {next_retry_secs:.1}s: {reason}"),
            UploadEvent::StateChanged { state, .. } => tracing::debug!(?state, "state"),
            UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => {}
        }
    }

    match handle.wait().await {
        Ok(resource_id) => {
            println!("{resource_id}");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("upload failed [{}]: {e}", e.kind())),
    }
}

/// Lists uploads the ledger remembers.
pub fn status(config: &Config) -> anyhow::Result<()> {
    let entries = open_ledger(config)?.entries()?;
    if entries.is_empty() {
        println!("no uploads recorded");
        return Ok(());
    }
    for (fingerprint, resource_id) in entries {
        println!("{fingerprint}\t{resource_id}");
    }
    Ok(())
}

/// Drops the ledger entry for `file`, so the next upload starts over.
pub fn forget(config: &Config, file: &Path, container: Option<String>) -> anyhow::Result<()> {
    let container = container_for(config, container)?;
    let target = target_for_file(file, container, None)?;
    let fingerprint = target.fingerprint();
    let ledger = open_ledger(config)?;

    match ledger.lookup(&fingerprint)? {
        Some(resource_id) => {
            ledger.delete(&fingerprint)?;
            println!("forgot {} (resource {resource_id})", file.display());
        }
        None => println!("nothing recorded for {}", file.display()),
    }
    Ok(())
}

/// Describes `path` as an upload into `container`.
pub fn target_for_file(
    path: &Path,
    container: String,
    mime: Option<String>,
) -> anyhow::Result<UploadTarget> {
    let meta = std::fs::metadata(path).with_context(|| format!("reading {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))?;
    let last_modified_hint = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(UploadTarget {
        mime_type: mime.unwrap_or_else(|| guess_mime(path).to_string()),
        file_name,
        size_bytes: meta.len(),
        last_modified_hint,
        container_id: container,
    })
}

/// MIME type from the file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

fn progress_line(sent: u64, total: u64, bytes_per_second: f64) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        sent as f64 * 100.0 / total as f64
    };
    format!(
        "{} / {} ({percent:.1}%) {}/s",
        format_bytes(sent),
        format_bytes(total),
        format_bytes(bytes_per_second as u64)
    )
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
