//! # Batch uploads (CLI <-> Core)
//!
//! Wires [`HttpTransport`] and [`UploadManager`] together for the command line:
//! submit every file, follow the event stream until each file has reached its
//! terminal event, and collect a [`BatchReport`].
//!
//! An interrupt future (Ctrl-C in the binary) cancels every outstanding upload.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use snap_upload_core::{
    ErrorKind, HttpTransport, UploadConfig, UploadEvent, UploadEvents, UploadManager,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file: PathBuf,
    pub url: String,
    pub delete_hash: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub uploaded: Vec<UploadedImage>,
    pub failed: Vec<(PathBuf, ErrorKind)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builds the HTTP transport and manager described by `config`.
pub fn connect(config: UploadConfig) -> Result<(UploadManager, UploadEvents)> {
    let transport =
        HttpTransport::new(&config).context("Failed to construct HTTP transport")?;
    Ok(UploadManager::new(config, Arc::new(transport)))
}

/// Uploads `files` concurrently and waits for one terminal event per file.
///
/// When `interrupt` resolves first, all outstanding uploads are cancelled and
/// their cancellations are part of the report.
pub async fn upload_all<F>(
    manager: &UploadManager,
    events: &mut UploadEvents,
    files: &[PathBuf],
    interrupt: F,
) -> BatchReport
where
    F: Future<Output = ()>,
{
    let mut interrupt = std::pin::pin!(interrupt);
    let mut interrupted = false;

    info!(count = files.len(), "Submitting uploads");
    let mut submissions =
        std::pin::pin!(join_all(files.iter().map(|file| manager.upload(file))));
    let mut submitted = false;
    while !submitted {
        // Submissions go first so every file is reserved before a cancel.
        tokio::select! {
            biased;
            _ = &mut submissions => submitted = true,
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                warn!(
                    active = manager.active_count(),
                    "Interrupted while submitting, cancelling all uploads"
                );
                manager.cancel_all();
            }
        }
    }

    let mut report = BatchReport::default();
    let mut remaining = files.len();

    while remaining > 0 {
        tokio::select! {
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                warn!(active = manager.active_count(), "Interrupted, cancelling all uploads");
                manager.cancel_all();
            }
            event = events.recv() => {
                let Some(event) = event else {
                    warn!(remaining, "Event stream closed before all uploads finished");
                    break;
                };
                if event.is_terminal() {
                    remaining -= 1;
                }
                record(&mut report, event);
            }
        }
    }

    info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        "Batch finished"
    );
    report
}

fn record(report: &mut BatchReport, event: UploadEvent) {
    match event {
        UploadEvent::Progress { file, sent, total } => {
            debug!(file = %file.display(), sent, total, "Uploading");
        }
        UploadEvent::Uploaded {
            file,
            url,
            delete_hash,
        } => {
            println!("uploaded {} {} delete={}", file.display(), url, delete_hash);
            report.uploaded.push(UploadedImage {
                file,
                url,
                delete_hash,
            });
        }
        UploadEvent::Failed { file, kind } => {
            println!("failed {}: {}", file.display(), kind);
            report.failed.push((file, kind));
        }
    }
}
