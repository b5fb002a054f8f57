//! # manager: concurrent uploads with cancellation that always wins
//!
//! [`UploadManager`] accepts files, submits one transfer per file to a
//! [`Transport`], and publishes [`UploadEvent`]s on the channel returned by
//! [`UploadManager::new`].
//!
//! ## Request lifecycle
//! - `upload` reserves the path as *pending* before its first await, so a
//!   duplicate or a cancel arriving while the file is being read is seen.
//! - Once submitted, the request is *in flight* and its handle is the join key
//!   for the transport's progress and completion events.
//! - Whoever removes the request from the table first (completion, `cancel`,
//!   `cancel_all`) decides its outcome. Later events for the handle are inert.
//!
//! ## Ordering
//! All table mutation and every event emission happen under one lock, so for a
//! given file progress is non-decreasing and the terminal event comes last.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::contract::{
    ErrorKind, TransferEvents, TransferHandle, Transport, TransportError, TransportEvent,
    TransportResponse, UploadEvent, UploadPayload,
};
use crate::response::classify;

/// Receiving end of the events published by an [`UploadManager`].
pub type UploadEvents = mpsc::UnboundedReceiver<UploadEvent>;

pub struct UploadManager {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    transfer_events: TransferEvents,
    api_key: String,
}

struct Shared {
    table: Mutex<ActiveRequests>,
    events: mpsc::UnboundedSender<UploadEvent>,
    direct_url: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Reserved by `upload`, file not yet submitted. Tagged with the request id.
    Pending(u64),
    InFlight {
        handle: TransferHandle,
        last_sent: u64,
    },
}

/// Registry of active requests. `handles` holds exactly the in-flight
/// entries of `files`; both change together.
#[derive(Default)]
struct ActiveRequests {
    handles: HashMap<TransferHandle, PathBuf>,
    files: HashMap<PathBuf, Slot>,
    next_request: u64,
}

impl ActiveRequests {
    fn reserve(&mut self, file: &Path) -> u64 {
        self.next_request += 1;
        let id = self.next_request;
        self.files.insert(file.to_path_buf(), Slot::Pending(id));
        id
    }

    fn is_pending(&self, file: &Path, request: u64) -> bool {
        self.files.get(file) == Some(&Slot::Pending(request))
    }

    /// Drop a pending reservation if it is still ours.
    fn release(&mut self, file: &Path, request: u64) -> bool {
        if self.is_pending(file, request) {
            self.files.remove(file);
            true
        } else {
            false
        }
    }

    fn register(&mut self, file: &Path, handle: TransferHandle) {
        self.handles.insert(handle, file.to_path_buf());
        self.files.insert(
            file.to_path_buf(),
            Slot::InFlight {
                handle,
                last_sent: 0,
            },
        );
    }

    /// Remove the in-flight entry for `handle`, returning its file.
    fn finish(&mut self, handle: TransferHandle) -> Option<PathBuf> {
        let file = self.handles.remove(&handle)?;
        self.files.remove(&file);
        Some(file)
    }
}

impl UploadManager {
    /// Create a manager that submits through `transport`.
    ///
    /// Spawns the task that routes transport events back into the manager, so
    /// it must be called from within a Tokio runtime.
    pub fn new(config: UploadConfig, transport: Arc<dyn Transport>) -> (Self, UploadEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            table: Mutex::new(ActiveRequests::default()),
            events: events_tx,
            direct_url: config.direct_url,
        });
        tokio::spawn(route_transport_events(Arc::clone(&shared), transport_rx));

        info!(direct_url = config.direct_url, "Upload manager started");
        let manager = Self {
            shared,
            transport,
            transfer_events: TransferEvents::new(transport_tx),
            api_key: config.api_key,
        };
        (manager, events_rx)
    }

    /// Start uploading `file`.
    ///
    /// Returns once the transfer has been handed to the transport. A missing,
    /// unreadable or empty file, or one that is already being uploaded, is
    /// reported as [`ErrorKind::File`] before this returns.
    pub async fn upload(&self, file: impl AsRef<Path>) {
        let file = file.as_ref();

        let request = {
            let mut table = self.shared.lock();
            if table.files.contains_key(file) {
                warn!(file = %file.display(), "Upload rejected, file is already being uploaded");
                self.shared.failed(file, ErrorKind::File);
                return;
            }
            table.reserve(file)
        };
        debug!(file = %file.display(), request, "Upload reserved");
        let mut reservation = Reservation {
            shared: &self.shared,
            file,
            request,
            armed: true,
        };

        let image = match tokio::fs::read(file).await {
            Ok(bytes) if bytes.is_empty() => {
                warn!(file = %file.display(), "Upload rejected, file is empty");
                reservation.disarm();
                self.reject_pending(file, request);
                return;
            }
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Upload rejected, file is unreadable");
                reservation.disarm();
                self.reject_pending(file, request);
                return;
            }
        };

        let payload = build_payload(file, image);
        let size = payload.len();

        reservation.disarm();
        let mut table = self.shared.lock();
        if !table.is_pending(file, request) {
            debug!(file = %file.display(), request, "Upload cancelled before submission");
            return;
        }
        let handle = self
            .transport
            .submit(payload, &self.api_key, self.transfer_events.clone());
        table.register(file, handle);
        info!(file = %file.display(), %handle, bytes = size, "Upload submitted");
    }

    /// Cancel the upload of `file`. Unknown or finished files are ignored.
    pub fn cancel(&self, file: impl AsRef<Path>) {
        let file = file.as_ref();
        let mut table = self.shared.lock();
        let Some(slot) = table.files.remove(file) else {
            debug!(file = %file.display(), "Cancel ignored, no active upload");
            return;
        };
        self.stop(&mut table, file, slot);
    }

    /// Cancel every active upload as one batch.
    pub fn cancel_all(&self) {
        let mut table = self.shared.lock();
        if table.files.is_empty() {
            debug!("Cancel all ignored, no active uploads");
            return;
        }
        let drained: Vec<(PathBuf, Slot)> = table.files.drain().collect();
        info!(count = drained.len(), "Cancelling all uploads");
        for (file, slot) in drained {
            self.stop(&mut table, &file, slot);
        }
    }

    pub fn is_active(&self, file: impl AsRef<Path>) -> bool {
        self.shared.lock().files.contains_key(file.as_ref())
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock().files.len()
    }

    pub fn active_files(&self) -> Vec<PathBuf> {
        self.shared.lock().files.keys().cloned().collect()
    }

    /// Terminate a request already removed from `files`.
    fn stop(&self, table: &mut ActiveRequests, file: &Path, slot: Slot) {
        if let Slot::InFlight { handle, .. } = slot {
            table.handles.remove(&handle);
            self.transport.abort(handle);
            info!(file = %file.display(), %handle, "Upload cancelled");
        } else {
            info!(file = %file.display(), "Pending upload cancelled");
        }
        self.shared.failed(file, ErrorKind::Cancel);
    }

    fn reject_pending(&self, file: &Path, request: u64) {
        let mut table = self.shared.lock();
        // A cancel that got here first already reported the outcome.
        if table.release(file, request) {
            self.shared.failed(file, ErrorKind::File);
        }
    }
}

/// Pending slot held by an `upload` call that has not reached submission.
///
/// Dropping the `upload` future at its await point drops this too; the slot
/// is then released and the request ends as cancelled.
struct Reservation<'a> {
    shared: &'a Shared,
    file: &'a Path,
    request: u64,
    armed: bool,
}

impl Reservation<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut table = self.shared.lock();
        if table.release(self.file, self.request) {
            info!(file = %self.file.display(), "Upload abandoned before submission");
            self.shared.failed(self.file, ErrorKind::Cancel);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ActiveRequests> {
        // Every critical section leaves the table consistent, so a panic
        // elsewhere does not invalidate it.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UploadEvent) {
        if self.events.send(event).is_err() {
            debug!("Upload event dropped, receiver is gone");
        }
    }

    fn failed(&self, file: &Path, kind: ErrorKind) {
        self.emit(UploadEvent::Failed {
            file: file.to_path_buf(),
            kind,
        });
    }

    fn on_progress(&self, handle: TransferHandle, sent: u64, total: u64) {
        let mut table = self.lock();
        let Some(file) = table.handles.get(&handle).cloned() else {
            debug!(%handle, sent, "Progress for inactive transfer dropped");
            return;
        };
        match table.files.get_mut(&file) {
            Some(Slot::InFlight { last_sent, .. }) if sent >= *last_sent => {
                *last_sent = sent;
            }
            _ => {
                debug!(%handle, sent, "Out of order progress dropped");
                return;
            }
        }
        debug!(file = %file.display(), sent, total, "Upload progress");
        self.emit(UploadEvent::Progress { file, sent, total });
    }

    fn on_complete(
        &self,
        handle: TransferHandle,
        outcome: Result<TransportResponse, TransportError>,
    ) {
        let mut table = self.lock();
        let Some(file) = table.finish(handle) else {
            debug!(%handle, "Completion for inactive transfer discarded");
            return;
        };

        match classify(&outcome) {
            Ok(record) => {
                let url = record.resolve_url(self.direct_url);
                info!(file = %file.display(), %handle, url = %url, "Upload succeeded");
                self.emit(UploadEvent::Uploaded {
                    file,
                    url,
                    delete_hash: record.delete_hash,
                });
            }
            Err(kind) => {
                warn!(file = %file.display(), %handle, %kind, "Upload failed");
                self.emit(UploadEvent::Failed { file, kind });
            }
        }
    }
}

async fn route_transport_events(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Progress {
                handle,
                sent,
                total,
            } => shared.on_progress(handle, sent, total),
            TransportEvent::Complete { handle, outcome } => shared.on_complete(handle, outcome),
        }
    }
    debug!("Transport event stream closed");
}

fn build_payload(file: &Path, image: Vec<u8>) -> UploadPayload {
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot".to_string());
    UploadPayload {
        content_type: content_type_for(file),
        fields: vec![
            ("type".to_string(), "file".to_string()),
            ("name".to_string(), file_name.clone()),
        ],
        file_name,
        image,
    }
}

/// MIME type guessed from the file extension.
fn content_type_for(file: &Path) -> String {
    mime_guess::from_path(file)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
