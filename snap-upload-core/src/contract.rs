//! # contract: the seams between the upload manager, its transport and its observers
//!
//! This module defines the [`Transport`] trait the manager submits transfers to,
//! the events a transport reports back ([`TransportEvent`]), the events the
//! manager publishes to the embedding application ([`UploadEvent`]), and the
//! closed set of failure categories ([`ErrorKind`]).
//!
//! ## Mocking & Testing
//! - [`Transport`] is annotated for `mockall`, so consumers can generate
//!   deterministic mocks with the `test-export-mocks` feature.
//! - Transports never call into the manager directly: they push
//!   [`TransportEvent`]s through the [`TransferEvents`] sink handed to `submit`.

use std::fmt;
use std::path::PathBuf;

use mockall::automock;
use tokio::sync::mpsc;

/// Opaque identifier a transport assigns to a single network transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferHandle(pub u64);

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The multipart body of one upload: the image part plus plain text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    /// File name reported for the image part.
    pub file_name: String,
    /// MIME type of the image part.
    pub content_type: String,
    /// Raw file contents.
    pub image: Vec<u8>,
    /// Additional text fields, in submission order.
    pub fields: Vec<(String, String)>,
}

impl UploadPayload {
    /// Size of the image part in bytes.
    pub fn len(&self) -> u64 {
        self.image.len() as u64
    }

    /// True when there are no image bytes to send.
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

/// Raw response delivered by the transport once the remote has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Failures below the HTTP layer: the remote never produced a usable response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transfer timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Event reported by a transport for one of its transfers.
#[derive(Debug)]
pub enum TransportEvent {
    Progress {
        handle: TransferHandle,
        sent: u64,
        total: u64,
    },
    Complete {
        handle: TransferHandle,
        outcome: Result<TransportResponse, TransportError>,
    },
}

/// Sink a transport uses to report progress and completion for its transfers.
///
/// Cloning is cheap; every clone feeds the same manager.
#[derive(Debug, Clone)]
pub struct TransferEvents {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransferEvents {
    pub fn new(tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { tx }
    }

    pub fn progress(&self, handle: TransferHandle, sent: u64, total: u64) {
        self.send(TransportEvent::Progress {
            handle,
            sent,
            total,
        });
    }

    pub fn complete(
        &self,
        handle: TransferHandle,
        outcome: Result<TransportResponse, TransportError>,
    ) {
        self.send(TransportEvent::Complete { handle, outcome });
    }

    fn send(&self, event: TransportEvent) {
        // The manager has been dropped; nobody is left to observe the transfer.
        if self.tx.send(event).is_err() {
            tracing::debug!("Transport event dropped, upload manager is gone");
        }
    }
}

/// Transport collaborator: issues multipart POSTs and reports back asynchronously.
///
/// `submit` must not block on the transfer. Events for the returned handle are
/// delivered through `events`, possibly from another task or thread. After
/// `abort`, a transport may still deliver events for the handle; the manager
/// ignores them.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Transport: Send + Sync {
    /// Start a transfer of `payload`, authenticated with `credential`.
    fn submit(
        &self,
        payload: UploadPayload,
        credential: &str,
        events: TransferEvents,
    ) -> TransferHandle;

    /// Best-effort abort of a running transfer.
    fn abort(&self, handle: TransferHandle);
}

/// Why an upload ended without a hosted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Missing, unreadable or empty file, or the file is already being uploaded.
    #[error("ErrorFile")]
    File,
    /// The transport failed before the remote produced a response.
    #[error("ErrorNetwork")]
    Network,
    /// The remote rejected the credential or the quota is exhausted.
    #[error("ErrorCredits")]
    Credits,
    /// The remote answered with an error or an unusable body.
    #[error("ErrorUpload")]
    Upload,
    /// The upload was cancelled.
    #[error("ErrorCancel")]
    Cancel,
}

impl ErrorKind {
    /// Stable identifier of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::File => "ErrorFile",
            ErrorKind::Network => "ErrorNetwork",
            ErrorKind::Credits => "ErrorCredits",
            ErrorKind::Upload => "ErrorUpload",
            ErrorKind::Cancel => "ErrorCancel",
        }
    }
}

/// Event published by the manager to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Progress {
        file: PathBuf,
        sent: u64,
        total: u64,
    },
    Uploaded {
        file: PathBuf,
        url: String,
        delete_hash: String,
    },
    Failed {
        file: PathBuf,
        kind: ErrorKind,
    },
}

impl UploadEvent {
    /// The file the event is about.
    pub fn file(&self) -> &PathBuf {
        match self {
            UploadEvent::Progress { file, .. }
            | UploadEvent::Uploaded { file, .. }
            | UploadEvent::Failed { file, .. } => file,
        }
    }

    /// True for `Uploaded` and `Failed`: nothing follows for this request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadEvent::Progress { .. })
    }
}
