#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use snap_upload_core::{
    TransferEvents, TransferHandle, Transport, TransportError, TransportResponse, UploadConfig,
    UploadEvent, UploadEvents, UploadManager, UploadPayload,
};

/// A transfer handed to the scripted transport.
#[derive(Clone)]
pub struct Submission {
    pub handle: TransferHandle,
    pub payload: UploadPayload,
    pub credential: String,
    pub events: TransferEvents,
}

/// Transport that never touches the network: tests decide when and how
/// each transfer progresses and completes.
#[derive(Default)]
pub struct ScriptedTransport {
    next: AtomicU64,
    submissions: Mutex<Vec<Submission>>,
    aborted: Mutex<Vec<TransferHandle>>,
}

impl ScriptedTransport {
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission(&self, index: usize) -> Submission {
        self.submissions.lock().unwrap()[index].clone()
    }

    pub fn aborted(&self) -> Vec<TransferHandle> {
        self.aborted.lock().unwrap().clone()
    }

    pub fn progress(&self, handle: TransferHandle, sent: u64, total: u64) {
        self.events_for(handle).progress(handle, sent, total);
    }

    pub fn respond(&self, handle: TransferHandle, status: u16, body: &str) {
        self.events_for(handle).complete(
            handle,
            Ok(TransportResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
        );
    }

    pub fn fail(&self, handle: TransferHandle, error: TransportError) {
        self.events_for(handle).complete(handle, Err(error));
    }

    fn events_for(&self, handle: TransferHandle) -> TransferEvents {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| s.events.clone())
            .expect("unknown handle")
    }
}

impl Transport for ScriptedTransport {
    fn submit(
        &self,
        payload: UploadPayload,
        credential: &str,
        events: TransferEvents,
    ) -> TransferHandle {
        let handle = TransferHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.submissions.lock().unwrap().push(Submission {
            handle,
            payload,
            credential: credential.to_string(),
            events,
        });
        handle
    }

    fn abort(&self, handle: TransferHandle) {
        self.aborted.lock().unwrap().push(handle);
    }
}

pub const API_KEY: &str = "test-client-id";

pub fn manager_with(config: UploadConfig) -> (UploadManager, UploadEvents, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let (manager, events) = UploadManager::new(config, transport.clone());
    (manager, events, transport)
}

pub fn manager() -> (UploadManager, UploadEvents, Arc<ScriptedTransport>) {
    manager_with(UploadConfig::new(API_KEY))
}

/// Write a small fake screenshot into `dir`.
pub fn screenshot(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really an image").unwrap();
    path
}

pub async fn next_event(events: &mut UploadEvents) -> UploadEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for upload event")
        .expect("event channel closed")
}

/// Give the manager time to route anything in flight, then require silence.
pub async fn assert_quiet(events: &mut UploadEvents) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = events.try_recv() {
        panic!("expected no further events, got {event:?}");
    }
}

pub fn success_body(id: &str, link: &str, delete_hash: &str) -> String {
    format!(r#"{{"id":"{id}","link":"{link}","deleteHash":"{delete_hash}"}}"#)
}
