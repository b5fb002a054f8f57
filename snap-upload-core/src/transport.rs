//! HTTP transport over `reqwest`: one tokio task per transfer, aborted by handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::task::AbortHandle;

use crate::config::UploadConfig;
use crate::contract::{
    TransferEvents, TransferHandle, Transport, TransportError, TransportResponse, UploadPayload,
};

/// Size of the slices the image part is streamed in; one progress event each.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub struct HttpTransport {
    client: Client,
    endpoint: String,
    next_handle: AtomicU64,
    running: Arc<Mutex<HashMap<TransferHandle, AbortHandle>>>,
}

impl HttpTransport {
    pub fn new(config: &UploadConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        tracing::info!(
            endpoint = %config.endpoint,
            timeout_secs = config.timeout_secs,
            "Initialized HttpTransport"
        );
        Ok(Self::with_client(client, config.endpoint.clone()))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            next_handle: AtomicU64::new(1),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of transfers whose task has not finished yet.
    pub fn running(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for HttpTransport {
    fn submit(
        &self,
        payload: UploadPayload,
        credential: &str,
        events: TransferEvents,
    ) -> TransferHandle {
        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let form = match build_form(payload, handle, events.clone()) {
            Ok(form) => form,
            Err(e) => {
                tracing::error!(%handle, error = %e, "Failed to build multipart form");
                events.complete(handle, Err(TransportError::Request(e.to_string())));
                return handle;
            }
        };
        let request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Client-ID {credential}"))
            .multipart(form);

        // Hold the lock until the abort handle is stored, so the task's own
        // removal cannot run first.
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let registry = Arc::clone(&self.running);
        let task = tokio::spawn(async move {
            let outcome = send(request).await;
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle);
            events.complete(handle, outcome);
        });
        running.insert(handle, task.abort_handle());
        tracing::debug!(%handle, endpoint = %self.endpoint, "Transfer spawned");
        handle
    }

    fn abort(&self, handle: TransferHandle) {
        let task = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        match task {
            Some(task) => {
                task.abort();
                tracing::debug!(%handle, "Transfer aborted");
            }
            None => tracing::debug!(%handle, "Abort ignored, transfer already finished"),
        }
    }
}

fn build_form(
    payload: UploadPayload,
    handle: TransferHandle,
    events: TransferEvents,
) -> Result<Form, reqwest::Error> {
    let total = payload.len();
    let chunks: Vec<Vec<u8>> = payload
        .image
        .chunks(CHUNK_SIZE)
        .map(<[u8]>::to_vec)
        .collect();

    let mut sent = 0u64;
    let body = Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        events.progress(handle, sent, total);
        Ok::<_, std::io::Error>(chunk)
    })));

    let part = Part::stream_with_length(body, total)
        .file_name(payload.file_name)
        .mime_str(&payload.content_type)?;

    Ok(payload
        .fields
        .into_iter()
        .fold(Form::new().part("image", part), |form, (name, value)| {
            form.text(name, value)
        }))
}

async fn send(request: reqwest::RequestBuilder) -> Result<TransportResponse, TransportError> {
    let response = request.send().await.map_err(classify_reqwest)?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::Body(e.to_string()))?;
    tracing::debug!(status, bytes = body.len(), "Response received");
    Ok(TransportResponse {
        status,
        body: body.to_vec(),
    })
}

fn classify_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
