#![doc = "snap-upload-core: image upload manager for the snap-upload screenshot tool."]

//! This crate holds the upload logic: the transport contract, the upload
//! manager that tracks and cancels concurrent transfers, parsing of the image
//! host's responses, and the default HTTP transport.
//!
//! # Usage
//! Build an [`UploadConfig`], pick a [`Transport`] (normally [`HttpTransport`]),
//! create an [`UploadManager`] and consume the [`UploadEvent`]s it publishes.

pub mod config;
pub mod contract;
pub mod manager;
pub mod response;
pub mod transport;

pub use config::UploadConfig;
pub use contract::{
    ErrorKind, TransferEvents, TransferHandle, Transport, TransportError, TransportEvent,
    TransportResponse, UploadEvent, UploadPayload,
};
pub use manager::{UploadEvents, UploadManager};
pub use response::ImageRecord;
pub use transport::HttpTransport;
