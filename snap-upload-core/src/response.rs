//! Parsing of the image host's answer and classification of failed transfers.

use serde::Deserialize;

use crate::contract::{ErrorKind, TransportError, TransportResponse};

/// Base of the human-facing page for an uploaded image.
pub const PAGE_BASE_URL: &str = "https://imgur.com/";

/// A hosted image, as described by a successful upload response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    /// Direct link to the image file.
    pub link: String,
    #[serde(rename = "deletehash", alias = "deleteHash", alias = "delete_hash")]
    pub delete_hash: String,
    #[serde(default)]
    pub page: Option<String>,
}

impl ImageRecord {
    /// Link to the image's page, derived from the id when the host sends none.
    pub fn page_link(&self) -> String {
        match &self.page {
            Some(page) => page.clone(),
            None => format!("{PAGE_BASE_URL}{}", self.id),
        }
    }

    pub fn resolve_url(&self, direct: bool) -> String {
        if direct {
            self.link.clone()
        } else {
            self.page_link()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("response body is not a valid image record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("host reported failure with status {0:?}")]
    Rejected(Option<u16>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Body {
    Envelope {
        data: ImageRecord,
        #[serde(default = "default_success")]
        success: bool,
        #[serde(default)]
        status: Option<u16>,
    },
    Bare(ImageRecord),
}

fn default_success() -> bool {
    true
}

/// Parse a 2xx body, either bare or wrapped in the `{data, success, status}` envelope.
pub fn parse_image_record(body: &[u8]) -> Result<ImageRecord, ResponseError> {
    match serde_json::from_slice::<Body>(body)? {
        Body::Envelope {
            success: false,
            status,
            ..
        } => Err(ResponseError::Rejected(status)),
        Body::Envelope { data, .. } | Body::Bare(data) => Ok(data),
    }
}

/// Statuses by which the host rejects the credential or signals exhausted quota.
pub fn is_credits_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 429)
}

/// Map a completed transfer to its hosted image or to the failure category.
pub fn classify(
    outcome: &Result<TransportResponse, TransportError>,
) -> Result<ImageRecord, ErrorKind> {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Transfer failed below HTTP");
            return Err(ErrorKind::Network);
        }
    };

    if is_credits_status(response.status) {
        tracing::warn!(status = response.status, "Host rejected credential or quota");
        return Err(ErrorKind::Credits);
    }
    if !(200..300).contains(&response.status) {
        tracing::warn!(status = response.status, "Host answered with an error status");
        return Err(ErrorKind::Upload);
    }

    parse_image_record(&response.body).map_err(|e| {
        tracing::warn!(error = %e, status = response.status, "Unusable success body");
        ErrorKind::Upload
    })
}
