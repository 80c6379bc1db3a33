// HTTP transport for encoded telemetry records.
// Invariants: one upload per record, bounded by a hard timeout; the caller
// decides what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::constants::UPLOAD_TIMEOUT_SECS;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("permanent transport failure: http status {0}")]
    Permanent(u16),
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, payload: &[u8]) -> Result<(), UploadError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    vin: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, vin: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: format!("{}/telemetry", base_url.trim_end_matches('/')),
            vin: vin.to_string(),
        }
    }
}

#[async_trait]
impl Uploader for HttpTransport {
    async fn upload(&self, payload: &[u8]) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/octet-stream")
            .header("X-Compressed", "true")
            .header("X-Vehicle-VIN", self.vin.as_str())
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|err| UploadError::Transient(err.to_string()))?;

        classify_status(response.status())
    }
}

fn classify_status(status: StatusCode) -> Result<(), UploadError> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    if status.is_server_error() || code == 408 || code == 429 {
        Err(UploadError::Transient(format!("http status {code}")))
    } else {
        Err(UploadError::Permanent(code))
    }
}
