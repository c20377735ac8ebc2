//! Byte materialization: turn any [`Input`] into canonical bytes.
//!
//! Each representation has exactly one strategy and one attempt. In-memory
//! buffers resolve without copying (`Bytes` slices share their backing
//! storage); files, blobs and URLs suspend at their I/O boundary and either
//! fully succeed or fully fail. There is no retry and no cancellation.

use crate::error::{MaterializeStage, X2tError};
use crate::object_url::ObjectUrlRegistry;
use crate::pipeline::classify::{classify, classify_str, Representation};
use crate::pipeline::input::{BlobHandle, FileHandle, Input};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Resolves inputs to bytes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Materializer {
    client: reqwest::Client,
    object_urls: Arc<ObjectUrlRegistry>,
    download_timeout_secs: u64,
}

impl Materializer {
    pub fn new(
        object_urls: Arc<ObjectUrlRegistry>,
        download_timeout_secs: u64,
    ) -> Result<Self, X2tError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(download_timeout_secs))
            .build()
            .map_err(|e| X2tError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            object_urls,
            download_timeout_secs,
        })
    }

    /// Materialize `input` into canonical bytes.
    pub async fn materialize(&self, input: Input) -> Result<Bytes, X2tError> {
        let rep = classify(&input);
        debug!("Materializing input classified as {}", rep);

        match input {
            Input::Bytes(b) => Ok(b),
            Input::Memory(b) => Ok(b),
            Input::Numeric(buf) => Ok(buf.as_bytes()),
            Input::File(handle) => read_file(handle).await,
            Input::Blob(blob) => read_blob(blob).await,
            Input::Text(s) => self.materialize_str(s, rep).await,
            Input::WideText(units) => {
                let s = String::from_utf16(&units).map_err(|e| X2tError::Materialization {
                    stage: MaterializeStage::TextEncode,
                    reason: e.to_string(),
                })?;
                let rep = classify_str(&s);
                self.materialize_str(s, rep).await
            }
            Input::Unknown { .. } => Err(unsupported(&rep)),
        }
    }

    async fn materialize_str(&self, s: String, rep: Representation) -> Result<Bytes, X2tError> {
        match rep {
            Representation::HttpUrl => self.fetch_http(s.trim()).await,
            Representation::ObjectUrl => self.resolve_object_url(s.trim()),
            Representation::FileUrl => read_file_url(s.trim()).await,
            Representation::DataUrl => decode_data_url(&s),
            Representation::Text => Ok(Bytes::from(s.into_bytes())),
            other => Err(unsupported(&other)),
        }
    }

    async fn fetch_http(&self, url: &str) -> Result<Bytes, X2tError> {
        info!("Downloading document from: {}", url);

        let fail = |reason: String| X2tError::Materialization {
            stage: MaterializeStage::HttpFetch,
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                fail(format!("timed out after {}s", self.download_timeout_secs))
            } else {
                fail(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }

    fn resolve_object_url(&self, url: &str) -> Result<Bytes, X2tError> {
        self.object_urls
            .resolve(url)
            .map(|entry| entry.data)
            .ok_or_else(|| X2tError::Materialization {
                stage: MaterializeStage::ObjectUrl,
                reason: format!("404 no object registered for '{url}'"),
            })
    }
}

async fn read_file(handle: FileHandle) -> Result<Bytes, X2tError> {
    let data = tokio::fs::read(handle.path())
        .await
        .map_err(|e| X2tError::Materialization {
            stage: MaterializeStage::FileRead,
            reason: format!("{}: {}", handle.path().display(), e),
        })?;
    if data.len() as u64 != handle.size() {
        warn!(
            "File {} changed size since it was opened ({} → {} bytes)",
            handle.path().display(),
            handle.size(),
            data.len()
        );
    }
    Ok(Bytes::from(data))
}

/// Upper bound on the buffer reserved up front from a blob's declared size.
const BLOB_PREALLOC_LIMIT: usize = 64 * 1024 * 1024;

async fn read_blob(blob: BlobHandle) -> Result<Bytes, X2tError> {
    let declared = blob.size();
    let capacity = usize::try_from(declared)
        .unwrap_or(0)
        .min(BLOB_PREALLOC_LIMIT);
    let mut buf = Vec::with_capacity(capacity);
    blob.into_reader()
        .take(declared.saturating_add(1))
        .read_to_end(&mut buf)
        .await
        .map_err(|e| X2tError::Materialization {
            stage: MaterializeStage::BlobRead,
            reason: e.to_string(),
        })?;
    if buf.len() as u64 != declared {
        // At most `declared + 1` bytes are read, so a longer blob shows up
        // as exactly one byte over.
        let actual = if buf.len() as u64 > declared {
            format!("more than {declared}")
        } else {
            buf.len().to_string()
        };
        warn!("Blob declared {} bytes but yielded {}", declared, actual);
        return Err(X2tError::Materialization {
            stage: MaterializeStage::BlobRead,
            reason: format!("declared size {declared} does not match content ({actual} bytes)"),
        });
    }
    Ok(Bytes::from(buf))
}

async fn read_file_url(url: &str) -> Result<Bytes, X2tError> {
    let fail = |reason: String| X2tError::Materialization {
        stage: MaterializeStage::FileUrl,
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| fail(e.to_string()))?;
    let path = parsed
        .to_file_path()
        .map_err(|_| fail(format!("'{url}' does not name a local path")))?;
    let data = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            fail(format!("404 {}", path.display()))
        } else {
            fail(format!("{}: {}", path.display(), e))
        }
    })?;
    Ok(Bytes::from(data))
}

/// Standard alphabet; trailing `=` padding is optional, as in browsers.
const DATA_URL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the payload of a base64 data URL (everything after the first comma).
pub fn decode_data_url(url: &str) -> Result<Bytes, X2tError> {
    let fail = |reason: String| X2tError::Materialization {
        stage: MaterializeStage::DataUrl,
        reason,
    };
    let payload = url
        .trim()
        .split_once(',')
        .map(|(_, p)| p)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| fail("invalid data URL: missing payload".to_string()))?;
    let decoded = DATA_URL_BASE64
        .decode(payload)
        .map_err(|e| fail(format!("invalid base64 payload: {e}")))?;
    Ok(Bytes::from(decoded))
}

fn unsupported(rep: &Representation) -> X2tError {
    warn!("Unsupported input representation: {}", rep);
    X2tError::ClassificationUnsupported {
        tag: rep.to_string(),
    }
}
