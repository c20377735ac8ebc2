//! Conversion results and writing them to disk.

use crate::error::X2tError;
use crate::formats::{self, DocumentCategory};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// The outcome of one successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// Sanitised base name used inside the workspace.
    pub file_name: String,

    /// Resulting extension with a leading dot, e.g. `.docx`.
    pub extension: String,

    /// Editor family of the document. `None` for fixed-layout exports (PDF).
    pub category: Option<DocumentCategory>,

    /// Extracted media: `media/<file>` → object URL in the converter's
    /// [`crate::object_url::ObjectUrlRegistry`].
    pub media: BTreeMap<String, String>,

    /// The converted document.
    #[serde(skip_serializing)]
    pub data: Bytes,

    /// `data.len()`.
    pub size: usize,
}

impl ConversionResult {
    /// `<file_name><extension>`.
    pub fn file_name_with_extension(&self) -> String {
        format!("{}{}", self.file_name, self.extension)
    }

    pub fn mime_type(&self) -> &'static str {
        formats::mime_type(&self.extension)
    }

    pub fn description(&self) -> &'static str {
        formats::description(&self.extension)
    }
}

/// Write `data` to `path` atomically (temp file + rename), creating parent
/// directories as needed. A partially written file never appears at `path`.
pub async fn save_output(data: &[u8], path: impl AsRef<Path>) -> Result<(), X2tError> {
    let path = path.as_ref();
    let fail = |source: std::io::Error| X2tError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, data).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }

    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}
