//! Static format tables: categories, MIME types, descriptions, legacy map.
//!
//! All lookups accept an extension with or without its leading dot and are
//! case-insensitive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension of the engine's native intermediate format.
pub const INTERMEDIATE_EXTENSION: &str = ".bin";

/// Editor family a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Word,
    Cell,
    Slide,
}

impl DocumentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentCategory::Word => "word",
            DocumentCategory::Cell => "cell",
            DocumentCategory::Slide => "slide",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip a leading dot and lowercase.
pub fn bare_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Ensure the extension carries exactly one leading dot. Case is preserved.
pub fn dotted_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.'))
}

pub fn is_intermediate(ext: &str) -> bool {
    bare_extension(ext) == "bin"
}

/// Document category of an extension, if it is one the editor can open.
pub fn category_for(ext: &str) -> Option<DocumentCategory> {
    match bare_extension(ext).as_str() {
        "docx" | "doc" | "odt" | "rtf" | "txt" => Some(DocumentCategory::Word),
        "xlsx" | "xls" | "ods" | "csv" => Some(DocumentCategory::Cell),
        "pptx" | "ppt" | "odp" => Some(DocumentCategory::Slide),
        _ => None,
    }
}

/// Export-only formats with a fixed page layout (need font resources).
pub fn is_fixed_layout(ext: &str) -> bool {
    bare_extension(ext) == "pdf"
}

/// Modern container a legacy extension is normalised to before reaching
/// the intermediate format.
pub fn legacy_upgrade(ext: &str) -> Option<&'static str> {
    match bare_extension(ext).as_str() {
        "doc" => Some("docx"),
        "xls" => Some("xlsx"),
        "ppt" => Some("pptx"),
        _ => None,
    }
}

pub fn mime_type(ext: &str) -> &'static str {
    match bare_extension(ext).as_str() {
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "csv" => "text/csv",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "ppt" => "application/vnd.ms-powerpoint",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub fn description(ext: &str) -> &'static str {
    match bare_extension(ext).as_str() {
        "docx" => "Word Document",
        "doc" => "Word 97-2003 Document",
        "odt" => "OpenDocument Text",
        "pdf" => "PDF Document",
        "xlsx" => "Excel Workbook",
        "xls" => "Excel 97-2003 Workbook",
        "ods" => "OpenDocument Spreadsheet",
        "pptx" => "PowerPoint Presentation",
        "ppt" => "PowerPoint 97-2003 Presentation",
        "odp" => "OpenDocument Presentation",
        "txt" => "Text Document",
        "rtf" => "Rich Text Format",
        "csv" => "CSV File",
        _ => "Document",
    }
}
