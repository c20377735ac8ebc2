//! Input classification: decide which representation a value is.
//!
//! Classification is pure and total. Binary variants are decided by the
//! [`Input`] variant itself; strings are refined most-specific first:
//!
//! ```text
//! data:<mime>;base64,<payload>  →  DataUrl
//! blob:…                        →  ObjectUrl
//! file://…                      →  FileUrl
//! http(s)://… (valid URL)       →  HttpUrl
//! any other valid URL           →  GenericUrl
//! everything else               →  Text
//! ```

use crate::pipeline::input::{Input, NumericKind};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::fmt;

/// The closed set of representations the materializer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    Bytes,
    Numeric(NumericKind),
    Memory,
    File,
    Blob,
    HttpUrl,
    DataUrl,
    ObjectUrl,
    FileUrl,
    GenericUrl,
    Text,
    Unknown(String),
}

impl Representation {
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Representation::Bytes
                | Representation::Numeric(_)
                | Representation::Memory
                | Representation::File
                | Representation::Blob
        )
    }

    pub fn is_url(&self) -> bool {
        matches!(
            self,
            Representation::HttpUrl
                | Representation::DataUrl
                | Representation::ObjectUrl
                | Representation::FileUrl
                | Representation::GenericUrl
        )
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Bytes => f.write_str("Uint8Array"),
            Representation::Numeric(kind) => f.write_str(kind.name()),
            Representation::Memory => f.write_str("ArrayBuffer"),
            Representation::File => f.write_str("File"),
            Representation::Blob => f.write_str("Blob"),
            Representation::HttpUrl => f.write_str("HttpURL"),
            Representation::DataUrl => f.write_str("DataURL"),
            Representation::ObjectUrl => f.write_str("BlobURL"),
            Representation::FileUrl => f.write_str("FileURL"),
            Representation::GenericUrl => f.write_str("URL"),
            Representation::Text => f.write_str("String"),
            Representation::Unknown(type_name) => f.write_str(type_name),
        }
    }
}

static RE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([a-zA-Z0-9][a-zA-Z0-9/+\-]*);base64,([A-Za-z0-9+/]+=*)$").unwrap()
});

/// Classify an input value.
pub fn classify(input: &Input) -> Representation {
    match input {
        Input::Bytes(_) => Representation::Bytes,
        Input::Numeric(buf) => Representation::Numeric(buf.kind()),
        Input::Memory(_) => Representation::Memory,
        Input::File(_) => Representation::File,
        Input::Blob(_) => Representation::Blob,
        Input::Text(s) => classify_str(s),
        Input::WideText(units) => match String::from_utf16(units) {
            Ok(s) => classify_str(&s),
            Err(_) => Representation::Text,
        },
        Input::Unknown { type_name } => Representation::Unknown(type_name.clone()),
    }
}

/// Classify a string value.
pub fn classify_str(s: &str) -> Representation {
    if is_data_url(s) {
        Representation::DataUrl
    } else if is_object_url(s) {
        Representation::ObjectUrl
    } else if is_file_url(s) {
        Representation::FileUrl
    } else if is_http_url(s) {
        Representation::HttpUrl
    } else if is_url(s) {
        Representation::GenericUrl
    } else {
        Representation::Text
    }
}

/// A non-blank string that parses as an absolute URL.
pub fn is_url(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && Url::parse(s).is_ok()
}

pub fn is_http_url(s: &str) -> bool {
    if !is_url(s) {
        return false;
    }
    let lower = s.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn is_data_url(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && RE_DATA_URL.is_match(s)
}

pub fn is_object_url(s: &str) -> bool {
    has_prefix_ignore_case(s.trim(), "blob:")
}

pub fn is_file_url(s: &str) -> bool {
    has_prefix_ignore_case(s.trim(), "file://")
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Is the value any binary representation?
pub fn is_binary(input: &Input) -> bool {
    classify(input).is_binary()
}

/// Binary data or a URL string: worth attempting to materialise as a
/// document rather than treating as literal text.
pub fn is_binary_or_url(input: &Input) -> bool {
    let rep = classify(input);
    rep.is_binary() || rep.is_url()
}

/// Size of the value in bytes, per representation.
///
/// Files and blobs report their recorded size; buffers their byte length;
/// strings their UTF-8 encoded size (lone surrogates count as U+FFFD).
pub fn byte_size(input: &Input) -> u64 {
    match input {
        Input::Bytes(b) | Input::Memory(b) => b.len() as u64,
        Input::Numeric(buf) => buf.byte_len() as u64,
        Input::File(f) => f.size(),
        Input::Blob(b) => b.size(),
        Input::Text(s) => s.len() as u64,
        Input::WideText(units) => String::from_utf16_lossy(units).len() as u64,
        Input::Unknown { .. } => 0,
    }
}

/// Non-empty binary data, a non-blank string, or any other present value.
pub fn is_meaningful(input: &Input) -> bool {
    match input {
        Input::Text(s) => !s.trim().is_empty(),
        Input::WideText(units) => !String::from_utf16_lossy(units).trim().is_empty(),
        Input::Unknown { type_name } => !matches!(type_name.as_str(), "null" | "undefined"),
        binary => byte_size(binary) > 0,
    }
}

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Human-readable size using base-1024 units, two decimals, trailing zeros
/// dropped: `1536` → `"1.5 KB"`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let value = bytes as f64;
    let exp = ((value.ln() / 1024f64.ln()).floor() as usize).min(SIZE_UNITS.len() - 1);
    let scaled = value / 1024f64.powi(exp as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[exp])
}
