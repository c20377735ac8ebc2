//! Workspace management inside the engine filesystem.
//!
//! Layout under the working root (default `/working`):
//!
//! ```text
//! /working/
//! ├── media/                 engine-global; extracted images land here
//! ├── fonts/                 font resources (fixed-layout exports)
//! ├── themes/                theme resources
//! └── <name>-<request id>/   one per conversion
//!     ├── <name><src ext>
//!     ├── params.xml
//!     └── <name><dst ext>
//! ```
//!
//! Everything here is synchronous and runs on the blocking thread that also
//! runs the engine.

use crate::engine::{join, EngineFs};
use crate::error::X2tError;
use crate::formats;
use crate::object_url::ObjectUrlRegistry;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MEDIA_DIR: &str = "media";
pub const FONTS_DIR: &str = "fonts";
pub const THEMES_DIR: &str = "themes";

/// Subdirectories of the root that survive a purge.
pub const RESERVED_DIRS: [&str; 3] = [MEDIA_DIR, FONTS_DIR, THEMES_DIR];

pub const DESCRIPTOR_FILE_NAME: &str = "params.xml";

// ── Naming ───────────────────────────────────────────────────────────────

fn is_stripped(c: char) -> bool {
    matches!(
        c,
        '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"' | '&' | '\'' | '%' | '!' | '{'
            | '}' | '[' | ']'
    ) || c.is_control()
}

/// Derive a workspace-safe base name from a caller-supplied file name.
///
/// Keeps only the final path component, drops the last extension, removes
/// path-illegal characters, control characters and descriptor
/// metacharacters, then trims leading dots and surrounding whitespace. A
/// name made only of dots sanitises to the empty string; callers treat an
/// empty result as [`X2tError::InvalidName`].
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => base,
    };
    let cleaned: String = stem.chars().filter(|c| !is_stripped(*c)).collect();
    if cleaned.chars().all(|c| c == '.') {
        return String::new();
    }
    cleaned.trim().trim_start_matches('.').trim().to_string()
}

/// [`sanitize_file_name`] that rejects an empty result.
pub fn checked_file_name(name: &str) -> Result<String, X2tError> {
    let sanitized = sanitize_file_name(name);
    if sanitized.is_empty() {
        return Err(X2tError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(sanitized)
}

// ── Per-request workspace ────────────────────────────────────────────────

/// Paths of one conversion's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub dir: String,
    pub input_path: String,
    pub output_path: String,
    pub descriptor_path: String,
}

impl Workspace {
    /// Allocate paths for a conversion of `name` from `src_ext` to `dst_ext`.
    ///
    /// With `isolate` the directory carries a random request id so that
    /// concurrent conversions of the same name never collide.
    pub fn allocate(root: &str, name: &str, src_ext: &str, dst_ext: &str, isolate: bool) -> Self {
        let dir_name = if isolate {
            let id = Uuid::new_v4().simple().to_string();
            format!("{}-{}", name, &id[..12])
        } else {
            name.to_string()
        };
        let dir = join(root, &dir_name);
        Self {
            input_path: join(&dir, &format!("{}{}", name, formats::dotted_extension(src_ext))),
            output_path: join(&dir, &format!("{}{}", name, formats::dotted_extension(dst_ext))),
            descriptor_path: join(&dir, DESCRIPTOR_FILE_NAME),
            dir,
        }
    }

    /// Remove the workspace directory. Failures are logged, not returned.
    pub fn remove(&self, fs: &dyn EngineFs) {
        if let Err(e) = fs.remove_dir_all(&self.dir) {
            warn!("Failed to remove workspace {}: {}", self.dir, e);
        }
    }
}

/// Write `data` to `path`, mapping the I/O error to a workspace error.
pub fn write(fs: &dyn EngineFs, path: &str, data: &[u8]) -> Result<(), X2tError> {
    debug!("Writing {} bytes to {}", data.len(), path);
    fs.write_file(path, data)
        .map_err(|e| X2tError::workspace(path, e))
}

pub fn read(fs: &dyn EngineFs, path: &str) -> Result<Bytes, X2tError> {
    let data = fs.read_file(path).map_err(|e| X2tError::workspace(path, e))?;
    debug!("Read {} bytes from {}", data.len(), path);
    Ok(Bytes::from(data))
}

/// Create the root and its reserved subdirectories.
///
/// "Already exists" is expected on every load after the first and is only
/// logged at debug level; anything else is a warning.
pub fn ensure_layout(fs: &dyn EngineFs, root: &str) {
    let mut dirs = vec![root.to_string()];
    dirs.extend(RESERVED_DIRS.iter().map(|d| join(root, d)));
    for dir in dirs {
        match fs.mkdir(&dir) {
            Ok(()) => debug!("Created {}", dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("{} already exists", dir)
            }
            Err(e) => warn!("Failed to create {}: {}", dir, e),
        }
    }
}

// ── Media ────────────────────────────────────────────────────────────────

/// Media extracted by one conversion.
#[derive(Debug, Default)]
pub struct HarvestedMedia {
    /// `media/<file>` → object URL.
    pub urls: BTreeMap<String, String>,
    /// Engine paths of the harvested files.
    pub paths: Vec<String>,
}

/// Read every file in `<root>/media` and register it as an object URL.
///
/// Unreadable files are skipped with a warning; an unreadable media
/// directory yields an empty result.
pub fn harvest_media(
    fs: &dyn EngineFs,
    root: &str,
    registry: &ObjectUrlRegistry,
) -> HarvestedMedia {
    let media_dir = join(root, MEDIA_DIR);
    let mut harvested = HarvestedMedia::default();

    let entries = match fs.read_dir(&media_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read media directory {}: {}", media_dir, e);
            return harvested;
        }
    };

    for file in entries {
        if file == "." || file == ".." {
            continue;
        }
        let path = join(&media_dir, &file);
        if fs.is_dir(&path) {
            continue;
        }
        match fs.read_file(&path) {
            Ok(data) => {
                let ext = file.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
                let url = registry.create(Bytes::from(data), formats::mime_type(ext));
                harvested.urls.insert(format!("{MEDIA_DIR}/{file}"), url);
                harvested.paths.push(path);
            }
            Err(e) => warn!("Failed to read media file {}: {}", path, e),
        }
    }

    if !harvested.urls.is_empty() {
        debug!("Harvested {} media files", harvested.urls.len());
    }
    harvested
}

// ── Purge ────────────────────────────────────────────────────────────────

/// Outcome of [`purge`]: what was removed and what could not be.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: Vec<String>,
    /// `(path, error message)` for every entry that could not be removed.
    pub failures: Vec<(String, String)>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, path: String, outcome: std::io::Result<()>) {
        match outcome {
            Ok(()) => self.removed.push(path),
            Err(e) => {
                warn!("Failed to remove {}: {}", path, e);
                self.failures.push((path, e.to_string()));
            }
        }
    }
}

/// Remove everything directly under `root` except the reserved
/// directories, then every file inside `<root>/media`.
///
/// Best effort: failures are logged and collected, deletions already made
/// are kept.
pub fn purge(fs: &dyn EngineFs, root: &str) -> PurgeReport {
    let mut report = PurgeReport::default();

    match fs.read_dir(root) {
        Ok(entries) => {
            for entry in entries {
                if entry == "." || entry == ".." || RESERVED_DIRS.contains(&entry.as_str()) {
                    continue;
                }
                let path = join(root, &entry);
                let outcome = if fs.is_dir(&path) {
                    fs.remove_dir_all(&path)
                } else {
                    fs.unlink(&path)
                };
                report.record(path, outcome);
            }
        }
        Err(e) => {
            warn!("Cannot read working directory {}: {}", root, e);
            report.failures.push((root.to_string(), e.to_string()));
        }
    }

    let media = clear_media(fs, root);
    report.removed.extend(media.removed);
    report.failures.extend(media.failures);
    report
}

/// Unlink every file in `<root>/media`, leaving the directory itself.
pub fn clear_media(fs: &dyn EngineFs, root: &str) -> PurgeReport {
    let mut report = PurgeReport::default();
    let media_dir = join(root, MEDIA_DIR);
    if let Ok(files) = fs.read_dir(&media_dir) {
        for file in files {
            if file == "." || file == ".." {
                continue;
            }
            let path = join(&media_dir, &file);
            if fs.is_dir(&path) {
                continue;
            }
            let outcome = fs.unlink(&path);
            report.record(path, outcome);
        }
    }
    report
}
