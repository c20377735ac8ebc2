//! In-process registry of `blob:` object URLs.
//!
//! Harvested media are handed back to callers as object URLs rather than
//! raw byte maps. An object URL stays resolvable until revoked, so it can be
//! fed straight back into a conversion as an [`crate::pipeline::input::Input`]
//! string and the materializer will resolve it here.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const SCHEME_PREFIX: &str = "blob:x2t/";

/// Bytes registered under an object URL, with their MIME type.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub data: Bytes,
    pub mime: String,
}

/// Thread-safe map of object URL → bytes.
#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    entries: RwLock<HashMap<String, ObjectEntry>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` and return a fresh `blob:` URL for it.
    pub fn create(&self, data: Bytes, mime: impl Into<String>) -> String {
        let url = format!("{SCHEME_PREFIX}{}", Uuid::new_v4());
        let entry = ObjectEntry {
            data,
            mime: mime.into(),
        };
        debug!("Registered object URL {} ({} bytes)", url, entry.data.len());
        self.write().insert(url.clone(), entry);
        url
    }

    /// Look up an object URL. Returns `None` for unknown or revoked URLs.
    pub fn resolve(&self, url: &str) -> Option<ObjectEntry> {
        self.read().get(url.trim()).cloned()
    }

    /// Release the bytes behind `url`. Returns whether it was registered.
    pub fn revoke(&self, url: &str) -> bool {
        self.write().remove(url.trim()).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ObjectEntry>> {
        // A poisoned map is still structurally valid.
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ObjectEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
