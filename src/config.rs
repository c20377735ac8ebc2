//! Configuration for the x2t converter.
//!
//! All converter behaviour is controlled through [`ConverterConfig`], built
//! via its [`ConverterConfigBuilder`]. Callers set only what they care about
//! and rely on the documented defaults for the rest.

use crate::error::X2tError;
use crate::formats;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for an [`crate::converter::X2tConverter`].
///
/// # Example
/// ```rust
/// use edgequake_x2t::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .working_root("/scratch")
///     .init_timeout_ms(5_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.working_root, "/scratch");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Root of the engine-side working area. Absolute, no trailing slash.
    /// Default: `/working`.
    pub working_root: String,

    /// Upper bound on engine load, in milliseconds. Default: 20 000.
    ///
    /// Only the load is bounded. A running conversion has no timeout.
    pub init_timeout_ms: u64,

    /// Download timeout for HTTP(S) inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Give every conversion its own `<name>-<request id>` directory.
    /// Default: true.
    ///
    /// With `false` the workspace is keyed by the sanitised name alone, so
    /// concurrent conversions of identically named documents share a
    /// directory.
    pub isolate_workspaces: bool,

    /// Keep request workspaces and harvested media files in the engine
    /// filesystem after a conversion. Default: false.
    pub retain_workspaces: bool,

    /// Load the engine on first use instead of failing with
    /// [`X2tError::EngineNotReady`]. Default: true.
    pub auto_initialize: bool,

    /// Target used by `convert_from_bin` when none is given. Default: `docx`.
    pub default_export_extension: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            working_root: "/working".to_string(),
            init_timeout_ms: 20_000,
            download_timeout_secs: 120,
            isolate_workspaces: true,
            retain_workspaces: false,
            auto_initialize: true,
            default_export_extension: "docx".to_string(),
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("working_root", &self.working_root)
            .field("init_timeout_ms", &self.init_timeout_ms)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("isolate_workspaces", &self.isolate_workspaces)
            .field("retain_workspaces", &self.retain_workspaces)
            .field("auto_initialize", &self.auto_initialize)
            .field("default_export_extension", &self.default_export_extension)
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn media_dir(&self) -> String {
        format!("{}/media", self.working_root)
    }

    pub fn fonts_dir(&self) -> String {
        format!("{}/fonts", self.working_root)
    }

    pub fn themes_dir(&self) -> String {
        format!("{}/themes", self.working_root)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    /// Trailing slashes are dropped.
    pub fn working_root(mut self, root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        self.config.working_root = if trimmed.is_empty() && !root.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        self
    }

    pub fn init_timeout_ms(mut self, ms: u64) -> Self {
        self.config.init_timeout_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn isolate_workspaces(mut self, v: bool) -> Self {
        self.config.isolate_workspaces = v;
        self
    }

    pub fn retain_workspaces(mut self, v: bool) -> Self {
        self.config.retain_workspaces = v;
        self
    }

    pub fn auto_initialize(mut self, v: bool) -> Self {
        self.config.auto_initialize = v;
        self
    }

    /// Accepts `docx`, `.docx` or `.DOCX`; stored bare and lowercase.
    pub fn default_export_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.config.default_export_extension = formats::bare_extension(ext.as_ref());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, X2tError> {
        let c = &self.config;
        if !c.working_root.starts_with('/') || c.working_root == "/" {
            return Err(X2tError::InvalidConfig(format!(
                "working_root must be an absolute directory below '/', got '{}'",
                c.working_root
            )));
        }
        if c.working_root.split('/').any(|part| part == "..") {
            return Err(X2tError::InvalidConfig(
                "working_root must not contain '..'".into(),
            ));
        }
        if c.init_timeout_ms == 0 {
            return Err(X2tError::InvalidConfig(
                "init_timeout_ms must be ≥ 1".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(X2tError::InvalidConfig(
                "download_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.default_export_extension.is_empty() || formats::is_intermediate(&c.default_export_extension) {
            return Err(X2tError::InvalidConfig(format!(
                "default_export_extension must name a document format, got '{}'",
                c.default_export_extension
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConverterConfig::default();
        assert_eq!(c.working_root, "/working");
        assert_eq!(c.init_timeout_ms, 20_000);
        assert_eq!(c.download_timeout_secs, 120);
        assert!(c.isolate_workspaces);
        assert!(!c.retain_workspaces);
        assert!(c.auto_initialize);
        assert_eq!(c.default_export_extension, "docx");
        assert_eq!(c.themes_dir(), "/working/themes");
        assert_eq!(ConverterConfig::builder().build().unwrap(), c);
    }

    #[test]
    fn builder_normalises_inputs() {
        let c = ConverterConfig::builder()
            .working_root("/scratch/x2t/")
            .default_export_extension(".DOCX")
            .build()
            .unwrap();
        assert_eq!(c.working_root, "/scratch/x2t");
        assert_eq!(c.default_export_extension, "docx");
        assert_eq!(c.fonts_dir(), "/scratch/x2t/fonts");
    }

    #[test]
    fn rejects_invalid_values() {
        for root in ["working", "/", "/a/../b", ""] {
            let err = ConverterConfig::builder().working_root(root).build();
            assert!(matches!(err, Err(X2tError::InvalidConfig(_))), "{root:?}");
        }
        assert!(ConverterConfig::builder().init_timeout_ms(0).build().is_err());
        assert!(ConverterConfig::builder().download_timeout_secs(0).build().is_err());
        assert!(ConverterConfig::builder()
            .default_export_extension("bin")
            .build()
            .is_err());
    }
}
