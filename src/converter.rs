//! The conversion orchestrator.
//!
//! [`X2tConverter`] owns the engine lifecycle and composes the pipeline
//! stages around it:
//!
//! ```text
//! wait for engine ─▶ materialize input ─┬▶ sanitize name ─▶ resolve category
//!                                       │  ─▶ allocate workspace ─▶ write input
//!                                       │  ─▶ write params.xml ─▶ run engine
//!                                       │  ─▶ read output ─▶ harvest media ─▶ clean up
//!                                       └── any failure here → ConversionFailed
//! ```
//!
//! ## Engine lifecycle
//!
//! `Unloaded → Loading → Ready`, `Loading → Failed`. At most one load is in
//! flight: concurrent callers of [`X2tConverter::initialize`] await the same
//! shared future. The load is bounded by `init_timeout_ms`; a timed-out or
//! failed load leaves the converter in `Failed`, from which the next call
//! starts a fresh load. The state lock is never held across an `.await`.
//!
//! ## Multi-step chains
//!
//! The engine only converts to and from its intermediate `.bin` format.
//! Legacy binaries (`doc`, `xls`, `ppt`) are first normalised to their
//! modern container, then converted to `.bin`:
//!
//! ```text
//! report.doc ──▶ report.docx ──▶ report.bin
//! report.docx ─────────────────▶ report.bin
//! ```

use crate::config::ConverterConfig;
use crate::engine::{Engine, EngineLoader, LoadFuture};
use crate::error::{EngineLoadError, X2tError};
use crate::formats::{self, DocumentCategory};
use crate::object_url::ObjectUrlRegistry;
use crate::output::ConversionResult;
use crate::pipeline::descriptor::{Directive, JobDescriptor};
use crate::pipeline::input::Input;
use crate::pipeline::materialize::Materializer;
use crate::pipeline::workspace::{self, PurgeReport, Workspace};
use bytes::Bytes;
use futures::future::{FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    /// The last load failed; the message is the load error.
    Failed(String),
}

enum Slot {
    Unloaded,
    Loading(Shared<LoadFuture>),
    Ready(Arc<dyn Engine>),
    Failed(String),
}

/// One conversion job: file name plus source and target extensions.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub name: String,
    pub from: String,
    pub to: String,
    pub directives: Vec<Directive>,
}

impl ConversionRequest {
    pub fn new(name: impl Into<String>, from: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            from: normalize_extension(from.as_ref()),
            to: normalize_extension(to.as_ref()),
            directives: Vec::new(),
        }
    }

    /// Add an extra engine directive to the job descriptor.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }
}

/// `docx`, `.docx`, `.DOCX` → `.docx`.
fn normalize_extension(ext: &str) -> String {
    formats::dotted_extension(ext).to_ascii_lowercase()
}

/// Converts documents through an x2t engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct X2tConverter {
    config: ConverterConfig,
    loader: Arc<dyn EngineLoader>,
    slot: Mutex<Slot>,
    materializer: Materializer,
    object_urls: Arc<ObjectUrlRegistry>,
}

impl std::fmt::Debug for X2tConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X2tConverter")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("object_urls", &self.object_urls.len())
            .finish()
    }
}

impl X2tConverter {
    pub fn new(config: ConverterConfig, loader: impl EngineLoader + 'static) -> Result<Self, X2tError> {
        Self::with_loader(config, Arc::new(loader))
    }

    pub fn with_loader(
        config: ConverterConfig,
        loader: Arc<dyn EngineLoader>,
    ) -> Result<Self, X2tError> {
        let object_urls = Arc::new(ObjectUrlRegistry::new());
        let materializer = Materializer::new(Arc::clone(&object_urls), config.download_timeout_secs)?;
        Ok(Self {
            config,
            loader,
            slot: Mutex::new(Slot::Unloaded),
            materializer,
            object_urls,
        })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Registry holding the object URLs handed out for harvested media.
    /// Revoke URLs once their media is no longer needed.
    pub fn object_urls(&self) -> &Arc<ObjectUrlRegistry> {
        &self.object_urls
    }

    pub fn state(&self) -> EngineState {
        match &*self.lock() {
            Slot::Unloaded => EngineState::Unloaded,
            Slot::Loading(_) => EngineState::Loading,
            Slot::Ready(_) => EngineState::Ready,
            Slot::Failed(reason) => EngineState::Failed(reason.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), Slot::Ready(_))
    }

    // ── Engine lifecycle ─────────────────────────────────────────────────

    /// Load the engine, or join the load already in flight.
    ///
    /// Returns immediately once ready. On success the working root and its
    /// `media`, `fonts` and `themes` directories exist.
    pub async fn initialize(&self) -> Result<Arc<dyn Engine>, X2tError> {
        let shared = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(engine) => return Ok(Arc::clone(engine)),
                Slot::Loading(shared) => {
                    debug!("Joining in-flight x2t engine load");
                    shared.clone()
                }
                Slot::Unloaded | Slot::Failed(_) => {
                    let shared = self.start_load();
                    *slot = Slot::Loading(shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        {
            let mut slot = self.lock();
            let still_current = matches!(&*slot, Slot::Loading(current) if current.ptr_eq(&shared));
            if still_current {
                *slot = match &result {
                    Ok(engine) => Slot::Ready(Arc::clone(engine)),
                    Err(e) => Slot::Failed(e.to_string()),
                };
            }
        }

        result.map_err(X2tError::from)
    }

    fn start_load(&self) -> Shared<LoadFuture> {
        let timeout_ms = self.config.init_timeout_ms;
        let root = self.config.working_root.clone();
        let load = self.loader.load();
        info!("Loading x2t engine (timeout {}ms)", timeout_ms);

        let fut: LoadFuture = Box::pin(async move {
            let start = Instant::now();
            let engine = match tokio::time::timeout(Duration::from_millis(timeout_ms), load).await {
                Ok(Ok(engine)) => engine,
                Ok(Err(e)) => {
                    warn!("x2t engine load failed: {}", e);
                    return Err(e);
                }
                Err(_) => {
                    warn!("x2t engine load timed out after {}ms", timeout_ms);
                    return Err(EngineLoadError::Timeout { ms: timeout_ms });
                }
            };

            let layout_engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || workspace::ensure_layout(layout_engine.fs(), &root))
                .await
                .map_err(|e| EngineLoadError::Failed(format!("layout task panicked: {e}")))?;

            info!("x2t engine ready in {}ms", start.elapsed().as_millis());
            Ok::<_, EngineLoadError>(engine)
        });
        fut.shared()
    }

    /// Drop the engine and return to `Unloaded`. A load in flight keeps
    /// running for the callers already awaiting it but no longer updates
    /// this converter. Returns whether a ready engine was released.
    pub fn release(&self) -> bool {
        let previous = std::mem::replace(&mut *self.lock(), Slot::Unloaded);
        let released = matches!(previous, Slot::Ready(_));
        if released {
            info!("x2t engine released");
        }
        released
    }

    async fn ready_engine(&self) -> Result<Arc<dyn Engine>, X2tError> {
        let ready = match &*self.lock() {
            Slot::Ready(engine) => Some(Arc::clone(engine)),
            _ => None,
        };
        if let Some(engine) = ready {
            return Ok(engine);
        }
        if !self.config.auto_initialize {
            return Err(X2tError::EngineNotReady);
        }
        self.initialize().await
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Convert `input` to the engine's intermediate format in one step.
    pub async fn convert_to_bin_direct(
        &self,
        input: impl Into<Input>,
        name: &str,
        source_ext: &str,
    ) -> Result<ConversionResult, X2tError> {
        self.convert(
            input,
            ConversionRequest::new(name, source_ext, formats::INTERMEDIATE_EXTENSION),
        )
        .await
    }

    /// Convert intermediate-format bytes to `target_ext` (default: the
    /// configured export extension).
    pub async fn convert_from_bin(
        &self,
        input: impl Into<Input>,
        name: &str,
        target_ext: Option<&str>,
    ) -> Result<ConversionResult, X2tError> {
        let target = target_ext.unwrap_or(&self.config.default_export_extension);
        self.convert(
            input,
            ConversionRequest::new(name, formats::INTERMEDIATE_EXTENSION, target),
        )
        .await
    }

    /// Normalise a legacy binary (`doc`, `xls`, `ppt`) to its modern
    /// container. `Ok(None)` when `source_ext` is not a legacy format.
    pub async fn normalize_legacy(
        &self,
        input: impl Into<Input>,
        name: &str,
        source_ext: &str,
    ) -> Result<Option<ConversionResult>, X2tError> {
        let Some(modern) = formats::legacy_upgrade(source_ext) else {
            return Ok(None);
        };
        info!("Normalising legacy {} to .{}", normalize_extension(source_ext), modern);
        self.convert(input, ConversionRequest::new(name, source_ext, modern))
            .await
            .map(Some)
    }

    /// Convert `input` to the intermediate format, normalising legacy
    /// sources first.
    pub async fn convert_to_bin(
        &self,
        input: impl Into<Input>,
        name: &str,
        source_ext: &str,
    ) -> Result<ConversionResult, X2tError> {
        let input = input.into();
        if formats::legacy_upgrade(source_ext).is_none() {
            return self.convert_to_bin_direct(input, name, source_ext).await;
        }

        let normalized = match self.normalize_legacy(input, name, source_ext).await? {
            Some(r) => r,
            None => return Err(X2tError::Internal("legacy normalisation produced no result".into())),
        };

        let converted = self
            .convert_to_bin_direct(
                Input::Bytes(normalized.data.clone()),
                &normalized.file_name_with_extension(),
                &normalized.extension,
            )
            .await;
        let mut result = match converted {
            Ok(result) => result,
            Err(e) => {
                for url in normalized.media.values() {
                    self.object_urls.revoke(url);
                }
                return Err(e);
            }
        };

        for (key, url) in normalized.media {
            if result.media.contains_key(&key) {
                self.object_urls.revoke(&url);
            } else {
                result.media.insert(key, url);
            }
        }
        Ok(result)
    }

    /// Run one engine conversion as described by `request`.
    ///
    /// Engine readiness and input materialization errors are returned as
    /// they are; every later failure is wrapped in
    /// [`X2tError::ConversionFailed`].
    pub async fn convert(
        &self,
        input: impl Into<Input>,
        request: ConversionRequest,
    ) -> Result<ConversionResult, X2tError> {
        let engine = self.ready_engine().await?;
        let data = self.materializer.materialize(input.into()).await?;
        debug!("Materialized {} input bytes", data.len());

        self.run_job(engine, data, request)
            .await
            .map_err(X2tError::into_conversion_failure)
    }

    async fn run_job(
        &self,
        engine: Arc<dyn Engine>,
        data: Bytes,
        request: ConversionRequest,
    ) -> Result<ConversionResult, X2tError> {
        let start = Instant::now();
        let ConversionRequest {
            name,
            from,
            to,
            directives,
        } = request;

        let file_name = workspace::checked_file_name(&name)?;
        let category = resolve_category(&from, &to)?;

        let ws = Workspace::allocate(
            &self.config.working_root,
            &file_name,
            &from,
            &to,
            self.config.isolate_workspaces,
        );

        let fs = engine.fs();
        let mut descriptor = JobDescriptor::new(
            fs.host_path(&ws.input_path),
            fs.host_path(&ws.output_path),
            fs.host_path(&self.config.themes_dir()),
        );
        if formats::is_fixed_layout(&to) {
            descriptor = descriptor.directive(Directive::font_dir(&fs.host_path(&self.config.fonts_dir())));
        }
        for d in directives {
            descriptor = descriptor.directive(d);
        }

        info!("Converting {}{} → {}", file_name, from, to);

        let job = BlockingJob {
            engine,
            workspace: ws,
            descriptor,
            input: data,
            root: self.config.working_root.clone(),
            retain: self.config.retain_workspaces,
            registry: Arc::clone(&self.object_urls),
        };
        let (output, media) = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| X2tError::Internal(format!("Conversion task panicked: {}", e)))??;

        info!(
            "Converted {}{} → {} ({} bytes, {} media) in {}ms",
            file_name,
            from,
            to,
            output.len(),
            media.len(),
            start.elapsed().as_millis()
        );

        Ok(ConversionResult {
            file_name,
            extension: to,
            category,
            media,
            size: output.len(),
            data: output,
        })
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Remove stale workspaces and media from the engine filesystem.
    ///
    /// Reserved directories (`media`, `fonts`, `themes`) are kept. Failures
    /// are collected in the report, never returned as errors.
    pub async fn purge_working_directory(&self) -> Result<PurgeReport, X2tError> {
        let engine = match &*self.lock() {
            Slot::Ready(engine) => Arc::clone(engine),
            _ => return Err(X2tError::EngineNotReady),
        };
        let root = self.config.working_root.clone();
        let report = tokio::task::spawn_blocking(move || workspace::purge(engine.fs(), &root))
            .await
            .map_err(|e| X2tError::Internal(format!("Purge task panicked: {}", e)))?;
        info!(
            "Purged working directory: {} removed, {} failed",
            report.removed.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

/// Document category of a conversion.
///
/// The category follows the target when converting out of the intermediate
/// format and the source otherwise. Fixed-layout formats have no category.
fn resolve_category(from: &str, to: &str) -> Result<Option<DocumentCategory>, X2tError> {
    for ext in [from, to] {
        if !formats::is_intermediate(ext)
            && !formats::is_fixed_layout(ext)
            && formats::category_for(ext).is_none()
        {
            return Err(X2tError::UnsupportedFormat {
                extension: ext.to_string(),
            });
        }
    }
    let effective = if formats::is_intermediate(from) { to } else { from };
    if formats::is_intermediate(effective) {
        return Err(X2tError::UnsupportedFormat {
            extension: effective.to_string(),
        });
    }
    Ok(formats::category_for(effective))
}

/// The synchronous part of a conversion, run on a blocking thread.
struct BlockingJob {
    engine: Arc<dyn Engine>,
    workspace: Workspace,
    descriptor: JobDescriptor,
    input: Bytes,
    root: String,
    retain: bool,
    registry: Arc<ObjectUrlRegistry>,
}

impl BlockingJob {
    fn run(self) -> Result<(Bytes, std::collections::BTreeMap<String, String>), X2tError> {
        let fs = self.engine.fs();
        let outcome = self.execute().map(|output| {
            let media = workspace::harvest_media(fs, &self.root, &self.registry);
            (output, media)
        });

        if !self.retain {
            self.workspace.remove(fs);
            match &outcome {
                Ok((_, media)) => {
                    for path in &media.paths {
                        if let Err(e) = fs.unlink(path) {
                            warn!("Failed to remove media file {}: {}", path, e);
                        }
                    }
                }
                Err(_) => {
                    let dropped = workspace::clear_media(fs, &self.root);
                    if !dropped.removed.is_empty() {
                        debug!(
                            "Discarded {} media files of a failed conversion",
                            dropped.removed.len()
                        );
                    }
                }
            }
        }

        outcome.map(|(output, media)| (output, media.urls))
    }

    fn execute(&self) -> Result<Bytes, X2tError> {
        let fs = self.engine.fs();
        let ws = &self.workspace;

        workspace::write(fs, &ws.input_path, &self.input)?;
        workspace::write(fs, &ws.descriptor_path, self.descriptor.render().as_bytes())?;

        let status = self
            .engine
            .run(&ws.descriptor_path)
            .map_err(|source| X2tError::EngineCall { source })?;
        if status != 0 {
            warn!("x2t returned status {} for {}", status, ws.descriptor_path);
            return Err(X2tError::EngineStatus { code: status });
        }

        workspace::read(fs, &ws.output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_follows_target_out_of_bin() {
        assert_eq!(
            resolve_category(".bin", ".xlsx").unwrap(),
            Some(DocumentCategory::Cell)
        );
        assert_eq!(
            resolve_category(".pptx", ".bin").unwrap(),
            Some(DocumentCategory::Slide)
        );
        assert_eq!(
            resolve_category(".doc", ".docx").unwrap(),
            Some(DocumentCategory::Word)
        );
    }

    #[test]
    fn pdf_export_has_no_category() {
        assert_eq!(resolve_category(".bin", ".pdf").unwrap(), None);
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        for (from, to) in [(".xyz", ".bin"), (".bin", ".xyz"), (".bin", ".bin")] {
            assert!(
                matches!(
                    resolve_category(from, to),
                    Err(X2tError::UnsupportedFormat { .. })
                ),
                "{from} → {to}"
            );
        }
    }

    #[test]
    fn request_normalises_extensions() {
        let r = ConversionRequest::new("a", "DOCX", ".Bin");
        assert_eq!(r.from, ".docx");
        assert_eq!(r.to, ".bin");
    }
}
