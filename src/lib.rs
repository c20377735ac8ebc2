//! # edgequake-x2t
//!
//! Drive the x2t document conversion engine from Rust.
//!
//! Hand the converter a document in whatever form you hold it (bytes, a
//! typed buffer, a file, a blob, an HTTP(S) URL, a `data:` URL, an object
//! URL, a `file://` URL or plain text) and get document bytes back in the
//! target format. The converter materialises the input, sets up an isolated
//! workspace in the engine's private filesystem, writes the XML job
//! descriptor, runs the engine and collects the output and any extracted
//! media.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Input
//!  │
//!  ├─ 1. Classify     which representation is this?
//!  ├─ 2. Materialize  bytes, per-representation strategy (async I/O)
//!  ├─ 3. Workspace    sanitise name, write input into the engine fs
//!  ├─ 4. Descriptor   params.xml for the engine
//!  ├─ 5. Engine       run x2t (spawn_blocking)
//!  └─ 6. Output       converted bytes + media object URLs
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_x2t::{ConverterConfig, ProcessEngineLoader, X2tConverter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = X2tConverter::new(
//!         ConverterConfig::default(),
//!         ProcessEngineLoader::new("/opt/onlyoffice/x2t"),
//!     )?;
//!     let bytes = std::fs::read("report.doc")?;
//!     // report.doc → report.docx → report.bin
//!     let bin = converter.convert_to_bin(bytes, "report.doc", "doc").await?;
//!     println!("{} bytes, category {:?}", bin.size, bin.category);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `x2t-convert` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-x2t = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod formats;
pub mod object_url;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use converter::{ConversionRequest, EngineState, X2tConverter};
pub use engine::{
    DiskFs, Engine, EngineFs, EngineLoader, LoadFuture, MemoryFs, ProcessEngine,
    ProcessEngineLoader,
};
pub use error::{EngineLoadError, MaterializeStage, X2tError};
pub use formats::DocumentCategory;
pub use object_url::ObjectUrlRegistry;
pub use output::{save_output, ConversionResult};
pub use pipeline::classify::{classify, format_size, Representation};
pub use pipeline::descriptor::{Directive, JobDescriptor};
pub use pipeline::input::{BlobHandle, FileHandle, Input, NumericKind, TypedBuffer};
pub use pipeline::workspace::{sanitize_file_name, PurgeReport};
