//! The x2t engine boundary.
//!
//! The engine is an opaque capability with a private filesystem and one
//! synchronous call: "run the job descriptor at this path", which returns a
//! status code (`0` = success). Everything the converter needs from it is
//! captured by two traits:
//!
//! * [`EngineFs`]: byte-addressed files under a virtual root. Paths are
//!   absolute, `/`-separated strings in the engine's namespace.
//! * [`Engine`]: the filesystem plus [`Engine::run`].
//!
//! Engines are produced asynchronously by an [`EngineLoader`] (fetching and
//! instantiating the engine binary may take a while); the converter shares
//! one in-flight load between concurrent callers.
//!
//! Back-ends shipped with the crate:
//!
//! | Type | Filesystem | Runs |
//! |------|------------|------|
//! | [`process::ProcessEngine`] | [`disk::DiskFs`] | an `x2t` executable, one process per job |
//! | any custom [`Engine`] | [`memory::MemoryFs`] | embedded engines, tests |

pub mod disk;
pub mod memory;
pub mod process;

use crate::error::EngineLoadError;
use futures::future::BoxFuture;
use std::io;
use std::sync::Arc;

pub use disk::DiskFs;
pub use memory::MemoryFs;
pub use process::{ProcessEngine, ProcessEngineLoader};

/// Filesystem operations the converter performs inside the engine.
///
/// All operations are synchronous; the converter calls them from a
/// blocking task.
pub trait EngineFs: Send + Sync {
    /// Create one directory. Fails with `AlreadyExists` if present.
    fn mkdir(&self, path: &str) -> io::Result<()>;

    /// Names of the entries directly inside `path`.
    fn read_dir(&self, path: &str) -> io::Result<Vec<String>>;

    /// Write a file, creating missing parent directories.
    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()>;

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Remove a file (not a directory).
    fn unlink(&self, path: &str) -> io::Result<()>;

    fn is_dir(&self, path: &str) -> bool;

    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &str) -> io::Result<()>;

    /// The path as the engine itself will see it when it reads the job
    /// descriptor. Identity for engines that share the virtual namespace.
    fn host_path(&self, path: &str) -> String {
        path.to_string()
    }
}

/// A loaded, ready-to-run conversion engine.
pub trait Engine: Send + Sync {
    fn fs(&self) -> &dyn EngineFs;

    /// Run the job descriptor stored at `descriptor_path`.
    ///
    /// `Ok(status)` means the engine ran; `status != 0` is a conversion
    /// failure. `Err` means it could not be run at all.
    fn run(&self, descriptor_path: &str) -> io::Result<i32>;
}

/// Result of an engine load. `Clone` so a single load can be shared.
pub type LoadResult = Result<Arc<dyn Engine>, EngineLoadError>;

/// Boxed future produced by [`EngineLoader::load`].
pub type LoadFuture = BoxFuture<'static, LoadResult>;

/// Produces engines. Called once per (re)initialisation.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> LoadFuture;
}

impl<F> EngineLoader for F
where
    F: Fn() -> LoadFuture + Send + Sync,
{
    fn load(&self) -> LoadFuture {
        self()
    }
}

/// Join a virtual directory and a child name with exactly one `/`.
pub fn join(dir: &str, name: &str) -> String {
    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}
