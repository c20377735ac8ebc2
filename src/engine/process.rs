//! Native-process engine: run an `x2t` executable once per job.
//!
//! The executable is invoked as `x2t <descriptor>` with the host path of the
//! job descriptor. Its exit code is the conversion status; a process killed
//! by a signal reports `-1`.

use super::{disk::DiskFs, Engine, EngineFs, EngineLoader, LoadFuture};
use crate::error::EngineLoadError;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ProcessEngine {
    executable: PathBuf,
    fs: DiskFs,
}

impl ProcessEngine {
    pub fn new(executable: impl Into<PathBuf>, fs: DiskFs) -> Self {
        Self {
            executable: executable.into(),
            fs,
        }
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }

    pub fn disk(&self) -> &DiskFs {
        &self.fs
    }
}

impl Engine for ProcessEngine {
    fn fs(&self) -> &dyn EngineFs {
        &self.fs
    }

    fn run(&self, descriptor_path: &str) -> io::Result<i32> {
        let descriptor = self.fs.resolve(descriptor_path)?;
        debug!(
            "Running {} {}",
            self.executable.display(),
            descriptor.display()
        );

        let output = Command::new(&self.executable)
            .arg(&descriptor)
            .current_dir(self.fs.root())
            .output()?;

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.status.success() {
                debug!("x2t stderr: {}", stderr.trim_end());
            } else {
                warn!("x2t stderr: {}", stderr.trim_end());
            }
        }

        Ok(output.status.code().unwrap_or(-1))
    }
}

/// Loads a [`ProcessEngine`]: verifies the executable and prepares the
/// host directory that backs the engine root.
#[derive(Debug, Clone)]
pub struct ProcessEngineLoader {
    executable: PathBuf,
    host_root: Option<PathBuf>,
}

impl ProcessEngineLoader {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            host_root: None,
        }
    }

    /// Back the engine root with this host directory instead of a
    /// temporary one.
    pub fn host_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.host_root = Some(root.into());
        self
    }
}

impl EngineLoader for ProcessEngineLoader {
    fn load(&self) -> LoadFuture {
        let executable = self.executable.clone();
        let host_root = self.host_root.clone();
        Box::pin(async move {
            info!("Loading x2t engine from {}", executable.display());

            let meta = tokio::fs::metadata(&executable).await.map_err(|e| {
                EngineLoadError::Failed(format!(
                    "x2t executable {}: {}",
                    executable.display(),
                    e
                ))
            })?;
            if !meta.is_file() {
                return Err(EngineLoadError::Failed(format!(
                    "x2t executable {} is not a file",
                    executable.display()
                )));
            }

            let fs = tokio::task::spawn_blocking(move || match host_root {
                Some(root) => DiskFs::new(root),
                None => DiskFs::temporary(),
            })
            .await
            .map_err(|e| EngineLoadError::Failed(format!("engine root task panicked: {e}")))?
            .map_err(|e| EngineLoadError::Failed(format!("engine root: {e}")))?;

            let engine: Arc<dyn Engine> = Arc::new(ProcessEngine::new(executable, fs));
            Ok(engine)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_fails_load() {
        let err = ProcessEngineLoader::new("/definitely/not/x2t")
            .load()
            .await
            .err()
            .expect("load fails");
        assert!(err.to_string().contains("/definitely/not/x2t"), "{err}");
    }

    #[tokio::test]
    async fn directory_is_not_an_executable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProcessEngineLoader::new(dir.path())
            .load()
            .await
            .err()
            .expect("load fails");
        assert!(err.to_string().contains("not a file"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_status() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("x2t");
        std::fs::write(&script, "#!/bin/sh\ntest -f \"$1\" || exit 3\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = ProcessEngineLoader::new(&script)
            .host_root(dir.path().join("root"))
            .load()
            .await
            .ok()
            .expect("engine loads");

        assert_eq!(engine.run("/working/params.xml").unwrap(), 3);
        engine
            .fs()
            .write_file("/working/params.xml", b"<TaskQueueDataConvert/>")
            .unwrap();
        assert_eq!(engine.run("/working/params.xml").unwrap(), 0);
    }
}
