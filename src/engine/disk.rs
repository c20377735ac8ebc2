//! Disk-backed engine filesystem.
//!
//! Maps the engine's virtual namespace onto a host directory: virtual
//! `/working/a.docx` lives at `<host_root>/working/a.docx`. Used by the
//! native-process engine, which reads and writes real files.

use super::EngineFs;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

#[derive(Debug)]
pub struct DiskFs {
    root: PathBuf,
    // Keeps a temporary root alive (and removes it on drop).
    _temp: Option<TempDir>,
}

impl DiskFs {
    /// Use `root` as the host directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Engine filesystem rooted at {}", root.display());
        Ok(Self { root, _temp: None })
    }

    /// Use a fresh temporary directory, removed when this value is dropped.
    pub fn temporary() -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("x2t-engine-").tempdir()?;
        let root = temp.path().to_path_buf();
        debug!("Engine filesystem rooted at temporary {}", root.display());
        Ok(Self {
            root,
            _temp: Some(temp),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host location of a virtual path. Rejects relative paths and `..`.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        if !path.starts_with('/') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path must be absolute: {path}"),
            ));
        }
        let mut out = self.root.clone();
        for comp in Path::new(path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes the engine root: {path}"),
                    ))
                }
            }
        }
        Ok(out)
    }
}

impl EngineFs for DiskFs {
    fn mkdir(&self, path: &str) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, data)
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn unlink(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn remove_dir_all(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove the root",
            ));
        }
        fs::remove_dir_all(target)
    }

    fn host_path(&self, path: &str) -> String {
        match self.resolve(path) {
            Ok(p) => p.to_string_lossy().into_owned(),
            Err(_) => path.to_string(),
        }
    }
}
