//! In-memory engine filesystem.
//!
//! A flat map from normalised absolute path to node. The root `/` always
//! exists. Suitable for engines embedded in-process and for tests.

use super::EngineFs;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Bytes),
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does anything exist at `path`?
    pub fn exists(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) => p == "/" || self.lock().contains_key(&p),
            Err(_) => false,
        }
    }

    /// Every file path currently stored, sorted.
    pub fn files(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize(path: &str) -> io::Result<String> {
    if !path.starts_with('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path must be absolute: {path}"),
        ));
    }
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("parent references are not allowed: {path}"),
                ))
            }
            other => parts.push(other),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

fn parent(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(i) => Some(&path[..i]),
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {path}"))
}

fn is_dir_in(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    path == "/" || matches!(nodes.get(path), Some(Node::Dir))
}

impl EngineFs for MemoryFs {
    fn mkdir(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.lock();
        if path == "/" || nodes.contains_key(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already exists: {path}"),
            ));
        }
        if let Some(p) = parent(&path) {
            if !is_dir_in(&nodes, p) {
                return Err(not_found(p));
            }
        }
        nodes.insert(path, Node::Dir);
        Ok(())
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let path = normalize(path)?;
        let nodes = self.lock();
        if !is_dir_in(&nodes, &path) {
            return Err(not_found(&path));
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| &k[prefix.len()..])
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.lock();
        if is_dir_in(&nodes, &path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            ));
        }
        let mut ancestor = parent(&path);
        while let Some(dir) = ancestor {
            let existing_is_dir = nodes.get(dir).map(|n| matches!(n, Node::Dir));
            match existing_is_dir {
                Some(false) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("not a directory: {dir}"),
                    ))
                }
                Some(true) => break,
                None if dir == "/" => break,
                None => {
                    nodes.insert(dir.to_string(), Node::Dir);
                }
            }
            ancestor = parent(dir);
        }
        nodes.insert(path, Node::File(Bytes::copy_from_slice(data)));
        Ok(())
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let path = normalize(path)?;
        match self.lock().get(&path) {
            Some(Node::File(data)) => Ok(data.to_vec()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn unlink(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.lock();
        match nodes.get(&path) {
            Some(Node::File(_)) => {
                nodes.remove(&path);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) => is_dir_in(&self.lock(), &p),
            Err(_) => false,
        }
    }

    fn remove_dir_all(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove the root",
            ));
        }
        let mut nodes = self.lock();
        if !is_dir_in(&nodes, &path) {
            return Err(not_found(&path));
        }
        let prefix = format!("{path}/");
        nodes.retain(|k, _| k != &path && !k.starts_with(&prefix));
        Ok(())
    }
}
