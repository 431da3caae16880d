// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! A writable in-memory layer over a read-only view of a host directory.
//!
//! Blueprints, resource inputs and render outputs are all accessed through
//! an [`OverlayFs`]. Reads see memory first and fall back to the host;
//! writes only ever touch memory until [`OverlayFs::persist`] is called.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

#[cfg(test)]
#[path = "./vfs_test.rs"]
mod vfs_test;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct OverlayFs {
    root: PathBuf,
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl OverlayFs {
    /// Create an overlay projecting `root`. The root does not need to exist.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to its location in the host projection.
    pub fn host_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.root.join(normalize(path.as_ref()))
    }

    /// Open a file for reading, preferring the memory layer.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> io::Result<Box<dyn Read + '_>> {
        let path = normalize(path.as_ref());
        if let Some(data) = self.files.get(&path) {
            return Ok(Box::new(Cursor::new(data.as_slice())));
        }
        if self.dirs.contains(&path) {
            return Err(is_a_directory(&path));
        }
        let file = std::fs::File::open(self.root.join(&path))?;
        Ok(Box::new(file))
    }

    pub fn read<P: AsRef<Path>>(&self, path: P) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn read_to_string<P: AsRef<Path>>(&self, path: P) -> io::Result<String> {
        let mut buf = String::new();
        self.open(path)?.read_to_string(&mut buf)?;
        Ok(buf)
    }

    /// Write a file into the memory layer, creating parents as needed.
    pub fn write<P: AsRef<Path>, C: Into<Vec<u8>>>(&mut self, path: P, contents: C) -> io::Result<()> {
        let path = normalize(path.as_ref());
        if path.as_os_str().is_empty() || self.dirs.contains(&path) {
            return Err(is_a_directory(&path));
        }
        if let Some(parent) = path.parent() {
            self.insert_dirs(parent);
        }
        self.files.insert(path, contents.into());
        Ok(())
    }

    /// Create a directory and all of its parents in the memory layer.
    pub fn mkdir_all<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        let path = normalize(path.as_ref());
        if self.files.contains_key(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a file", path.display()),
            ));
        }
        self.insert_dirs(&path);
        Ok(())
    }

    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = normalize(path.as_ref());
        self.files.contains_key(&path)
            || self.dirs.contains(&path)
            || path.as_os_str().is_empty()
            || self.root.join(&path).exists()
    }

    pub fn is_dir<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = normalize(path.as_ref());
        if self.files.contains_key(&path) {
            return false;
        }
        self.dirs.contains(&path) || self.root.join(&path).is_dir()
    }

    /// List a directory, merging both layers. Names are sorted.
    pub fn read_dir<P: AsRef<Path>>(&self, path: P) -> io::Result<Vec<DirEntry>> {
        let path = normalize(path.as_ref());
        let mut entries: BTreeMap<String, bool> = BTreeMap::new();
        let mut found = path.as_os_str().is_empty() || self.dirs.contains(&path);

        let host = self.root.join(&path);
        if host.is_dir() {
            found = true;
            for entry in std::fs::read_dir(&host)? {
                let entry = entry?;
                let is_dir = entry.file_type()?.is_dir();
                entries.insert(entry.file_name().to_string_lossy().into_owned(), is_dir);
            }
        }

        let children = self
            .dirs
            .iter()
            .map(|d| (d, true))
            .chain(self.files.keys().map(|f| (f, false)));
        for (child, is_dir) in children {
            if child.parent() == Some(path.as_path()) {
                if let Some(name) = child.file_name() {
                    entries.insert(name.to_string_lossy().into_owned(), is_dir);
                }
            }
        }

        if !found {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    /// All files below `path`, as sorted virtual paths relative to the root.
    pub fn walk_files<P: AsRef<Path>>(&self, path: P) -> io::Result<Vec<PathBuf>> {
        let path = normalize(path.as_ref());
        let mut out = Vec::new();
        self.walk_into(&path, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn walk_into(&self, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in self.read_dir(dir)? {
            let child = dir.join(&entry.name);
            if entry.is_dir {
                self.walk_into(&child, out)?;
            } else {
                out.push(child);
            }
        }
        Ok(())
    }

    /// Paths of all files currently held in memory.
    pub fn pending_files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    /// Flush the memory layer to the host.
    ///
    /// Either every file is written, or everything this call created is
    /// removed again and the first error is returned.
    pub fn persist(&self) -> io::Result<Vec<PathBuf>> {
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written: Vec<PathBuf> = Vec::new();

        let result = self.persist_into(&mut created_dirs, &mut written);
        if let Err(err) = result {
            for file in written.iter().rev() {
                if let Err(cleanup) = std::fs::remove_file(file) {
                    tracing::warn!(path = ?file, %cleanup, "failed to clean up partially written file");
                }
            }
            for dir in created_dirs.iter().rev() {
                let _ = std::fs::remove_dir(dir);
            }
            return Err(err);
        }
        Ok(written)
    }

    fn persist_into(
        &self,
        created_dirs: &mut Vec<PathBuf>,
        written: &mut Vec<PathBuf>,
    ) -> io::Result<()> {
        let wanted = self
            .dirs
            .iter()
            .cloned()
            .chain(std::iter::once(PathBuf::new()));
        for dir in wanted.collect::<BTreeSet<_>>() {
            create_dir_tracked(&self.root.join(dir), created_dirs)?;
        }
        for (path, data) in &self.files {
            let host = self.root.join(path);
            if let Some(parent) = host.parent() {
                create_dir_tracked(parent, created_dirs)?;
            }
            std::fs::write(&host, data)?;
            written.push(host);
        }
        Ok(())
    }

    fn insert_dirs(&mut self, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            self.dirs.insert(current.clone());
        }
    }
}

fn create_dir_tracked(dir: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_tracked(parent, created)?;
        }
    }
    std::fs::create_dir(dir)?;
    created.push(dir.to_path_buf());
    Ok(())
}

/// Reduce a virtual path to plain components, clamping `..` at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::other(format!("{} is a directory", path.display()))
}
